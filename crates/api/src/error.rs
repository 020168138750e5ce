use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not authenticated: {0}")]
    Unauthenticated(String),

    #[error("Session expired. Please log in again.")]
    SessionExpired,

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl ApiError {
    pub fn user_message(&self) -> &'static str {
        match self {
            ApiError::Unauthenticated(_) => "No access token found. Please login again.",
            ApiError::SessionExpired => "Authentication expired. Please login again.",
            ApiError::Network(_) => "Network error. Check your connection.",
            ApiError::Status { .. } => "Server error. Please try again later.",
            ApiError::Backend(_) => "The server rejected the request.",
            ApiError::Malformed(_) => "Unexpected response from the server.",
            ApiError::Storage(_) => "Could not read or write local credentials.",
        }
    }

    /// Short stable tag, used by front ends that surface errors as strings.
    pub fn tag(&self) -> &'static str {
        match self {
            ApiError::Unauthenticated(_) => "unauthenticated",
            ApiError::SessionExpired => "session_expired",
            ApiError::Network(_) => "network",
            ApiError::Status { .. } => "status",
            ApiError::Backend(_) => "backend",
            ApiError::Malformed(_) => "malformed",
            ApiError::Storage(_) => "storage",
        }
    }

    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            ApiError::Unauthenticated(_) | ApiError::SessionExpired | ApiError::Status { status: 401, .. }
        )
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError::Malformed(e.to_string())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

pub fn map_storage_error(e: anyhow::Error) -> ApiError {
    ApiError::Storage(e.to_string())
}
