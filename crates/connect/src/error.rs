use adsight_api::ApiError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectError {
    #[error("No access token found. Please login again.")]
    Unauthenticated,

    #[error("Popup blocked! Please allow popups for this site and try again.")]
    PopupBlocked,

    #[error("Failed to get authorization URL from server.")]
    AuthorizationUrlMissing,

    #[error("Invalid state parameter. OAuth flow may have been compromised.")]
    StateMismatch,

    #[error("OAuth window was closed or connection failed. Please try again.")]
    StateLost,

    #[error("Connection timeout. Please try again.")]
    Timeout,

    #[error("Network error: {0}")]
    Network(String),

    #[error("{0}")]
    Backend(String),
}

impl ConnectError {
    /// Errors the user can recover from by pressing "try again" without
    /// signing in again.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ConnectError::Unauthenticated)
    }
}

impl From<ApiError> for ConnectError {
    fn from(e: ApiError) -> Self {
        match e {
            ApiError::Unauthenticated(_) | ApiError::SessionExpired => ConnectError::Unauthenticated,
            ApiError::Network(inner) => ConnectError::Network(inner.to_string()),
            ApiError::Backend(msg) => ConnectError::Backend(msg),
            other => ConnectError::Backend(other.to_string()),
        }
    }
}

pub type ConnectResult<T> = Result<T, ConnectError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expired_session_maps_to_unauthenticated() {
        assert_eq!(
            ConnectError::from(ApiError::SessionExpired),
            ConnectError::Unauthenticated
        );
        assert!(!ConnectError::Unauthenticated.is_retryable());
        assert!(ConnectError::PopupBlocked.is_retryable());
    }

    #[test]
    fn backend_message_is_kept_verbatim() {
        let err = ConnectError::from(ApiError::Backend("Google said no".into()));
        assert_eq!(err.to_string(), "Google said no");
    }
}
