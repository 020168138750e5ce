use crate::csrf::{is_csrf_rejection, CsrfCache};
use crate::error::{map_storage_error, ApiError, ApiResult};
use crate::session::Credentials;
use crate::types::{
    envelope_error, unwrap_envelope, username_from_email, AccountSummary, AuthTokens,
    AuthorizationGrant, ConnectionReport, SignupForm, SyncRequest, User,
};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

pub mod endpoints {
    pub const SIGNUP: &str = "/accounts/api/signup/";
    pub const SIGNIN: &str = "/accounts/api/signin/";
    pub const SIGNOUT: &str = "/accounts/api/signout/";
    pub const CSRF: &str = "/accounts/api/csrf/";
    pub const GOOGLE_OAUTH_INITIATE: &str = "/accounts/api/google-oauth/initiate/";
    pub const GOOGLE_OAUTH_EXCHANGE_TOKENS: &str = "/accounts/api/google-oauth/exchange-tokens/";
    pub const GOOGLE_OAUTH_STATUS: &str = "/accounts/api/google-oauth/status/";
    pub const GOOGLE_ADS_ACCOUNT_SUMMARY: &str = "/google-ads-new/api/account-summary/";
    pub const GOOGLE_ADS_SYNC_DATA: &str = "/google-ads-new/api/sync-data/";
    pub const TOKEN_REFRESH: &str = "/accounts/api/token/refresh/";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub base_url: String,
    pub chat_base_path: String,
    pub request_timeout_secs: u64,
    pub oauth_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            chat_base_path: "/google-ads-new/api".to_string(),
            request_timeout_secs: 30,
            oauth_timeout_secs: 60,
        }
    }
}

#[derive(Clone, Copy)]
pub(crate) enum Body<'a> {
    Empty,
    Json(&'a Value),
    Form(&'a [(&'static str, String)]),
}

#[derive(Clone)]
pub struct BackendClient {
    http: Client,
    config: ClientConfig,
    credentials: Credentials,
    csrf: CsrfCache,
}

impl BackendClient {
    pub fn new(config: ClientConfig, credentials: Credentials) -> Self {
        let http = Client::builder()
            .user_agent("adsight/0.2")
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            http,
            config,
            credentials,
            csrf: CsrfCache::default(),
        }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn timeout_for(&self, path: &str) -> Duration {
        if path.contains("oauth") {
            Duration::from_secs(self.config.oauth_timeout_secs)
        } else {
            Duration::from_secs(self.config.request_timeout_secs)
        }
    }

    async fn csrf_token(&self) -> Option<String> {
        if let Some(token) = self.csrf.get().await {
            return Some(token);
        }

        let response = match self.http.get(self.url(endpoints::CSRF)).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!("Failed to fetch CSRF token: {}", e);
                return None;
            }
        };
        let data: Value = response.json().await.ok()?;
        let token = data.get("csrfToken").and_then(|v| v.as_str())?.to_string();
        self.csrf.put(token.clone()).await;
        Some(token)
    }

    fn build(
        &self,
        method: &Method,
        path: &str,
        body: Body<'_>,
        bearer: Option<&str>,
        csrf: Option<&str>,
    ) -> RequestBuilder {
        let mut request = self
            .http
            .request(method.clone(), self.url(path))
            .timeout(self.timeout_for(path));

        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }
        if let Some(csrf) = csrf {
            request = request.header("X-CSRFToken", csrf);
        }

        match body {
            Body::Empty => request,
            Body::Json(value) => request.json(value),
            Body::Form(fields) => request.form(fields),
        }
    }

    /// Sends one request. Non-GET requests carry the cached CSRF token; a
    /// CSRF rejection refreshes the token and retries exactly once.
    async fn dispatch(
        &self,
        method: &Method,
        path: &str,
        body: Body<'_>,
        bearer: Option<&str>,
    ) -> ApiResult<Response> {
        if *method == Method::GET {
            return Ok(self.build(method, path, body, bearer, None).send().await?);
        }

        let csrf = self.csrf_token().await;
        let response = self
            .build(method, path, body, bearer, csrf.as_deref())
            .send()
            .await?;

        if response.status() != StatusCode::FORBIDDEN {
            return Ok(response);
        }

        let text = response.text().await?;
        if !is_csrf_rejection(403, &text) {
            return Err(ApiError::Status {
                status: 403,
                body: text,
            });
        }

        warn!("CSRF token rejected for {}, refetching and retrying once", path);
        self.csrf.invalidate().await;
        let csrf = self.csrf_token().await;
        Ok(self
            .build(method, path, body, bearer, csrf.as_deref())
            .send()
            .await?)
    }

    pub(crate) async fn send_public(
        &self,
        method: Method,
        path: &str,
        body: Body<'_>,
    ) -> ApiResult<Value> {
        let response = self.dispatch(&method, path, body, None).await?;
        read_json(response).await
    }

    /// Sends a bearer-authenticated request. A 401 triggers one token refresh
    /// and one retry; a failed refresh signs the user out.
    pub(crate) async fn send_authed(
        &self,
        method: Method,
        path: &str,
        body: Body<'_>,
    ) -> ApiResult<Value> {
        let token = self
            .credentials
            .access_token()
            .await
            .ok_or_else(|| ApiError::Unauthenticated("No access token found".to_string()))?;

        let response = self.dispatch(&method, path, body, Some(&token)).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return read_json(response).await;
        }

        info!("Access token rejected by {}, attempting refresh", path);
        let fresh = match self.refresh_access_token().await {
            Ok(token) => token,
            Err(e) => {
                warn!("Token refresh failed, signing out: {}", e);
                self.force_logout().await;
                return Err(ApiError::SessionExpired);
            }
        };

        debug!("Token refreshed, retrying {}", path);
        let retried = self.dispatch(&method, path, body, Some(&fresh)).await?;
        read_json(retried).await
    }

    async fn force_logout(&self) {
        self.csrf.invalidate().await;
        if let Err(e) = self.credentials.clear().await {
            warn!("Failed to clear stored credentials: {}", e);
        }
    }

    pub async fn signup(&self, form: &SignupForm) -> ApiResult<User> {
        let fields = form.form_fields();
        let data = self
            .send_public(Method::POST, endpoints::SIGNUP, Body::Form(&fields))
            .await?;
        let tokens: AuthTokens = unwrap_envelope(data, "Signup failed")?;

        let fallback_name = format!("{} {}", form.first_name, form.last_name);
        let user = User::from_payload(tokens.user.as_ref(), fallback_name.trim(), &form.email);
        self.credentials
            .sign_in(tokens.access_token, tokens.refresh_token, user.clone())
            .await
            .map_err(map_storage_error)?;

        info!("Signed up as {}", user.email);
        Ok(user)
    }

    pub async fn login(&self, email: &str, password: &str) -> ApiResult<User> {
        let username = username_from_email(email);
        let fields = [("username", username.clone()), ("password", password.to_string())];
        let data = self
            .send_public(Method::POST, endpoints::SIGNIN, Body::Form(&fields))
            .await?;
        let tokens: AuthTokens = unwrap_envelope(data, "Login failed")?;

        let user = User::from_payload(tokens.user.as_ref(), &username, email);
        self.credentials
            .sign_in(tokens.access_token, tokens.refresh_token, user.clone())
            .await
            .map_err(map_storage_error)?;

        info!("Logged in as {}", user.email);
        Ok(user)
    }

    /// Always clears local state, even when the remote sign-out fails.
    pub async fn logout(&self) -> ApiResult<()> {
        if let Some(token) = self.credentials.access_token().await {
            let empty = json!({});
            match self
                .dispatch(&Method::POST, endpoints::SIGNOUT, Body::Json(&empty), Some(&token))
                .await
            {
                Ok(response) if response.status().is_success() => {}
                Ok(response) => warn!(
                    "Logout API call failed ({}), clearing local data anyway",
                    response.status()
                ),
                Err(e) => warn!("Logout API call failed: {}, clearing local data anyway", e),
            }
        }

        self.csrf.invalidate().await;
        self.credentials.clear().await.map_err(map_storage_error)?;
        info!("Logged out");
        Ok(())
    }

    pub async fn refresh_access_token(&self) -> ApiResult<String> {
        let refresh = self
            .credentials
            .refresh_token()
            .await
            .ok_or_else(|| ApiError::Unauthenticated("No refresh token found".to_string()))?;

        let response = self
            .http
            .post(self.url(endpoints::TOKEN_REFRESH))
            .json(&json!({ "refresh": refresh }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status { status, body });
        }

        let data: Value = response.json().await?;
        let access = data
            .get("access")
            .and_then(|v| v.as_str())
            .map(String::from)
            .ok_or_else(|| ApiError::Malformed("No access token in refresh response".to_string()))?;

        self.credentials
            .set_access_token(access.clone())
            .await
            .map_err(map_storage_error)?;
        info!("Access token refreshed");
        Ok(access)
    }

    pub async fn initiate_google_oauth(&self) -> ApiResult<AuthorizationGrant> {
        let data = self
            .send_authed(Method::GET, endpoints::GOOGLE_OAUTH_INITIATE, Body::Empty)
            .await?;
        debug!("OAuth initiation response received");
        unwrap_envelope(data, "Failed to get authorization URL from server.")
    }

    pub async fn exchange_google_code(&self, code: &str, state: &str) -> ApiResult<Value> {
        let body = json!({ "code": code, "state": state });
        let data = self
            .send_authed(
                Method::POST,
                endpoints::GOOGLE_OAUTH_EXCHANGE_TOKENS,
                Body::Json(&body),
            )
            .await?;
        unwrap_envelope(data, "Failed to exchange authorization code for tokens")
    }

    pub async fn google_oauth_status(&self) -> ApiResult<ConnectionReport> {
        let data = self
            .send_authed(Method::GET, endpoints::GOOGLE_OAUTH_STATUS, Body::Empty)
            .await?;
        unwrap_envelope(data, "Failed to check connection status")
    }

    /// Fresh check against the backend; the cached flag follows the answer and
    /// any failure counts as "not connected".
    pub async fn validate_google_connection(&self) -> ConnectionReport {
        let report = match self.google_oauth_status().await {
            Ok(report) => report,
            Err(e) => {
                warn!("Google OAuth connection validation failed: {}", e);
                let message = if e.is_auth_failure() {
                    "Authentication expired".to_string()
                } else {
                    "Failed to validate connection".to_string()
                };
                ConnectionReport {
                    connected: false,
                    message: Some(message),
                }
            }
        };

        if let Err(e) = self
            .credentials
            .set_google_ads_connected(report.connected)
            .await
        {
            warn!("Failed to persist connection flag: {}", e);
        }
        report
    }

    pub async fn disconnect_google_ads(&self) -> ApiResult<()> {
        self.credentials
            .set_google_ads_connected(false)
            .await
            .map_err(map_storage_error)?;
        info!("Google Ads disconnected");
        Ok(())
    }

    pub async fn account_summary(&self) -> ApiResult<AccountSummary> {
        #[derive(Deserialize)]
        struct SummaryBody {
            #[serde(default)]
            summary: AccountSummary,
        }

        let data = self
            .send_authed(Method::GET, endpoints::GOOGLE_ADS_ACCOUNT_SUMMARY, Body::Empty)
            .await?;
        let body: SummaryBody = unwrap_envelope(data, "Failed to get account summary")?;
        Ok(body.summary)
    }

    pub async fn sync_google_ads(&self, weeks_back: u32) -> ApiResult<Value> {
        info!("Starting Google Ads data sync, {} weeks back", weeks_back);
        let request = serde_json::to_value(SyncRequest::weekly(weeks_back))?;
        let mut data = self
            .send_authed(Method::POST, endpoints::GOOGLE_ADS_SYNC_DATA, Body::Json(&request))
            .await?;

        if !crate::types::envelope_ok(&data) {
            return Err(ApiError::Backend(envelope_error(
                &data,
                "Failed to sync Google Ads data",
            )));
        }
        info!("Google Ads data sync completed");
        Ok(match data.get_mut("data").map(Value::take) {
            Some(inner) if !inner.is_null() => inner,
            _ => data,
        })
    }
}

/// Decodes a response body. Error statuses carrying an envelope surface its
/// message; anything else keeps the raw body.
pub(crate) async fn read_json(response: Response) -> ApiResult<Value> {
    let status = response.status();
    let text = response.text().await?;

    if status.is_success() {
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        return serde_json::from_str(&text).map_err(|e| ApiError::Malformed(e.to_string()));
    }

    if status != StatusCode::UNAUTHORIZED {
        if let Ok(data) = serde_json::from_str::<Value>(&text) {
            if data.get("message").is_some() || data.get("errors").is_some() {
                return Err(ApiError::Backend(envelope_error(&data, status.as_str())));
            }
        }
    }

    Err(ApiError::Status {
        status: status.as_u16(),
        body: text,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;

    #[test]
    fn oauth_paths_get_the_longer_timeout() {
        let client = BackendClient::new(
            ClientConfig::default(),
            Credentials::in_memory(Session::default()),
        );
        assert_eq!(
            client.timeout_for(endpoints::GOOGLE_OAUTH_INITIATE),
            Duration::from_secs(60)
        );
        assert_eq!(client.timeout_for(endpoints::SIGNIN), Duration::from_secs(30));
    }

    #[test]
    fn url_joins_without_double_slash() {
        let config = ClientConfig {
            base_url: "http://api.test/".to_string(),
            ..ClientConfig::default()
        };
        let client = BackendClient::new(config, Credentials::default());
        assert_eq!(client.url(endpoints::SIGNIN), "http://api.test/accounts/api/signin/");
    }

    #[tokio::test]
    async fn authed_request_without_token_is_unauthenticated() {
        let client = BackendClient::new(ClientConfig::default(), Credentials::default());
        let result = client.account_summary().await;
        assert!(matches!(result, Err(ApiError::Unauthenticated(_))));
    }
}
