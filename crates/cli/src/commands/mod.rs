use crate::config::Config;
use crate::console::Console;
use adsight_api::{ApiError, BackendClient, Credentials, SessionStore};
use adsight_connect::ConnectError;
use anyhow::{bail, Result};
use colored::Colorize;

pub mod account;
pub mod ads;
pub mod chat;
pub mod connect;
pub mod onboard;

pub struct Context {
    pub config: Config,
    pub client: BackendClient,
    pub console: Console,
}

impl Context {
    pub fn new(config: Config, store: SessionStore, console: Console) -> Result<Self> {
        let credentials = Credentials::load(store)?;
        let client = BackendClient::new(config.api.clone(), credentials);
        Ok(Self {
            config,
            client,
            console,
        })
    }

    pub async fn require_login(&self) -> Result<()> {
        if !self.client.credentials().is_authenticated().await {
            bail!(ApiError::Unauthenticated("Run `adsight login` first".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginRequired {
    /// No credentials were stored.
    Missing,
    /// A refresh was attempted and rejected.
    Expired,
}

impl LoginRequired {
    pub fn message(self) -> &'static str {
        match self {
            LoginRequired::Missing => "You need to log in first.",
            LoginRequired::Expired => "Your session has expired. Please log in again.",
        }
    }
}

/// Whether the error means the user has to log in before retrying.
pub fn login_required(error: &anyhow::Error) -> Option<LoginRequired> {
    match error.downcast_ref::<ApiError>() {
        Some(ApiError::SessionExpired) => return Some(LoginRequired::Expired),
        Some(ApiError::Unauthenticated(_)) => return Some(LoginRequired::Missing),
        Some(_) => return None,
        None => {}
    }
    matches!(error.downcast_ref::<ConnectError>(), Some(ConnectError::Unauthenticated))
        .then_some(LoginRequired::Missing)
}

pub fn report_error(context: &str, error: &anyhow::Error) {
    let detail = match error.downcast_ref::<ApiError>() {
        Some(ApiError::Backend(message)) => message.clone(),
        Some(api) => format!("{} ({api})", api.user_message()),
        None => redact_sensitive(&format!("{error:#}")),
    };
    tracing::warn!("{context}: {detail}");
    eprintln!("{} {context}: {detail}", "✗".red().bold());
}

pub fn success(message: &str) {
    println!("{} {message}", "✓".green().bold());
}

fn redact_sensitive(input: &str) -> String {
    match input.find("Bearer ") {
        Some(idx) => format!("{}Bearer [REDACTED]", &input[..idx]),
        None => input.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_requirements_are_detected_through_anyhow() {
        assert_eq!(
            login_required(&anyhow::Error::new(ApiError::SessionExpired)),
            Some(LoginRequired::Expired)
        );
        assert_eq!(
            login_required(&anyhow::Error::new(ConnectError::Unauthenticated)),
            Some(LoginRequired::Missing)
        );
        assert_eq!(login_required(&anyhow::Error::new(ConnectError::Timeout)), None);
        assert_eq!(login_required(&anyhow::anyhow!("boom")), None);
    }

    #[tokio::test]
    async fn never_logged_in_is_not_reported_as_expired() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = Context::new(
            Config::default(),
            SessionStore::new(dir.path()),
            Console::from_reader(std::io::Cursor::new("")),
        )
        .unwrap();

        let err = ctx.require_login().await.unwrap_err();
        let required = login_required(&err);
        assert_eq!(required, Some(LoginRequired::Missing));
        assert!(!required.unwrap().message().contains("expired"));
    }

    #[test]
    fn bearer_tokens_are_redacted() {
        assert_eq!(
            redact_sensitive("header Authorization: Bearer eyJhbGciOi"),
            "header Authorization: Bearer [REDACTED]"
        );
    }
}
