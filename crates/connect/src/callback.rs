use crate::driver::{CodeExchange, MessagePort};
use crate::error::{ConnectError, ConnectResult};
use crate::machine::MissingStatePolicy;
use crate::state::PendingAuthorization;
use crate::window::{CallbackParams, CallbackQuery, WindowMessage};
use serde_json::{json, Value};
use tracing::{info, warn};

/// The window the provider redirects to. Finishes the exchange with the
/// backend and reports back to the opener.
pub struct CallbackPage<'a, X: ?Sized> {
    exchange: &'a X,
    pending: PendingAuthorization,
    opener: Option<(MessagePort, String)>,
    missing_state: MissingStatePolicy,
}

impl<'a, X: CodeExchange + ?Sized> CallbackPage<'a, X> {
    pub fn new(exchange: &'a X, pending: PendingAuthorization) -> Self {
        Self {
            exchange,
            pending,
            opener: None,
            missing_state: MissingStatePolicy::default(),
        }
    }

    /// Messages to the opener are stamped with `origin`.
    pub fn with_opener(mut self, opener: MessagePort, origin: impl Into<String>) -> Self {
        self.opener = Some((opener, origin.into()));
        self
    }

    pub fn with_missing_state(mut self, policy: MissingStatePolicy) -> Self {
        self.missing_state = policy;
        self
    }

    pub async fn complete(&self, query: &str) -> ConnectResult<Value> {
        let result = self.process(query).await;

        match &self.opener {
            Some((port, origin)) => {
                let message = match &result {
                    Ok((data, state)) => WindowMessage::Success {
                        data: data.clone(),
                        state: Some(state.clone()),
                    },
                    Err(e) => WindowMessage::Failure {
                        error: Some(e.to_string()),
                    },
                };
                if !port.post(origin, message) {
                    warn!("Opener is gone, clearing pending state");
                    self.pending.clear();
                }
            }
            None => self.pending.clear(),
        }

        result.map(|(data, _)| data)
    }

    async fn process(&self, query: &str) -> ConnectResult<(Value, String)> {
        let params = match CallbackQuery::parse(query) {
            CallbackQuery::Complete(params) => params,
            CallbackQuery::ProviderError(error) => {
                return Err(ConnectError::Backend(format!("OAuth error: {error}")))
            }
            CallbackQuery::Incomplete => {
                return Err(ConnectError::Backend(
                    "Missing authorization code or state parameter".to_string(),
                ))
            }
        };

        self.verify(&params)?;

        let exchanged = self.exchange.exchange_code(&params).await?;
        let report = self.exchange.confirm_connection().await?;
        if !report.connected {
            return Err(ConnectError::Backend(
                report
                    .message
                    .unwrap_or_else(|| "Google Ads connection was not confirmed".to_string()),
            ));
        }

        info!("Authorization code exchanged");
        let data = json!({
            "connected": true,
            "message": report.message,
            "exchange": exchanged,
        });
        Ok((data, params.state))
    }

    fn verify(&self, params: &CallbackParams) -> ConnectResult<()> {
        match self.pending.current() {
            Some(stored) if stored.matches(&params.state) => Ok(()),
            Some(_) => Err(ConnectError::StateMismatch),
            None => match self.missing_state {
                MissingStatePolicy::Reject => Err(ConnectError::StateLost),
                MissingStatePolicy::AcceptWithWarning => {
                    warn!("No stored OAuth state in callback window, skipping verification");
                    Ok(())
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::ConnectDriver;
    use crate::machine::{ConnectionStatus, HandshakeConfig};
    use crate::state::OAuthState;
    use crate::window::{MemoryLocation, PopupHandle, PopupRefusal, Browser};
    use adsight_api::ConnectionReport;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Backend {
        exchanged: AtomicUsize,
        connected: bool,
    }

    #[async_trait]
    impl CodeExchange for Backend {
        async fn exchange_code(&self, _params: &CallbackParams) -> ConnectResult<Value> {
            self.exchanged.fetch_add(1, Ordering::SeqCst);
            Ok(json!({ "success": true }))
        }

        async fn confirm_connection(&self) -> ConnectResult<ConnectionReport> {
            Ok(ConnectionReport {
                connected: self.connected,
                message: Some("Google Ads account connected".into()),
            })
        }
    }

    struct Popups;

    impl Browser for Popups {
        fn open_popup(&mut self, _url: &str, name: &str, _features: &str) -> Result<PopupHandle, PopupRefusal> {
            Ok(PopupHandle::new(name))
        }

        fn navigate(&mut self, _url: &str) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn without_opener_clears_state_itself() {
        let pending = PendingAuthorization::new();
        pending.store(OAuthState::new("abc123"));
        let backend = Backend {
            connected: true,
            ..Backend::default()
        };

        let page = CallbackPage::new(&backend, pending.clone());
        let data = page.complete("code=c0de&state=abc123").await.unwrap();

        assert_eq!(data["connected"], true);
        assert_eq!(backend.exchanged.load(Ordering::SeqCst), 1);
        assert!(!pending.is_pending());
    }

    #[tokio::test]
    async fn mismatched_state_skips_exchange() {
        let pending = PendingAuthorization::new();
        pending.store(OAuthState::new("abc123"));
        let backend = Backend::default();

        let page = CallbackPage::new(&backend, pending);
        let err = page.complete("code=c0de&state=forged").await.unwrap_err();

        assert_eq!(err, ConnectError::StateMismatch);
        assert_eq!(backend.exchanged.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn provider_error_is_reported() {
        let backend = Backend::default();
        let page = CallbackPage::new(&backend, PendingAuthorization::new());
        let err = page.complete("error=access_denied").await.unwrap_err();
        assert_eq!(err, ConnectError::Backend("OAuth error: access_denied".into()));
    }

    #[tokio::test]
    async fn unconfirmed_connection_is_a_failure() {
        let pending = PendingAuthorization::new();
        pending.store(OAuthState::new("abc123"));
        let backend = Backend::default();

        let page = CallbackPage::new(&backend, pending);
        let err = page.complete("code=c0de&state=abc123").await.unwrap_err();
        assert_eq!(err, ConnectError::Backend("Google Ads account connected".into()));
    }

    #[tokio::test]
    async fn success_is_posted_to_the_opener() {
        let origin = "http://127.0.0.1:8765";
        let pending = PendingAuthorization::new();
        let mut driver = ConnectDriver::new(
            HandshakeConfig::new(origin),
            pending.clone(),
            Popups,
            MemoryLocation::new(),
        );
        let backend = Backend {
            connected: true,
            ..Backend::default()
        };
        let grant = adsight_api::AuthorizationGrant {
            authorization_url: Some("https://x".into()),
            state: Some("abc123".into()),
        };

        struct Grant(adsight_api::AuthorizationGrant);

        #[async_trait]
        impl crate::driver::AuthorizationSource for Grant {
            async fn authorization_grant(&self) -> ConnectResult<adsight_api::AuthorizationGrant> {
                Ok(self.0.clone())
            }
        }

        let port = driver.port();
        let source = Grant(grant);
        let callback = async {
            tokio::task::yield_now().await;
            let page = CallbackPage::new(&backend, pending.clone()).with_opener(port, origin);
            page.complete("code=c0de&state=abc123").await
        };

        let (settled, posted) = tokio::join!(driver.connect(&source, &backend), callback);
        assert!(posted.is_ok());
        assert!(matches!(settled, Ok(crate::driver::Settled::Connected(_))));
        assert_eq!(driver.status(), ConnectionStatus::Connected);
        assert!(!pending.is_pending());
    }
}
