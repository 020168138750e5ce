use crate::error::{ConnectError, ConnectResult};
use crate::machine::{
    ConnectionStatus, Effect, Handshake, HandshakeConfig, HandshakeEvent, Launch, TimeoutStage,
};
use crate::state::PendingAuthorization;
use crate::window::{Browser, CallbackParams, Location, PostedMessage, WindowMessage};
use adsight_api::{AuthorizationGrant, BackendClient, ConnectionReport};
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[async_trait]
pub trait AuthorizationSource: Send + Sync {
    async fn authorization_grant(&self) -> ConnectResult<AuthorizationGrant>;
}

#[async_trait]
pub trait CodeExchange: Send + Sync {
    async fn exchange_code(&self, params: &CallbackParams) -> ConnectResult<Value>;

    async fn confirm_connection(&self) -> ConnectResult<ConnectionReport>;
}

#[async_trait]
impl AuthorizationSource for BackendClient {
    async fn authorization_grant(&self) -> ConnectResult<AuthorizationGrant> {
        if self.credentials().access_token().await.is_none() {
            return Err(ConnectError::Unauthenticated);
        }
        Ok(self.initiate_google_oauth().await?)
    }
}

#[async_trait]
impl CodeExchange for BackendClient {
    async fn exchange_code(&self, params: &CallbackParams) -> ConnectResult<Value> {
        Ok(self.exchange_google_code(&params.code, &params.state).await?)
    }

    async fn confirm_connection(&self) -> ConnectResult<ConnectionReport> {
        let report = self.google_oauth_status().await?;
        if let Err(e) = self.credentials().set_google_ads_connected(report.connected).await {
            warn!("Failed to persist connection flag: {e}");
        }
        Ok(report)
    }
}

/// Cloneable sender into the handshake queue.
#[derive(Clone)]
pub struct MessagePort {
    tx: mpsc::UnboundedSender<HandshakeEvent>,
}

impl MessagePort {
    /// Delivers a window message stamped with the sender's origin. Returns
    /// false once the driver is gone.
    pub fn post(&self, origin: &str, message: WindowMessage) -> bool {
        self.send(HandshakeEvent::Message(PostedMessage {
            origin: origin.to_string(),
            message,
        }))
    }

    pub fn reset(&self) -> bool {
        self.send(HandshakeEvent::Reset)
    }

    pub fn teardown(&self) -> bool {
        self.send(HandshakeEvent::Teardown)
    }

    fn send(&self, event: HandshakeEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Settled {
    Connected(Value),
    /// The user reset the flow or the host went away.
    Reset,
}

pub struct ConnectDriver<B, L> {
    handshake: Handshake,
    browser: B,
    location: L,
    tx: mpsc::UnboundedSender<HandshakeEvent>,
    rx: mpsc::UnboundedReceiver<HandshakeEvent>,
    timers: Option<CancellationToken>,
}

impl<B: Browser, L: Location> ConnectDriver<B, L> {
    pub fn new(config: HandshakeConfig, pending: PendingAuthorization, browser: B, location: L) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            handshake: Handshake::new(config, pending),
            browser,
            location,
            tx,
            rx,
            timers: None,
        }
    }

    pub fn port(&self) -> MessagePort {
        MessagePort { tx: self.tx.clone() }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.handshake.status()
    }

    pub fn pending(&self) -> &PendingAuthorization {
        self.handshake.pending()
    }

    /// Runs one connection attempt until it resolves or is reset.
    pub async fn connect<S, X>(&mut self, source: &S, exchange: &X) -> ConnectResult<Settled>
    where
        S: AuthorizationSource + ?Sized,
        X: CodeExchange + ?Sized,
    {
        while let Ok(stale) = self.rx.try_recv() {
            debug!(?stale, "Dropping event queued before this attempt");
        }

        let grant = match source.authorization_grant().await {
            Ok(grant) => grant,
            Err(e) => return Err(self.handshake.fail(e)),
        };

        let launch = self.handshake.begin(&grant, &mut self.browser)?;
        let attempt = launch.attempt();
        if !matches!(launch, Launch::AlreadyConnecting { .. }) {
            self.arm_timers(attempt);
        }
        info!(attempt, "Waiting for authorization");

        let result = self.drive(exchange).await;
        self.disarm_timers();
        result
    }

    async fn drive<X>(&mut self, exchange: &X) -> ConnectResult<Settled>
    where
        X: CodeExchange + ?Sized,
    {
        loop {
            let Some(event) = self.rx.recv().await else {
                return Ok(Settled::Reset);
            };

            let mut effect = self.handshake.handle(event, &mut self.location);

            if let Effect::ExchangeCode { attempt, params } = effect {
                let result = exchange.exchange_code(&params).await;
                let connected = match result {
                    Ok(data) => match exchange.confirm_connection().await {
                        Ok(report) if report.connected => Ok(data),
                        Ok(report) => Err(ConnectError::Backend(
                            report
                                .message
                                .unwrap_or_else(|| "Google Ads connection was not confirmed".to_string()),
                        )),
                        Err(e) => Err(e),
                    },
                    Err(e) => Err(e),
                };
                effect = self
                    .handshake
                    .handle(HandshakeEvent::Exchanged { attempt, result: connected }, &mut self.location);
            }

            match effect {
                Effect::Nothing | Effect::ExchangeCode { .. } => continue,
                Effect::Resolved(outcome) => return outcome.into_result().map(Settled::Connected),
                Effect::Abandoned => return Ok(Settled::Reset),
            }
        }
    }

    fn arm_timers(&mut self, attempt: u64) {
        self.disarm_timers();
        let token = CancellationToken::new();
        let timings = self.handshake.config().timings;

        let tx = self.tx.clone();
        let cancel = token.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(timings.poll_interval);
            // First tick fires immediately.
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        if tx.send(HandshakeEvent::Tick { attempt }).is_err() {
                            break;
                        }
                    }
                }
            }
        });

        for stage in TimeoutStage::LADDER {
            let tx = self.tx.clone();
            let cancel = token.clone();
            let delay = timings.delay(stage);
            tokio::spawn(async move {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(delay) => {
                        let _ = tx.send(HandshakeEvent::Timeout { attempt, stage });
                    }
                }
            });
        }

        self.timers = Some(token);
    }

    fn disarm_timers(&mut self) {
        if let Some(token) = self.timers.take() {
            token.cancel();
        }
    }
}

impl<B, L> Drop for ConnectDriver<B, L> {
    fn drop(&mut self) {
        if let Some(token) = self.timers.take() {
            token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::{MemoryLocation, PopupHandle, PopupRefusal};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    const ORIGIN: &str = "http://127.0.0.1:8765";

    struct StaticGrant(AuthorizationGrant);

    #[async_trait]
    impl AuthorizationSource for StaticGrant {
        async fn authorization_grant(&self) -> ConnectResult<AuthorizationGrant> {
            Ok(self.0.clone())
        }
    }

    struct NoGrant;

    #[async_trait]
    impl AuthorizationSource for NoGrant {
        async fn authorization_grant(&self) -> ConnectResult<AuthorizationGrant> {
            Err(ConnectError::Unauthenticated)
        }
    }

    #[derive(Default)]
    struct CountingExchange {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CodeExchange for CountingExchange {
        async fn exchange_code(&self, params: &CallbackParams) -> ConnectResult<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(json!({ "code": params.code }))
        }

        async fn confirm_connection(&self) -> ConnectResult<ConnectionReport> {
            Ok(ConnectionReport {
                connected: true,
                message: None,
            })
        }
    }

    #[derive(Clone, Default)]
    struct RecordingBrowser {
        opened: Arc<AtomicUsize>,
        blocked: bool,
    }

    impl Browser for RecordingBrowser {
        fn open_popup(&mut self, _url: &str, name: &str, _features: &str) -> Result<PopupHandle, PopupRefusal> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            if self.blocked {
                Err(PopupRefusal::NoWindow)
            } else {
                Ok(PopupHandle::new(name))
            }
        }

        fn navigate(&mut self, _url: &str) -> bool {
            panic!("navigation must not happen by default");
        }
    }

    fn abc123() -> StaticGrant {
        StaticGrant(AuthorizationGrant {
            authorization_url: Some("https://x".into()),
            state: Some("abc123".into()),
        })
    }

    fn driver(browser: RecordingBrowser, location: MemoryLocation) -> ConnectDriver<RecordingBrowser, MemoryLocation> {
        ConnectDriver::new(HandshakeConfig::new(ORIGIN), PendingAuthorization::new(), browser, location)
    }

    #[tokio::test(start_paused = true)]
    async fn posted_success_connects() {
        let mut driver = driver(RecordingBrowser::default(), MemoryLocation::new());
        let port = driver.port();
        let pending = driver.pending().clone();

        let poster = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            assert!(pending.current().unwrap().matches("abc123"));
            port.post(
                ORIGIN,
                WindowMessage::Success {
                    data: json!({ "connected": true }),
                    state: Some("abc123".into()),
                },
            );
        });

        let settled = driver.connect(&abc123(), &CountingExchange::default()).await.unwrap();
        poster.await.unwrap();

        assert_eq!(settled, Settled::Connected(json!({ "connected": true })));
        assert_eq!(driver.status(), ConnectionStatus::Connected);
        assert!(!driver.pending().is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn long_timeout_resolves_as_timeout() {
        let mut driver = driver(RecordingBrowser::default(), MemoryLocation::new());

        let err = driver.connect(&abc123(), &CountingExchange::default()).await.unwrap_err();
        assert_eq!(err, ConnectError::Timeout);
        assert_eq!(driver.status(), ConnectionStatus::Error("Connection timeout. Please try again.".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn lost_state_aborts_at_medium_timeout() {
        let mut driver = driver(RecordingBrowser::default(), MemoryLocation::new());
        let pending = driver.pending().clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(15)).await;
            pending.clear();
        });

        let started = tokio::time::Instant::now();
        let err = driver.connect(&abc123(), &CountingExchange::default()).await.unwrap_err();
        assert_eq!(err, ConnectError::StateLost);
        assert!(started.elapsed() < Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn redirect_in_location_is_exchanged_once() {
        let location = MemoryLocation::new();
        let mut driver = driver(RecordingBrowser::default(), location.clone());
        let exchange = CountingExchange::default();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            location.set_url("http://127.0.0.1:8765/callback?code=c0de&state=abc123");
        });

        let settled = driver.connect(&abc123(), &exchange).await.unwrap();
        assert_eq!(settled, Settled::Connected(json!({ "code": "c0de" })));
        assert_eq!(exchange.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_settles_and_leaves_idle() {
        let mut driver = driver(RecordingBrowser::default(), MemoryLocation::new());
        let port = driver.port();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            port.reset();
            port.reset();
        });

        let settled = driver.connect(&abc123(), &CountingExchange::default()).await.unwrap();
        assert_eq!(settled, Settled::Reset);
        assert_eq!(driver.status(), ConnectionStatus::Idle);
        assert!(!driver.pending().is_pending());
    }

    #[tokio::test]
    async fn blocked_popups_surface_error() {
        let browser = RecordingBrowser {
            blocked: true,
            ..RecordingBrowser::default()
        };
        let opened = browser.opened.clone();
        let mut driver = driver(browser, MemoryLocation::new());

        let err = driver.connect(&abc123(), &CountingExchange::default()).await.unwrap_err();
        assert_eq!(err, ConnectError::PopupBlocked);
        assert_eq!(opened.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn missing_credential_fails_before_opening_anything() {
        let browser = RecordingBrowser::default();
        let opened = browser.opened.clone();
        let mut driver = driver(browser, MemoryLocation::new());

        let err = driver.connect(&NoGrant, &CountingExchange::default()).await.unwrap_err();
        assert_eq!(err, ConnectError::Unauthenticated);
        assert_eq!(opened.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn backend_client_requires_access_token() {
        let client = BackendClient::new(Default::default(), Default::default());
        assert_eq!(
            client.authorization_grant().await.unwrap_err(),
            ConnectError::Unauthenticated
        );
    }
}
