use crate::error::{ConnectError, ConnectResult};
use crate::state::{OAuthState, PendingAuthorization};
use crate::window::{
    Browser, CallbackParams, CallbackQuery, Location, PopupHandle, PostedMessage, WindowMessage,
    POPUP_FEATURES, POPUP_NAME,
};
use adsight_api::AuthorizationGrant;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    Idle,
    Connecting,
    Connected,
    Error(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeoutStage {
    Short,
    Medium,
    Long,
}

impl TimeoutStage {
    pub const LADDER: [TimeoutStage; 3] = [TimeoutStage::Short, TimeoutStage::Medium, TimeoutStage::Long];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    pub poll_interval: Duration,
    pub short: Duration,
    pub medium: Duration,
    pub long: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            short: Duration::from_secs(10),
            medium: Duration::from_secs(30),
            long: Duration::from_secs(60),
        }
    }
}

impl Timings {
    pub fn delay(&self, stage: TimeoutStage) -> Duration {
        match stage {
            TimeoutStage::Short => self.short,
            TimeoutStage::Medium => self.medium,
            TimeoutStage::Long => self.long,
        }
    }
}

/// What to do when a callback arrives and no state token is pending.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingStatePolicy {
    #[default]
    Reject,
    /// Skips anti-forgery verification. Security defect kept only for
    /// deployments that cannot guarantee the pending state survives.
    AcceptWithWarning,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockedPopupPolicy {
    #[default]
    Fail,
    NavigateFallback,
}

#[derive(Debug, Clone)]
pub struct HandshakeConfig {
    /// Origin a posted message must come from to be considered.
    pub expected_origin: String,
    pub missing_state: MissingStatePolicy,
    pub blocked_popup: BlockedPopupPolicy,
    pub timings: Timings,
}

impl HandshakeConfig {
    pub fn new(expected_origin: impl Into<String>) -> Self {
        Self {
            expected_origin: expected_origin.into(),
            missing_state: MissingStatePolicy::default(),
            blocked_popup: BlockedPopupPolicy::default(),
            timings: Timings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Connected(Value),
    Failed(ConnectError),
}

impl Outcome {
    pub fn into_result(self) -> ConnectResult<Value> {
        match self {
            Outcome::Connected(data) => Ok(data),
            Outcome::Failed(e) => Err(e),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Phase {
    Idle,
    AwaitingCallback {
        attempt: u64,
        popup: Option<PopupHandle>,
        exchanging: bool,
    },
    Resolved(Outcome),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Launch {
    Popup { attempt: u64 },
    /// No popup could be opened and the current window was sent to the
    /// provider instead. The polling path picks up the redirect.
    Redirected { attempt: u64 },
    AlreadyConnecting { attempt: u64 },
}

impl Launch {
    pub fn attempt(&self) -> u64 {
        match self {
            Launch::Popup { attempt } | Launch::Redirected { attempt } | Launch::AlreadyConnecting { attempt } => {
                *attempt
            }
        }
    }
}

#[derive(Debug, Clone)]
pub enum HandshakeEvent {
    Message(PostedMessage),
    Tick { attempt: u64 },
    Timeout { attempt: u64, stage: TimeoutStage },
    /// Result of exchanging a code seen on the polling path.
    Exchanged { attempt: u64, result: ConnectResult<Value> },
    Reset,
    Teardown,
}

/// Side effect the host must carry out after an event.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Nothing,
    ExchangeCode { attempt: u64, params: CallbackParams },
    Resolved(Outcome),
    Abandoned,
}

pub struct Handshake {
    config: HandshakeConfig,
    pending: PendingAuthorization,
    phase: Phase,
    attempts: u64,
}

impl Handshake {
    pub fn new(config: HandshakeConfig, pending: PendingAuthorization) -> Self {
        Self {
            config,
            pending,
            phase: Phase::Idle,
            attempts: 0,
        }
    }

    pub fn config(&self) -> &HandshakeConfig {
        &self.config
    }

    pub fn pending(&self) -> &PendingAuthorization {
        &self.pending
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn status(&self) -> ConnectionStatus {
        match &self.phase {
            Phase::Idle => ConnectionStatus::Idle,
            Phase::AwaitingCallback { .. } => ConnectionStatus::Connecting,
            Phase::Resolved(Outcome::Connected(_)) => ConnectionStatus::Connected,
            Phase::Resolved(Outcome::Failed(e)) => ConnectionStatus::Error(e.to_string()),
        }
    }

    pub fn current_attempt(&self) -> Option<u64> {
        match &self.phase {
            Phase::AwaitingCallback { attempt, .. } => Some(*attempt),
            _ => None,
        }
    }

    /// Stores the grant's state token and opens the authorization window.
    pub fn begin(&mut self, grant: &AuthorizationGrant, browser: &mut dyn Browser) -> ConnectResult<Launch> {
        if let Some(attempt) = self.current_attempt() {
            debug!(attempt, "Ignoring initiation while a connection is in flight");
            return Ok(Launch::AlreadyConnecting { attempt });
        }

        let (url, state) = match (grant.authorization_url.as_deref(), grant.state.as_deref()) {
            (Some(url), Some(state)) if !url.is_empty() && !state.is_empty() => (url, state),
            _ => return Err(self.fail(ConnectError::AuthorizationUrlMissing)),
        };

        self.attempts += 1;
        let attempt = self.attempts;
        self.pending.store(OAuthState::new(state));

        for (i, features) in POPUP_FEATURES.iter().enumerate() {
            match browser.open_popup(url, POPUP_NAME, features) {
                Ok(popup) => {
                    info!(attempt, "Opened authorization window");
                    self.phase = Phase::AwaitingCallback {
                        attempt,
                        popup: Some(popup),
                        exchanging: false,
                    };
                    return Ok(Launch::Popup { attempt });
                }
                Err(refusal) => debug!(attempt, option = i + 1, ?refusal, "Popup attempt refused"),
            }
        }

        if self.config.blocked_popup == BlockedPopupPolicy::NavigateFallback && browser.navigate(url) {
            warn!(attempt, "All popups blocked, navigated the current window to the provider");
            self.phase = Phase::AwaitingCallback {
                attempt,
                popup: None,
                exchanging: false,
            };
            return Ok(Launch::Redirected { attempt });
        }

        warn!(attempt, "All popup attempts were blocked");
        Err(self.fail(ConnectError::PopupBlocked))
    }

    /// Resolves the flow with an error raised outside the event queue.
    pub fn fail(&mut self, error: ConnectError) -> ConnectError {
        self.resolve(Outcome::Failed(error.clone()));
        error
    }

    pub fn handle(&mut self, event: HandshakeEvent, location: &mut dyn Location) -> Effect {
        match event {
            HandshakeEvent::Reset | HandshakeEvent::Teardown => {
                self.pending.clear();
                self.close_popup();
                if !matches!(self.phase, Phase::Idle) {
                    match event {
                        HandshakeEvent::Teardown => info!("Opener went away, OAuth connection abandoned"),
                        _ => info!("OAuth connection reset"),
                    }
                }
                self.phase = Phase::Idle;
                Effect::Abandoned
            }
            HandshakeEvent::Message(posted) => self.on_message(posted),
            HandshakeEvent::Tick { attempt } => self.on_tick(attempt, location),
            HandshakeEvent::Timeout { attempt, stage } => self.on_timeout(attempt, stage),
            HandshakeEvent::Exchanged { attempt, result } => {
                if !self.is_awaiting(attempt) {
                    debug!(attempt, "Dropping stale exchange result");
                    return Effect::Nothing;
                }
                match result {
                    Ok(data) => self.resolve(Outcome::Connected(data)),
                    Err(e) => self.resolve(Outcome::Failed(e)),
                }
            }
        }
    }

    fn is_awaiting(&self, attempt: u64) -> bool {
        self.current_attempt() == Some(attempt)
    }

    fn on_message(&mut self, posted: PostedMessage) -> Effect {
        if self.current_attempt().is_none() {
            debug!("Message received while not connecting");
            return Effect::Nothing;
        }
        if posted.origin != self.config.expected_origin {
            warn!(origin = %posted.origin, "Ignoring message from foreign origin");
            return Effect::Nothing;
        }

        match posted.message {
            WindowMessage::Success { data, state } => {
                if let Some(state) = state.as_deref() {
                    if let Err(e) = self.verify_state(state) {
                        return self.resolve(Outcome::Failed(e));
                    }
                }
                self.resolve(Outcome::Connected(data))
            }
            WindowMessage::Failure { error } => {
                let message = error.unwrap_or_else(|| "OAuth connection failed".to_string());
                self.resolve(Outcome::Failed(ConnectError::Backend(message)))
            }
        }
    }

    fn on_tick(&mut self, attempt: u64, location: &mut dyn Location) -> Effect {
        match &self.phase {
            Phase::AwaitingCallback {
                attempt: current,
                exchanging: false,
                ..
            } if *current == attempt => {}
            _ => return Effect::Nothing,
        }

        let Some(query) = location.query() else {
            return Effect::Nothing;
        };

        match CallbackQuery::parse(&query) {
            CallbackQuery::Incomplete => Effect::Nothing,
            CallbackQuery::ProviderError(error) => {
                location.strip_query();
                self.resolve(Outcome::Failed(ConnectError::Backend(error)))
            }
            CallbackQuery::Complete(params) => {
                location.strip_query();
                if let Err(e) = self.verify_state(&params.state) {
                    return self.resolve(Outcome::Failed(e));
                }
                info!(attempt, "Authorization callback found in the current location");
                if let Phase::AwaitingCallback { exchanging, .. } = &mut self.phase {
                    *exchanging = true;
                }
                Effect::ExchangeCode { attempt, params }
            }
        }
    }

    fn on_timeout(&mut self, attempt: u64, stage: TimeoutStage) -> Effect {
        if !self.is_awaiting(attempt) {
            return Effect::Nothing;
        }

        match stage {
            TimeoutStage::Short => {
                let popup_closed = matches!(
                    &self.phase,
                    Phase::AwaitingCallback { popup: Some(p), .. } if p.is_closed()
                );
                info!(attempt, popup_closed, "Still waiting for the authorization callback");
                Effect::Nothing
            }
            TimeoutStage::Medium => {
                if self.pending.is_pending() {
                    Effect::Nothing
                } else {
                    warn!(attempt, "Pending OAuth state disappeared");
                    self.resolve(Outcome::Failed(ConnectError::StateLost))
                }
            }
            TimeoutStage::Long => {
                warn!(attempt, "OAuth connection timed out");
                self.resolve(Outcome::Failed(ConnectError::Timeout))
            }
        }
    }

    fn verify_state(&self, candidate: &str) -> ConnectResult<()> {
        match self.pending.current() {
            Some(stored) if stored.matches(candidate) => Ok(()),
            Some(_) => {
                warn!("OAuth state mismatch");
                Err(ConnectError::StateMismatch)
            }
            None => match self.config.missing_state {
                MissingStatePolicy::Reject => Err(ConnectError::StateLost),
                MissingStatePolicy::AcceptWithWarning => {
                    warn!("No stored OAuth state, accepting callback without verification");
                    Ok(())
                }
            },
        }
    }

    fn close_popup(&self) {
        if let Phase::AwaitingCallback { popup: Some(popup), .. } = &self.phase {
            popup.close();
        }
    }

    fn resolve(&mut self, outcome: Outcome) -> Effect {
        self.pending.clear();
        self.close_popup();
        match &outcome {
            Outcome::Connected(_) => info!("Google Ads connected"),
            Outcome::Failed(e) => warn!(error = %e, "OAuth connection failed"),
        }
        self.phase = Phase::Resolved(outcome.clone());
        Effect::Resolved(outcome)
    }
}
