use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

/// Opaque server-issued nonce tying an authorization request to its callback.
#[derive(Clone, PartialEq, Eq)]
pub struct OAuthState(String);

impl OAuthState {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn matches(&self, candidate: &str) -> bool {
        self.0 == candidate
    }
}

impl fmt::Debug for OAuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix: String = self.0.chars().take(4).collect();
        write!(f, "OAuthState({prefix}…)")
    }
}

/// Handle on the one in-flight state token. Clones share the slot, so the
/// opener and the callback page observe the same value.
#[derive(Clone, Default)]
pub struct PendingAuthorization {
    slot: Arc<Mutex<Option<OAuthState>>>,
}

impl PendingAuthorization {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<OAuthState>> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Last write wins.
    pub fn store(&self, state: OAuthState) {
        let mut slot = self.lock();
        if let Some(previous) = slot.as_ref() {
            warn!(?previous, "Overwriting a pending OAuth state");
        }
        debug!(?state, "Stored OAuth state");
        *slot = Some(state);
    }

    pub fn current(&self) -> Option<OAuthState> {
        self.lock().clone()
    }

    pub fn is_pending(&self) -> bool {
        self.lock().is_some()
    }

    pub fn clear(&self) {
        if self.lock().take().is_some() {
            debug!("Cleared OAuth state");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_one_slot() {
        let opener = PendingAuthorization::new();
        let popup = opener.clone();

        opener.store(OAuthState::new("abc123"));
        assert!(popup.current().unwrap().matches("abc123"));

        popup.clear();
        assert!(!opener.is_pending());
    }

    #[test]
    fn last_write_wins() {
        let pending = PendingAuthorization::new();
        pending.store(OAuthState::new("first"));
        pending.store(OAuthState::new("second"));
        assert_eq!(pending.current().unwrap().as_str(), "second");
        pending.clear();
        assert!(pending.current().is_none());
    }

    #[test]
    fn debug_output_redacts_the_token() {
        let rendered = format!("{:?}", OAuthState::new("supersecretvalue"));
        assert!(!rendered.contains("supersecretvalue"));
        assert!(rendered.starts_with("OAuthState(supe"));
    }
}
