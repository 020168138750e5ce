use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Window-feature strings tried in order, most restrictive chrome first.
pub const POPUP_FEATURES: [&str; 3] = [
    "width=500,height=600,scrollbars=yes,resizable=yes,menubar=no,toolbar=no,location=no,status=no",
    "width=600,height=700,scrollbars=yes,resizable=yes",
    "width=800,height=600,scrollbars=yes,resizable=yes",
];

pub const POPUP_NAME: &str = "google-oauth";

/// Reference to a spawned authorization window. Not owned data: the host
/// flips `closed` when the window goes away.
#[derive(Debug, Clone)]
pub struct PopupHandle {
    name: String,
    closed: Arc<AtomicBool>,
}

impl PopupHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PopupRefusal {
    /// The host returned no window at all.
    NoWindow,
    /// A window came back but is not usable.
    Inaccessible(String),
}

pub trait Browser {
    fn open_popup(&mut self, url: &str, name: &str, features: &str) -> Result<PopupHandle, PopupRefusal>;

    /// Full-page navigation of the current window. Returns false when the
    /// host cannot navigate either.
    fn navigate(&mut self, url: &str) -> bool;
}

/// The query string of the page the opener is showing.
pub trait Location {
    fn query(&self) -> Option<String>;

    /// Rewrites history so processed callback parameters disappear.
    fn strip_query(&mut self);
}

/// Shared in-process location; the host writes a URL into it when a
/// redirect lands in the current window.
#[derive(Clone, Default)]
pub struct MemoryLocation {
    url: Arc<Mutex<Option<String>>>,
}

impl MemoryLocation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_url(&self, url: impl Into<String>) {
        *self.url.lock().unwrap_or_else(|p| p.into_inner()) = Some(url.into());
    }

    pub fn url(&self) -> Option<String> {
        self.url.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

impl Location for MemoryLocation {
    fn query(&self) -> Option<String> {
        let url = self.url()?;
        match url.split_once('?') {
            Some((_, query)) => Some(query.split('#').next().unwrap_or("").to_string()),
            None if url.contains('=') => Some(url),
            None => None,
        }
    }

    fn strip_query(&mut self) {
        let mut guard = self.url.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(url) = guard.as_mut() {
            match url.split_once('?') {
                Some((base, _)) => *url = base.to_string(),
                None => *guard = None,
            }
        }
    }
}

/// `code`/`state` pair carried back by the authorization redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: String,
    pub state: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackQuery {
    Complete(CallbackParams),
    ProviderError(String),
    Incomplete,
}

impl CallbackQuery {
    pub fn parse(query: &str) -> Self {
        let query = query.trim_start_matches('?');
        let mut code = None;
        let mut state = None;
        let mut error = None;

        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "code" if !value.is_empty() => code = Some(value.into_owned()),
                "state" if !value.is_empty() => state = Some(value.into_owned()),
                "error" => error = Some(value.into_owned()),
                _ => {}
            }
        }

        match (code, state, error) {
            (Some(code), Some(state), _) => CallbackQuery::Complete(CallbackParams { code, state }),
            (_, _, Some(error)) => CallbackQuery::ProviderError(error),
            _ => CallbackQuery::Incomplete,
        }
    }
}

/// Structured cross-window message, keyed by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WindowMessage {
    #[serde(rename = "GOOGLE_OAUTH_SUCCESS")]
    Success {
        #[serde(default)]
        data: Value,
        #[serde(default)]
        state: Option<String>,
    },
    #[serde(rename = "GOOGLE_OAUTH_FAILURE")]
    Failure {
        #[serde(default)]
        error: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PostedMessage {
    pub origin: String,
    pub message: WindowMessage,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_complete_callback_query() {
        assert_eq!(
            CallbackQuery::parse("?code=4%2F0Ab&state=abc123&scope=ads"),
            CallbackQuery::Complete(CallbackParams {
                code: "4/0Ab".into(),
                state: "abc123".into()
            })
        );
        assert_eq!(CallbackQuery::parse("code=x"), CallbackQuery::Incomplete);
        assert_eq!(
            CallbackQuery::parse("error=access_denied&state=abc"),
            CallbackQuery::ProviderError("access_denied".into())
        );
    }

    #[test]
    fn memory_location_strips_query() {
        let mut location = MemoryLocation::new();
        location.set_url("http://localhost:5173/onboarding?code=c&state=s#top");
        assert_eq!(location.query().as_deref(), Some("code=c&state=s"));

        location.strip_query();
        assert_eq!(location.url().as_deref(), Some("http://localhost:5173/onboarding"));
        assert!(location.query().is_none());
    }

    #[test]
    fn window_message_uses_legacy_type_tags() {
        let msg: WindowMessage =
            serde_json::from_value(json!({ "type": "GOOGLE_OAUTH_FAILURE", "error": "denied" })).unwrap();
        assert_eq!(msg, WindowMessage::Failure { error: Some("denied".into()) });

        let encoded = serde_json::to_value(WindowMessage::Success {
            data: json!({ "connected": true }),
            state: Some("abc".into()),
        })
        .unwrap();
        assert_eq!(encoded["type"], "GOOGLE_OAUTH_SUCCESS");
    }

    #[test]
    fn popup_handle_close_is_shared() {
        let handle = PopupHandle::new(POPUP_NAME);
        let observer = handle.clone();
        handle.close();
        assert!(observer.is_closed());
    }
}
