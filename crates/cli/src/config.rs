use adsight_api::ClientConfig;
use adsight_connect::{BlockedPopupPolicy, HandshakeConfig, MissingStatePolicy, Timings};
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ClientConfig,
    pub connect: ConnectConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectConfig {
    /// Loopback port the authorization redirect is served on.
    pub callback_port: u16,
    pub poll_interval_secs: u64,
    pub short_timeout_secs: u64,
    pub medium_timeout_secs: u64,
    pub long_timeout_secs: u64,
    /// Print the authorization URL for manual opening when no browser
    /// window could be launched.
    pub popup_fallback: bool,
    /// Accept callbacks when no state token is pending. Disables the
    /// anti-forgery check.
    pub allow_missing_state: bool,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            callback_port: 8765,
            poll_interval_secs: 2,
            short_timeout_secs: 10,
            medium_timeout_secs: 30,
            long_timeout_secs: 60,
            popup_fallback: false,
            allow_missing_state: false,
        }
    }
}

impl ConnectConfig {
    pub fn missing_state_policy(&self) -> MissingStatePolicy {
        if self.allow_missing_state {
            MissingStatePolicy::AcceptWithWarning
        } else {
            MissingStatePolicy::Reject
        }
    }

    pub fn handshake(&self, expected_origin: &str) -> HandshakeConfig {
        HandshakeConfig {
            expected_origin: expected_origin.to_string(),
            missing_state: self.missing_state_policy(),
            blocked_popup: if self.popup_fallback {
                BlockedPopupPolicy::NavigateFallback
            } else {
                BlockedPopupPolicy::Fail
            },
            timings: Timings {
                poll_interval: Duration::from_secs(self.poll_interval_secs.max(1)),
                short: Duration::from_secs(self.short_timeout_secs),
                medium: Duration::from_secs(self.medium_timeout_secs),
                long: Duration::from_secs(self.long_timeout_secs),
            },
        }
    }
}

impl Config {
    pub fn default_path() -> PathBuf {
        if let Some(proj_dirs) = ProjectDirs::from("com", "adsight", "adsight") {
            proj_dirs.config_dir().join("config.toml")
        } else {
            PathBuf::from("config/default.toml")
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config at {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Invalid config at {}", path.display()))?;
        Ok(config)
    }

    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        Self::load(path).unwrap_or_else(|e| {
            warn!("{e:#}, using defaults");
            Self::default()
        })
    }

    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("ADSIGHT_API_URL").filter(|u| !u.is_empty()) {
            self.api.base_url = url;
        }
        if let Some(port) = lookup("ADSIGHT_CALLBACK_PORT") {
            match port.parse() {
                Ok(port) => self.connect.callback_port = port,
                Err(_) => warn!("Ignoring invalid ADSIGHT_CALLBACK_PORT: {port}"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[api]\nbase_url = \"https://api.adsight.test\"\n\n[connect]\nallow_missing_state = true\n",
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.api.base_url, "https://api.adsight.test");
        assert_eq!(config.api.chat_base_path, "/google-ads-new/api");
        assert_eq!(config.connect.callback_port, 8765);
        assert_eq!(
            config.connect.missing_state_policy(),
            MissingStatePolicy::AcceptWithWarning
        );
    }

    #[test]
    fn broken_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "api = 3").unwrap();

        let config = Config::load_or_default(&path);
        assert_eq!(config.api.base_url, "http://localhost:8000");
        assert!(!config.connect.popup_fallback);
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = Config::default();
        config.apply_overrides(|key| match key {
            "ADSIGHT_API_URL" => Some("https://prod.adsight.test".into()),
            "ADSIGHT_CALLBACK_PORT" => Some("not-a-port".into()),
            _ => None,
        });
        assert_eq!(config.api.base_url, "https://prod.adsight.test");
        assert_eq!(config.connect.callback_port, 8765);
    }

    #[test]
    fn handshake_defaults_are_strict() {
        let handshake = ConnectConfig::default().handshake("http://127.0.0.1:8765");
        assert_eq!(handshake.missing_state, MissingStatePolicy::Reject);
        assert_eq!(handshake.blocked_popup, BlockedPopupPolicy::Fail);
        assert_eq!(handshake.timings, Timings::default());
    }
}
