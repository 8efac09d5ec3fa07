//! Static engine configuration.
//!
//! Built once at construction time from a TOML file and/or environment
//! variables; there is no hot reload in this core. Unknown proxy schemes
//! are downgraded to "no proxy" with a warning instead of failing startup,
//! matching the upstream clients' tolerance for half-configured boxes.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Base URL of the single-instance (standalone) catalog.
    pub standalone_base_url: String,
    /// Base URL of the shared-session (coop) catalog.
    pub coop_base_url: String,
    /// Outbound proxy for catalog traffic (`http://`, `https://`,
    /// `socks4://` or `socks5://`). `None` disables the proxy.
    pub proxy: Option<String>,
    /// Fixed informational part prepended to every dispatched bundle.
    pub info_part: String,
    /// Optional image reference attached to the informational part.
    pub info_image: Option<String>,
    pub fetch: FetchConfig,
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Attempt bound, including the first try.
    pub attempts: u32,
    /// Base delay; actual delay is `base × attempt_index` (linear).
    pub retry_delay_secs: u64,
    /// Per-request network timeout. Independent of the disambiguation
    /// timeout: hitting it is a retryable condition, not a session event.
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// How long a disambiguation prompt waits for the respondent.
    pub selection_timeout_secs: u64,
    /// Display cap for the candidate list.
    pub max_candidates: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            standalone_base_url: "https://www.xianyudanji.to".to_string(),
            coop_base_url: "https://byrutgame.org".to_string(),
            proxy: None,
            info_part: String::new(),
            info_image: None,
            fetch: FetchConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            retry_delay_secs: 2,
            timeout_secs: 30,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            selection_timeout_secs: 40,
            max_candidates: 5,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

impl EngineConfig {
    /// Load from a TOML file. Missing keys fall back to defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&raw)?;
        config.apply_env();
        config.validate_proxy();
        Ok(config)
    }

    /// Build from environment variables alone (defaults for everything
    /// unset). `.env` files are honored the same way the rest of the bot
    /// loads them.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let mut config = Self::default();
        config.apply_env();
        config.validate_proxy();
        config
    }

    fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("GAMESCOUT_STANDALONE_BASE_URL") {
            self.standalone_base_url = v;
        }
        if let Ok(v) = std::env::var("GAMESCOUT_COOP_BASE_URL") {
            self.coop_base_url = v;
        }
        if let Ok(v) = std::env::var("GAMESCOUT_PROXY") {
            self.proxy = if v.trim().is_empty() { None } else { Some(v) };
        }
    }

    fn validate_proxy(&mut self) {
        if let Some(proxy) = &self.proxy {
            let well_formed = ["http://", "https://", "socks4://", "socks5://"]
                .iter()
                .any(|scheme| proxy.starts_with(scheme));
            if !well_formed {
                tracing::warn!(proxy = %proxy, "Malformed proxy address; proxy disabled");
                self.proxy = None;
            }
        }
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.fetch.retry_delay_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch.timeout_secs)
    }

    pub fn selection_timeout(&self) -> Duration {
        Duration::from_secs(self.session.selection_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_observed_upstream_settings() {
        let config = EngineConfig::default();
        assert_eq!(config.fetch.attempts, 3);
        assert_eq!(config.fetch.retry_delay_secs, 2);
        assert_eq!(config.session.selection_timeout_secs, 40);
        assert_eq!(config.session.max_candidates, 5);
        assert!(config.proxy.is_none());
    }

    #[test]
    fn file_overrides_merge_over_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
coop_base_url = "https://mirror.example.org"

[fetch]
attempts = 5

[session]
selection_timeout_secs = 10
"#
        )
        .unwrap();

        let config = EngineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.coop_base_url, "https://mirror.example.org");
        assert_eq!(config.fetch.attempts, 5);
        // Unset keys keep their defaults.
        assert_eq!(config.fetch.retry_delay_secs, 2);
        assert_eq!(config.session.selection_timeout_secs, 10);
        assert_eq!(config.session.max_candidates, 5);
    }

    #[test]
    fn malformed_proxy_is_disabled_not_fatal() {
        let mut config = EngineConfig {
            proxy: Some("127.0.0.1:7890".to_string()),
            ..Default::default()
        };
        config.validate_proxy();
        assert!(config.proxy.is_none());

        let mut config = EngineConfig {
            proxy: Some("socks5://127.0.0.1:7890".to_string()),
            ..Default::default()
        };
        config.validate_proxy();
        assert_eq!(config.proxy.as_deref(), Some("socks5://127.0.0.1:7890"));
    }

    #[test]
    fn malformed_toml_propagates() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "fetch = \"not a table\"").unwrap();
        assert!(matches!(
            EngineConfig::from_file(file.path()),
            Err(ConfigError::Parse(_))
        ));
    }
}
