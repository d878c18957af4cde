//! Configuration loader and validator for the listings marketplace core.
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::model::Session;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub store: Store,
    pub assist: Assist,
    #[serde(default)]
    pub session: Option<SessionConfig>,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub app_id: String,
    pub poll_interval_ms: u64,
}

/// Remote listing collection (snapshot source and write path).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Store {
    pub base_url: String,
    #[serde(default)]
    pub token: String,
}

/// Generative text endpoint used by the assist client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Assist {
    pub base_url: String,
    pub model: String,
    #[serde(default)]
    pub api_key: String,
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
}

/// Pre-established identity; sign-in itself happens elsewhere.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionConfig {
    pub user_id: String,
}

impl Config {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.app.poll_interval_ms)
    }

    /// Authenticated session, if one was configured.
    pub fn session(&self) -> Option<Session> {
        self.session
            .as_ref()
            .filter(|s| !s.user_id.trim().is_empty())
            .map(|s| Session::new(s.user_id.trim()))
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.app_id.trim().is_empty() {
        return Err(ConfigError::Invalid("app.app_id must be non-empty"));
    }
    if cfg.app.poll_interval_ms == 0 {
        return Err(ConfigError::Invalid("app.poll_interval_ms must be > 0"));
    }

    if Url::parse(&cfg.store.base_url).is_err() {
        return Err(ConfigError::Invalid("store.base_url must be a valid URL"));
    }

    if Url::parse(&cfg.assist.base_url).is_err() {
        return Err(ConfigError::Invalid("assist.base_url must be a valid URL"));
    }
    if cfg.assist.model.trim().is_empty() {
        return Err(ConfigError::Invalid("assist.model must be non-empty"));
    }
    if cfg.assist.max_attempts == 0 {
        return Err(ConfigError::Invalid("assist.max_attempts must be >= 1"));
    }
    if cfg.assist.initial_backoff_ms == 0 {
        return Err(ConfigError::Invalid("assist.initial_backoff_ms must be > 0"));
    }

    Ok(())
}

/// Example configuration, also used as the test fixture.
pub fn example() -> &'static str {
    r#"app:
  app_id: "sport-resell-prod"
  poll_interval_ms: 2000

store:
  base_url: "http://localhost:8080/"
  token: ""

assist:
  base_url: "https://generativelanguage.googleapis.com/"
  model: "gemini-2.5-flash-preview-09-2025"
  api_key: ""
  max_attempts: 5
  initial_backoff_ms: 1000

session:
  user_id: "anon-7f3a9c21"
"#
}
