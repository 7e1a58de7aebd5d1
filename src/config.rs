//! Client configuration parsed from environment variables.

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;

use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_DEVELOPMENT_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_PRODUCTION_BASE_URL: &str = "https://api.yourdomain.com";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_STATE_DIR: &str = ".wingman";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config parse failed: {0}")]
    Parse(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    #[must_use]
    pub fn default_base_url(self) -> &'static str {
        match self {
            Self::Development => DEFAULT_DEVELOPMENT_BASE_URL,
            Self::Production => DEFAULT_PRODUCTION_BASE_URL,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

impl Timeouts {
    #[must_use]
    pub fn request(self) -> Duration {
        Duration::from_secs(self.request_secs)
    }

    #[must_use]
    pub fn connect(self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self { request_secs: DEFAULT_REQUEST_TIMEOUT_SECS, connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub environment: Environment,
    /// API root without a trailing slash; request paths are appended as-is.
    pub base_url: String,
    pub timeouts: Timeouts,
    pub state_dir: PathBuf,
}

impl ClientConfig {
    /// Config for a given base URL with default timeouts.
    #[must_use]
    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            environment: Environment::Development,
            base_url: normalize_base_url(base_url),
            timeouts: Timeouts::default(),
            state_dir: PathBuf::from(DEFAULT_STATE_DIR),
        }
    }

    /// Replace the base URL, normalized like the environment value.
    ///
    /// # Errors
    ///
    /// Returns an error when the URL is empty after normalization.
    pub fn set_base_url(&mut self, base_url: &str) -> Result<(), ConfigError> {
        let base_url = normalize_base_url(base_url);
        if base_url.is_empty() {
            return Err(ConfigError::Parse("base URL must not be empty".into()));
        }
        self.base_url = base_url;
        Ok(())
    }

    /// Build typed config from environment variables.
    ///
    /// Optional:
    /// - `WINGMAN_ENV`: `development` (default) or `production`
    /// - `WINGMAN_API_BASE_URL`: overrides the environment default
    /// - `WINGMAN_REQUEST_TIMEOUT_SECS`: default 30
    /// - `WINGMAN_CONNECT_TIMEOUT_SECS`: default 10
    /// - `WINGMAN_STATE_DIR`: default `.wingman`
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown `WINGMAN_ENV` or an empty base URL.
    pub fn from_env() -> Result<Self, ConfigError> {
        let environment = parse_environment(env_non_empty("WINGMAN_ENV").as_deref())?;
        let base_url = env_non_empty("WINGMAN_API_BASE_URL").unwrap_or_else(|| environment.default_base_url().to_owned());
        let base_url = normalize_base_url(&base_url);
        if base_url.is_empty() {
            return Err(ConfigError::Parse("WINGMAN_API_BASE_URL must not be empty".into()));
        }
        let timeouts = Timeouts {
            request_secs: env_parse_u64("WINGMAN_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_secs: env_parse_u64("WINGMAN_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS),
        };
        let state_dir = env_non_empty("WINGMAN_STATE_DIR").map_or_else(|| PathBuf::from(DEFAULT_STATE_DIR), PathBuf::from);

        Ok(Self { environment, base_url, timeouts, state_dir })
    }
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

/// Positive integer from `key`; zero, garbage, or absence yield `default`.
fn env_parse_u64(key: &str, default: u64) -> u64 {
    env_non_empty(key)
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default)
}

pub(crate) fn parse_environment(raw: Option<&str>) -> Result<Environment, ConfigError> {
    match raw.map(str::to_ascii_lowercase).as_deref().unwrap_or("development") {
        "development" | "dev" => Ok(Environment::Development),
        "production" | "prod" => Ok(Environment::Production),
        other => Err(ConfigError::Parse(format!("unknown WINGMAN_ENV: {other}"))),
    }
}

pub(crate) fn normalize_base_url(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_owned()
}
