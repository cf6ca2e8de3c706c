//! Client configuration.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const ENV_SHELL_URL: &str = "REMOTE_SHELL_URL";
pub const ENV_USER_AGENT: &str = "REMOTE_SHELL_USER_AGENT";
pub const ENV_CONNECT_TIMEOUT_SECS: &str = "REMOTE_SHELL_CONNECT_TIMEOUT_SECS";

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000/";
const DEFAULT_USER_AGENT: &str = concat!("remote-shell/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0}")]
    Message(String),
}

impl ConfigError {
    fn configuration(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }
}

/// Where and how to reach the shell server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Bounds connection establishment only; output polls are long-lived.
    #[serde(default)]
    pub connect_timeout_secs: Option<u64>,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_owned()
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_owned()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_agent: default_user_agent(),
            connect_timeout_secs: None,
        }
    }
}

impl ClientConfig {
    /// Config pointing at `base_url`, everything else default.
    #[must_use]
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Defaults overlaid with `REMOTE_SHELL_*` environment variables.
    ///
    /// # Errors
    /// Returns error if a variable is present but invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(url) = non_blank(lookup(ENV_SHELL_URL)) {
            config.base_url = url;
        }
        if let Some(agent) = non_blank(lookup(ENV_USER_AGENT)) {
            config.user_agent = agent;
        }
        if let Some(raw) = non_blank(lookup(ENV_CONNECT_TIMEOUT_SECS)) {
            let secs = raw.parse::<u64>().map_err(|_| {
                ConfigError::configuration(format!(
                    "{ENV_CONNECT_TIMEOUT_SECS} must be a whole number of seconds, got '{raw}'"
                ))
            })?;
            config.connect_timeout_secs = Some(secs);
        }

        config.validate()?;
        Ok(config)
    }

    /// Check the base URL and normalise it to end in `/`.
    ///
    /// # Errors
    /// Returns error if the base URL is not an absolute http(s) URL.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        let url = reqwest::Url::parse(self.base_url.trim()).map_err(|err| {
            ConfigError::configuration(format!("invalid base_url '{}': {err}", self.base_url))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::configuration(format!(
                "base_url must use http or https, got '{}'",
                url.scheme()
            )));
        }

        let mut normalised = url.to_string();
        if !normalised.ends_with('/') {
            normalised.push('/');
        }
        self.base_url = normalised;
        Ok(())
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}
