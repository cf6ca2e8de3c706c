//! Session tuning.

use std::time::Duration;

use serde::{Deserialize, Serialize};

const DEFAULT_POLL_RETRY_DELAY_MS: u64 = 1000;

/// Timing knobs for the session loops.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Pause before re-issuing an output poll whose request failed.
    /// Heartbeats and chunks re-arm immediately regardless.
    #[serde(default = "default_poll_retry_delay", with = "millis")]
    pub poll_retry_delay: Duration,
}

const fn default_poll_retry_delay() -> Duration {
    Duration::from_millis(DEFAULT_POLL_RETRY_DELAY_MS)
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_retry_delay: default_poll_retry_delay(),
        }
    }
}

impl SessionConfig {
    #[must_use]
    pub const fn with_poll_retry_delay(mut self, delay: Duration) -> Self {
        self.poll_retry_delay = delay;
        self
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_delay_in_millis() {
        let config: SessionConfig = serde_json::from_str(r#"{"poll_retry_delay": 250}"#).unwrap();
        assert_eq!(config.poll_retry_delay, Duration::from_millis(250));

        let config: SessionConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, SessionConfig::default());
    }
}
