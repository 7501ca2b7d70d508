//! # Sandbox Configuration
//!
//! Interpreter limits, job draining and transport tunables for one sandbox.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use meridian_core::ConfigError;

/// Sandbox configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Interpreter operations allowed per entry-point call. `0` disables the limit.
    pub max_operations: u64,
    /// Maximum script call depth.
    pub max_call_levels: usize,
    /// Maximum script string length in bytes.
    pub max_string_size: usize,
    /// Maximum script array length.
    pub max_array_size: usize,
    /// Maximum script object map size.
    pub max_map_size: usize,
    /// Rounds of ready jobs drained after each call before giving up.
    pub max_job_rounds: usize,
    /// Host replies buffered before the next tick applies them.
    pub inbox_capacity: usize,
    /// Capacity of each channel between the sandbox and a threaded host.
    pub channel_capacity: usize,
    /// How long an exchange waits for the host, in milliseconds.
    pub reply_timeout_ms: u64,
    /// Console lines kept in memory.
    pub console_capacity: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            max_operations: 1_000_000,
            max_call_levels: 64,
            max_string_size: 64 * 1024,
            max_array_size: 16 * 1024,
            max_map_size: 4 * 1024,
            max_job_rounds: 64,
            inbox_capacity: 8,
            channel_capacity: 1,
            reply_timeout_ms: 1_000,
            console_capacity: 256,
        }
    }
}

impl SandboxConfig {
    /// Exchange timeout as a [`Duration`].
    #[must_use]
    pub const fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms)
    }

    /// Parses a TOML document holding only a sandbox table.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Parse`] on malformed TOML, [`ConfigError::Invalid`] if
    /// the values are inconsistent.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value consistency.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_call_levels == 0 {
            return Err(ConfigError::Invalid("max_call_levels must be at least 1".into()));
        }
        if self.max_job_rounds == 0 {
            return Err(ConfigError::Invalid("max_job_rounds must be at least 1".into()));
        }
        if self.inbox_capacity == 0 {
            return Err(ConfigError::Invalid("inbox_capacity must be at least 1".into()));
        }
        if self.channel_capacity == 0 {
            return Err(ConfigError::Invalid("channel_capacity must be at least 1".into()));
        }
        if self.reply_timeout_ms == 0 {
            return Err(ConfigError::Invalid("reply_timeout_ms must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(SandboxConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_toml() {
        let config = SandboxConfig::from_toml_str("max_operations = 500\nreply_timeout_ms = 20").unwrap();
        assert_eq!(config.max_operations, 500);
        assert_eq!(config.reply_timeout(), Duration::from_millis(20));
        assert_eq!(config.max_job_rounds, SandboxConfig::default().max_job_rounds);
    }

    #[test]
    fn test_rejects_zero_rounds() {
        let err = SandboxConfig::from_toml_str("max_job_rounds = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
