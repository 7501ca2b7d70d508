//! # Session Configuration
//!
//! One TOML file configures a whole session:
//!
//! ```toml
//! tick_rate = 30
//! log_level = "info"
//! max_consecutive_faults = 3
//! threaded_host = false
//!
//! [host]
//! entity_range_start = 3
//! entity_range_end = 512
//!
//! [scene]
//! grow_only_max_elements = 100
//!
//! [sandbox]
//! max_operations = 1000000
//! ```
//!
//! Every key is optional. Note that a partial `[host]` table fills its missing
//! keys from the engine defaults, which are the scene's.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use meridian_core::{ConfigError, EngineConfig};
use meridian_sandbox::SandboxConfig;
use meridian_shared::TICK_RATE;

/// Session configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Host ticks per second.
    pub tick_rate: u32,
    /// Default log filter, overridden by `RUST_LOG`.
    pub log_level: String,
    /// Consecutive rejected ticks tolerated before the scene is terminated.
    /// `0` never terminates on recoverable faults.
    pub max_consecutive_faults: u32,
    /// Serve the host on its own thread behind channels.
    pub threaded_host: bool,
    /// Host engine.
    pub host: EngineConfig,
    /// Scene engine.
    pub scene: EngineConfig,
    /// Sandbox limits and transport tunables.
    pub sandbox: SandboxConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick_rate: TICK_RATE,
            log_level: "info".to_string(),
            max_consecutive_faults: 3,
            threaded_host: false,
            host: EngineConfig::host(),
            scene: EngineConfig::scene(),
            sandbox: SandboxConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Reads and validates a configuration file.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Io`] if the file cannot be read, otherwise as
    /// [`SessionConfig::from_toml_str`].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Parses and validates a configuration document.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Parse`] on malformed TOML, [`ConfigError::Invalid`] if
    /// any section is inconsistent.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every section and the host/scene split.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] naming the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_rate == 0 {
            return Err(ConfigError::Invalid("tick_rate must be at least 1".into()));
        }
        self.host.validate()?;
        self.scene.validate()?;
        self.sandbox.validate()?;
        let overlap = self.host.entity_range_start < self.scene.entity_range_end
            && self.scene.entity_range_start < self.host.entity_range_end;
        if overlap {
            return Err(ConfigError::Invalid(format!(
                "host entity range {}..{} overlaps scene range {}..{}",
                self.host.entity_range_start,
                self.host.entity_range_end,
                self.scene.entity_range_start,
                self.scene.entity_range_end
            )));
        }
        Ok(())
    }

    /// Fixed time step derived from the tick rate.
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(1) / self.tick_rate.max(1)
    }

    /// Fixed delta time in seconds.
    #[must_use]
    pub fn delta_time(&self) -> f32 {
        1.0 / self.tick_rate.max(1) as f32
    }
}
