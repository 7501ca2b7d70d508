//! # Engine Configuration
//!
//! Tunables for one [`Engine`](crate::Engine) instance. Loaded once at startup,
//! usually as a table nested inside the session configuration.

use serde::{Deserialize, Serialize};

use meridian_shared::constants::{
    DEFAULT_GROW_ONLY_MAX_ELEMENTS, HOST_ENTITY_RANGE_START, MAX_ENTITY_NUMBER,
    RESERVED_STATIC_ENTITIES,
};

use crate::error::ConfigError;

/// Engine configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// First entity number this engine allocates.
    pub entity_range_start: u32,
    /// One past the last entity number this engine allocates.
    pub entity_range_end: u32,
    /// Bound for grow-only components that do not specify their own.
    pub grow_only_max_elements: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::scene()
    }
}

impl EngineConfig {
    /// Scene-side defaults: allocates above the reserved range.
    #[must_use]
    pub const fn scene() -> Self {
        Self {
            entity_range_start: RESERVED_STATIC_ENTITIES,
            entity_range_end: MAX_ENTITY_NUMBER,
            grow_only_max_elements: DEFAULT_GROW_ONLY_MAX_ELEMENTS,
        }
    }

    /// Host-side defaults: allocates inside the reserved range.
    #[must_use]
    pub const fn host() -> Self {
        Self {
            entity_range_start: HOST_ENTITY_RANGE_START,
            entity_range_end: RESERVED_STATIC_ENTITIES,
            grow_only_max_elements: DEFAULT_GROW_ONLY_MAX_ELEMENTS,
        }
    }

    /// Parses a TOML document holding only an engine table.
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

    /// Checks the values for consistency.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.entity_range_start < HOST_ENTITY_RANGE_START {
            return Err(ConfigError::Invalid(format!(
                "entity_range_start {} overlaps the reserved entities (< {})",
                self.entity_range_start, HOST_ENTITY_RANGE_START
            )));
        }
        if self.entity_range_end <= self.entity_range_start
            || self.entity_range_end > MAX_ENTITY_NUMBER + 1
        {
            return Err(ConfigError::Invalid(format!(
                "entity range {}..{} is empty or exceeds {}",
                self.entity_range_start,
                self.entity_range_end,
                MAX_ENTITY_NUMBER + 1
            )));
        }
        if self.grow_only_max_elements == 0 {
            return Err(ConfigError::Invalid(
                "grow_only_max_elements must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
