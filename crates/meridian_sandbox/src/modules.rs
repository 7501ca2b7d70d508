//! # System Modules
//!
//! Scenes reach the host only through a fixed set of named modules. Any other
//! name is a fatal sandbox error.

use std::fmt;

use tracing::{debug, warn};

use meridian_shared::constants::{SYSTEM_ENGINE_API, SYSTEM_RUNTIME};

use crate::error::{SandboxError, SandboxResult};

/// A module a scene may request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SystemModule {
    /// Entity and component access.
    EngineApi,
    /// Tick counter and scene clock.
    Runtime,
}

impl SystemModule {
    /// Every module, in registration order.
    pub const ALL: [Self; 2] = [Self::EngineApi, Self::Runtime];

    /// Name scenes use to request the module.
    #[must_use]
    pub const fn path(self) -> &'static str {
        match self {
            Self::EngineApi => SYSTEM_ENGINE_API,
            Self::Runtime => SYSTEM_RUNTIME,
        }
    }
}

impl fmt::Display for SystemModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Resolves module names for one scene.
#[derive(Clone, Debug)]
pub struct ModuleResolver {
    scene: String,
}

impl ModuleResolver {
    /// Creates a resolver for `scene` (used in log fields only).
    pub fn new(scene: impl Into<String>) -> Self {
        Self {
            scene: scene.into(),
        }
    }

    /// Looks a module up by name.
    ///
    /// # Errors
    ///
    /// [`SandboxError::UnknownModule`] for any name outside [`SystemModule::ALL`].
    pub fn resolve(&self, name: &str) -> SandboxResult<SystemModule> {
        match SystemModule::ALL.into_iter().find(|module| module.path() == name) {
            Some(module) => {
                debug!(scene = %self.scene, module = %module, "Resolved system module");
                Ok(module)
            }
            None => {
                warn!(scene = %self.scene, module = name, "Scene requested an unknown module");
                Err(SandboxError::UnknownModule(name.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_shared::SYSTEM_MODULES;

    #[test]
    fn test_every_published_name_resolves() {
        let resolver = ModuleResolver::new("test");
        for name in SYSTEM_MODULES {
            assert_eq!(resolver.resolve(name).unwrap().path(), name);
        }
    }

    #[test]
    fn test_unknown_module_is_fatal() {
        let err = ModuleResolver::new("test").resolve("~system/Filesystem").unwrap_err();
        assert!(matches!(err, SandboxError::UnknownModule(ref name) if name == "~system/Filesystem"));
        assert!(err.is_fatal());
    }
}
