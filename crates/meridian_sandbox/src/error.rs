//! # Sandbox Error Types
//!
//! Everything a scene can do wrong ends up as a [`SandboxError`]. The host
//! decides per error whether to retry the next tick or tear the scene down;
//! [`SandboxError::is_fatal`] marks the ones that can never recover.

use std::time::Duration;

use thiserror::Error;

use meridian_core::{ConfigError, EngineError};

use crate::sandbox::SandboxState;

/// Failures crossing the host boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The other side hung up.
    #[error("host endpoint disconnected")]
    Disconnected,

    /// The host did not answer in time.
    #[error("host did not reply within {0:?}")]
    Timeout(Duration),

    /// The host answered a request with the wrong kind of reply.
    #[error("unexpected reply from host: expected {0}")]
    UnexpectedReply(&'static str),
}

/// Errors raised by a sandbox.
#[derive(Error, Debug)]
pub enum SandboxError {
    /// The scene asked for a system module that does not exist.
    #[error("unknown system module {0:?}")]
    UnknownModule(String),

    /// The script bundle failed to compile or to evaluate its top level.
    #[error("failed to load script {script:?}: {message}")]
    Load {
        /// Script name.
        script: String,
        /// Interpreter message.
        message: String,
    },

    /// A lifecycle call or pending job raised an error.
    #[error("script error in {entry_point}: {message}")]
    Script {
        /// Entry point or job that failed.
        entry_point: &'static str,
        /// Interpreter message.
        message: String,
    },

    /// Pending jobs kept scheduling more ready jobs past the drain limit.
    #[error("pending jobs did not settle after {0} rounds")]
    JobsUnsettled(usize),

    /// Operation not allowed in the current lifecycle state.
    #[error("sandbox is {state:?}, cannot {operation}")]
    InvalidState {
        /// Current state.
        state: SandboxState,
        /// Rejected operation.
        operation: &'static str,
    },

    /// The host exchange failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The scene misused the engine API.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Sandbox configuration is unusable.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl SandboxError {
    /// Builds a [`SandboxError::Script`].
    pub fn script(entry_point: &'static str, message: impl Into<String>) -> Self {
        Self::Script {
            entry_point,
            message: message.into(),
        }
    }

    /// Errors after which the sandbox cannot run another tick.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::UnknownModule(_) | Self::Load { .. } | Self::Config(_) => true,
            Self::InvalidState { state, .. } => *state == SandboxState::Terminated,
            Self::Transport(err) => *err == TransportError::Disconnected,
            Self::Script { .. } | Self::JobsUnsettled(_) | Self::Engine(_) => false,
        }
    }
}

/// Result type for sandbox operations.
pub type SandboxResult<T> = Result<T, SandboxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(SandboxError::UnknownModule("~system/Nope".into()).is_fatal());
        assert!(SandboxError::Transport(TransportError::Disconnected).is_fatal());
        assert!(!SandboxError::Transport(TransportError::Timeout(Duration::from_millis(5))).is_fatal());
        assert!(!SandboxError::script("on_update", "boom").is_fatal());
        assert!(SandboxError::InvalidState {
            state: SandboxState::Terminated,
            operation: "tick",
        }
        .is_fatal());
        assert!(!SandboxError::InvalidState {
            state: SandboxState::Created,
            operation: "tick",
        }
        .is_fatal());
    }
}
