//! Session error types.

use thiserror::Error;

use meridian_core::{ConfigError, EngineError, HierarchyError};
use meridian_sandbox::SandboxError;

/// Errors raised by a scene session.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Configuration could not be loaded or is inconsistent.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Host engine failure.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Sandbox failure outside a tick (construction, start).
    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    /// World matrix query hit a parent cycle.
    #[error(transparent)]
    Hierarchy(#[from] HierarchyError),

    /// The host thread could not be spawned.
    #[error("failed to spawn host thread: {0}")]
    Spawn(#[source] std::io::Error),

    /// The host thread panicked.
    #[error("host thread panicked")]
    HostPanicked,

    /// The scene was terminated; the session only answers host queries.
    #[error("scene terminated")]
    Terminated,

    /// The tracing subscriber could not be installed.
    #[error("failed to install tracing subscriber: {0}")]
    Telemetry(String),
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;
