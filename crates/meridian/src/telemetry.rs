//! Tracing bootstrap for binaries.

use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::{SessionError, SessionResult};

/// Installs a `fmt` subscriber. `RUST_LOG` wins over `default_level`; an
/// unparsable level falls back to `info`.
///
/// # Errors
///
/// [`SessionError::Telemetry`] if a global subscriber is already installed.
pub fn init_telemetry(default_level: &str) -> SessionResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .try_init()
        .map_err(|err| SessionError::Telemetry(err.to_string()))?;
    info!(target: "telemetry", default_level, "Telemetry initialized");
    Ok(())
}
