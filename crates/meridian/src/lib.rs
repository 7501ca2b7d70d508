//! # Meridian
//!
//! Scene sessions: a host engine, a sandboxed scene and the loop between them.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        SCENE SESSION                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ┌─────────────────┐   CRDT batches   ┌─────────────────┐       │
//! │  │   SANDBOX       │<────────────────>│   HOST          │       │
//! │  │                 │                  │                 │       │
//! │  │  • Runtime      │                  │  • Engine       │       │
//! │  │  • Scene engine │                  │  • Player/camera│       │
//! │  │  • Jobs         │                  │  • World queries│       │
//! │  └─────────────────┘                  └─────────────────┘       │
//! │                                                                 │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `config`: one TOML file for the whole session
//! - `session`: host/sandbox wiring and the fault policy
//! - `telemetry`: tracing bootstrap for binaries

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod session;
pub mod telemetry;

// Re-export the layers
pub use meridian_core as core;
pub use meridian_sandbox as sandbox;

pub use config::SessionConfig;
pub use error::{SessionError, SessionResult};
pub use session::{SceneSession, SessionSummary, TickOutcome};
pub use telemetry::init_telemetry;
