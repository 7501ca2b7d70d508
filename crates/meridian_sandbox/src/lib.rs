//! # Meridian Sandbox
//!
//! Runs one scene's logic in isolation and keeps it in sync with its host.
//!
//! ## Architecture
//!
//! ```text
//! SANDBOX (scene thread)                      HOST (any thread)
//!   ScriptRuntime ── SceneBridges ── Engine     SceneHost ── Engine
//!         │                             │            ▲
//!         └── jobs, console, modules    └── bytes ───┘ Transport
//! ```
//!
//! - A scene only reaches the world through the bridges handed to its runtime
//! - Scene and host engines exchange CRDT byte batches, never references
//! - A script fault rejects one tick; loader and transport loss end the scene
//!
//! ## Example
//!
//! ```rust,ignore
//! use meridian_sandbox::{RhaiRuntime, Sandbox, SandboxConfig, SceneHost, DirectTransport};
//!
//! let config = SandboxConfig::default();
//! let host = Rc::new(RefCell::new(SceneHost::new(EngineConfig::host())?));
//! let runtime = RhaiRuntime::compile("cube", SOURCE, &config)?;
//! let mut sandbox = Sandbox::new(
//!     "cube",
//!     config,
//!     EngineConfig::scene(),
//!     Box::new(runtime),
//!     Box::new(DirectTransport::new(host)),
//! )?;
//! sandbox.start()?;
//! sandbox.tick(1.0 / 30.0)?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod console;
pub mod error;
pub mod host;
pub mod jobs;
pub mod modules;
pub mod rhai_runtime;
pub mod runtime;
pub mod sandbox;
pub mod transport;

pub use config::SandboxConfig;
pub use console::{Console, ConsoleLevel, ConsoleLine};
pub use error::{SandboxError, SandboxResult, TransportError};
pub use host::SceneHost;
pub use jobs::JobQueue;
pub use modules::{ModuleResolver, SystemModule};
pub use rhai_runtime::RhaiRuntime;
pub use runtime::{
    NativeJob, NativeRuntime, SceneBridges, SceneClock, SceneContext, SceneScript, ScriptRuntime,
};
pub use sandbox::{Sandbox, SandboxState, TickReport};
pub use transport::{
    channel_transport, ChannelTransport, DirectTransport, FullState, HostBridge, HostEndpoint,
    Transport, TransportStats,
};
