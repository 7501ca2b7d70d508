//! # Scene Session
//!
//! Wires one [`SceneHost`] to one [`Sandbox`] and owns the fault policy.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ SceneSession                                                 │
//! │                                                              │
//! │  Sandbox ── Transport ──┬── Direct:   Rc<RefCell<SceneHost>> │
//! │   (scene engine,        └── Threaded: Arc<Mutex<SceneHost>>  │
//! │    runtime, jobs)                     on "meridian-host"     │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Fault policy
//!
//! - Fatal sandbox errors (unknown module, loader failure, lost host)
//!   terminate the scene immediately
//! - Any other error rejects the tick; the next tick runs normally
//! - `max_consecutive_faults` rejected ticks in a row terminate the scene

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use meridian_core::Entity;
use meridian_sandbox::{
    channel_transport, DirectTransport, RhaiRuntime, Sandbox, SandboxError, SandboxState,
    SceneHost, ScriptRuntime, TickReport, Transport,
};
use meridian_shared::math::Mat4;

use crate::config::SessionConfig;
use crate::error::{SessionError, SessionResult};

/// Result of one session tick.
#[derive(Debug)]
pub enum TickOutcome {
    /// The tick ran to completion.
    Completed(TickReport),
    /// The tick failed; the scene keeps running.
    Rejected {
        /// Why the tick failed.
        error: SandboxError,
        /// Rejected ticks in a row, this one included.
        consecutive: u32,
    },
    /// The scene was terminated by this tick.
    Terminated(SandboxError),
}

/// Totals over the life of a session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionSummary {
    /// Ticks that completed.
    pub completed: u64,
    /// Ticks that were rejected.
    pub rejected: u64,
    /// True once the scene was terminated by a fault.
    pub faulted: bool,
    /// Requests answered by a threaded host; zero for a direct host.
    pub host_requests: u64,
}

enum HostHandle {
    Direct(Rc<RefCell<SceneHost>>),
    Threaded {
        host: Arc<Mutex<SceneHost>>,
        server: JoinHandle<u64>,
    },
}

/// One running scene and its host.
pub struct SceneSession {
    config: SessionConfig,
    sandbox: Sandbox,
    host: HostHandle,
    consecutive_faults: u32,
    summary: SessionSummary,
}

impl SceneSession {
    /// Builds the host and the sandbox for `runtime`. The scene is not
    /// started yet.
    ///
    /// # Errors
    ///
    /// Invalid configuration, host setup failures, or failure to spawn the
    /// host thread.
    pub fn new(
        name: &str,
        config: SessionConfig,
        runtime: Box<dyn ScriptRuntime>,
    ) -> SessionResult<Self> {
        config.validate()?;
        let scene_host = SceneHost::new(config.host.clone())?;

        let (host, transport): (HostHandle, Box<dyn Transport>) = if config.threaded_host {
            let host = Arc::new(Mutex::new(scene_host));
            let (transport, endpoint) = channel_transport(
                config.sandbox.channel_capacity,
                config.sandbox.reply_timeout(),
            );
            let server = endpoint
                .spawn(Arc::clone(&host))
                .map_err(SessionError::Spawn)?;
            (HostHandle::Threaded { host, server }, Box::new(transport))
        } else {
            let host = Rc::new(RefCell::new(scene_host));
            let transport = DirectTransport::new(Rc::clone(&host));
            (HostHandle::Direct(host), Box::new(transport))
        };

        let sandbox = Sandbox::new(
            name,
            config.sandbox.clone(),
            config.scene.clone(),
            runtime,
            transport,
        )?;
        info!(
            scene = name,
            threaded_host = config.threaded_host,
            tick_rate = config.tick_rate,
            "Session created"
        );
        Ok(Self {
            config,
            sandbox,
            host,
            consecutive_faults: 0,
            summary: SessionSummary::default(),
        })
    }

    /// Compiles a rhai scene from source.
    ///
    /// # Errors
    ///
    /// Syntax errors, plus everything [`SceneSession::new`] reports.
    pub fn from_source(name: &str, source: &str, config: SessionConfig) -> SessionResult<Self> {
        let runtime = RhaiRuntime::compile(name, source, &config.sandbox)?;
        Self::new(name, config, Box::new(runtime))
    }

    /// Loads a rhai scene from a file; the scene is named after the file.
    ///
    /// # Errors
    ///
    /// Unreadable or invalid scripts, plus everything [`SceneSession::new`]
    /// reports.
    pub fn from_script_file(path: &Path, config: SessionConfig) -> SessionResult<Self> {
        let runtime = RhaiRuntime::from_file(path, &config.sandbox)?;
        let name = runtime.name().to_string();
        Self::new(&name, config, Box::new(runtime))
    }

    /// Session configuration.
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The sandbox, for inspection.
    #[must_use]
    pub const fn sandbox(&self) -> &Sandbox {
        &self.sandbox
    }

    /// Totals so far.
    #[must_use]
    pub const fn summary(&self) -> SessionSummary {
        self.summary
    }

    /// True while the scene accepts ticks.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.sandbox.state() != SandboxState::Terminated
    }

    /// Starts the scene: hydration, `on_start` and the first exchange.
    ///
    /// # Errors
    ///
    /// The sandbox start failure; the scene is terminated.
    pub fn start(&mut self) -> SessionResult<()> {
        self.sandbox.start().map_err(|err| {
            self.summary.faulted = true;
            SessionError::from(err)
        })
    }

    /// Runs one tick of `dt` seconds and applies the fault policy.
    ///
    /// # Errors
    ///
    /// [`SessionError::Terminated`] once the scene is gone.
    pub fn tick(&mut self, dt: f32) -> SessionResult<TickOutcome> {
        if !self.is_running() {
            return Err(SessionError::Terminated);
        }
        self.with_host(|host| host.advance_frame());

        match self.sandbox.tick(dt) {
            Ok(report) => {
                self.consecutive_faults = 0;
                self.summary.completed += 1;
                Ok(TickOutcome::Completed(report))
            }
            Err(err) if err.is_fatal() => {
                self.summary.faulted = true;
                Ok(TickOutcome::Terminated(err))
            }
            Err(err) => {
                self.consecutive_faults += 1;
                self.summary.rejected += 1;
                let limit = self.config.max_consecutive_faults;
                if limit > 0 && self.consecutive_faults >= limit {
                    error!(
                        scene = self.sandbox.name(),
                        faults = self.consecutive_faults,
                        error = %err,
                        "Too many consecutive faults, terminating scene"
                    );
                    self.sandbox.dispose();
                    self.summary.faulted = true;
                    return Ok(TickOutcome::Terminated(err));
                }
                Ok(TickOutcome::Rejected {
                    error: err,
                    consecutive: self.consecutive_faults,
                })
            }
        }
    }

    /// Runs up to `ticks` fixed-step ticks, stopping early if the scene is
    /// terminated.
    ///
    /// # Errors
    ///
    /// [`SessionError::Terminated`] if the scene was already gone.
    pub fn run(&mut self, ticks: u64) -> SessionResult<SessionSummary> {
        let dt = self.config.delta_time();
        for _ in 0..ticks {
            match self.tick(dt)? {
                TickOutcome::Completed(report) => {
                    debug!(tick = report.tick, jobs = report.jobs_run, "Tick completed");
                }
                TickOutcome::Rejected { error, consecutive } => {
                    warn!(error = %error, consecutive, "Tick rejected");
                }
                TickOutcome::Terminated(_) => break,
            }
        }
        Ok(self.summary)
    }

    /// Runs `f` against the host. For a threaded host the lock is held only
    /// for the call, between exchanges.
    pub fn with_host<R>(&self, f: impl FnOnce(&mut SceneHost) -> R) -> R {
        match &self.host {
            HostHandle::Direct(host) => f(&mut host.borrow_mut()),
            HostHandle::Threaded { host, .. } => f(&mut host.lock()),
        }
    }

    /// World matrix of `entity` in the host's view of the scene.
    ///
    /// # Errors
    ///
    /// [`SessionError::Hierarchy`] if the parent chain loops.
    pub fn world_matrix(&self, entity: Entity) -> SessionResult<Mat4> {
        Ok(self.with_host(|host| host.world_matrix(entity))?)
    }

    /// Disposes the scene, closes the transport and joins the host thread.
    ///
    /// # Errors
    ///
    /// [`SessionError::HostPanicked`] if the host thread panicked.
    pub fn shutdown(self) -> SessionResult<SessionSummary> {
        let Self {
            mut sandbox,
            host,
            mut summary,
            ..
        } = self;
        let discarded = sandbox.dispose();
        // Dropping the sandbox closes a channel transport.
        drop(sandbox);
        if let HostHandle::Threaded { server, .. } = host {
            summary.host_requests = server.join().map_err(|_| SessionError::HostPanicked)?;
        }
        info!(
            completed = summary.completed,
            rejected = summary.rejected,
            discarded_jobs = discarded,
            "Session shut down"
        );
        Ok(summary)
    }
}
