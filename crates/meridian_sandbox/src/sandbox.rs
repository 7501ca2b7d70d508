//! # Sandbox Driver
//!
//! Owns one scene: its engine partition, its runtime and its transport.
//!
//! ## Start
//!
//! ```text
//! attach runtime → hydrate from host full state → seal engine
//!   → on_start → drain jobs → send batch
//! ```
//!
//! ## Tick
//!
//! ```text
//! 1. Apply host batches received during the previous exchange
//! 2. on_update(dt)           (dt forced to 0 on the first tick)
//! 3. Drain pending jobs
//! 4. Run engine systems
//! 5. Send outgoing batch; queue the host's reply for the next tick
//! ```
//!
//! A batch the host did not acknowledge is sent again in front of the next
//! one. Reapplying it on the host changes nothing.
//!
//! A tick that fails leaves the sandbox usable unless the error is fatal, in
//! which case the sandbox is terminated and every later call is rejected.

use std::cell::RefMut;
use std::collections::VecDeque;

use tracing::{debug, error, info, warn};

use meridian_core::{ApplyReport, Engine, EngineConfig};

use crate::config::SandboxConfig;
use crate::console::Console;
use crate::error::{SandboxError, SandboxResult};
use crate::modules::ModuleResolver;
use crate::runtime::{SceneBridges, SceneClock, ScriptRuntime};
use crate::transport::{Transport, TransportStats};

/// Lifecycle state of a sandbox.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SandboxState {
    /// Constructed, runtime not attached yet.
    Created,
    /// `on_start` completed, no tick run yet.
    Started,
    /// At least one tick ran.
    Running,
    /// Disposed or failed fatally.
    Terminated,
}

/// What one tick did.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TickReport {
    /// Scene tick number, starting at 1.
    pub tick: u64,
    /// Delta time passed to `on_update`.
    pub dt: f32,
    /// Host batches applied since the previous tick, at its start or early
    /// on inbox overflow.
    pub batches_applied: usize,
    /// Counters of those batches.
    pub applied: ApplyReport,
    /// Jobs run in the drain step.
    pub jobs_run: usize,
    /// Size of the batch sent to the host.
    pub bytes_sent: usize,
    /// Host batches received in reply.
    pub batches_received: usize,
}

/// One isolated scene.
pub struct Sandbox {
    name: String,
    config: SandboxConfig,
    state: SandboxState,
    bridges: SceneBridges,
    runtime: Box<dyn ScriptRuntime>,
    transport: Box<dyn Transport>,
    inbox: VecDeque<Vec<u8>>,
    /// Outgoing bytes not yet acknowledged by the host.
    unsent: Vec<u8>,
    /// Host batches applied early because the inbox was full.
    early_batches: usize,
    early_applied: ApplyReport,
    hydration: ApplyReport,
}

impl Sandbox {
    /// Creates a sandbox with a fresh scene engine carrying the built-in
    /// components.
    ///
    /// # Errors
    ///
    /// [`SandboxError::Config`] for invalid configuration, or engine
    /// registration failures.
    pub fn new(
        name: impl Into<String>,
        config: SandboxConfig,
        engine_config: EngineConfig,
        runtime: Box<dyn ScriptRuntime>,
        transport: Box<dyn Transport>,
    ) -> SandboxResult<Self> {
        config.validate()?;
        engine_config.validate()?;
        let name = name.into();
        let engine = Engine::with_builtins(engine_config)?;
        let bridges = SceneBridges::new(
            engine,
            Console::new(name.clone(), config.console_capacity),
            ModuleResolver::new(name.clone()),
        );
        Ok(Self {
            name,
            config,
            state: SandboxState::Created,
            bridges,
            runtime,
            transport,
            inbox: VecDeque::new(),
            unsent: Vec::new(),
            early_batches: 0,
            early_applied: ApplyReport::default(),
            hydration: ApplyReport::default(),
        })
    }

    /// Scene name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> SandboxState {
        self.state
    }

    /// Scene clock.
    #[must_use]
    pub fn clock(&self) -> SceneClock {
        self.bridges.clock()
    }

    /// Borrows the scene engine.
    ///
    /// # Panics
    ///
    /// If called while the runtime holds the engine, which cannot happen
    /// between sandbox calls.
    pub fn engine(&self) -> RefMut<'_, Engine> {
        self.bridges.engine()
    }

    /// Borrows the scene console.
    pub fn console(&self) -> RefMut<'_, Console> {
        self.bridges.console()
    }

    /// Counters of the full-state hydration.
    #[must_use]
    pub const fn hydration(&self) -> ApplyReport {
        self.hydration
    }

    /// Exchange counters.
    #[must_use]
    pub fn transport_stats(&self) -> TransportStats {
        self.transport.stats()
    }

    /// Host batches waiting for the next tick.
    #[must_use]
    pub fn inbox_len(&self) -> usize {
        self.inbox.len()
    }

    /// Attaches the runtime, hydrates from the host, seals the engine, runs
    /// `on_start` with its jobs and sends the first batch.
    ///
    /// Any failure terminates the sandbox.
    ///
    /// # Errors
    ///
    /// [`SandboxError::InvalidState`] unless freshly created, otherwise
    /// whatever step failed.
    pub fn start(&mut self) -> SandboxResult<()> {
        if self.state != SandboxState::Created {
            return Err(self.invalid("start"));
        }
        match self.run_start() {
            Ok(()) => {
                self.state = SandboxState::Started;
                info!(scene = %self.name, runtime = self.runtime.name(), "Sandbox started");
                Ok(())
            }
            Err(err) => {
                error!(scene = %self.name, error = %err, "Sandbox failed to start");
                self.terminate();
                Err(err)
            }
        }
    }

    fn run_start(&mut self) -> SandboxResult<()> {
        self.runtime.attach(self.bridges.clone())?;

        let state = self.transport.full_state()?;
        {
            let mut engine = self.bridges.engine();
            for batch in &state.data {
                self.hydration.merge(engine.apply_batch(batch));
            }
            engine.seal();
        }
        debug!(
            scene = %self.name,
            has_entities = state.has_entities,
            applied = self.hydration.applied,
            "Hydrated from host"
        );

        self.runtime.on_start()?;
        self.drain_jobs()?;
        self.exchange()?;
        Ok(())
    }

    /// Runs one tick.
    ///
    /// # Errors
    ///
    /// [`SandboxError::InvalidState`] before `start` or after termination.
    /// Otherwise the failing step's error; fatal errors terminate the sandbox.
    pub fn tick(&mut self, dt: f32) -> SandboxResult<TickReport> {
        let dt = match self.state {
            SandboxState::Started => 0.0,
            SandboxState::Running => dt,
            SandboxState::Created | SandboxState::Terminated => return Err(self.invalid("tick")),
        };
        self.state = SandboxState::Running;

        match self.run_tick(dt) {
            Ok(report) => Ok(report),
            Err(err) => {
                if err.is_fatal() {
                    error!(scene = %self.name, error = %err, "Fatal sandbox fault");
                    self.terminate();
                } else {
                    warn!(scene = %self.name, error = %err, "Tick rejected");
                }
                Err(err)
            }
        }
    }

    fn run_tick(&mut self, dt: f32) -> SandboxResult<TickReport> {
        self.bridges.advance_clock(dt);
        let mut report = TickReport {
            tick: self.bridges.clock().tick,
            dt,
            batches_applied: std::mem::take(&mut self.early_batches),
            applied: std::mem::take(&mut self.early_applied),
            ..TickReport::default()
        };

        {
            let mut engine = self.bridges.engine();
            while let Some(batch) = self.inbox.pop_front() {
                report.applied.merge(engine.apply_batch(&batch));
                report.batches_applied += 1;
            }
        }

        self.runtime.on_update(dt)?;
        report.jobs_run = self.drain_jobs()?;
        self.bridges.engine().update(dt);

        let (sent, received) = self.exchange()?;
        report.bytes_sent = sent;
        report.batches_received = received;
        Ok(report)
    }

    /// Runs ready jobs until none are left or the round limit is hit.
    fn drain_jobs(&mut self) -> SandboxResult<usize> {
        let mut total = 0;
        for _ in 0..self.config.max_job_rounds {
            if !self.runtime.has_ready_jobs() {
                return Ok(total);
            }
            total += self.runtime.run_pending_jobs()?;
        }
        if self.runtime.has_ready_jobs() {
            return Err(SandboxError::JobsUnsettled(self.config.max_job_rounds));
        }
        Ok(total)
    }

    /// Sends the outgoing batch and queues the host's reply.
    fn exchange(&mut self) -> SandboxResult<(usize, usize)> {
        if !self.unsent.is_empty() {
            debug!(scene = %self.name, bytes = self.unsent.len(), "Resending unacknowledged batch");
        }
        let outgoing = self.bridges.engine().take_outgoing();
        self.unsent.extend_from_slice(&outgoing);
        let sent = self.unsent.len();
        let replies = self.transport.send_batch(&self.unsent)?;
        self.unsent.clear();

        let received = replies.len();
        for reply in replies {
            if self.inbox.len() >= self.config.inbox_capacity {
                // Keep the inbox bounded by applying the oldest batch now.
                if let Some(oldest) = self.inbox.pop_front() {
                    debug!(scene = %self.name, "Inbox full, applying oldest host batch early");
                    let applied = self.bridges.engine().apply_batch(&oldest);
                    self.early_applied.merge(applied);
                    self.early_batches += 1;
                }
            }
            self.inbox.push_back(reply);
        }
        Ok((sent, received))
    }

    /// Discards the runtime's pending jobs and queued host batches and
    /// terminates the sandbox. Returns the number of discarded jobs.
    pub fn dispose(&mut self) -> usize {
        if self.state == SandboxState::Terminated {
            return 0;
        }
        let discarded = self.terminate();
        info!(scene = %self.name, discarded_jobs = discarded, "Sandbox disposed");
        discarded
    }

    fn terminate(&mut self) -> usize {
        self.state = SandboxState::Terminated;
        self.inbox.clear();
        self.unsent.clear();
        self.runtime.discard_jobs()
    }

    fn invalid(&self, operation: &'static str) -> SandboxError {
        SandboxError::InvalidState {
            state: self.state,
            operation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::runtime::{NativeRuntime, SceneContext, SceneScript};
    use crate::transport::{DirectTransport, FullState, HostBridge};
    use meridian_core::codec::MessageReader;
    use meridian_core::ecs::{BuiltinComponent, Name};
    use meridian_core::Entity;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingHost {
        batches: Vec<Vec<u8>>,
    }

    impl HostBridge for RecordingHost {
        fn exchange(&mut self, batch: &[u8]) -> Vec<u8> {
            self.batches.push(batch.to_vec());
            Vec::new()
        }

        fn full_state(&mut self) -> FullState {
            FullState::default()
        }
    }

    /// Times out while `timeouts` is above zero, then delivers.
    struct FlakyTransport {
        timeouts: Rc<Cell<usize>>,
        delivered: Rc<RefCell<Vec<Vec<u8>>>>,
        replies: Vec<Vec<u8>>,
    }

    impl Transport for FlakyTransport {
        fn send_batch(&mut self, batch: &[u8]) -> Result<Vec<Vec<u8>>, TransportError> {
            if self.timeouts.get() > 0 {
                self.timeouts.set(self.timeouts.get() - 1);
                return Err(TransportError::Timeout(Duration::from_millis(1)));
            }
            self.delivered.borrow_mut().push(batch.to_vec());
            Ok(self.replies.clone())
        }

        fn full_state(&mut self) -> Result<FullState, TransportError> {
            Ok(FullState::default())
        }

        fn stats(&self) -> TransportStats {
            TransportStats::default()
        }
    }

    struct Script {
        dts: Rc<RefCell<Vec<f32>>>,
        fail_on: Option<u64>,
        runaway: bool,
    }

    fn reschedule(ctx: &mut SceneContext<'_>) -> SandboxResult<()> {
        ctx.defer(reschedule);
        Ok(())
    }

    impl SceneScript for Script {
        fn on_update(&mut self, ctx: &mut SceneContext<'_>, dt: f32) -> SandboxResult<()> {
            self.dts.borrow_mut().push(dt);
            if self.runaway {
                ctx.defer(reschedule);
            }
            if self.fail_on == Some(ctx.clock().tick) {
                return Err(SandboxError::script("on_update", "planned failure"));
            }
            Ok(())
        }
    }

    fn sandbox(script: Script) -> (Sandbox, Rc<RefCell<RecordingHost>>) {
        let host = Rc::new(RefCell::new(RecordingHost::default()));
        let sandbox = Sandbox::new(
            "test",
            SandboxConfig::default(),
            EngineConfig::scene(),
            Box::new(NativeRuntime::new("script", script)),
            Box::new(DirectTransport::new(Rc::clone(&host))),
        )
        .unwrap();
        (sandbox, host)
    }

    fn flaky_sandbox(config: SandboxConfig, transport: FlakyTransport) -> Sandbox {
        let dts = Rc::new(RefCell::new(Vec::new()));
        Sandbox::new(
            "test",
            config,
            EngineConfig::scene(),
            Box::new(NativeRuntime::new("script", script(&dts))),
            Box::new(transport),
        )
        .unwrap()
    }

    fn script(dts: &Rc<RefCell<Vec<f32>>>) -> Script {
        Script {
            dts: Rc::clone(dts),
            fail_on: None,
            runaway: false,
        }
    }

    #[test]
    fn test_first_tick_has_zero_dt() {
        let dts = Rc::new(RefCell::new(Vec::new()));
        let (mut sandbox, host) = sandbox(script(&dts));
        sandbox.start().unwrap();
        assert!(sandbox.engine().is_sealed());
        assert_eq!(sandbox.state(), SandboxState::Started);

        assert_eq!(sandbox.tick(0.25).unwrap().dt, 0.0);
        assert_eq!(sandbox.tick(0.25).unwrap().tick, 2);
        assert_eq!(*dts.borrow(), vec![0.0, 0.25]);
        assert_eq!(sandbox.state(), SandboxState::Running);
        // start + two ticks
        assert_eq!(host.borrow().batches.len(), 3);
    }

    #[test]
    fn test_tick_before_start_is_rejected() {
        let dts = Rc::new(RefCell::new(Vec::new()));
        let (mut sandbox, _) = sandbox(script(&dts));
        let err = sandbox.tick(0.1).unwrap_err();
        assert!(matches!(err, SandboxError::InvalidState { state: SandboxState::Created, .. }));
    }

    #[test]
    fn test_script_fault_rejects_only_that_tick() {
        let dts = Rc::new(RefCell::new(Vec::new()));
        let (mut sandbox, _) = sandbox(Script {
            fail_on: Some(2),
            ..script(&dts)
        });
        sandbox.start().unwrap();
        sandbox.tick(0.1).unwrap();
        assert!(sandbox.tick(0.1).is_err());
        assert_eq!(sandbox.state(), SandboxState::Running);
        assert_eq!(sandbox.tick(0.1).unwrap().tick, 3);
    }

    #[test]
    fn test_runaway_jobs_are_bounded() {
        let dts = Rc::new(RefCell::new(Vec::new()));
        let (mut sandbox, _) = sandbox(Script {
            runaway: true,
            ..script(&dts)
        });
        sandbox.start().unwrap();
        let err = sandbox.tick(0.1).unwrap_err();
        assert!(matches!(err, SandboxError::JobsUnsettled(64)));
        assert!(sandbox.dispose() > 0);
        assert_eq!(sandbox.state(), SandboxState::Terminated);
        assert!(sandbox.tick(0.1).unwrap_err().is_fatal());
    }

    #[test]
    fn test_unacknowledged_batch_is_resent() {
        let timeouts = Rc::new(Cell::new(0));
        let delivered = Rc::new(RefCell::new(Vec::new()));
        let mut sandbox = flaky_sandbox(
            SandboxConfig::default(),
            FlakyTransport {
                timeouts: Rc::clone(&timeouts),
                delivered: Rc::clone(&delivered),
                replies: Vec::new(),
            },
        );
        sandbox.start().unwrap();

        let entity = {
            let mut engine = sandbox.engine();
            let entity = engine.add_entity().unwrap();
            engine
                .lww_mut(&Name::definition())
                .unwrap()
                .create(entity, Name::new("kept"))
                .unwrap();
            entity
        };
        timeouts.set(1);
        let err = sandbox.tick(0.1).unwrap_err();
        assert!(matches!(err, SandboxError::Transport(TransportError::Timeout(_))));
        assert_eq!(sandbox.state(), SandboxState::Running);

        assert!(sandbox.tick(0.1).unwrap().bytes_sent > 0);
        let last = delivered.borrow().last().cloned().unwrap();
        let entities: Vec<Entity> = MessageReader::new(&last)
            .map(|message| message.unwrap().entity())
            .collect();
        assert_eq!(entities, vec![entity]);
        assert_eq!(sandbox.tick(0.1).unwrap().bytes_sent, 0);
    }

    #[test]
    fn test_early_applied_batches_are_reported() {
        let config = SandboxConfig {
            inbox_capacity: 1,
            ..SandboxConfig::default()
        };
        let mut sandbox = flaky_sandbox(
            config,
            FlakyTransport {
                timeouts: Rc::new(Cell::new(0)),
                delivered: Rc::new(RefCell::new(Vec::new())),
                // Each reply is one corrupt message.
                replies: vec![vec![1, 0], vec![2, 0]],
            },
        );
        sandbox.start().unwrap();
        assert_eq!(sandbox.inbox_len(), 1);

        let report = sandbox.tick(0.1).unwrap();
        assert_eq!(report.batches_applied, 2);
        assert_eq!(report.applied.malformed, 2);
    }
}
