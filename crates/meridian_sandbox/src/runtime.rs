//! # Script Runtimes
//!
//! A runtime executes one scene's logic. The sandbox drives it through
//! [`ScriptRuntime`] and hands it a [`SceneBridges`] handle once, at attach
//! time: the scene engine, the console, the module resolver and the scene
//! clock. Nothing else of the host is reachable.
//!
//! Two runtimes exist:
//! - [`NativeRuntime`]: a Rust [`SceneScript`], for built-in scenes and tests
//! - [`RhaiRuntime`](crate::RhaiRuntime): an isolated rhai script bundle

use std::cell::{Cell, RefCell, RefMut};
use std::rc::Rc;

use meridian_core::{Engine, EngineResult};

use crate::console::{Console, ConsoleLevel};
use crate::error::SandboxResult;
use crate::jobs::JobQueue;
use crate::modules::{ModuleResolver, SystemModule};

/// Scene time as the script sees it.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SceneClock {
    /// Ticks started so far; `0` during `on_start`.
    pub tick: u64,
    /// Sum of every delta time passed to `on_update`, in seconds.
    pub elapsed: f64,
}

/// Shared handles a runtime uses to reach the scene.
///
/// Cloning is cheap; every clone points at the same scene.
#[derive(Clone)]
pub struct SceneBridges {
    engine: Rc<RefCell<Engine>>,
    console: Rc<RefCell<Console>>,
    modules: Rc<ModuleResolver>,
    clock: Rc<Cell<SceneClock>>,
}

impl SceneBridges {
    /// Bundles the bridges for one scene.
    pub fn new(engine: Engine, console: Console, modules: ModuleResolver) -> Self {
        Self {
            engine: Rc::new(RefCell::new(engine)),
            console: Rc::new(RefCell::new(console)),
            modules: Rc::new(modules),
            clock: Rc::new(Cell::new(SceneClock::default())),
        }
    }

    /// Borrows the scene engine mutably.
    ///
    /// # Panics
    ///
    /// If the engine is already borrowed; bridges are never re-entered.
    pub fn engine(&self) -> RefMut<'_, Engine> {
        self.engine.borrow_mut()
    }

    /// Borrows the console mutably.
    pub fn console(&self) -> RefMut<'_, Console> {
        self.console.borrow_mut()
    }

    /// The module resolver.
    #[must_use]
    pub fn modules(&self) -> &ModuleResolver {
        &self.modules
    }

    /// Current scene clock.
    #[must_use]
    pub fn clock(&self) -> SceneClock {
        self.clock.get()
    }

    /// Starts a new tick of `dt` seconds.
    pub(crate) fn advance_clock(&self, dt: f32) {
        let mut clock = self.clock.get();
        clock.tick += 1;
        clock.elapsed += f64::from(dt);
        self.clock.set(clock);
    }

    /// Writes a console line stamped with the current tick.
    pub fn log(&self, level: ConsoleLevel, message: impl Into<String>) {
        let tick = self.clock().tick;
        self.console().write(level, tick, message);
    }
}

/// What the sandbox needs from a runtime.
pub trait ScriptRuntime {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    /// Receives the bridges, registers scene-specific components and
    /// evaluates the bundle's top level. Called once, before the scene
    /// engine is hydrated and sealed.
    ///
    /// # Errors
    ///
    /// Load and registration failures; always fatal.
    fn attach(&mut self, bridges: SceneBridges) -> SandboxResult<()>;

    /// Calls the scene's `on_start`, if it has one.
    ///
    /// # Errors
    ///
    /// Whatever the scene raised.
    fn on_start(&mut self) -> SandboxResult<()>;

    /// Calls the scene's `on_update`, if it has one.
    ///
    /// # Errors
    ///
    /// Whatever the scene raised.
    fn on_update(&mut self, dt: f32) -> SandboxResult<()>;

    /// Runs every job ready at the current tick once. Jobs scheduled while
    /// running wait for the next round. Returns how many jobs ran.
    ///
    /// # Errors
    ///
    /// The first job failure. Jobs of the round that did not run yet stay
    /// queued for the next drain.
    fn run_pending_jobs(&mut self) -> SandboxResult<usize>;

    /// True if a round at the current tick would run something.
    fn has_ready_jobs(&self) -> bool;

    /// Drops every scheduled job, returning how many were discarded.
    fn discard_jobs(&mut self) -> usize;
}

// =============================================================================
// NATIVE RUNTIME
// =============================================================================

/// Continuation scheduled by a native scene.
pub type NativeJob = Box<dyn FnOnce(&mut SceneContext<'_>) -> SandboxResult<()>>;

/// Everything a native scene may touch during a call.
pub struct SceneContext<'a> {
    /// The scene engine.
    pub engine: &'a mut Engine,
    bridges: &'a SceneBridges,
    jobs: &'a mut JobQueue<NativeJob>,
}

impl SceneContext<'_> {
    /// Current scene clock.
    #[must_use]
    pub fn clock(&self) -> SceneClock {
        self.bridges.clock()
    }

    /// Writes an info line to the console.
    pub fn log(&self, message: impl Into<String>) {
        self.bridges.log(ConsoleLevel::Info, message);
    }

    /// Writes an error line to the console.
    pub fn error(&self, message: impl Into<String>) {
        self.bridges.log(ConsoleLevel::Error, message);
    }

    /// Requests a system module by name.
    ///
    /// # Errors
    ///
    /// [`SandboxError::UnknownModule`](crate::SandboxError::UnknownModule),
    /// which ends the scene when propagated.
    pub fn require(&self, name: &str) -> SandboxResult<SystemModule> {
        self.bridges.modules().resolve(name)
    }

    /// Runs `job` in the drain step after the current call.
    pub fn defer(&mut self, job: impl FnOnce(&mut SceneContext<'_>) -> SandboxResult<()> + 'static) {
        self.jobs.push_ready(Box::new(job));
    }

    /// Runs `job` in the drain step of the tick `ticks` from now.
    pub fn after_ticks(
        &mut self,
        ticks: u64,
        job: impl FnOnce(&mut SceneContext<'_>) -> SandboxResult<()> + 'static,
    ) {
        let due = self.clock().tick.saturating_add(ticks);
        self.jobs.push_after(due, Box::new(job));
    }
}

/// Scene logic written in Rust.
pub trait SceneScript {
    /// Defines scene-specific components. Runs before hydration.
    ///
    /// # Errors
    ///
    /// Registration conflicts.
    fn register(&mut self, _engine: &mut Engine) -> EngineResult<()> {
        Ok(())
    }

    /// Called once after the scene is hydrated.
    ///
    /// # Errors
    ///
    /// Any scene fault.
    fn on_start(&mut self, _ctx: &mut SceneContext<'_>) -> SandboxResult<()> {
        Ok(())
    }

    /// Called once per tick. The first tick always sees `dt == 0`.
    ///
    /// # Errors
    ///
    /// Any scene fault.
    fn on_update(&mut self, ctx: &mut SceneContext<'_>, dt: f32) -> SandboxResult<()>;
}

/// Runs a [`SceneScript`].
pub struct NativeRuntime<S: SceneScript> {
    name: String,
    script: S,
    bridges: Option<SceneBridges>,
    jobs: JobQueue<NativeJob>,
}

impl<S: SceneScript> NativeRuntime<S> {
    /// Wraps `script`.
    pub fn new(name: impl Into<String>, script: S) -> Self {
        Self {
            name: name.into(),
            script,
            bridges: None,
            jobs: JobQueue::new(),
        }
    }

    /// The wrapped script.
    pub fn script(&self) -> &S {
        &self.script
    }

    fn call(
        &mut self,
        f: impl FnOnce(&mut S, &mut SceneContext<'_>) -> SandboxResult<()>,
    ) -> SandboxResult<()> {
        let Some(bridges) = self.bridges.as_ref() else {
            return Ok(());
        };
        let mut engine = bridges.engine();
        let mut ctx = SceneContext {
            engine: &mut *engine,
            bridges,
            jobs: &mut self.jobs,
        };
        f(&mut self.script, &mut ctx)
    }
}

impl<S: SceneScript> ScriptRuntime for NativeRuntime<S> {
    fn name(&self) -> &str {
        &self.name
    }

    fn attach(&mut self, bridges: SceneBridges) -> SandboxResult<()> {
        self.script.register(&mut bridges.engine())?;
        self.bridges = Some(bridges);
        Ok(())
    }

    fn on_start(&mut self) -> SandboxResult<()> {
        self.call(|script, ctx| script.on_start(ctx))
    }

    fn on_update(&mut self, dt: f32) -> SandboxResult<()> {
        self.call(|script, ctx| script.on_update(ctx, dt))
    }

    fn run_pending_jobs(&mut self) -> SandboxResult<usize> {
        let Some(bridges) = self.bridges.as_ref() else {
            return Ok(0);
        };
        let ready = self.jobs.take_ready(bridges.clock().tick);
        let count = ready.len();
        let mut engine = bridges.engine();
        let mut ctx = SceneContext {
            engine: &mut *engine,
            bridges,
            jobs: &mut self.jobs,
        };
        let mut ready = ready.into_iter();
        while let Some(job) = ready.next() {
            if let Err(err) = job(&mut ctx) {
                ctx.jobs.requeue(ready);
                return Err(err);
            }
        }
        Ok(count)
    }

    fn has_ready_jobs(&self) -> bool {
        let now = self.bridges.as_ref().map_or(0, |bridges| bridges.clock().tick);
        self.jobs.has_ready(now)
    }

    fn discard_jobs(&mut self) -> usize {
        self.jobs.clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SandboxError;
    use meridian_core::EngineConfig;

    struct Recorder {
        seen: Rc<RefCell<Vec<String>>>,
    }

    impl SceneScript for Recorder {
        fn on_start(&mut self, ctx: &mut SceneContext<'_>) -> SandboxResult<()> {
            let seen = Rc::clone(&self.seen);
            ctx.defer(move |_| {
                seen.borrow_mut().push("deferred".into());
                Ok(())
            });
            let seen = Rc::clone(&self.seen);
            ctx.after_ticks(2, move |ctx| {
                seen.borrow_mut().push(format!("delayed@{}", ctx.clock().tick));
                Ok(())
            });
            self.seen.borrow_mut().push("start".into());
            Ok(())
        }

        fn on_update(&mut self, ctx: &mut SceneContext<'_>, dt: f32) -> SandboxResult<()> {
            self.seen.borrow_mut().push(format!("update {dt}"));
            ctx.log("tick");
            Ok(())
        }
    }

    fn bridges() -> SceneBridges {
        SceneBridges::new(
            Engine::with_builtins(EngineConfig::scene()).unwrap(),
            Console::new("test", 8),
            ModuleResolver::new("test"),
        )
    }

    #[test]
    fn test_native_jobs_follow_clock() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut runtime = NativeRuntime::new("recorder", Recorder { seen: Rc::clone(&seen) });
        let bridges = bridges();
        runtime.attach(bridges.clone()).unwrap();

        runtime.on_start().unwrap();
        assert_eq!(runtime.run_pending_jobs().unwrap(), 1);
        assert!(!runtime.has_ready_jobs());

        bridges.advance_clock(0.0);
        runtime.on_update(0.0).unwrap();
        assert_eq!(runtime.run_pending_jobs().unwrap(), 0);

        bridges.advance_clock(0.5);
        assert!(runtime.has_ready_jobs());
        assert_eq!(runtime.run_pending_jobs().unwrap(), 1);

        assert_eq!(
            *seen.borrow(),
            vec!["start", "deferred", "update 0", "delayed@2"]
        );
        assert_eq!(bridges.console().len(), 1);
        assert!((bridges.clock().elapsed - 0.5).abs() < 1e-9);
    }

    struct FailingJob {
        seen: Rc<RefCell<Vec<String>>>,
    }

    impl SceneScript for FailingJob {
        fn on_start(&mut self, ctx: &mut SceneContext<'_>) -> SandboxResult<()> {
            ctx.defer(|_| Err(SandboxError::script("pending job", "first")));
            let seen = Rc::clone(&self.seen);
            ctx.defer(move |_| {
                seen.borrow_mut().push("second".into());
                Ok(())
            });
            Ok(())
        }

        fn on_update(&mut self, _ctx: &mut SceneContext<'_>, _dt: f32) -> SandboxResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_failed_job_keeps_the_rest_queued() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut runtime = NativeRuntime::new("failing", FailingJob { seen: Rc::clone(&seen) });
        runtime.attach(bridges()).unwrap();
        runtime.on_start().unwrap();

        assert!(runtime.run_pending_jobs().is_err());
        assert!(seen.borrow().is_empty());
        assert!(runtime.has_ready_jobs());
        assert_eq!(runtime.run_pending_jobs().unwrap(), 1);
        assert_eq!(*seen.borrow(), vec!["second"]);
    }

    #[test]
    fn test_discard_jobs() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut runtime = NativeRuntime::new("recorder", Recorder { seen });
        runtime.attach(bridges()).unwrap();
        runtime.on_start().unwrap();
        assert_eq!(runtime.discard_jobs(), 2);
    }
}
