//! # Rhai Runtime
//!
//! Runs a scene bundle written in rhai inside an isolated interpreter:
//! - no `import`, no `eval`, bounded operations, call depth and collection sizes
//! - the only bridges are the console (`log`, `error`, `print`, `debug`),
//!   `require(name)` for system modules, and `defer`/`after_ticks` continuations
//!
//! ## Scene shape
//!
//! ```text
//! fn on_start() {
//!     this.api = require("~system/EngineApi");
//!     this.cube = this.api.add_entity();
//! }
//!
//! fn on_update(dt) {
//!     let p = this.api.get_position(this.cube);
//!     this.api.set_position(this.cube, p.x, p.y + dt, p.z);
//! }
//! ```
//!
//! Both entry points are optional. `this` is a map that persists for the
//! lifetime of the scene.

use std::cell::RefCell;
use std::fs;
use std::path::Path;
use std::rc::Rc;

use rhai::module_resolvers::DummyModuleResolver;
use rhai::{
    Array, CallFnOptions, Dynamic, Engine as RhaiEngine, EvalAltResult, FnPtr, FuncArgs, Map,
    Scope, AST, FLOAT, INT,
};
use tracing::{debug, info};

use meridian_core::ecs::{AvatarEmoteCommand, BuiltinComponent, Name, PointerEventType};
use meridian_core::{EngineError, Entity, EntityState, PointerEventsResult, Transform};
use meridian_shared::math::{Quaternion, Vec3};

use crate::config::SandboxConfig;
use crate::console::ConsoleLevel;
use crate::error::{SandboxError, SandboxResult};
use crate::jobs::JobQueue;
use crate::modules::SystemModule;
use crate::runtime::{SceneBridges, ScriptRuntime};

type RhaiResult<T> = Result<T, Box<EvalAltResult>>;

/// State shared between the runtime and its registered functions.
#[derive(Default)]
struct Shared {
    jobs: JobQueue<FnPtr>,
    /// Set by `require` when the scene asks for a module that does not exist.
    unknown_module: Option<String>,
}

/// Rhai implementation of [`ScriptRuntime`].
pub struct RhaiRuntime {
    name: String,
    engine: RhaiEngine,
    ast: AST,
    scope: Scope<'static>,
    this: Dynamic,
    shared: Rc<RefCell<Shared>>,
    bridges: Option<SceneBridges>,
}

impl RhaiRuntime {
    /// Compiles a scene bundle.
    ///
    /// # Errors
    ///
    /// [`SandboxError::Load`] on syntax errors.
    pub fn compile(name: impl Into<String>, source: &str, config: &SandboxConfig) -> SandboxResult<Self> {
        let name = name.into();
        let engine = isolated_engine(config);
        let ast = engine.compile(source).map_err(|err| SandboxError::Load {
            script: name.clone(),
            message: err.to_string(),
        })?;
        debug!(script = %name, functions = ast.iter_functions().count(), "Compiled scene bundle");
        Ok(Self {
            name,
            engine,
            ast,
            scope: Scope::new(),
            this: Dynamic::from_map(Map::new()),
            shared: Rc::new(RefCell::new(Shared::default())),
            bridges: None,
        })
    }

    /// Reads and compiles a scene bundle from disk.
    ///
    /// # Errors
    ///
    /// [`SandboxError::Load`] if the file cannot be read or compiled.
    pub fn from_file(path: &Path, config: &SandboxConfig) -> SandboxResult<Self> {
        let name = path.display().to_string();
        let source = fs::read_to_string(path).map_err(|err| SandboxError::Load {
            script: name.clone(),
            message: err.to_string(),
        })?;
        Self::compile(name, &source, config)
    }

    /// The persistent `this` map.
    #[must_use]
    pub fn state(&self) -> &Dynamic {
        &self.this
    }

    fn call_entry(&mut self, entry_point: &'static str, args: impl FuncArgs) -> SandboxResult<()> {
        if self.bridges.is_none() || !self.defines(entry_point) {
            return Ok(());
        }
        let options = CallFnOptions::new()
            .eval_ast(false)
            .bind_this_ptr(&mut self.this);
        let result = self
            .engine
            .call_fn_with_options::<Dynamic>(options, &mut self.scope, &self.ast, entry_point, args)
            .map(drop);
        self.settle(entry_point, result)
    }

    /// True if the bundle defines a script function named `name`.
    fn defines(&self, name: &str) -> bool {
        self.ast.iter_functions().any(|function| function.name == name)
    }

    /// Request of a module that does not exist during the last call, even if
    /// the script caught the error. Clears the record.
    fn take_unknown_module(&self) -> Option<SandboxError> {
        self.shared
            .borrow_mut()
            .unknown_module
            .take()
            .map(SandboxError::UnknownModule)
    }

    /// Maps the outcome of one call into the scene.
    fn settle(&self, entry_point: &'static str, result: RhaiResult<()>) -> SandboxResult<()> {
        if let Some(err) = self.take_unknown_module() {
            return Err(err);
        }
        result.map_err(|err| SandboxError::script(entry_point, err.to_string()))
    }
}

impl ScriptRuntime for RhaiRuntime {
    fn name(&self) -> &str {
        &self.name
    }

    fn attach(&mut self, bridges: SceneBridges) -> SandboxResult<()> {
        register_bridges(&mut self.engine, &bridges, &self.shared);
        let result = self.engine.run_ast_with_scope(&mut self.scope, &self.ast);
        if let Some(err) = self.take_unknown_module() {
            return Err(err);
        }
        result.map_err(|err| SandboxError::Load {
            script: self.name.clone(),
            message: err.to_string(),
        })?;
        info!(script = %self.name, "Scene bundle evaluated");
        self.bridges = Some(bridges);
        Ok(())
    }

    fn on_start(&mut self) -> SandboxResult<()> {
        self.call_entry("on_start", ())
    }

    fn on_update(&mut self, dt: f32) -> SandboxResult<()> {
        self.call_entry("on_update", (FLOAT::from(dt),))
    }

    fn run_pending_jobs(&mut self) -> SandboxResult<usize> {
        let Some(now) = self.bridges.as_ref().map(|bridges| bridges.clock().tick) else {
            return Ok(0);
        };
        let ready = self.shared.borrow_mut().jobs.take_ready(now);
        let count = ready.len();
        let mut ready = ready.into_iter();
        while let Some(job) = ready.next() {
            let result = job.call::<Dynamic>(&self.engine, &self.ast, ()).map(drop);
            if let Err(err) = self.settle("pending job", result) {
                self.shared.borrow_mut().jobs.requeue(ready);
                return Err(err);
            }
        }
        Ok(count)
    }

    fn has_ready_jobs(&self) -> bool {
        let now = self.bridges.as_ref().map_or(0, |bridges| bridges.clock().tick);
        self.shared.borrow().jobs.has_ready(now)
    }

    fn discard_jobs(&mut self) -> usize {
        self.shared.borrow_mut().jobs.clear()
    }
}

fn isolated_engine(config: &SandboxConfig) -> RhaiEngine {
    let mut engine = RhaiEngine::new();
    engine.set_module_resolver(DummyModuleResolver::new());
    engine.disable_symbol("eval");
    engine.set_max_operations(config.max_operations);
    engine.set_max_call_levels(config.max_call_levels);
    engine.set_max_string_size(config.max_string_size);
    engine.set_max_array_size(config.max_array_size);
    engine.set_max_map_size(config.max_map_size);
    engine.set_fast_operators(true);
    engine
}

fn register_bridges(engine: &mut RhaiEngine, bridges: &SceneBridges, shared: &Rc<RefCell<Shared>>) {
    // Console
    let console = bridges.clone();
    engine.on_print(move |text| console.log(ConsoleLevel::Info, text));
    let console = bridges.clone();
    engine.on_debug(move |text, _source, _pos| console.log(ConsoleLevel::Debug, text));
    let console = bridges.clone();
    engine.register_fn("log", move |text: &str| console.log(ConsoleLevel::Info, text));
    let console = bridges.clone();
    engine.register_fn("error", move |text: &str| console.log(ConsoleLevel::Error, text));

    // Modules
    let scene = bridges.clone();
    let fault = Rc::clone(shared);
    engine.register_fn("require", move |name: &str| -> RhaiResult<Dynamic> {
        match scene.modules().resolve(name) {
            Ok(SystemModule::EngineApi) => Ok(Dynamic::from(EngineApi {
                bridges: scene.clone(),
            })),
            Ok(SystemModule::Runtime) => Ok(Dynamic::from(RuntimeApi {
                bridges: scene.clone(),
            })),
            Err(err) => {
                fault.borrow_mut().unknown_module = Some(name.to_string());
                Err(err.to_string().into())
            }
        }
    });

    // Continuations
    let jobs = Rc::clone(shared);
    engine.register_fn("defer", move |job: FnPtr| jobs.borrow_mut().jobs.push_ready(job));
    let jobs = Rc::clone(shared);
    let clock = bridges.clone();
    engine.register_fn("after_ticks", move |ticks: INT, job: FnPtr| {
        let due = clock.clock().tick.saturating_add(u64::try_from(ticks).unwrap_or(0));
        jobs.borrow_mut().jobs.push_after(due, job);
    });

    register_engine_api(engine);
    engine.register_type_with_name::<RuntimeApi>("Runtime");
    engine.register_fn("tick", RuntimeApi::tick);
    engine.register_fn("elapsed", RuntimeApi::elapsed);
}

fn register_engine_api(engine: &mut RhaiEngine) {
    engine.register_type_with_name::<EngineApi>("EngineApi");
    engine.register_fn("add_entity", EngineApi::add_entity);
    engine.register_fn("remove_entity", EngineApi::remove_entity);
    engine.register_fn("entities", EngineApi::entities);
    engine.register_fn("set_position", EngineApi::set_position);
    engine.register_fn("set_rotation", EngineApi::set_rotation);
    engine.register_fn("set_scale", EngineApi::set_scale);
    engine.register_fn("set_parent", EngineApi::set_parent);
    engine.register_fn("get_position", EngineApi::get_position);
    engine.register_fn("world_position", EngineApi::world_position);
    engine.register_fn("player_position", EngineApi::player_position);
    engine.register_fn("set_name", EngineApi::set_name);
    engine.register_fn("get_name", EngineApi::get_name);
    engine.register_fn("play_emote", EngineApi::play_emote);
    engine.register_fn("pointer_events", EngineApi::pointer_events);
}

// =============================================================================
// SYSTEM MODULES
// =============================================================================

/// `~system/EngineApi`: entity and component access for scripts.
#[derive(Clone)]
struct EngineApi {
    bridges: SceneBridges,
}

fn entity_arg(value: INT) -> RhaiResult<Entity> {
    u32::try_from(value)
        .map(Entity::from_raw)
        .map_err(|_| format!("invalid entity id {value}").into())
}

fn engine_error(err: EngineError) -> Box<EvalAltResult> {
    err.to_string().into()
}

fn vec3(x: FLOAT, y: FLOAT, z: FLOAT) -> RhaiResult<Vec3> {
    let v = Vec3::new(x as f32, y as f32, z as f32);
    if v.is_finite() {
        Ok(v)
    } else {
        Err(format!("non-finite vector ({x}, {y}, {z})").into())
    }
}

fn vec3_map(v: Vec3) -> Dynamic {
    let mut map = Map::new();
    map.insert("x".into(), Dynamic::from_float(FLOAT::from(v.x)));
    map.insert("y".into(), Dynamic::from_float(FLOAT::from(v.y)));
    map.insert("z".into(), Dynamic::from_float(FLOAT::from(v.z)));
    Dynamic::from_map(map)
}

impl EngineApi {
    /// Applies `edit` to the entity's transform, creating it if missing.
    fn edit_transform(&mut self, entity: INT, edit: impl FnOnce(&mut Transform)) -> RhaiResult<()> {
        let entity = entity_arg(entity)?;
        let mut engine = self.bridges.engine();
        if engine.entity_state(entity) == EntityState::Removed {
            return Err(engine_error(EngineError::EntityNotAlive(entity)));
        }
        let transforms = engine.lww_mut(&Transform::definition()).map_err(engine_error)?;
        match transforms.get_mutable_or_null(entity) {
            Some(transform) => edit(transform),
            None => {
                let mut transform = Transform::default();
                edit(&mut transform);
                transforms.create_or_replace(entity, transform);
            }
        }
        Ok(())
    }

    fn add_entity(&mut self) -> RhaiResult<INT> {
        let entity = self.bridges.engine().add_entity().map_err(engine_error)?;
        Ok(INT::from(entity.to_raw()))
    }

    fn remove_entity(&mut self, entity: INT) -> RhaiResult<bool> {
        let entity = entity_arg(entity)?;
        Ok(self.bridges.engine().remove_entity(entity).is_ok())
    }

    fn entities(&mut self) -> Array {
        self.bridges
            .engine()
            .entities()
            .into_iter()
            .map(|entity| Dynamic::from_int(INT::from(entity.to_raw())))
            .collect()
    }

    fn set_position(&mut self, entity: INT, x: FLOAT, y: FLOAT, z: FLOAT) -> RhaiResult<()> {
        let position = vec3(x, y, z)?;
        self.edit_transform(entity, |transform| transform.position = position)
    }

    /// Euler angles in degrees.
    fn set_rotation(&mut self, entity: INT, x: FLOAT, y: FLOAT, z: FLOAT) -> RhaiResult<()> {
        let degrees = vec3(x, y, z)?;
        let rotation = Quaternion::from_euler_degrees(degrees.x, degrees.y, degrees.z);
        self.edit_transform(entity, |transform| transform.rotation = rotation)
    }

    fn set_scale(&mut self, entity: INT, x: FLOAT, y: FLOAT, z: FLOAT) -> RhaiResult<()> {
        let scale = vec3(x, y, z)?;
        self.edit_transform(entity, |transform| transform.scale = scale)
    }

    fn set_parent(&mut self, entity: INT, parent: INT) -> RhaiResult<()> {
        let parent = entity_arg(parent)?;
        self.edit_transform(entity, |transform| transform.parent = parent.to_raw())
    }

    fn get_position(&mut self, entity: INT) -> RhaiResult<Dynamic> {
        let entity = entity_arg(entity)?;
        let engine = self.bridges.engine();
        let transforms = engine.lww(&Transform::definition()).map_err(engine_error)?;
        Ok(transforms
            .get_or_null(entity)
            .map_or(Dynamic::UNIT, |transform| vec3_map(transform.position)))
    }

    fn world_position(&mut self, entity: INT) -> RhaiResult<Dynamic> {
        let entity = entity_arg(entity)?;
        let engine = self.bridges.engine();
        let transforms = engine.lww(&Transform::definition()).map_err(engine_error)?;
        let world = meridian_core::world_matrix(transforms, entity)
            .map_err(|err| -> Box<EvalAltResult> { err.to_string().into() })?;
        Ok(vec3_map(world.translation()))
    }

    fn player_position(&mut self) -> RhaiResult<Dynamic> {
        self.get_position(INT::from(Entity::PLAYER.to_raw()))
    }

    fn set_name(&mut self, entity: INT, name: &str) -> RhaiResult<()> {
        let entity = entity_arg(entity)?;
        let mut engine = self.bridges.engine();
        engine
            .lww_mut(&Name::definition())
            .map_err(engine_error)?
            .create_or_replace(entity, Name::new(name));
        Ok(())
    }

    fn get_name(&mut self, entity: INT) -> RhaiResult<Dynamic> {
        let entity = entity_arg(entity)?;
        let engine = self.bridges.engine();
        let names = engine.lww(&Name::definition()).map_err(engine_error)?;
        Ok(names
            .get_or_null(entity)
            .map_or(Dynamic::UNIT, |name| Dynamic::from(name.value.clone())))
    }

    /// Appends an emote stamped with the current scene tick.
    fn play_emote(&mut self, entity: INT, urn: &str, looping: bool) -> RhaiResult<bool> {
        let entity = entity_arg(entity)?;
        let timestamp = u32::try_from(self.bridges.clock().tick).unwrap_or(u32::MAX);
        let mut engine = self.bridges.engine();
        let emotes = engine
            .grow_only_mut(&AvatarEmoteCommand::definition())
            .map_err(engine_error)?;
        Ok(emotes.add_value(
            entity,
            AvatarEmoteCommand {
                emote_urn: urn.to_string(),
                looping,
                timestamp,
            },
        ))
    }

    /// Pointer events on `entity`, newest first.
    fn pointer_events(&mut self, entity: INT) -> RhaiResult<Array> {
        let entity = entity_arg(entity)?;
        let engine = self.bridges.engine();
        let events = engine
            .grow_only(&PointerEventsResult::definition())
            .map_err(engine_error)?;
        Ok(events
            .iter_values(entity)
            .map(|event| {
                let mut map = Map::new();
                map.insert("button".into(), Dynamic::from_int(INT::from(event.button)));
                map.insert("state".into(), Dynamic::from(pointer_state_name(event.state).to_string()));
                map.insert("tick".into(), Dynamic::from_int(INT::from(event.tick_number)));
                map.insert("timestamp".into(), Dynamic::from_int(INT::from(event.timestamp)));
                map.insert("hit".into(), vec3_map(event.hit_position));
                Dynamic::from_map(map)
            })
            .collect())
    }
}

const fn pointer_state_name(state: PointerEventType) -> &'static str {
    match state {
        PointerEventType::Down => "down",
        PointerEventType::Up => "up",
        PointerEventType::HoverEnter => "hover_enter",
        PointerEventType::HoverLeave => "hover_leave",
    }
}

/// `~system/Runtime`: scene clock for scripts.
#[derive(Clone)]
struct RuntimeApi {
    bridges: SceneBridges,
}

impl RuntimeApi {
    fn tick(&mut self) -> INT {
        INT::try_from(self.bridges.clock().tick).unwrap_or(INT::MAX)
    }

    fn elapsed(&mut self) -> FLOAT {
        self.bridges.clock().elapsed as FLOAT
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::Console;
    use crate::modules::ModuleResolver;
    use meridian_core::{Engine, EngineConfig};

    fn bridges() -> SceneBridges {
        SceneBridges::new(
            Engine::with_builtins(EngineConfig::scene()).unwrap(),
            Console::new("test", 32),
            ModuleResolver::new("test"),
        )
    }

    fn attached(source: &str) -> (RhaiRuntime, SceneBridges) {
        let bridges = bridges();
        let mut runtime = RhaiRuntime::compile("test", source, &SandboxConfig::default()).unwrap();
        runtime.attach(bridges.clone()).unwrap();
        (runtime, bridges)
    }

    const SPINNER: &str = r#"
        fn on_start() {
            this.api = require("~system/EngineApi");
            this.cube = this.api.add_entity();
            this.api.set_position(this.cube, 8.0, 1.0, 8.0);
            this.api.set_name(this.cube, "cube");
            defer(|| log("deferred ran"));
        }

        fn on_update(dt) {
            let p = this.api.get_position(this.cube);
            this.api.set_position(this.cube, p.x, p.y + dt, p.z);
        }
    "#;

    #[test]
    fn test_lifecycle_mutates_engine() {
        let (mut runtime, bridges) = attached(SPINNER);
        runtime.on_start().unwrap();
        assert_eq!(runtime.run_pending_jobs().unwrap(), 1);
        runtime.on_update(0.5).unwrap();

        let engine = bridges.engine();
        let cube = engine.entities()[0];
        let transform = engine.lww(&Transform::definition()).unwrap().get(cube).unwrap();
        assert!(transform.position.approx_eq(Vec3::new(8.0, 1.5, 8.0), 1e-5));
        assert_eq!(engine.lww(&Name::definition()).unwrap().get(cube).unwrap().value, "cube");
        drop(engine);

        let lines: Vec<String> = bridges.console().lines().map(|line| line.message.clone()).collect();
        assert_eq!(lines, vec!["deferred ran".to_string()]);
    }

    #[test]
    fn test_missing_entry_points_are_optional() {
        let (mut runtime, _) = attached("let unused = 1;");
        runtime.on_start().unwrap();
        runtime.on_update(0.0).unwrap();
    }

    #[test]
    fn test_unknown_module_in_entry_point() {
        let (mut runtime, _) = attached(r#"fn on_start() { require("~system/Secrets"); }"#);
        let err = runtime.on_start().unwrap_err();
        assert!(matches!(err, SandboxError::UnknownModule(ref name) if name == "~system/Secrets"));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_caught_unknown_module_is_still_fatal() {
        let (mut runtime, _) = attached(
            r#"
            fn on_start() {
                try { require("~system/Secrets"); } catch (err) { log("ignored"); }
            }
            fn on_update(dt) { throw "ordinary"; }
            "#,
        );
        let err = runtime.on_start().unwrap_err();
        assert!(matches!(err, SandboxError::UnknownModule(ref name) if name == "~system/Secrets"));

        // The failed request is reported once, not pinned on later errors.
        let err = runtime.on_update(0.1).unwrap_err();
        assert!(matches!(err, SandboxError::Script { entry_point: "on_update", .. }));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_caught_unknown_module_at_top_level() {
        let mut runtime = RhaiRuntime::compile(
            "test",
            r#"try { require("~system/Filesystem"); } catch (err) { }"#,
            &SandboxConfig::default(),
        )
        .unwrap();
        let err = runtime.attach(bridges()).unwrap_err();
        assert!(matches!(err, SandboxError::UnknownModule(_)));
    }

    #[test]
    fn test_failed_job_keeps_the_rest_queued() {
        let (mut runtime, bridges) = attached(
            r#"
            fn on_start() {
                defer(|| { throw "first"; });
                defer(|| { log("second"); });
            }
            "#,
        );
        runtime.on_start().unwrap();
        let err = runtime.run_pending_jobs().unwrap_err();
        assert!(matches!(err, SandboxError::Script { entry_point: "pending job", .. }));

        assert!(runtime.has_ready_jobs());
        assert_eq!(runtime.run_pending_jobs().unwrap(), 1);
        let lines: Vec<String> = bridges.console().lines().map(|line| line.message.clone()).collect();
        assert_eq!(lines, vec!["second".to_string()]);
    }

    #[test]
    fn test_unknown_module_at_top_level() {
        let mut runtime = RhaiRuntime::compile(
            "test",
            r#"let fs = require("~system/Filesystem");"#,
            &SandboxConfig::default(),
        )
        .unwrap();
        let err = runtime.attach(bridges()).unwrap_err();
        assert!(matches!(err, SandboxError::UnknownModule(_)));
    }

    #[test]
    fn test_script_errors_are_recoverable() {
        let (mut runtime, _) = attached(r#"fn on_update(dt) { throw "boom"; }"#);
        let err = runtime.on_update(0.1).unwrap_err();
        assert!(matches!(err, SandboxError::Script { entry_point: "on_update", .. }));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_operation_limit() {
        let config = SandboxConfig {
            max_operations: 10_000,
            ..SandboxConfig::default()
        };
        let mut runtime =
            RhaiRuntime::compile("test", "fn on_update(dt) { loop { } }", &config).unwrap();
        runtime.attach(bridges()).unwrap();
        assert!(matches!(runtime.on_update(0.1), Err(SandboxError::Script { .. })));
    }

    #[test]
    fn test_imports_are_disabled() {
        let mut runtime =
            RhaiRuntime::compile("test", r#"import "std" as s;"#, &SandboxConfig::default()).unwrap();
        assert!(matches!(runtime.attach(bridges()), Err(SandboxError::Load { .. })));
    }

    #[test]
    fn test_syntax_error() {
        let result = RhaiRuntime::compile("test", "fn on_start( {", &SandboxConfig::default());
        assert!(matches!(result, Err(SandboxError::Load { .. })));
    }

    #[test]
    fn test_after_ticks_waits_for_clock() {
        let (mut runtime, bridges) = attached(
            r#"fn on_start() { after_ticks(2, || log("later")); }"#,
        );
        runtime.on_start().unwrap();
        assert_eq!(runtime.run_pending_jobs().unwrap(), 0);
        bridges.advance_clock(0.0);
        assert!(!runtime.has_ready_jobs());
        bridges.advance_clock(0.1);
        assert!(runtime.has_ready_jobs());
        assert_eq!(runtime.run_pending_jobs().unwrap(), 1);
    }

    #[test]
    fn test_runtime_module_reads_clock() {
        let (mut runtime, bridges) = attached(
            r#"
            fn on_update(dt) {
                let rt = require("~system/Runtime");
                this.tick = rt.tick();
            }
            "#,
        );
        bridges.advance_clock(0.0);
        bridges.advance_clock(0.0);
        runtime.on_update(0.0).unwrap();
        let state = runtime.state().clone().cast::<Map>();
        assert_eq!(state["tick"].as_int().unwrap(), 2);
    }
}
