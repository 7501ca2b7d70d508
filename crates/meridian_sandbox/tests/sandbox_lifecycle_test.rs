//! Integration test for the sandbox lifecycle against a same-thread host.

use std::cell::RefCell;
use std::rc::Rc;

use meridian_core::ecs::{BuiltinComponent, Transform};
use meridian_core::{EngineConfig, Entity};
use meridian_sandbox::{
    DirectTransport, NativeRuntime, Sandbox, SandboxConfig, SandboxError, SandboxResult,
    SandboxState, SceneContext, SceneHost, SceneScript,
};
use meridian_shared::math::Vec3;

/// Spawns a cube at start and moves it up by `dt` every tick.
#[derive(Default)]
struct RisingCube {
    cube: Option<Entity>,
}

impl SceneScript for RisingCube {
    fn on_start(&mut self, ctx: &mut SceneContext<'_>) -> SandboxResult<()> {
        let cube = ctx.engine.add_entity()?;
        ctx.engine
            .lww_mut(&Transform::definition())?
            .create(cube, Transform::default())?;
        self.cube = Some(cube);
        ctx.log("cube spawned");
        Ok(())
    }

    fn on_update(&mut self, ctx: &mut SceneContext<'_>, dt: f32) -> SandboxResult<()> {
        let Some(cube) = self.cube else {
            return Ok(());
        };
        let transforms = ctx.engine.lww_mut(&Transform::definition())?;
        transforms.get_mutable(cube)?.position.y += dt;
        Ok(())
    }
}

fn setup() -> (Sandbox, Rc<RefCell<SceneHost>>) {
    let host = Rc::new(RefCell::new(SceneHost::new(EngineConfig::host()).unwrap()));
    let sandbox = Sandbox::new(
        "rising-cube",
        SandboxConfig::default(),
        EngineConfig::scene(),
        Box::new(NativeRuntime::new("rising-cube", RisingCube::default())),
        Box::new(DirectTransport::new(Rc::clone(&host))),
    )
    .unwrap();
    (sandbox, host)
}

fn host_position(host: &Rc<RefCell<SceneHost>>, entity: Entity) -> Vec3 {
    host.borrow()
        .engine()
        .lww(&Transform::definition())
        .unwrap()
        .get(entity)
        .unwrap()
        .position
}

#[test]
fn test_start_hydrates_then_publishes() {
    let (mut sandbox, host) = setup();
    sandbox.start().unwrap();

    // Player and camera come from the host snapshot.
    assert_eq!(sandbox.hydration().applied, 2);
    assert!(sandbox.engine().is_sealed());

    let cube = sandbox.engine().entities()[0];
    assert!(cube.number() >= 512);
    assert_eq!(host_position(&host, cube), Vec3::ZERO);
    assert_eq!(sandbox.console().lines().next().unwrap().message, "cube spawned");
}

#[test]
fn test_ticks_replicate_to_host() {
    let (mut sandbox, host) = setup();
    sandbox.start().unwrap();
    let cube = sandbox.engine().entities()[0];

    sandbox.tick(0.5).unwrap();
    for _ in 0..4 {
        sandbox.tick(0.5).unwrap();
    }

    // First tick ran with dt = 0.
    assert!(host_position(&host, cube).approx_eq(Vec3::new(0.0, 2.0, 0.0), 1e-5));
    assert_eq!(sandbox.clock().tick, 5);
    assert_eq!(sandbox.transport_stats().batches_sent, 6);
    assert_eq!(sandbox.transport_stats().full_state_requests, 1);
}

#[test]
fn test_host_changes_arrive_next_tick() {
    let (mut sandbox, host) = setup();
    sandbox.start().unwrap();
    sandbox.tick(0.0).unwrap();

    host.borrow_mut()
        .set_player_position(Vec3::new(8.0, 0.0, 8.0))
        .unwrap();
    // The reply to this tick carries the new position.
    let report = sandbox.tick(0.1).unwrap();
    assert_eq!(report.batches_received, 1);
    assert_eq!(sandbox.inbox_len(), 1);

    let report = sandbox.tick(0.1).unwrap();
    assert_eq!(report.batches_applied, 1);
    assert_eq!(report.applied.applied, 1);
    let player = sandbox
        .engine()
        .lww(&Transform::definition())
        .unwrap()
        .get(Entity::PLAYER)
        .unwrap()
        .position;
    assert_eq!(player, Vec3::new(8.0, 0.0, 8.0));
}

#[test]
fn test_dispose_terminates() {
    let (mut sandbox, _host) = setup();
    assert!(matches!(
        sandbox.tick(0.1),
        Err(SandboxError::InvalidState {
            state: SandboxState::Created,
            ..
        })
    ));

    sandbox.start().unwrap();
    assert!(sandbox.start().is_err());
    sandbox.dispose();
    assert_eq!(sandbox.state(), SandboxState::Terminated);
    assert_eq!(sandbox.dispose(), 0);
    assert!(sandbox.tick(0.1).unwrap_err().is_fatal());
}
