//! Integration test for world matrices across a three-level parent chain.

use meridian_core::ecs::{BuiltinComponent, Transform};
use meridian_core::{world_matrix, world_transform, Engine, EngineConfig, TransformResolver};
use meridian_shared::math::{Mat4, Quaternion, Vec3};

const TOLERANCE: f32 = 1e-4;

fn build_chain(engine: &mut Engine) -> [meridian_core::Entity; 3] {
    let grandparent = engine.add_entity().unwrap();
    let parent = engine.add_entity().unwrap();
    let child = engine.add_entity().unwrap();
    let transforms = engine.lww_mut(&Transform::definition()).unwrap();
    transforms
        .create(
            grandparent,
            Transform::from_position(Vec3::new(10.0, 0.0, 0.0))
                .with_rotation(Quaternion::from_euler_degrees(0.0, 90.0, 0.0)),
        )
        .unwrap();
    transforms
        .create(
            parent,
            Transform::from_position(Vec3::new(0.0, 0.0, 5.0))
                .with_scale(Vec3::new(2.0, 2.0, 2.0))
                .with_parent(grandparent),
        )
        .unwrap();
    transforms
        .create(
            child,
            Transform::from_position(Vec3::new(1.0, 0.0, 0.0)).with_parent(parent),
        )
        .unwrap();
    [grandparent, parent, child]
}

#[test]
fn test_three_level_composition() {
    let mut engine = Engine::with_builtins(EngineConfig::scene()).unwrap();
    let [grandparent, parent, child] = build_chain(&mut engine);
    let transforms = engine.lww(&Transform::definition()).unwrap();

    let expected = transforms.get(grandparent).unwrap().local_matrix()
        * transforms.get(parent).unwrap().local_matrix()
        * transforms.get(child).unwrap().local_matrix();
    let world = world_matrix(transforms, child).unwrap();
    assert!(world.approx_eq(&expected, TOLERANCE));

    // Y rotation of 90 degrees maps +Z to +X and +X to -Z.
    // parent origin: (10,0,0) + rot(0,0,5) = (15,0,0)
    // child origin: parent + rot(scale * (1,0,0)) = (15,0,-2)
    assert!(world
        .translation()
        .approx_eq(Vec3::new(15.0, 0.0, -2.0), TOLERANCE));
}

#[test]
fn test_decomposition_round_trip() {
    let mut engine = Engine::with_builtins(EngineConfig::scene()).unwrap();
    let [_, _, child] = build_chain(&mut engine);
    let transforms = engine.lww(&Transform::definition()).unwrap();

    let world = world_transform(transforms, child).unwrap();
    assert!(world.scale.approx_eq(Vec3::new(2.0, 2.0, 2.0), TOLERANCE));
    assert!(world
        .rotation
        .approx_eq(Quaternion::from_euler_degrees(0.0, 90.0, 0.0), TOLERANCE));

    let recomposed =
        Mat4::from_scale_rotation_translation(world.scale, world.rotation, world.position);
    assert!(recomposed.approx_eq(&world_matrix(transforms, child).unwrap(), TOLERANCE));
}

#[test]
fn test_resolver_tracks_remote_changes() {
    let mut scene = Engine::with_builtins(EngineConfig::scene()).unwrap();
    let [grandparent, _, child] = build_chain(&mut scene);
    let mut host = Engine::with_builtins(EngineConfig::host()).unwrap();
    host.apply_batch(&scene.take_outgoing());

    let mut resolver = TransformResolver::new();
    let before = resolver
        .world_matrix(host.lww(&Transform::definition()).unwrap(), child)
        .unwrap();

    scene
        .lww_mut(&Transform::definition())
        .unwrap()
        .get_mutable(grandparent)
        .unwrap()
        .position = Vec3::ZERO;
    host.apply_batch(&scene.take_outgoing());

    let after = resolver
        .world_matrix(host.lww(&Transform::definition()).unwrap(), child)
        .unwrap();
    assert!(before
        .translation()
        .approx_eq(Vec3::new(15.0, 0.0, -2.0), TOLERANCE));
    assert!(after
        .translation()
        .approx_eq(Vec3::new(5.0, 0.0, -2.0), TOLERANCE));
}
