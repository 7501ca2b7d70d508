//! # Scene Host
//!
//! Host-side state for one scene: its own [`Engine`] allocating from the
//! reserved range, the player and camera transforms it owns, and a cached
//! transform resolver for whoever renders the world.

use tracing::debug;

use meridian_core::ecs::{BuiltinComponent, PointerEventType};
use meridian_core::{
    ApplyReport, Engine, EngineConfig, EngineResult, Entity, HierarchyError, PointerEventsResult,
    Transform, TransformResolver,
};
use meridian_shared::math::{Mat4, Vec3};

use crate::transport::{FullState, HostBridge};

/// Host side of one scene.
pub struct SceneHost {
    engine: Engine,
    resolver: TransformResolver,
    /// Host frames since creation, stamped on pointer events.
    frame: u32,
    /// Last GO timestamp issued by this host.
    event_clock: u32,
    last_report: ApplyReport,
    exchanges: u64,
}

impl SceneHost {
    /// Creates a host engine with the built-in components and seeds the
    /// player and camera transforms.
    ///
    /// # Errors
    ///
    /// Propagates component registration failures.
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        let mut engine = Engine::with_builtins(config)?;
        let transforms = engine.lww_mut(&Transform::definition())?;
        transforms.create_or_replace(Entity::PLAYER, Transform::default());
        transforms.create_or_replace(Entity::CAMERA, Transform::default());
        engine.seal();
        Ok(Self {
            engine,
            resolver: TransformResolver::new(),
            frame: 0,
            event_clock: 0,
            last_report: ApplyReport::default(),
            exchanges: 0,
        })
    }

    /// The host engine.
    #[must_use]
    pub const fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Mutable host engine, for host-side systems.
    pub fn engine_mut(&mut self) -> &mut Engine {
        &mut self.engine
    }

    /// Report of the last applied scene batch.
    #[must_use]
    pub const fn last_report(&self) -> ApplyReport {
        self.last_report
    }

    /// Number of scene batches received.
    #[must_use]
    pub const fn exchanges(&self) -> u64 {
        self.exchanges
    }

    /// Current host frame.
    #[must_use]
    pub const fn frame(&self) -> u32 {
        self.frame
    }

    /// Advances the host frame counter.
    pub fn advance_frame(&mut self) -> u32 {
        self.frame = self.frame.wrapping_add(1);
        self.frame
    }

    /// Moves the player avatar.
    ///
    /// # Errors
    ///
    /// Only if the transform component is missing, which `new` rules out.
    pub fn set_player_position(&mut self, position: Vec3) -> EngineResult<()> {
        let transforms = self.engine.lww_mut(&Transform::definition())?;
        match transforms.get_mutable_or_null(Entity::PLAYER) {
            Some(transform) => transform.position = position,
            None => {
                transforms.create_or_replace(Entity::PLAYER, Transform::from_position(position));
            }
        }
        Ok(())
    }

    /// Records a pointer interaction on `entity` for the scene to read.
    ///
    /// Returns false if the event was older than the stored bound allows.
    ///
    /// # Errors
    ///
    /// Only if the pointer component is missing, which `new` rules out.
    pub fn publish_pointer_event(
        &mut self,
        entity: Entity,
        button: u32,
        state: PointerEventType,
        hit_position: Vec3,
    ) -> EngineResult<bool> {
        self.event_clock = self.event_clock.saturating_add(1);
        let event = PointerEventsResult {
            button,
            state,
            hit_position,
            timestamp: self.event_clock,
            tick_number: self.frame,
        };
        let added = self
            .engine
            .grow_only_mut(&PointerEventsResult::definition())?
            .add_value(entity, event);
        debug!(entity = %entity, button, ?state, "Published pointer event");
        Ok(added)
    }

    /// World matrix of `entity` as the host sees it.
    ///
    /// # Errors
    ///
    /// [`HierarchyError::Cycle`] if the parent chain loops. An engine without
    /// transforms yields identity.
    pub fn world_matrix(&mut self, entity: Entity) -> Result<Mat4, HierarchyError> {
        match self.engine.lww(&Transform::definition()) {
            Ok(transforms) => self.resolver.world_matrix(transforms, entity),
            Err(_) => Ok(Mat4::IDENTITY),
        }
    }
}

impl HostBridge for SceneHost {
    fn exchange(&mut self, batch: &[u8]) -> Vec<u8> {
        self.exchanges += 1;
        self.last_report = self.engine.apply_batch(batch);
        self.engine.take_outgoing()
    }

    fn full_state(&mut self) -> FullState {
        // The snapshot already carries everything pending.
        drop(self.engine.take_outgoing());
        FullState {
            data: vec![self.engine.full_state()],
            has_entities: self.engine.has_entities(),
        }
    }
}
