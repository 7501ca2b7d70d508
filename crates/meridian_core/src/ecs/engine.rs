//! # Engine
//!
//! The entity/component engine: one entity container, one store per
//! registered component, and the systems run each tick.
//!
//! An engine is an explicit context. The host and every scene own their own
//! instance and only ever exchange encoded batches.
//!
//! # Example
//!
//! ```rust,ignore
//! let mut engine = Engine::with_builtins(EngineConfig::scene())?;
//! let door = engine.add_entity()?;
//! engine
//!     .lww_mut(&Transform::definition())?
//!     .create(door, Transform::from_position(Vec3::new(1.0, 0.0, 4.0)))?;
//! let batch = engine.take_outgoing();
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::{debug, warn};

use super::component::component_id_from_name;
use super::components::{register_builtins, BuiltinComponent, Transform};
use super::entity::{EntityContainer, EntityState};
use super::grow_only::{GrowOnlySet, TimestampFn};
use super::lww::LwwSet;
use super::store::{ComponentStore, DirtyMessage, MutationClock};
use super::system::{SystemFn, SystemSet};
use super::{ComponentDefinition, ComponentKind, Entity};
use crate::codec::{encode_batch, CrdtMessage};
use crate::config::EngineConfig;
use crate::crdt::{apply_batch, ApplyReport};
use crate::error::{EngineError, EngineResult};
use crate::schema::Schema;

/// Entity/component engine.
pub struct Engine {
    config: EngineConfig,
    entities: EntityContainer,
    stores: BTreeMap<u32, ComponentStore>,
    names: HashMap<String, u32>,
    clock: MutationClock,
    systems: SystemSet,
    running_systems: bool,
    /// DELETE_ENTITY messages not yet sent.
    pending_removals: Vec<DirtyMessage>,
    sealed: bool,
}

impl Engine {
    /// Creates an engine with no registered components.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        let entities = EntityContainer::new(config.entity_range_start, config.entity_range_end);
        Self {
            config,
            entities,
            stores: BTreeMap::new(),
            names: HashMap::new(),
            clock: MutationClock::new(),
            systems: SystemSet::new(),
            running_systems: false,
            pending_removals: Vec::new(),
            sealed: false,
        }
    }

    /// Creates an engine with the built-in components registered.
    ///
    /// # Errors
    ///
    /// Propagates registration errors (none occur on a fresh engine).
    pub fn with_builtins(config: EngineConfig) -> EngineResult<Self> {
        let mut engine = Self::new(config);
        register_builtins(&mut engine)?;
        Ok(engine)
    }

    /// Configuration this engine was built with.
    #[inline]
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    // =========================================================================
    // Component registration
    // =========================================================================

    /// Freezes the component registry.
    pub fn seal(&mut self) {
        if !self.sealed {
            debug!(components = self.stores.len(), "engine sealed");
        }
        self.sealed = true;
    }

    /// True once [`Engine::seal`] was called.
    #[inline]
    #[must_use]
    pub const fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Defines an LWW component whose id is derived from its name.
    ///
    /// # Errors
    ///
    /// [`EngineError::EngineSealed`] or [`EngineError::DuplicateComponent`].
    pub fn define_component<T: Schema + Send>(
        &mut self,
        name: &str,
    ) -> EngineResult<ComponentDefinition<T>> {
        self.define_component_with_id(component_id_from_name(name), name)
    }

    /// Defines an LWW component with an explicit id.
    ///
    /// # Errors
    ///
    /// [`EngineError::EngineSealed`] or [`EngineError::DuplicateComponent`].
    pub fn define_component_with_id<T: Schema + Send>(
        &mut self,
        id: u32,
        name: &str,
    ) -> EngineResult<ComponentDefinition<T>> {
        self.check_definable(id, name)?;
        let store = LwwSet::<T>::new(id, name, self.clock.clone());
        self.register(id, name, ComponentStore::LastWriteWins(Box::new(store)));
        Ok(ComponentDefinition::new(id, ComponentKind::LastWriteWins))
    }

    /// Defines a grow-only component whose id is derived from its name.
    ///
    /// # Arguments
    ///
    /// * `name` - Component name
    /// * `max_elements` - Values kept per entity
    /// * `timestamp_of` - Extracts the ordering timestamp from a value
    ///
    /// # Errors
    ///
    /// [`EngineError::EngineSealed`] or [`EngineError::DuplicateComponent`].
    pub fn define_grow_only<T: Schema + Send>(
        &mut self,
        name: &str,
        max_elements: usize,
        timestamp_of: TimestampFn<T>,
    ) -> EngineResult<ComponentDefinition<T>> {
        self.define_grow_only_with_id(component_id_from_name(name), name, max_elements, timestamp_of)
    }

    /// Defines a grow-only component with an explicit id.
    ///
    /// # Errors
    ///
    /// [`EngineError::EngineSealed`] or [`EngineError::DuplicateComponent`].
    pub fn define_grow_only_with_id<T: Schema + Send>(
        &mut self,
        id: u32,
        name: &str,
        max_elements: usize,
        timestamp_of: TimestampFn<T>,
    ) -> EngineResult<ComponentDefinition<T>> {
        self.check_definable(id, name)?;
        let store = GrowOnlySet::<T>::new(id, name, max_elements, timestamp_of, self.clock.clone());
        self.register(id, name, ComponentStore::GrowOnly(Box::new(store)));
        Ok(ComponentDefinition::new(id, ComponentKind::GrowOnly))
    }

    fn check_definable(&self, id: u32, name: &str) -> EngineResult<()> {
        if self.sealed {
            return Err(EngineError::EngineSealed(name.to_string()));
        }
        if self.stores.contains_key(&id) || self.names.contains_key(name) {
            return Err(EngineError::DuplicateComponent {
                id,
                name: name.to_string(),
            });
        }
        Ok(())
    }

    fn register(&mut self, id: u32, name: &str, store: ComponentStore) {
        debug!(component_id = id, name, kind = %store.kind(), "component defined");
        self.names.insert(name.to_string(), id);
        self.stores.insert(id, store);
    }

    // =========================================================================
    // Component lookup
    // =========================================================================

    /// Store of a component id, if registered.
    #[must_use]
    pub fn store(&self, id: u32) -> Option<&ComponentStore> {
        self.stores.get(&id)
    }

    pub(crate) fn store_mut(&mut self, id: u32) -> Option<&mut ComponentStore> {
        self.stores.get_mut(&id)
    }

    /// Store of a component id.
    ///
    /// # Errors
    ///
    /// [`EngineError::UnknownComponent`] if the id is not registered.
    pub fn component_by_id(&self, id: u32) -> EngineResult<&ComponentStore> {
        self.stores.get(&id).ok_or(EngineError::UnknownComponent(id))
    }

    /// Store of a component name.
    ///
    /// # Errors
    ///
    /// [`EngineError::UnknownComponentName`] if the name is not registered.
    pub fn component_by_name(&self, name: &str) -> EngineResult<&ComponentStore> {
        self.names
            .get(name)
            .and_then(|id| self.stores.get(id))
            .ok_or_else(|| EngineError::UnknownComponentName(name.to_string()))
    }

    /// Registered component ids, ascending.
    #[must_use]
    pub fn component_ids(&self) -> Vec<u32> {
        self.stores.keys().copied().collect()
    }

    /// Typed LWW store.
    ///
    /// # Errors
    ///
    /// [`EngineError::UnknownComponent`] or [`EngineError::ComponentTypeMismatch`].
    pub fn lww<T: Schema + Send>(&self, def: &ComponentDefinition<T>) -> EngineResult<&LwwSet<T>> {
        let store = self.component_by_id(def.id())?;
        store
            .as_any()
            .downcast_ref::<LwwSet<T>>()
            .ok_or_else(|| type_mismatch(store))
    }

    /// Typed mutable LWW store.
    ///
    /// # Errors
    ///
    /// [`EngineError::UnknownComponent`] or [`EngineError::ComponentTypeMismatch`].
    pub fn lww_mut<T: Schema + Send>(
        &mut self,
        def: &ComponentDefinition<T>,
    ) -> EngineResult<&mut LwwSet<T>> {
        let store = self.component_by_id(def.id())?;
        if !store.as_any().is::<LwwSet<T>>() {
            return Err(type_mismatch(store));
        }
        self.stores
            .get_mut(&def.id())
            .and_then(|store| store.as_any_mut().downcast_mut::<LwwSet<T>>())
            .ok_or(EngineError::UnknownComponent(def.id()))
    }

    /// Typed grow-only store.
    ///
    /// # Errors
    ///
    /// [`EngineError::UnknownComponent`] or [`EngineError::ComponentTypeMismatch`].
    pub fn grow_only<T: Schema + Send>(
        &self,
        def: &ComponentDefinition<T>,
    ) -> EngineResult<&GrowOnlySet<T>> {
        let store = self.component_by_id(def.id())?;
        store
            .as_any()
            .downcast_ref::<GrowOnlySet<T>>()
            .ok_or_else(|| type_mismatch(store))
    }

    /// Typed mutable grow-only store.
    ///
    /// # Errors
    ///
    /// [`EngineError::UnknownComponent`] or [`EngineError::ComponentTypeMismatch`].
    pub fn grow_only_mut<T: Schema + Send>(
        &mut self,
        def: &ComponentDefinition<T>,
    ) -> EngineResult<&mut GrowOnlySet<T>> {
        let store = self.component_by_id(def.id())?;
        if !store.as_any().is::<GrowOnlySet<T>>() {
            return Err(type_mismatch(store));
        }
        self.stores
            .get_mut(&def.id())
            .and_then(|store| store.as_any_mut().downcast_mut::<GrowOnlySet<T>>())
            .ok_or(EngineError::UnknownComponent(def.id()))
    }

    // =========================================================================
    // Entities
    // =========================================================================

    /// Allocates a new entity from this engine's range.
    ///
    /// # Errors
    ///
    /// [`EngineError::EntityRangeExhausted`] when no number is free.
    pub fn add_entity(&mut self) -> EngineResult<Entity> {
        self.entities.generate_entity()
    }

    /// Removes an entity and every component attached to it.
    ///
    /// The removal crosses the boundary as DELETE_ENTITY.
    ///
    /// # Errors
    ///
    /// [`EngineError::EntityNotAlive`] for reserved, removed or unknown ids.
    pub fn remove_entity(&mut self, entity: Entity) -> EngineResult<()> {
        if self.entities.entity_state(entity) != EntityState::UsedEntity
            || !self.entities.remove_entity(entity)
        {
            return Err(EngineError::EntityNotAlive(entity));
        }
        self.clear_entity_components(entity);
        self.pending_removals
            .push((self.clock.tick(), CrdtMessage::DeleteEntity { entity }));
        debug!(entity = %entity, "entity removed");
        Ok(())
    }

    /// Removes an entity and every descendant reachable through
    /// `Transform.parent`.
    ///
    /// Returns the removed entities, the given one first.
    ///
    /// # Errors
    ///
    /// [`EngineError::EntityNotAlive`] if `entity` itself is not alive.
    pub fn remove_entity_with_children(&mut self, entity: Entity) -> EngineResult<Vec<Entity>> {
        if self.entities.entity_state(entity) != EntityState::UsedEntity {
            return Err(EngineError::EntityNotAlive(entity));
        }
        let mut order = vec![entity];
        if let Ok(transforms) = self.lww(&Transform::definition()) {
            let mut seen: HashSet<Entity> = order.iter().copied().collect();
            let mut cursor = 0;
            while cursor < order.len() {
                let parent = order[cursor].to_raw();
                for (child, transform) in transforms.iter() {
                    if transform.parent == parent && seen.insert(child) {
                        order.push(child);
                    }
                }
                cursor += 1;
            }
        }
        let mut removed = Vec::with_capacity(order.len());
        for target in order {
            if self.remove_entity(target).is_ok() {
                removed.push(target);
            }
        }
        Ok(removed)
    }

    /// What the engine knows about `entity`.
    #[must_use]
    pub fn entity_state(&self, entity: Entity) -> EntityState {
        self.entities.entity_state(entity)
    }

    /// Live entities, reserved ones excluded.
    #[must_use]
    pub fn entities(&self) -> Vec<Entity> {
        self.entities.live_entities()
    }

    /// True if any component holds a value.
    #[must_use]
    pub fn has_entities(&self) -> bool {
        self.stores.values().any(|store| !store.is_empty())
    }

    /// Recycles removed entity numbers no transform still uses as parent.
    pub fn release_removed_entities(&mut self) -> Vec<Entity> {
        let parents: HashSet<u32> = self
            .lww(&Transform::definition())
            .map(|transforms| {
                transforms
                    .iter()
                    .map(|(_, transform)| Entity::from_raw(transform.parent).number())
                    .collect()
            })
            .unwrap_or_default();
        self.entities
            .release_removed_entities(|number| parents.contains(&number))
    }

    pub(crate) fn entities_mut(&mut self) -> &mut EntityContainer {
        &mut self.entities
    }

    /// Applies a remote DELETE_ENTITY. Returns true if anything changed.
    pub(crate) fn apply_remote_entity_removal(&mut self, entity: Entity) -> bool {
        if entity.is_reserved() {
            warn!(entity = %entity, "ignoring removal of reserved entity");
            return false;
        }
        let removed = self.entities.remove_entity(entity);
        let cleared = self.clear_entity_components(entity);
        removed || cleared
    }

    fn clear_entity_components(&mut self, entity: Entity) -> bool {
        let mut cleared = false;
        for store in self.stores.values_mut() {
            cleared |= store.clear_entity(entity);
        }
        cleared
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Every entity holding `def`, with its value, in entity order.
    ///
    /// # Errors
    ///
    /// Lookup errors from [`Engine::lww`].
    pub fn get_entities_with<T: Schema + Send>(
        &self,
        def: &ComponentDefinition<T>,
    ) -> EngineResult<Vec<(Entity, &T)>> {
        Ok(self.lww(def)?.iter().collect())
    }

    /// Every entity holding both `a` and `b`.
    ///
    /// # Errors
    ///
    /// Lookup errors from [`Engine::lww`].
    pub fn get_entities_with2<A: Schema + Send, B: Schema + Send>(
        &self,
        a: &ComponentDefinition<A>,
        b: &ComponentDefinition<B>,
    ) -> EngineResult<Vec<(Entity, &A, &B)>> {
        let first = self.lww(a)?;
        let second = self.lww(b)?;
        Ok(first
            .iter()
            .filter_map(|(entity, va)| second.get_or_null(entity).map(|vb| (entity, va, vb)))
            .collect())
    }

    /// Entities holding a value of any component kind, by id.
    ///
    /// # Errors
    ///
    /// [`EngineError::UnknownComponent`] if the id is not registered.
    pub fn entities_with_component(&self, id: u32) -> EngineResult<Vec<Entity>> {
        Ok(self.component_by_id(id)?.entities())
    }

    // =========================================================================
    // Systems
    // =========================================================================

    /// Adds a named system. Returns false if the name is taken.
    pub fn add_system(&mut self, name: &str, priority: i32, system: SystemFn) -> bool {
        self.systems.add(name, priority, system)
    }

    /// Removes a named system. Removals requested by a running system take
    /// effect once the current update finishes.
    pub fn remove_system(&mut self, name: &str) -> bool {
        if self.systems.remove(name) {
            return true;
        }
        if self.running_systems {
            self.systems.defer_removal(name);
            return true;
        }
        false
    }

    /// Runs every system once in priority order.
    pub fn update(&mut self, dt: f32) {
        let mut systems = std::mem::take(&mut self.systems);
        self.running_systems = true;
        systems.run(self, dt);
        self.running_systems = false;
        let added = std::mem::replace(&mut self.systems, systems);
        self.systems.merge(added);
    }

    // =========================================================================
    // Replication
    // =========================================================================

    /// Applies an incoming batch. Never fails; problems are counted.
    pub fn apply_batch(&mut self, bytes: &[u8]) -> ApplyReport {
        apply_batch(self, bytes)
    }

    /// True if local mutations are waiting to be sent.
    #[must_use]
    pub fn has_outgoing(&self) -> bool {
        !self.pending_removals.is_empty() || self.stores.values().any(ComponentStore::has_dirty)
    }

    /// Encodes every local mutation since the previous call, in mutation order.
    pub fn take_outgoing(&mut self) -> Vec<u8> {
        self.purge_removed_values();

        let mut messages = std::mem::take(&mut self.pending_removals);
        for store in self.stores.values_mut() {
            messages.extend(store.take_dirty());
        }
        let entities = &self.entities;
        messages.retain(|(_, message)| {
            matches!(message, CrdtMessage::DeleteEntity { .. })
                || !entities.is_removed(message.entity())
        });
        messages.sort_by_key(|(sequence, _)| *sequence);
        encode_framed(messages.iter().map(|(_, message)| message))
    }

    /// Encodes every value held: LWW values as PUT, grow-only values as APPEND.
    #[must_use]
    pub fn full_state(&self) -> Vec<u8> {
        let mut messages = Vec::new();
        for store in self.stores.values() {
            store.full_state(&mut messages);
        }
        encode_framed(&messages)
    }

    /// Drops values written locally onto entities that were already removed.
    fn purge_removed_values(&mut self) {
        let entities = &self.entities;
        for store in self.stores.values_mut() {
            let stale: Vec<Entity> = store
                .entities()
                .into_iter()
                .filter(|entity| entities.is_removed(*entity))
                .collect();
            for entity in stale {
                store.clear_entity(entity);
            }
        }
    }
}

/// Encodes a batch, leaving out values too large for one frame.
fn encode_framed<'a>(messages: impl IntoIterator<Item = &'a CrdtMessage>) -> Vec<u8> {
    let framed: Vec<&CrdtMessage> = messages
        .into_iter()
        .filter(|message| {
            let fits = message.fits_frame();
            if !fits {
                warn!(
                    entity = %message.entity(),
                    component_id = ?message.component_id(),
                    bytes = message.encoded_len(),
                    "value too large to replicate, dropped from batch"
                );
            }
            fits
        })
        .collect();
    encode_batch(framed)
}

fn type_mismatch(store: &ComponentStore) -> EngineError {
    EngineError::ComponentTypeMismatch {
        id: store.component_id(),
        name: store.component_name().to_string(),
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("entities", &self.entities.len())
            .field("components", &self.stores.len())
            .field("systems", &self.systems)
            .field("sealed", &self.sealed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use meridian_shared::math::Vec3;

    use super::*;
    use crate::codec::MessageReader;
    use crate::ecs::Name;

    fn engine() -> Engine {
        Engine::with_builtins(EngineConfig::scene()).unwrap()
    }

    fn decode(bytes: &[u8]) -> Vec<CrdtMessage> {
        MessageReader::new(bytes).map(Result::unwrap).collect()
    }

    #[test]
    fn test_define_after_seal_fails() {
        let mut engine = engine();
        engine.seal();
        assert!(matches!(
            engine.define_component::<u32>("test::Late"),
            Err(EngineError::EngineSealed(_))
        ));
    }

    #[test]
    fn test_duplicate_definition_fails() {
        let mut engine = engine();
        engine.define_component::<u32>("test::A").unwrap();
        assert!(matches!(
            engine.define_component::<u32>("test::A"),
            Err(EngineError::DuplicateComponent { .. })
        ));
        assert!(matches!(
            engine.define_component_with_id::<u32>(1, "test::B"),
            Err(EngineError::DuplicateComponent { id: 1, .. })
        ));
    }

    #[test]
    fn test_unknown_component_lookup_fails_loudly() {
        let engine = engine();
        assert_eq!(
            engine.component_by_id(9999).unwrap_err(),
            EngineError::UnknownComponent(9999)
        );
        assert!(matches!(
            engine.component_by_name("nope"),
            Err(EngineError::UnknownComponentName(_))
        ));
        assert!(engine.component_by_name(Name::NAME).is_ok());
    }

    #[test]
    fn test_type_mismatch_detected() {
        let mut engine = engine();
        let def = engine.define_component::<u32>("test::Counter").unwrap();
        let wrong: ComponentDefinition<String> =
            ComponentDefinition::new(def.id(), ComponentKind::LastWriteWins);
        assert!(matches!(
            engine.lww(&wrong),
            Err(EngineError::ComponentTypeMismatch { .. })
        ));
        assert!(matches!(
            engine.grow_only_mut(&ComponentDefinition::<u32>::new(def.id(), ComponentKind::GrowOnly)),
            Err(EngineError::ComponentTypeMismatch { .. })
        ));
    }

    #[test]
    fn test_outgoing_in_mutation_order() {
        let mut engine = engine();
        let counter = engine.define_component::<u32>("test::Counter").unwrap();
        let a = engine.add_entity().unwrap();
        let b = engine.add_entity().unwrap();

        engine.lww_mut(&counter).unwrap().create(b, 1).unwrap();
        engine
            .lww_mut(&Transform::definition())
            .unwrap()
            .create(a, Transform::default())
            .unwrap();
        engine.lww_mut(&counter).unwrap().create(a, 2).unwrap();
        engine.lww_mut(&counter).unwrap().create_or_replace(b, 3);

        let messages = decode(&engine.take_outgoing());
        let order: Vec<(Entity, Option<u32>)> = messages
            .iter()
            .map(|m| (m.entity(), m.component_id()))
            .collect();
        assert_eq!(
            order,
            vec![
                (b, Some(counter.id())),
                (a, Some(1)),
                (a, Some(counter.id())),
            ]
        );
        assert!(matches!(messages[0], CrdtMessage::PutComponent { timestamp: 2, .. }));
        assert!(engine.take_outgoing().is_empty());
    }

    #[test]
    fn test_remove_entity_supersedes_component_messages() {
        let mut engine = engine();
        let e = engine.add_entity().unwrap();
        engine
            .lww_mut(&Transform::definition())
            .unwrap()
            .create(e, Transform::default())
            .unwrap();
        engine.remove_entity(e).unwrap();

        let messages = decode(&engine.take_outgoing());
        assert_eq!(messages, vec![CrdtMessage::DeleteEntity { entity: e }]);
        assert!(matches!(
            engine.remove_entity(e),
            Err(EngineError::EntityNotAlive(_))
        ));
        assert!(engine.remove_entity(Entity::PLAYER).is_err());
    }

    #[test]
    fn test_values_written_after_removal_are_purged() {
        let mut engine = engine();
        let e = engine.add_entity().unwrap();
        engine.remove_entity(e).unwrap();
        engine
            .lww_mut(&Transform::definition())
            .unwrap()
            .create(e, Transform::default())
            .unwrap();

        let messages = decode(&engine.take_outgoing());
        assert_eq!(messages, vec![CrdtMessage::DeleteEntity { entity: e }]);
        assert!(!engine.lww(&Transform::definition()).unwrap().has_value(e));
    }

    #[test]
    fn test_remove_with_children() {
        let mut engine = engine();
        let root = engine.add_entity().unwrap();
        let child = engine.add_entity().unwrap();
        let grandchild = engine.add_entity().unwrap();
        let other = engine.add_entity().unwrap();
        let transforms = engine.lww_mut(&Transform::definition()).unwrap();
        transforms.create(root, Transform::default()).unwrap();
        transforms.create(child, Transform::default().with_parent(root)).unwrap();
        transforms
            .create(grandchild, Transform::default().with_parent(child))
            .unwrap();
        transforms.create(other, Transform::default()).unwrap();

        let removed = engine.remove_entity_with_children(root).unwrap();
        assert_eq!(removed, vec![root, child, grandchild]);
        assert_eq!(engine.entity_state(other), EntityState::UsedEntity);
        assert_eq!(engine.entity_state(grandchild), EntityState::Removed);
    }

    #[test]
    fn test_queries() {
        let mut engine = engine();
        let a = engine.add_entity().unwrap();
        let b = engine.add_entity().unwrap();
        engine
            .lww_mut(&Transform::definition())
            .unwrap()
            .create(a, Transform::from_position(Vec3::X))
            .unwrap();
        engine
            .lww_mut(&Transform::definition())
            .unwrap()
            .create(b, Transform::default())
            .unwrap();
        engine
            .lww_mut(&Name::definition())
            .unwrap()
            .create(b, Name::new("b"))
            .unwrap();

        let with_transform = engine.get_entities_with(&Transform::definition()).unwrap();
        assert_eq!(with_transform.len(), 2);
        let both = engine
            .get_entities_with2(&Transform::definition(), &Name::definition())
            .unwrap();
        assert_eq!(both.len(), 1);
        assert_eq!(both[0].0, b);
        assert_eq!(both[0].2, &Name::new("b"));
    }

    #[test]
    fn test_systems_run_in_priority_order() {
        let mut engine = engine();
        let log = Arc::new(Mutex::new(Vec::new()));
        for (name, priority) in [("second", 2), ("first", 1)] {
            let log = Arc::clone(&log);
            engine.add_system(name, priority, Box::new(move |_, _| log.lock().unwrap().push(name)));
        }
        engine.update(0.0);
        assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn test_system_can_remove_itself() {
        let mut engine = engine();
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        engine.add_system(
            "once",
            0,
            Box::new(move |engine, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                engine.remove_system("once");
            }),
        );
        engine.update(0.1);
        engine.update(0.1);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(!engine.remove_system("once"));
    }

    #[test]
    fn test_release_keeps_parent_numbers() {
        let mut engine = engine();
        let parent = engine.add_entity().unwrap();
        let child = engine.add_entity().unwrap();
        engine
            .lww_mut(&Transform::definition())
            .unwrap()
            .create(child, Transform::default().with_parent(parent))
            .unwrap();
        engine.remove_entity(parent).unwrap();
        assert!(engine.release_removed_entities().is_empty());

        engine.remove_entity(child).unwrap();
        let released = engine.release_removed_entities();
        assert_eq!(released.len(), 2);
        assert!(released.iter().all(|e| e.version() == 1));
    }
}
