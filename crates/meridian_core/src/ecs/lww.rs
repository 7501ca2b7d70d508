//! # Last-Write-Wins Element Set
//!
//! At most one value per entity. Each value or tombstone carries a timestamp
//! assigned by the side that last wrote it. Local writes bump the timestamp;
//! remote writes win only if [`resolve_lww`] says so.
//!
//! When a remote write loses, the local entry is queued for the next outgoing
//! batch so the sender converges to the winning state.

use std::collections::{BTreeMap, HashMap};

use super::store::{ComponentStorage, DirtyMessage, LwwStorage, MutationClock};
use super::{ComponentKind, Entity};
use crate::codec::CrdtMessage;
use crate::crdt::{resolve_lww, ApplyOutcome, LwwResolution};
use crate::error::{EngineError, EngineResult};
use crate::schema::Schema;

/// Called after a remote message changed an entity's value.
/// Receives `None` when the value was deleted.
pub type ChangeCallback<T> = Box<dyn FnMut(Entity, Option<&T>) + Send>;

#[derive(Clone, Debug)]
struct LwwEntry<T> {
    timestamp: u32,
    /// `None` is a tombstone.
    value: Option<T>,
}

/// Typed last-write-wins store.
pub struct LwwSet<T: Schema> {
    id: u32,
    name: String,
    entries: BTreeMap<Entity, LwwEntry<T>>,
    /// Entity -> sequence number of its first unsent mutation.
    dirty: BTreeMap<Entity, u64>,
    callbacks: HashMap<Entity, Vec<ChangeCallback<T>>>,
    clock: MutationClock,
    version: u64,
}

impl<T: Schema> LwwSet<T> {
    /// Creates an empty store.
    #[must_use]
    pub fn new(id: u32, name: impl Into<String>, clock: MutationClock) -> Self {
        Self {
            id,
            name: name.into(),
            entries: BTreeMap::new(),
            dirty: BTreeMap::new(),
            callbacks: HashMap::new(),
            clock,
            version: 0,
        }
    }

    /// Value of `entity`.
    ///
    /// # Errors
    ///
    /// [`EngineError::ComponentNotFound`] if the entity has no value.
    pub fn get(&self, entity: Entity) -> EngineResult<&T> {
        self.get_or_null(entity).ok_or_else(|| self.not_found(entity))
    }

    /// Value of `entity`, if any.
    #[must_use]
    pub fn get_or_null(&self, entity: Entity) -> Option<&T> {
        self.entries.get(&entity).and_then(|entry| entry.value.as_ref())
    }

    /// Mutable value of `entity`. Counts as a write.
    ///
    /// # Errors
    ///
    /// [`EngineError::ComponentNotFound`] if the entity has no value.
    pub fn get_mutable(&mut self, entity: Entity) -> EngineResult<&mut T> {
        if !self.has_value(entity) {
            return Err(self.not_found(entity));
        }
        self.touch(entity);
        self.entries
            .get_mut(&entity)
            .and_then(|entry| entry.value.as_mut())
            .ok_or_else(|| EngineError::ComponentNotFound {
                component: self.name.clone(),
                entity,
            })
    }

    /// Mutable value of `entity`, if any. Counts as a write when present.
    pub fn get_mutable_or_null(&mut self, entity: Entity) -> Option<&mut T> {
        self.get_mutable(entity).ok()
    }

    /// Sets the value of an entity that has none.
    ///
    /// # Errors
    ///
    /// [`EngineError::ComponentAlreadyExists`] if a value is present.
    pub fn create(&mut self, entity: Entity, value: T) -> EngineResult<&mut T> {
        if self.has_value(entity) {
            return Err(EngineError::ComponentAlreadyExists {
                component: self.name.clone(),
                entity,
            });
        }
        Ok(self.create_or_replace(entity, value))
    }

    /// Sets the value of an entity, replacing any previous one.
    pub fn create_or_replace(&mut self, entity: Entity, value: T) -> &mut T {
        self.touch(entity);
        let entry = self.entries.entry(entity).or_insert(LwwEntry {
            timestamp: 1,
            value: None,
        });
        entry.value.insert(value)
    }

    /// Deletes the value of `entity`, leaving a tombstone.
    ///
    /// Returns the removed value.
    pub fn delete_from(&mut self, entity: Entity) -> Option<T> {
        if !self.has_value(entity) {
            return None;
        }
        self.touch(entity);
        self.entries.get_mut(&entity).and_then(|entry| entry.value.take())
    }

    /// True if `entity` holds a value.
    #[inline]
    #[must_use]
    pub fn has_value(&self, entity: Entity) -> bool {
        self.get_or_null(entity).is_some()
    }

    /// Iterates live values in entity order.
    pub fn iter(&self) -> impl Iterator<Item = (Entity, &T)> + '_ {
        self.entries
            .iter()
            .filter_map(|(entity, entry)| entry.value.as_ref().map(|value| (*entity, value)))
    }

    /// Registers a callback fired when a remote message changes `entity`.
    pub fn on_change(&mut self, entity: Entity, callback: ChangeCallback<T>) {
        self.callbacks.entry(entity).or_default().push(callback);
    }

    /// Name of the component.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bumps the timestamp and queues the entity for sending.
    fn touch(&mut self, entity: Entity) {
        // New entries are inserted by `create_or_replace` with timestamp 1.
        if let Some(entry) = self.entries.get_mut(&entity) {
            entry.timestamp = entry.timestamp.saturating_add(1);
        }
        let clock = &self.clock;
        self.dirty.entry(entity).or_insert_with(|| clock.tick());
        self.version += 1;
    }

    fn not_found(&self, entity: Entity) -> EngineError {
        EngineError::ComponentNotFound {
            component: self.name.clone(),
            entity,
        }
    }

    fn local_state(&self, entity: Entity) -> Option<(u32, Option<Vec<u8>>)> {
        self.entries
            .get(&entity)
            .map(|entry| (entry.timestamp, entry.value.as_ref().map(Schema::to_bytes)))
    }

    /// Marks the local entry for resend after losing a conflict.
    fn queue_correction(&mut self, entity: Entity) {
        let clock = &self.clock;
        self.dirty.entry(entity).or_insert_with(|| clock.tick());
    }

    fn notify(&mut self, entity: Entity) {
        if let Some(callbacks) = self.callbacks.get_mut(&entity) {
            let value = self.entries.get(&entity).and_then(|entry| entry.value.as_ref());
            for callback in callbacks.iter_mut() {
                callback(entity, value);
            }
        }
    }

    fn resolve(&self, entity: Entity, timestamp: u32, incoming: Option<&[u8]>) -> LwwResolution {
        let local = self.local_state(entity);
        let local_ref = local
            .as_ref()
            .map(|(timestamp, data)| (*timestamp, data.as_deref()));
        resolve_lww(local_ref, timestamp, incoming)
    }

    fn store_remote(&mut self, entity: Entity, timestamp: u32, value: Option<T>) {
        let changed = self.get_or_null(entity) != value.as_ref();
        self.entries.insert(entity, LwwEntry { timestamp, value });
        // The remote state supersedes any pending local write.
        self.dirty.remove(&entity);
        self.version += 1;
        if changed {
            self.notify(entity);
        }
    }
}

impl<T: Schema + Send> ComponentStorage for LwwSet<T> {
    fn component_id(&self) -> u32 {
        self.id
    }

    fn component_name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ComponentKind {
        ComponentKind::LastWriteWins
    }

    fn has(&self, entity: Entity) -> bool {
        self.has_value(entity)
    }

    fn entities(&self) -> Vec<Entity> {
        self.iter().map(|(entity, _)| entity).collect()
    }

    fn len(&self) -> usize {
        self.entries.values().filter(|entry| entry.value.is_some()).count()
    }

    fn clear_entity(&mut self, entity: Entity) -> bool {
        self.dirty.remove(&entity);
        self.callbacks.remove(&entity);
        match self.entries.remove(&entity) {
            Some(entry) => {
                self.version += 1;
                entry.value.is_some()
            }
            None => false,
        }
    }

    fn take_dirty(&mut self) -> Vec<DirtyMessage> {
        let dirty = std::mem::take(&mut self.dirty);
        dirty
            .into_iter()
            .filter_map(|(entity, sequence)| {
                let entry = self.entries.get(&entity)?;
                let message = match &entry.value {
                    Some(value) => CrdtMessage::PutComponent {
                        entity,
                        component_id: self.id,
                        timestamp: entry.timestamp,
                        data: value.to_bytes(),
                    },
                    None => CrdtMessage::DeleteComponent {
                        entity,
                        component_id: self.id,
                        timestamp: entry.timestamp,
                    },
                };
                Some((sequence, message))
            })
            .collect()
    }

    fn has_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    fn full_state(&self, out: &mut Vec<CrdtMessage>) {
        for (entity, entry) in &self.entries {
            if let Some(value) = &entry.value {
                out.push(CrdtMessage::PutComponent {
                    entity: *entity,
                    component_id: self.id,
                    timestamp: entry.timestamp,
                    data: value.to_bytes(),
                });
            }
        }
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

impl<T: Schema + Send> LwwStorage for LwwSet<T> {
    fn apply_put(&mut self, entity: Entity, timestamp: u32, data: &[u8]) -> ApplyOutcome {
        match self.resolve(entity, timestamp, Some(data)) {
            LwwResolution::AcceptIncoming => match T::from_bytes(data) {
                Ok(value) => {
                    self.store_remote(entity, timestamp, Some(value));
                    ApplyOutcome::Applied
                }
                Err(err) => ApplyOutcome::Malformed(err),
            },
            LwwResolution::KeepLocal => {
                self.queue_correction(entity);
                ApplyOutcome::Outdated
            }
            LwwResolution::Identical => ApplyOutcome::Unchanged,
        }
    }

    fn apply_delete(&mut self, entity: Entity, timestamp: u32) -> ApplyOutcome {
        match self.resolve(entity, timestamp, None) {
            LwwResolution::AcceptIncoming => {
                self.store_remote(entity, timestamp, None);
                ApplyOutcome::Applied
            }
            LwwResolution::KeepLocal => {
                self.queue_correction(entity);
                ApplyOutcome::Outdated
            }
            LwwResolution::Identical => ApplyOutcome::Unchanged,
        }
    }

    fn timestamp(&self, entity: Entity) -> Option<u32> {
        self.entries.get(&entity).map(|entry| entry.timestamp)
    }

    fn encoded(&self, entity: Entity) -> Option<Vec<u8>> {
        self.get_or_null(entity).map(Schema::to_bytes)
    }
}

impl<T: Schema> std::fmt::Debug for LwwSet<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LwwSet")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("entries", &self.entries.len())
            .field("dirty", &self.dirty.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    fn store() -> LwwSet<u32> {
        LwwSet::new(2000, "test::Counter", MutationClock::new())
    }

    const E: Entity = Entity::new(512, 0);

    #[test]
    fn test_local_writes_bump_timestamp() {
        let mut set = store();
        set.create(E, 1).unwrap();
        assert_eq!(set.timestamp(E), Some(1));
        set.create_or_replace(E, 2);
        assert_eq!(set.timestamp(E), Some(2));
        *set.get_mutable(E).unwrap() += 1;
        assert_eq!(set.timestamp(E), Some(3));
        assert_eq!(set.delete_from(E), Some(3));
        assert_eq!(set.timestamp(E), Some(4));
        set.create(E, 9).unwrap();
        assert_eq!(set.timestamp(E), Some(5));
    }

    #[test]
    fn test_create_twice_fails() {
        let mut set = store();
        set.create(E, 1).unwrap();
        assert!(matches!(
            set.create(E, 2),
            Err(EngineError::ComponentAlreadyExists { .. })
        ));
        assert!(matches!(
            store().get(E),
            Err(EngineError::ComponentNotFound { .. })
        ));
    }

    #[test]
    fn test_dirty_carries_final_state_once() {
        let mut set = store();
        set.create(E, 1).unwrap();
        set.create_or_replace(E, 2);
        set.create_or_replace(E, 3);
        let dirty = set.take_dirty();
        assert_eq!(dirty.len(), 1);
        assert_eq!(
            dirty[0].1,
            CrdtMessage::PutComponent {
                entity: E,
                component_id: 2000,
                timestamp: 3,
                data: 3u32.to_bytes(),
            }
        );
        assert!(set.take_dirty().is_empty());
    }

    #[test]
    fn test_remote_newer_applies_and_clears_dirty() {
        let mut set = store();
        set.create(E, 1).unwrap();
        let outcome = set.apply_put(E, 10, &7u32.to_bytes());
        assert_eq!(outcome, ApplyOutcome::Applied);
        assert_eq!(set.get_or_null(E), Some(&7));
        assert!(set.take_dirty().is_empty());
    }

    #[test]
    fn test_remote_stale_queues_correction() {
        let mut set = store();
        set.create(E, 1).unwrap();
        set.create_or_replace(E, 2);
        set.take_dirty();
        let outcome = set.apply_put(E, 1, &9u32.to_bytes());
        assert_eq!(outcome, ApplyOutcome::Outdated);
        assert_eq!(set.get_or_null(E), Some(&2));
        let dirty = set.take_dirty();
        assert_eq!(dirty.len(), 1);
        assert!(matches!(
            dirty[0].1,
            CrdtMessage::PutComponent { timestamp: 2, .. }
        ));
    }

    #[test]
    fn test_remote_delete_then_resurrect() {
        let mut set = store();
        assert_eq!(set.apply_put(E, 1, &5u32.to_bytes()), ApplyOutcome::Applied);
        assert_eq!(set.apply_delete(E, 2), ApplyOutcome::Applied);
        assert_eq!(set.get_or_null(E), None);
        assert_eq!(set.apply_put(E, 2, &5u32.to_bytes()), ApplyOutcome::Outdated);
        assert_eq!(set.apply_put(E, 3, &6u32.to_bytes()), ApplyOutcome::Applied);
        assert_eq!(set.get_or_null(E), Some(&6));
    }

    #[test]
    fn test_identical_is_unchanged() {
        let mut set = store();
        set.apply_put(E, 4, &5u32.to_bytes());
        assert_eq!(set.apply_put(E, 4, &5u32.to_bytes()), ApplyOutcome::Unchanged);
    }

    #[test]
    fn test_malformed_payload_leaves_state() {
        let mut set = store();
        set.apply_put(E, 1, &5u32.to_bytes());
        let outcome = set.apply_put(E, 2, &[1, 2]);
        assert!(matches!(outcome, ApplyOutcome::Malformed(_)));
        assert_eq!(set.get_or_null(E), Some(&5));
        assert_eq!(set.timestamp(E), Some(1));
    }

    #[test]
    fn test_change_callback_fires_on_remote_change() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut set = store();
        set.on_change(
            E,
            Box::new(move |_, value| sink.lock().unwrap().push(value.copied())),
        );
        set.apply_put(E, 1, &5u32.to_bytes());
        set.apply_put(E, 1, &5u32.to_bytes());
        set.apply_delete(E, 2);
        set.create(E, 8).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![Some(5), None]);
    }

    #[test]
    fn test_clear_entity_drops_everything() {
        let mut set = store();
        set.create(E, 1).unwrap();
        assert!(set.clear_entity(E));
        assert!(set.take_dirty().is_empty());
        assert_eq!(set.timestamp(E), None);
    }
}
