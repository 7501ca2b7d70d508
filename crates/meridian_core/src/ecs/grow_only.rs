//! # Grow-Only Value Set
//!
//! An ordered, bounded, append-only list of values per entity.
//!
//! Values are ordered newest first by a timestamp extracted from the value
//! itself; equal timestamps are ordered by encoded bytes, greatest first.
//! Once an entity holds more than `max_elements` values the oldest are
//! evicted. The same set of appends therefore leaves every replica with the
//! same list, whatever the arrival order.

use std::collections::BTreeMap;

use super::store::{ComponentStorage, DirtyMessage, GrowOnlyStorage, MutationClock};
use super::{ComponentKind, Entity};
use crate::codec::CrdtMessage;
use crate::crdt::ApplyOutcome;
use crate::schema::Schema;

/// Extracts the ordering timestamp from a value.
pub type TimestampFn<T> = fn(&T) -> u64;

#[derive(Clone, Debug)]
struct GrowOnlyElement<T> {
    timestamp: u64,
    bytes: Vec<u8>,
    value: T,
}

impl<T> GrowOnlyElement<T> {
    fn key(&self) -> (u64, &[u8]) {
        (self.timestamp, &self.bytes)
    }
}

/// Typed grow-only store.
pub struct GrowOnlySet<T: Schema> {
    id: u32,
    name: String,
    max_elements: usize,
    timestamp_of: TimestampFn<T>,
    values: BTreeMap<Entity, Vec<GrowOnlyElement<T>>>,
    pending: Vec<DirtyMessage>,
    clock: MutationClock,
    version: u64,
}

impl<T: Schema> GrowOnlySet<T> {
    /// Creates an empty store keeping at most `max_elements` values per entity.
    #[must_use]
    pub fn new(
        id: u32,
        name: impl Into<String>,
        max_elements: usize,
        timestamp_of: TimestampFn<T>,
        clock: MutationClock,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            max_elements: max_elements.max(1),
            timestamp_of,
            values: BTreeMap::new(),
            pending: Vec::new(),
            clock,
            version: 0,
        }
    }

    /// Appends a value and queues it for sending.
    ///
    /// Returns false if the value was not kept (duplicate, or older than a
    /// full list).
    pub fn add_value(&mut self, entity: Entity, value: T) -> bool {
        let bytes = value.to_bytes();
        let timestamp = (self.timestamp_of)(&value);
        self.pending.push((
            self.clock.tick(),
            CrdtMessage::AppendValue {
                entity,
                component_id: self.id,
                timestamp: u32::try_from(timestamp).unwrap_or(u32::MAX),
                data: bytes.clone(),
            },
        ));
        self.insert(entity, timestamp, bytes, value)
    }

    /// Values of `entity`, newest first.
    #[must_use]
    pub fn get_values(&self, entity: Entity) -> Vec<&T> {
        self.iter_values(entity).collect()
    }

    /// Iterates the values of `entity`, newest first.
    pub fn iter_values(&self, entity: Entity) -> impl Iterator<Item = &T> + '_ {
        self.values
            .get(&entity)
            .into_iter()
            .flat_map(|list| list.iter().map(|element| &element.value))
    }

    /// Newest value of `entity`.
    #[must_use]
    pub fn latest(&self, entity: Entity) -> Option<&T> {
        self.values
            .get(&entity)
            .and_then(|list| list.first())
            .map(|element| &element.value)
    }

    /// Iterates every entity with its values, newest first.
    pub fn iter(&self) -> impl Iterator<Item = (Entity, Vec<&T>)> + '_ {
        self.values.iter().map(|(entity, list)| {
            (*entity, list.iter().map(|element| &element.value).collect())
        })
    }

    /// Name of the component.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    fn insert(&mut self, entity: Entity, timestamp: u64, bytes: Vec<u8>, value: T) -> bool {
        let list = self.values.entry(entity).or_default();
        let key = (timestamp, bytes.as_slice());
        let position = list.partition_point(|element| element.key() > key);
        if list.get(position).is_some_and(|element| element.key() == key) {
            return false;
        }
        if position >= self.max_elements {
            return false;
        }
        list.insert(
            position,
            GrowOnlyElement {
                timestamp,
                bytes,
                value,
            },
        );
        list.truncate(self.max_elements);
        self.version += 1;
        true
    }
}

impl<T: Schema + Send> ComponentStorage for GrowOnlySet<T> {
    fn component_id(&self) -> u32 {
        self.id
    }

    fn component_name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ComponentKind {
        ComponentKind::GrowOnly
    }

    fn has(&self, entity: Entity) -> bool {
        self.values.get(&entity).is_some_and(|list| !list.is_empty())
    }

    fn entities(&self) -> Vec<Entity> {
        self.values
            .iter()
            .filter(|(_, list)| !list.is_empty())
            .map(|(entity, _)| *entity)
            .collect()
    }

    fn len(&self) -> usize {
        self.values.values().filter(|list| !list.is_empty()).count()
    }

    fn clear_entity(&mut self, entity: Entity) -> bool {
        self.pending.retain(|(_, message)| message.entity() != entity);
        match self.values.remove(&entity) {
            Some(list) => {
                self.version += 1;
                !list.is_empty()
            }
            None => false,
        }
    }

    fn take_dirty(&mut self) -> Vec<DirtyMessage> {
        std::mem::take(&mut self.pending)
    }

    fn has_dirty(&self) -> bool {
        !self.pending.is_empty()
    }

    fn full_state(&self, out: &mut Vec<CrdtMessage>) {
        for (entity, list) in &self.values {
            // Oldest first, so a replay appends in chronological order.
            for element in list.iter().rev() {
                out.push(CrdtMessage::AppendValue {
                    entity: *entity,
                    component_id: self.id,
                    timestamp: u32::try_from(element.timestamp).unwrap_or(u32::MAX),
                    data: element.bytes.clone(),
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

impl<T: Schema + Send> GrowOnlyStorage for GrowOnlySet<T> {
    fn apply_append(&mut self, entity: Entity, data: &[u8]) -> ApplyOutcome {
        let value = match T::from_bytes(data) {
            Ok(value) => value,
            Err(err) => return ApplyOutcome::Malformed(err),
        };
        let timestamp = (self.timestamp_of)(&value);
        if self.insert(entity, timestamp, data.to_vec(), value) {
            ApplyOutcome::Applied
        } else {
            ApplyOutcome::Unchanged
        }
    }

    fn max_elements(&self) -> usize {
        self.max_elements
    }

    fn encoded_values(&self, entity: Entity) -> Vec<Vec<u8>> {
        self.values
            .get(&entity)
            .map(|list| list.iter().map(|element| element.bytes.clone()).collect())
            .unwrap_or_default()
    }
}

impl<T: Schema> std::fmt::Debug for GrowOnlySet<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrowOnlySet")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("max_elements", &self.max_elements)
            .field("entities", &self.values.len())
            .field("pending", &self.pending.len())
            .finish()
    }
}
