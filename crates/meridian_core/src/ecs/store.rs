//! # Component Stores
//!
//! Every registered component owns one store. The engine keeps them as a
//! closed enum over the two consistency kinds; each variant holds a boxed
//! typed store behind a small object-safe interface.
//!
//! Local mutations are stamped with a sequence number from the engine-wide
//! [`MutationClock`] so the outgoing batch can be put back in mutation order.

use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::{ComponentKind, Entity};
use crate::codec::CrdtMessage;
use crate::crdt::ApplyOutcome;

/// Engine-wide source of mutation sequence numbers.
///
/// Cloned into every store of one engine. Never shared between engines.
#[derive(Clone, Debug, Default)]
pub struct MutationClock(Arc<AtomicU64>);

impl MutationClock {
    /// Creates a clock starting at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the next sequence number.
    #[inline]
    pub fn tick(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }

    /// Last value handed out plus one.
    #[inline]
    #[must_use]
    pub fn current(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// A pending outgoing message and the sequence number of the mutation that
/// first produced it.
pub type DirtyMessage = (u64, CrdtMessage);

/// Operations shared by both store kinds.
pub trait ComponentStorage: Send {
    /// Component id.
    fn component_id(&self) -> u32;

    /// Component name.
    fn component_name(&self) -> &str;

    /// Consistency kind.
    fn kind(&self) -> ComponentKind;

    /// True if `entity` holds a value.
    fn has(&self, entity: Entity) -> bool;

    /// Entities holding a value, ascending.
    fn entities(&self) -> Vec<Entity>;

    /// Number of entities holding a value.
    fn len(&self) -> usize;

    /// True if no entity holds a value.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops everything known about `entity`, pending messages included.
    ///
    /// Used when the entity is removed. Returns true if a value was present.
    fn clear_entity(&mut self, entity: Entity) -> bool;

    /// Drains the pending outgoing messages.
    fn take_dirty(&mut self) -> Vec<DirtyMessage>;

    /// True if local mutations are waiting to go out.
    fn has_dirty(&self) -> bool;

    /// Appends messages describing every value held.
    fn full_state(&self, out: &mut Vec<CrdtMessage>);

    /// Counter bumped on every change, local or remote.
    fn version(&self) -> u64;

    /// Upcast for typed access.
    fn as_any(&self) -> &dyn Any;

    /// Upcast for typed access.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Remote operations on a last-write-wins store.
pub trait LwwStorage: ComponentStorage {
    /// Applies a PUT_COMPONENT.
    fn apply_put(&mut self, entity: Entity, timestamp: u32, data: &[u8]) -> ApplyOutcome;

    /// Applies a DELETE_COMPONENT.
    fn apply_delete(&mut self, entity: Entity, timestamp: u32) -> ApplyOutcome;

    /// Timestamp of the entity's value or tombstone.
    fn timestamp(&self, entity: Entity) -> Option<u32>;

    /// Encoded value, `None` if absent or tombstoned.
    fn encoded(&self, entity: Entity) -> Option<Vec<u8>>;
}

/// Remote operations on a grow-only store.
pub trait GrowOnlyStorage: ComponentStorage {
    /// Applies an APPEND_VALUE.
    fn apply_append(&mut self, entity: Entity, data: &[u8]) -> ApplyOutcome;

    /// Maximum number of values kept per entity.
    fn max_elements(&self) -> usize;

    /// Encoded values of `entity`, newest first.
    fn encoded_values(&self, entity: Entity) -> Vec<Vec<u8>>;
}

/// A registered component's store.
pub enum ComponentStore {
    /// Last-write-wins element set.
    LastWriteWins(Box<dyn LwwStorage>),
    /// Grow-only value set.
    GrowOnly(Box<dyn GrowOnlyStorage>),
}

macro_rules! dispatch {
    ($self:expr, $store:ident => $body:expr) => {
        match $self {
            ComponentStore::LastWriteWins($store) => $body,
            ComponentStore::GrowOnly($store) => $body,
        }
    };
}

impl ComponentStore {
    /// Component id.
    #[must_use]
    pub fn component_id(&self) -> u32 {
        dispatch!(self, s => s.component_id())
    }

    /// Component name.
    #[must_use]
    pub fn component_name(&self) -> &str {
        dispatch!(self, s => s.component_name())
    }

    /// Consistency kind.
    #[must_use]
    pub const fn kind(&self) -> ComponentKind {
        match self {
            Self::LastWriteWins(_) => ComponentKind::LastWriteWins,
            Self::GrowOnly(_) => ComponentKind::GrowOnly,
        }
    }

    /// True if `entity` holds a value.
    #[must_use]
    pub fn has(&self, entity: Entity) -> bool {
        dispatch!(self, s => s.has(entity))
    }

    /// Entities holding a value, ascending.
    #[must_use]
    pub fn entities(&self) -> Vec<Entity> {
        dispatch!(self, s => s.entities())
    }

    /// Number of entities holding a value.
    #[must_use]
    pub fn len(&self) -> usize {
        dispatch!(self, s => s.len())
    }

    /// True if no entity holds a value.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        dispatch!(self, s => s.is_empty())
    }

    /// Drops everything known about `entity`.
    pub fn clear_entity(&mut self, entity: Entity) -> bool {
        dispatch!(self, s => s.clear_entity(entity))
    }

    /// Drains the pending outgoing messages.
    pub fn take_dirty(&mut self) -> Vec<DirtyMessage> {
        dispatch!(self, s => s.take_dirty())
    }

    /// True if local mutations are waiting to go out.
    #[must_use]
    pub fn has_dirty(&self) -> bool {
        dispatch!(self, s => s.has_dirty())
    }

    /// Appends messages describing every value held.
    pub fn full_state(&self, out: &mut Vec<CrdtMessage>) {
        dispatch!(self, s => s.full_state(out));
    }

    /// Change counter.
    #[must_use]
    pub fn version(&self) -> u64 {
        dispatch!(self, s => s.version())
    }

    /// Upcast for typed access.
    #[must_use]
    pub fn as_any(&self) -> &dyn Any {
        dispatch!(self, s => s.as_any())
    }

    /// Upcast for typed access.
    pub fn as_any_mut(&mut self) -> &mut dyn Any {
        dispatch!(self, s => s.as_any_mut())
    }
}

impl std::fmt::Debug for ComponentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentStore")
            .field("id", &self.component_id())
            .field("name", &self.component_name())
            .field("kind", &self.kind())
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_is_shared_between_clones() {
        let clock = MutationClock::new();
        let other = clock.clone();
        assert_eq!(clock.tick(), 0);
        assert_eq!(other.tick(), 1);
        assert_eq!(clock.current(), 2);
    }
}
