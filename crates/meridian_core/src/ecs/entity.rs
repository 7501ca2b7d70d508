//! # Entity Management
//!
//! Entities are plain identifiers consisting of:
//! - An entity number (low 16 bits)
//! - A version counter for safe reuse (high 16 bits)
//!
//! The [`EntityContainer`] tracks which (number, version) pairs are alive,
//! which were removed, and hands out new numbers from a configured range.
//! Host and scene allocate from disjoint ranges so both can create entities
//! without coordination.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

use meridian_shared::constants::{CAMERA_ENTITY, HOST_ENTITY_RANGE_START, MAX_ENTITY_NUMBER};

use crate::error::{EngineError, EngineResult};

const NUMBER_MASK: u32 = 0xFFFF;
const VERSION_SHIFT: u32 = 16;
const MAX_VERSION: u32 = 0xFFFF;

/// Unique identifier for an entity.
///
/// The id is split into two parts:
/// - Lower 16 bits: entity number
/// - Upper 16 bits: version, bumped every time the number is recycled
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[repr(transparent)]
pub struct Entity(u32);

impl Entity {
    /// The world root.
    pub const ROOT: Self = Self(meridian_shared::ROOT_ENTITY);

    /// The local player.
    pub const PLAYER: Self = Self(meridian_shared::PLAYER_ENTITY);

    /// The camera.
    pub const CAMERA: Self = Self(meridian_shared::constants::CAMERA_ENTITY);

    /// Creates an entity id from number and version.
    ///
    /// # Arguments
    ///
    /// * `number` - Entity number (0 to 2^16-1, higher bits are dropped)
    /// * `version` - Version counter (0 to 2^16-1, higher bits are dropped)
    #[inline]
    #[must_use]
    pub const fn new(number: u32, version: u32) -> Self {
        Self((number & NUMBER_MASK) | ((version & MAX_VERSION) << VERSION_SHIFT))
    }

    /// Wraps a raw wire value.
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw wire value.
    #[inline]
    #[must_use]
    pub const fn to_raw(self) -> u32 {
        self.0
    }

    /// Returns the entity number.
    #[inline]
    #[must_use]
    pub const fn number(self) -> u32 {
        self.0 & NUMBER_MASK
    }

    /// Returns the version.
    #[inline]
    #[must_use]
    pub const fn version(self) -> u32 {
        self.0 >> VERSION_SHIFT
    }

    /// True for the root, player and camera.
    #[inline]
    #[must_use]
    pub const fn is_reserved(self) -> bool {
        self.version() == 0 && self.number() <= CAMERA_ENTITY
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.number(), self.version())
    }
}

impl From<u32> for Entity {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

/// What the container knows about an entity id.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntityState {
    /// Never seen by this container.
    Unknown,
    /// Alive at exactly this version.
    UsedEntity,
    /// This version was removed. Messages for it are dropped.
    Removed,
    /// Root, player or camera. Always valid, never removed.
    Reserved,
}

/// Tracks live and removed entities and allocates new ones.
#[derive(Debug)]
pub struct EntityContainer {
    /// First number this side allocates.
    range_start: u32,
    /// One past the last number this side allocates.
    range_end: u32,
    /// Next never-used number.
    next_number: u32,
    /// Live version per entity number.
    used: HashMap<u32, u32>,
    /// Highest removed version per entity number.
    removed: HashMap<u32, u32>,
    /// Own-range numbers that were removed and may be recycled.
    release_candidates: HashSet<u32>,
    /// Recycled ids ready for allocation.
    free: VecDeque<Entity>,
}

impl EntityContainer {
    /// Creates a container allocating numbers in `start..end`.
    ///
    /// The range is clamped to the valid dynamic numbers
    /// (`HOST_ENTITY_RANGE_START..=MAX_ENTITY_NUMBER`).
    #[must_use]
    pub fn new(start: u32, end: u32) -> Self {
        let range_start = start.max(HOST_ENTITY_RANGE_START);
        let range_end = end.min(MAX_ENTITY_NUMBER + 1).max(range_start);
        Self {
            range_start,
            range_end,
            next_number: range_start,
            used: HashMap::new(),
            removed: HashMap::new(),
            release_candidates: HashSet::new(),
            free: VecDeque::new(),
        }
    }

    /// Allocation range as `(start, end)`.
    #[inline]
    #[must_use]
    pub const fn range(&self) -> (u32, u32) {
        (self.range_start, self.range_end)
    }

    /// Number of live entities (reserved ones excluded).
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.used.len()
    }

    /// True if no dynamic entity is alive.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.used.is_empty()
    }

    /// Allocates a fresh entity id.
    ///
    /// Recycled ids are handed out first, then never-used numbers.
    ///
    /// # Errors
    ///
    /// [`EngineError::EntityRangeExhausted`] when the range has no free number.
    pub fn generate_entity(&mut self) -> EngineResult<Entity> {
        let entity = if let Some(recycled) = self.free.pop_front() {
            recycled
        } else if self.next_number < self.range_end {
            let entity = Entity::new(self.next_number, 0);
            self.next_number += 1;
            entity
        } else {
            return Err(EngineError::EntityRangeExhausted {
                start: self.range_start,
                end: self.range_end,
            });
        };
        self.used.insert(entity.number(), entity.version());
        Ok(entity)
    }

    /// Marks an entity as removed.
    ///
    /// Returns `false` for reserved entities and already-removed versions.
    pub fn remove_entity(&mut self, entity: Entity) -> bool {
        if entity.is_reserved() || self.is_removed(entity) {
            return false;
        }
        let number = entity.number();
        if self.used.get(&number) == Some(&entity.version()) {
            self.used.remove(&number);
        }
        self.mark_removed(number, entity.version());
        true
    }

    /// Registers an entity seen in a remote message.
    ///
    /// Returns `false` if the version was removed. Seeing version `v` marks
    /// every older version of the same number as removed.
    pub fn update_used_entity(&mut self, entity: Entity) -> bool {
        if entity.is_reserved() {
            return true;
        }
        if self.is_removed(entity) {
            return false;
        }
        let number = entity.number();
        let version = entity.version();
        if version > 0 {
            self.mark_removed(number, version - 1);
        }
        self.used.insert(number, version);
        if number >= self.range_start && number < self.range_end && number >= self.next_number {
            // Never allocate a number the other side already uses.
            self.next_number = number + 1;
        }
        true
    }

    /// Current state of `entity`.
    #[must_use]
    pub fn entity_state(&self, entity: Entity) -> EntityState {
        if entity.is_reserved() {
            EntityState::Reserved
        } else if self.used.get(&entity.number()) == Some(&entity.version()) {
            EntityState::UsedEntity
        } else if self.is_removed(entity) {
            EntityState::Removed
        } else {
            EntityState::Unknown
        }
    }

    /// True if this exact version was removed.
    #[inline]
    #[must_use]
    pub fn is_removed(&self, entity: Entity) -> bool {
        self.removed
            .get(&entity.number())
            .is_some_and(|&max| entity.version() <= max)
    }

    /// Live entities, reserved ones excluded, sorted by number.
    #[must_use]
    pub fn live_entities(&self) -> Vec<Entity> {
        let mut out: Vec<Entity> = self
            .used
            .iter()
            .map(|(&number, &version)| Entity::new(number, version))
            .collect();
        out.sort_unstable();
        out
    }

    /// Makes removed own-range numbers available again with a bumped version.
    ///
    /// Numbers for which `is_referenced(number)` returns true are kept back
    /// (a transform still names them as parent). Numbers whose version space
    /// is exhausted are retired.
    ///
    /// Returns the ids that became allocatable.
    pub fn release_removed_entities(
        &mut self,
        mut is_referenced: impl FnMut(u32) -> bool,
    ) -> Vec<Entity> {
        let mut candidates: Vec<u32> = self.release_candidates.iter().copied().collect();
        candidates.sort_unstable();

        let mut released = Vec::new();
        for number in candidates {
            if self.used.contains_key(&number) {
                // The other side resurrected it with a newer version.
                self.release_candidates.remove(&number);
                continue;
            }
            if is_referenced(number) {
                continue;
            }
            self.release_candidates.remove(&number);
            let Some(&removed_version) = self.removed.get(&number) else {
                continue;
            };
            if removed_version >= MAX_VERSION {
                continue;
            }
            let entity = Entity::new(number, removed_version + 1);
            self.free.push_back(entity);
            released.push(entity);
        }
        released
    }

    fn mark_removed(&mut self, number: u32, version: u32) {
        let slot = self.removed.entry(number).or_insert(version);
        if *slot < version {
            *slot = version;
        }
        if number >= self.range_start && number < self.range_end {
            self.release_candidates.insert(number);
        }
    }
}
