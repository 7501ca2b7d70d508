//! # Component Definitions
//!
//! A component definition binds a stable numeric id to a value type and a
//! consistency kind. The engine stores the values; callers keep a typed
//! [`ComponentDefinition`] handle to reach them.

use std::fmt;
use std::marker::PhantomData;

use meridian_shared::constants::MAX_STATIC_COMPONENT;

/// Consistency kind of a component.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    /// At most one value per entity, newest timestamp wins.
    LastWriteWins,
    /// Bounded, ordered, append-only values per entity.
    GrowOnly,
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LastWriteWins => f.write_str("last-write-wins"),
            Self::GrowOnly => f.write_str("grow-only"),
        }
    }
}

/// Typed handle to a registered component.
///
/// The handle carries no data; the engine checks on every access that the
/// stored type matches `T`.
pub struct ComponentDefinition<T> {
    id: u32,
    kind: ComponentKind,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ComponentDefinition<T> {
    /// Creates a handle. Only the engine and built-in components mint handles.
    #[inline]
    #[must_use]
    pub(crate) const fn new(id: u32, kind: ComponentKind) -> Self {
        Self {
            id,
            kind,
            _marker: PhantomData,
        }
    }

    /// Component id.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> u32 {
        self.id
    }

    /// Consistency kind.
    #[inline]
    #[must_use]
    pub const fn kind(&self) -> ComponentKind {
        self.kind
    }
}

impl<T> Clone for ComponentDefinition<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ComponentDefinition<T> {}

impl<T> PartialEq for ComponentDefinition<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.kind == other.kind
    }
}

impl<T> Eq for ComponentDefinition<T> {}

impl<T> fmt::Debug for ComponentDefinition<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentDefinition")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("type", &std::any::type_name::<T>())
            .finish()
    }
}

/// Derives a component id from its name: `crc32(name) + 2048`, wrapping.
///
/// Static ids live below 2048, so derived ids only collide with them after
/// wrapping around `u32::MAX`.
#[must_use]
pub fn component_id_from_name(name: &str) -> u32 {
    crc32fast::hash(name.as_bytes()).wrapping_add(MAX_STATIC_COMPONENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_from_name_is_stable() {
        let a = component_id_from_name("core-schema::Name");
        let b = component_id_from_name("core-schema::Name");
        assert_eq!(a, b);
        assert_ne!(a, component_id_from_name("core-schema::Other"));
        assert_eq!(
            component_id_from_name(""),
            crc32fast::hash(b"").wrapping_add(2048)
        );
    }

    #[test]
    fn test_definition_is_copy() {
        let def: ComponentDefinition<u32> = ComponentDefinition::new(7, ComponentKind::GrowOnly);
        let copy = def;
        assert_eq!(def, copy);
        assert_eq!(copy.id(), 7);
        assert_eq!(copy.kind(), ComponentKind::GrowOnly);
    }
}
