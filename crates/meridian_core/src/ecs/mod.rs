//! # Entity Component System
//!
//! Entities, component stores and the engine that owns them.
//!
//! ## Design Philosophy
//!
//! - Two consistency kinds behind one closed enum: LWW and grow-only
//! - Typed handles, checked on every access, instead of global registries
//! - Deterministic iteration (entity order) so batches are reproducible
//! - Every local write is stamped and queued for the next outgoing batch

mod component;
pub mod components;
mod engine;
mod entity;
mod grow_only;
mod lww;
mod store;
mod system;

pub use component::{component_id_from_name, ComponentDefinition, ComponentKind};
pub use components::{
    register_builtins, AudioEvent, AudioState, AvatarEmoteCommand, BuiltinComponent,
    GrowOnlyComponent, Name, PointerEventType, PointerEventsResult, Transform,
};
pub use engine::Engine;
pub use entity::{Entity, EntityContainer, EntityState};
pub use grow_only::{GrowOnlySet, TimestampFn};
pub use lww::{ChangeCallback, LwwSet};
pub use store::{
    ComponentStorage, ComponentStore, DirtyMessage, GrowOnlyStorage, LwwStorage, MutationClock,
};
pub use system::{SystemFn, SystemSet};
