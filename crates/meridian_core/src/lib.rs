//! # Meridian Core Engine
//!
//! Component store and replication core for sandboxed scenes:
//! - Entity/component engine with last-write-wins and grow-only components
//! - Compact binary CRDT messages over a growable byte buffer
//! - Order-independent reconciliation of incoming batches
//! - Transform hierarchy resolution
//!
//! ## Architecture Rules
//!
//! 1. **Explicit contexts** - every host and scene owns its own [`Engine`]
//! 2. **Bytes across the boundary** - engines only exchange encoded batches
//! 3. **Corruption is not fatal** - a bad message is skipped, the batch goes on
//!
//! ## Example
//!
//! ```rust,ignore
//! use meridian_core::{Engine, EngineConfig, Transform, BuiltinComponent};
//!
//! let mut host = Engine::with_builtins(EngineConfig::host())?;
//! let mut scene = Engine::with_builtins(EngineConfig::scene())?;
//!
//! let cube = scene.add_entity()?;
//! scene.lww_mut(&Transform::definition())?.create(cube, Transform::default())?;
//! let report = host.apply_batch(&scene.take_outgoing());
//! assert_eq!(report.applied, 1);
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod codec;
pub mod config;
pub mod crdt;
pub mod ecs;
pub mod error;
pub mod schema;
pub mod transform;

pub use codec::{ByteBuffer, CrdtMessage, CrdtMessageType, MessageReader};
pub use config::EngineConfig;
pub use crdt::{ApplyOutcome, ApplyReport};
pub use ecs::{
    AudioEvent, AvatarEmoteCommand, BuiltinComponent, ComponentDefinition, ComponentKind,
    ComponentStore, Engine, Entity, EntityState, GrowOnlySet, LwwSet, Name, PointerEventType,
    PointerEventsResult, Transform,
};
pub use error::{
    CodecError, CodecResult, ConfigError, EngineError, EngineResult, HierarchyError,
};
pub use schema::Schema;
pub use transform::{world_matrix, world_transform, TransformResolver};
