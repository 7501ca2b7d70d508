//! # Meridian Shared
//!
//! Common types used by both the host engine and the scene runtime.
//!
//! ## CRITICAL RULE
//!
//! Everything in here is part of the host/scene contract:
//! - `constants`: reserved entities, static component ids, system module names
//! - `math`: vector, quaternion and matrix types used by the transform component
//!
//! If a value in this crate changes, host and scene must be rebuilt together.

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod constants;
pub mod math;

pub use constants::{
    CAMERA_ENTITY, PLAYER_ENTITY, ROOT_ENTITY, RESERVED_STATIC_ENTITIES, MAX_ENTITY_NUMBER,
    TRANSFORM_COMPONENT_ID, DEFAULT_GROW_ONLY_MAX_ELEMENTS, SYSTEM_MODULES, TICK_RATE,
    ENTITY_MESSAGE_HEADER_LENGTH, COMPONENT_MESSAGE_HEADER_LENGTH, MAX_MESSAGE_LENGTH,
};
pub use math::{Mat4, Quaternion, Vec3, EPSILON};
