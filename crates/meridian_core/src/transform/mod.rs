//! # Transform Hierarchy Resolver
//!
//! Pure functions composing local transforms into world matrices, plus an
//! optional cache for hosts that query every frame.

mod hierarchy;

pub use hierarchy::{world_matrix, world_transform, TransformResolver};
