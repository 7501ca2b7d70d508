//! # Transform Hierarchy
//!
//! `world(e) = world(parent(e)) * local(e)`, with `local = T * R * S`.
//!
//! The root entity, entities without a [`Transform`] and parents without one
//! contribute identity. Parent chains are walked iteratively; revisiting an
//! entity is reported as [`HierarchyError::Cycle`].

use std::collections::{HashMap, HashSet};

use meridian_shared::math::Mat4;

use crate::ecs::{ComponentStorage, Entity, LwwSet, Transform};
use crate::error::HierarchyError;

/// Walks from `entity` towards the root, stopping early at `stop`.
///
/// Returns the visited entities with their local matrices, `entity` first,
/// and the entity `stop` matched on (if any).
fn walk_chain(
    transforms: &LwwSet<Transform>,
    entity: Entity,
    mut stop: impl FnMut(Entity) -> bool,
) -> Result<(Vec<(Entity, Mat4)>, Option<Entity>), HierarchyError> {
    let mut chain = Vec::new();
    let mut visited = HashSet::new();
    let mut current = entity;
    loop {
        if current == Entity::ROOT {
            return Ok((chain, None));
        }
        if stop(current) {
            return Ok((chain, Some(current)));
        }
        let Some(transform) = transforms.get_or_null(current) else {
            return Ok((chain, None));
        };
        if !visited.insert(current) {
            return Err(HierarchyError::Cycle(current));
        }
        chain.push((current, transform.local_matrix()));
        match transform.parent_entity() {
            Some(parent) => current = parent,
            None => return Ok((chain, None)),
        }
    }
}

/// World matrix of `entity`.
///
/// # Errors
///
/// [`HierarchyError::Cycle`] if the parent chain loops.
pub fn world_matrix(transforms: &LwwSet<Transform>, entity: Entity) -> Result<Mat4, HierarchyError> {
    let (chain, _) = walk_chain(transforms, entity, |_| false)?;
    Ok(chain
        .iter()
        .rev()
        .fold(Mat4::IDENTITY, |world, (_, local)| world * *local))
}

/// World-space position, rotation and scale of `entity`, attached to the root.
///
/// # Errors
///
/// [`HierarchyError::Cycle`] if the parent chain loops.
pub fn world_transform(
    transforms: &LwwSet<Transform>,
    entity: Entity,
) -> Result<Transform, HierarchyError> {
    let (scale, rotation, position) = world_matrix(transforms, entity)?.to_scale_rotation_translation();
    Ok(Transform {
        position,
        rotation,
        scale,
        parent: meridian_shared::ROOT_ENTITY,
    })
}

/// Caches world matrices between transform changes.
///
/// The cache is dropped whenever the transform store changes (local writes,
/// remote applies and deletions all bump its version).
#[derive(Debug, Default)]
pub struct TransformResolver {
    cache: HashMap<Entity, Mat4>,
    store_version: Option<u64>,
}

impl TransformResolver {
    /// Creates an empty resolver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// World matrix of `entity`, reusing cached ancestors.
    ///
    /// # Errors
    ///
    /// [`HierarchyError::Cycle`] if the parent chain loops.
    pub fn world_matrix(
        &mut self,
        transforms: &LwwSet<Transform>,
        entity: Entity,
    ) -> Result<Mat4, HierarchyError> {
        let version = transforms.version();
        if self.store_version != Some(version) {
            self.cache.clear();
            self.store_version = Some(version);
        }
        if let Some(matrix) = self.cache.get(&entity) {
            return Ok(*matrix);
        }

        let cache = &self.cache;
        let (chain, cached_ancestor) = walk_chain(transforms, entity, |e| cache.contains_key(&e))?;
        let mut world = cached_ancestor
            .and_then(|ancestor| self.cache.get(&ancestor).copied())
            .unwrap_or(Mat4::IDENTITY);
        for (node, local) in chain.iter().rev() {
            world = world * *local;
            self.cache.insert(*node, world);
        }
        Ok(world)
    }

    /// Number of cached matrices.
    #[must_use]
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    /// Drops every cached matrix.
    pub fn invalidate(&mut self) {
        self.cache.clear();
        self.store_version = None;
    }
}
