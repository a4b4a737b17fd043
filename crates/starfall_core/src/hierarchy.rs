//! Parent/child links between transforms.
//!
//! Links are plain entity ids stored on both sides. The registry does not
//! maintain them on its own: killing a parent leaves its children pointing at
//! a dead id, which [`dangling_parent`] detects through the generation check.

use crate::components::Transform;
use crate::ecs::{Entity, Registry};
use crate::error::EcsResult;

/// Makes `child` a child of `parent`, detaching it from any previous parent.
///
/// # Errors
///
/// Fails if either entity is dead or lacks a [`Transform`].
pub fn link(registry: &mut Registry, parent: Entity, child: Entity) -> EcsResult<()> {
    // Validate both sides before touching anything.
    registry.get_component::<Transform>(parent)?;
    let previous = registry.get_component::<Transform>(child)?.parent;

    if let Some(old) = previous {
        if let Some(old_transform) = registry.try_get_mut::<Transform>(old) {
            old_transform.children.retain(|&c| c != child);
        }
    }

    registry.get_component_mut::<Transform>(child)?.parent = Some(parent);
    let children = &mut registry.get_component_mut::<Transform>(parent)?.children;
    if !children.contains(&child) {
        children.push(child);
    }
    Ok(())
}

/// Removes `child` from its parent, if it has one.
///
/// # Errors
///
/// Fails if `child` is dead or lacks a [`Transform`].
pub fn unlink(registry: &mut Registry, child: Entity) -> EcsResult<()> {
    let Some(parent) = registry.get_component_mut::<Transform>(child)?.parent.take() else {
        return Ok(());
    };
    if let Some(parent_transform) = registry.try_get_mut::<Transform>(parent) {
        parent_transform.children.retain(|&c| c != child);
    }
    Ok(())
}

/// Returns the parent id of `entity` if that parent is no longer alive.
#[must_use]
pub fn dangling_parent(registry: &Registry, entity: Entity) -> Option<Entity> {
    registry
        .try_get::<Transform>(entity)?
        .parent
        .filter(|&parent| !registry.is_alive(parent))
}
