//! # Registry
//!
//! The registry composes the entity allocator with one sparse column per
//! registered component type.
//!
//! ## Design
//!
//! - Columns are type-erased behind [`ErasedStorage`] and keyed by `TypeId`
//! - `kill_entity` clears the entity's slot in every column before the index
//!   returns to the free list
//! - Every accessor checks the entity generation, so a stale handle can never
//!   read the components of a recycled index
//! - The registry is owned by the simulation thread; `&mut self` on every
//!   mutating call rules out mutation during an iteration
//!
//! ```text
//!   Entity(idx, gen) ──► allocator.slots[idx].generation == gen ?
//!                                  │
//!            ┌─────────────────────┼─────────────────────┐
//!            ▼                     ▼                     ▼
//!   SparseArray<Transform>  SparseArray<Velocity>  SparseArray<HitBox>
//!        [idx] = Some(..)       [idx] = None          [idx] = Some(..)
//! ```

use super::bundle::Bundle;
use super::component::Component;
use super::entity::{Entity, EntityAllocator};
use super::query::{Fetch, Query};
use super::storage::{ErasedStorage, SparseArray};
use crate::error::{EcsError, EcsResult};
use std::any::{type_name, TypeId};
use std::collections::HashMap;

/// Default number of entity slots reserved up front.
pub const DEFAULT_ENTITY_CAPACITY: usize = 1024;

/// Entity allocator plus type-erased component columns.
///
/// # Example
///
/// ```rust,ignore
/// let mut registry = Registry::new();
/// registry.register_component::<Transform>()?;
/// let e = registry.spawn_entity();
/// registry.add_component(e, Transform::at(1.0, 2.0))?;
/// ```
pub struct Registry {
    /// Entity id issuer.
    allocator: EntityAllocator,
    /// One column per registered component type.
    storages: HashMap<TypeId, Box<dyn ErasedStorage>>,
    /// Initial capacity for newly registered columns.
    capacity: usize,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&'static str> = self.storages.values().map(|s| s.type_name()).collect();
        names.sort_unstable();
        f.debug_struct("Registry")
            .field("alive", &self.allocator.alive_count())
            .field("components", &names)
            .finish()
    }
}

impl Registry {
    /// Creates an empty registry with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_ENTITY_CAPACITY)
    }

    /// Creates an empty registry with room for `capacity` entities per column.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            allocator: EntityAllocator::with_capacity(capacity),
            storages: HashMap::new(),
            capacity,
        }
    }

    // =========================================================================
    // COMPONENT TYPES
    // =========================================================================

    /// Declares a component type.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::AlreadyRegistered`] if `C` was registered before.
    pub fn register_component<C: Component>(&mut self) -> EcsResult<()> {
        let key = TypeId::of::<C>();
        if self.storages.contains_key(&key) {
            return Err(EcsError::AlreadyRegistered(type_name::<C>()));
        }
        self.storages
            .insert(key, Box::new(SparseArray::<C>::with_capacity(self.capacity)));
        tracing::debug!(component = type_name::<C>(), "registered component");
        Ok(())
    }

    /// Checks whether `C` has been registered.
    #[inline]
    #[must_use]
    pub fn is_registered<C: Component>(&self) -> bool {
        self.storages.contains_key(&TypeId::of::<C>())
    }

    /// Returns the column for `C`.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::ComponentNotRegistered`] if `C` is unknown.
    pub fn components<C: Component>(&self) -> EcsResult<&SparseArray<C>> {
        self.storages
            .get(&TypeId::of::<C>())
            .and_then(|s| s.as_any().downcast_ref::<SparseArray<C>>())
            .ok_or(EcsError::ComponentNotRegistered(type_name::<C>()))
    }

    /// Returns the mutable column for `C`.
    ///
    /// Slots of the returned column are indexed by entity index; writing to a
    /// slot whose index is not alive is the caller's responsibility.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::ComponentNotRegistered`] if `C` is unknown.
    pub fn components_mut<C: Component>(&mut self) -> EcsResult<&mut SparseArray<C>> {
        self.storages
            .get_mut(&TypeId::of::<C>())
            .and_then(|s| s.as_any_mut().downcast_mut::<SparseArray<C>>())
            .ok_or(EcsError::ComponentNotRegistered(type_name::<C>()))
    }

    // =========================================================================
    // ENTITY LIFECYCLE
    // =========================================================================

    /// Spawns a fresh entity.
    ///
    /// Killed indices are recycled with a bumped generation, so handles to
    /// the previous occupant stay invalid.
    pub fn spawn_entity(&mut self) -> Entity {
        self.allocator.allocate()
    }

    /// Spawns an entity and attaches every component of `bundle`.
    ///
    /// # Errors
    ///
    /// If any component type is unregistered the half-built entity is
    /// killed and the error returned.
    pub fn spawn_with<B: Bundle>(&mut self, bundle: B) -> EcsResult<Entity> {
        let entity = self.spawn_entity();
        if let Err(err) = bundle.insert_into(self, entity) {
            self.kill_entity(entity);
            return Err(err);
        }
        Ok(entity)
    }

    /// Kills an entity, clearing it from every column.
    ///
    /// Returns `false` if the entity was already dead.
    pub fn kill_entity(&mut self, entity: Entity) -> bool {
        if !self.allocator.is_alive(entity) {
            return false;
        }
        let index = entity.index() as usize;
        for storage in self.storages.values_mut() {
            storage.remove_index(index);
        }
        self.allocator.free(entity)
    }

    /// Kills every entity. Registered component types stay registered.
    pub fn clear(&mut self) {
        for storage in self.storages.values_mut() {
            storage.clear_all();
        }
        self.allocator.clear();
        tracing::debug!("registry cleared");
    }

    /// Checks if an entity handle refers to a live entity.
    #[inline]
    #[must_use]
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.allocator.is_alive(entity)
    }

    /// Number of live entities.
    #[inline]
    #[must_use]
    pub fn alive_count(&self) -> usize {
        self.allocator.alive_count()
    }

    /// Returns the live occupant of an entity index.
    #[inline]
    #[must_use]
    pub fn entity_at(&self, index: usize) -> Option<Entity> {
        self.allocator.entity_at(index)
    }

    /// Number of entity indices ever issued (upper bound for index scans).
    #[inline]
    #[must_use]
    pub fn index_bound(&self) -> usize {
        self.allocator.len()
    }

    // =========================================================================
    // COMPONENT ACCESS
    // =========================================================================

    /// Stores `value` on `entity`, overwriting any previous value.
    ///
    /// # Errors
    ///
    /// Fails if the entity is dead or `C` is unregistered.
    pub fn add_component<C: Component>(&mut self, entity: Entity, value: C) -> EcsResult<()> {
        self.check_alive(entity)?;
        self.components_mut::<C>()?
            .insert(entity.index() as usize, value);
        Ok(())
    }

    /// Removes `C` from `entity`. Removing an absent component is a no-op.
    ///
    /// # Errors
    ///
    /// Fails if the entity is dead or `C` is unregistered.
    pub fn remove_component<C: Component>(&mut self, entity: Entity) -> EcsResult<Option<C>> {
        self.check_alive(entity)?;
        Ok(self.components_mut::<C>()?.remove(entity.index() as usize))
    }

    /// Checks whether a live `entity` carries `C`.
    #[must_use]
    pub fn has_component<C: Component>(&self, entity: Entity) -> bool {
        self.try_get::<C>(entity).is_some()
    }

    /// Reads `C` from `entity`.
    ///
    /// # Errors
    ///
    /// [`EcsError::MissingComponent`] if absent, [`EcsError::DeadEntity`] for
    /// stale handles, [`EcsError::ComponentNotRegistered`] for unknown types.
    pub fn get_component<C: Component>(&self, entity: Entity) -> EcsResult<&C> {
        self.check_alive(entity)?;
        self.components::<C>()?
            .get(entity.index() as usize)
            .ok_or(EcsError::MissingComponent {
                entity,
                component: type_name::<C>(),
            })
    }

    /// Mutably reads `C` from `entity`.
    ///
    /// # Errors
    ///
    /// Same as [`Registry::get_component`].
    pub fn get_component_mut<C: Component>(&mut self, entity: Entity) -> EcsResult<&mut C> {
        self.check_alive(entity)?;
        self.components_mut::<C>()?
            .get_mut(entity.index() as usize)
            .ok_or(EcsError::MissingComponent {
                entity,
                component: type_name::<C>(),
            })
    }

    /// Reads `C` from `entity`, or `None` when absent, dead or unregistered.
    #[must_use]
    pub fn try_get<C: Component>(&self, entity: Entity) -> Option<&C> {
        if !self.is_alive(entity) {
            return None;
        }
        self.components::<C>().ok()?.get(entity.index() as usize)
    }

    /// Mutable counterpart of [`Registry::try_get`].
    #[must_use]
    pub fn try_get_mut<C: Component>(&mut self, entity: Entity) -> Option<&mut C> {
        if !self.is_alive(entity) {
            return None;
        }
        self.components_mut::<C>().ok()?.get_mut(entity.index() as usize)
    }

    /// Reads `C` from `entity`, treating absence as a bug.
    ///
    /// # Panics
    ///
    /// Panics with the [`EcsError`] message if the access is invalid.
    #[must_use]
    pub fn component<C: Component>(&self, entity: Entity) -> &C {
        match self.get_component::<C>(entity) {
            Ok(value) => value,
            Err(err) => panic!("{err}"),
        }
    }

    // =========================================================================
    // ITERATION
    // =========================================================================

    /// Builds a lazy query over every live entity holding all of `Q`'s types.
    ///
    /// `Q` is a tuple of component types, e.g. `(Transform, Velocity)`.
    /// Iteration runs in index order and can be restarted with
    /// [`Query::rewind`].
    ///
    /// # Errors
    ///
    /// Fails if any type in `Q` is unregistered.
    pub fn query<'r, Q: Fetch<'r>>(&'r self) -> EcsResult<Query<'r, Q>> {
        Ok(Query::new(self, Q::columns(self)?))
    }

    /// Visits every live entity holding both `A` and `B`, with `A` mutable.
    ///
    /// # Errors
    ///
    /// Fails if either type is unregistered, or if `A` and `B` are the same
    /// type.
    pub fn each_mut<A, B, F>(&mut self, mut f: F) -> EcsResult<()>
    where
        A: Component,
        B: Component,
        F: FnMut(Entity, &mut A, &B),
    {
        let key_a = TypeId::of::<A>();
        if key_a == TypeId::of::<B>() {
            return Err(EcsError::AliasedComponent(type_name::<A>()));
        }
        // Detach column A so column B can be borrowed alongside it.
        let mut column_a = self
            .storages
            .remove(&key_a)
            .ok_or(EcsError::ComponentNotRegistered(type_name::<A>()))?;

        let result = match (
            column_a.as_any_mut().downcast_mut::<SparseArray<A>>(),
            self.components::<B>(),
        ) {
            (Some(a), Ok(b)) => {
                join(&self.allocator, a, b, &mut f);
                Ok(())
            }
            (None, _) => Err(EcsError::ComponentNotRegistered(type_name::<A>())),
            (_, Err(err)) => Err(err),
        };

        self.storages.insert(key_a, column_a);
        result
    }

    #[inline]
    fn check_alive(&self, entity: Entity) -> EcsResult<()> {
        if self.allocator.is_alive(entity) {
            Ok(())
        } else {
            Err(EcsError::DeadEntity(entity))
        }
    }
}

fn join<A, B, F>(allocator: &EntityAllocator, a: &mut SparseArray<A>, b: &SparseArray<B>, f: &mut F)
where
    F: FnMut(Entity, &mut A, &B),
{
    for (index, value_a) in a.iter_mut() {
        let Some(entity) = allocator.entity_at(index) else {
            continue;
        };
        if let Some(value_b) = b.get(index) {
            f(entity, value_a, value_b);
        }
    }
}
