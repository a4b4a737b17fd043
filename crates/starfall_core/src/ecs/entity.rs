//! # Entity Management
//!
//! Entities are lightweight identifiers consisting of:
//! - An index into component arrays
//! - A generation counter for safe reuse
//!
//! An index is recycled after its occupant is killed, but the generation is
//! bumped first. A stored `Entity` therefore never aliases the new occupant:
//! every registry lookup compares generations and treats a mismatch as dead.

use std::fmt;

/// Unique identifier for an entity.
///
/// The ID is split into two parts:
/// - Lower 32 bits: Index into component arrays
/// - Upper 32 bits: Generation counter for detecting stale references
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Entity(u64);

impl Entity {
    /// Creates a new entity ID from index and generation.
    #[inline]
    #[must_use]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self(((generation as u64) << 32) | (index as u64))
    }

    /// Returns the index portion of the entity ID.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0 as u32
    }

    /// Returns the generation portion of the entity ID.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Returns the raw packed value.
    #[inline]
    #[must_use]
    pub const fn to_bits(self) -> u64 {
        self.0
    }

    /// Null/invalid entity ID.
    pub const NULL: Self = Self(u64::MAX);

    /// Checks if this entity ID is null/invalid.
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == u64::MAX
    }
}

impl Default for Entity {
    fn default() -> Self {
        Self::NULL
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            f.write_str("Entity(null)")
        } else {
            write!(f, "Entity({}v{})", self.index(), self.generation())
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Allocator slot for one entity index.
#[derive(Clone, Copy, Debug)]
pub(crate) struct EntitySlot {
    /// Generation of the current (or last) occupant.
    pub generation: u32,
    /// Whether the slot is currently occupied.
    pub alive: bool,
}

/// Issues and recycles entity identifiers.
///
/// Indices are handed out in increasing order until a killed index is
/// available on the free list. Reuse always bumps the generation.
#[derive(Debug, Default)]
pub(crate) struct EntityAllocator {
    slots: Vec<EntitySlot>,
    free: Vec<u32>,
    alive: usize,
}

impl EntityAllocator {
    /// Creates an allocator with room for `capacity` entities before growing.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free: Vec::with_capacity(capacity),
            alive: 0,
        }
    }

    /// Allocates a fresh entity.
    ///
    /// # Panics
    ///
    /// Panics if more than `u32::MAX` indices would be needed.
    pub fn allocate(&mut self) -> Entity {
        self.alive += 1;

        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.generation = slot.generation.wrapping_add(1);
            slot.alive = true;
            return Entity::new(index, slot.generation);
        }

        let index = u32::try_from(self.slots.len()).expect("entity index space exhausted");
        self.slots.push(EntitySlot {
            generation: 0,
            alive: true,
        });
        Entity::new(index, 0)
    }

    /// Frees an entity. Returns `false` if it was already dead or stale.
    pub fn free(&mut self, entity: Entity) -> bool {
        if !self.is_alive(entity) {
            return false;
        }
        self.slots[entity.index() as usize].alive = false;
        self.free.push(entity.index());
        self.alive -= 1;
        true
    }

    /// Checks if an entity is alive (index occupied with matching generation).
    #[inline]
    pub fn is_alive(&self, entity: Entity) -> bool {
        if entity.is_null() {
            return false;
        }
        self.slots
            .get(entity.index() as usize)
            .is_some_and(|slot| slot.alive && slot.generation == entity.generation())
    }

    /// Returns the live occupant of an index, if any.
    #[inline]
    pub fn entity_at(&self, index: usize) -> Option<Entity> {
        let slot = self.slots.get(index)?;
        let index = u32::try_from(index).ok()?;
        slot.alive.then(|| Entity::new(index, slot.generation))
    }

    /// Number of indices ever issued.
    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Number of live entities.
    #[inline]
    pub fn alive_count(&self) -> usize {
        self.alive
    }

    /// Kills every entity, keeping generations so old ids stay stale.
    pub fn clear(&mut self) {
        self.free.clear();
        for (index, slot) in self.slots.iter_mut().enumerate().rev() {
            slot.alive = false;
            // Indices issued below u32::MAX by construction.
            self.free.push(index as u32);
        }
        self.alive = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_id_roundtrip() {
        let id = Entity::new(12345, 67890);
        assert_eq!(id.index(), 12345);
        assert_eq!(id.generation(), 67890);
    }

    #[test]
    fn test_null_entity() {
        assert!(Entity::NULL.is_null());
        assert!(Entity::default().is_null());
        assert!(!Entity::new(0, 0).is_null());
    }

    #[test]
    fn test_allocator_recycles_with_new_generation() {
        let mut alloc = EntityAllocator::with_capacity(4);
        let a = alloc.allocate();
        let b = alloc.allocate();
        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);

        assert!(alloc.free(a));
        assert!(!alloc.is_alive(a));
        assert!(!alloc.free(a), "double free must be rejected");

        let c = alloc.allocate();
        assert_eq!(c.index(), a.index());
        assert_ne!(c.generation(), a.generation());
        assert!(alloc.is_alive(c));
        assert!(!alloc.is_alive(a));
        assert_eq!(alloc.alive_count(), 2);
    }

    #[test]
    fn test_clear_keeps_old_ids_stale() {
        let mut alloc = EntityAllocator::with_capacity(4);
        let a = alloc.allocate();
        let _ = alloc.allocate();
        alloc.clear();
        assert_eq!(alloc.alive_count(), 0);

        let fresh = alloc.allocate();
        assert_eq!(fresh.index(), 0);
        assert_ne!(fresh, a);
        assert!(!alloc.is_alive(a));
    }
}
