//! # Component Storage
//!
//! Sparse per-type component columns.
//!
//! - One slot per entity index, `None` meaning "component absent"
//! - Access is O(1) via entity index
//! - Slots are reused across entity generations; the registry clears a slot
//!   before its index is recycled

use super::component::Component;
use std::any::Any;

/// Sparse storage for a single component type.
///
/// # Example
///
/// ```rust,ignore
/// let mut storage: SparseArray<Velocity> = SparseArray::with_capacity(1024);
/// storage.insert(0, Velocity::default());
/// assert!(storage.contains(0));
/// ```
#[derive(Debug)]
pub struct SparseArray<C> {
    /// One optional slot per entity index.
    slots: Vec<Option<C>>,
    /// Number of occupied slots.
    len: usize,
}

impl<C> Default for SparseArray<C> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            len: 0,
        }
    }
}

impl<C> SparseArray<C> {
    /// Creates storage with room for `capacity` indices before reallocating.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self { slots, len: 0 }
    }

    /// Number of slots currently backing the storage.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of present components.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns true if no component is present.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Stores a component at `index`, growing the column if needed.
    ///
    /// Returns the previous value if one was present.
    pub fn insert(&mut self, index: usize, value: C) -> Option<C> {
        if index >= self.slots.len() {
            self.slots.resize_with(index + 1, || None);
        }
        let previous = self.slots[index].replace(value);
        if previous.is_none() {
            self.len += 1;
        }
        previous
    }

    /// Clears presence at `index`, returning the removed value.
    pub fn remove(&mut self, index: usize) -> Option<C> {
        let removed = self.slots.get_mut(index)?.take();
        if removed.is_some() {
            self.len -= 1;
        }
        removed
    }

    /// Checks presence at `index`.
    #[inline]
    #[must_use]
    pub fn contains(&self, index: usize) -> bool {
        matches!(self.slots.get(index), Some(Some(_)))
    }

    /// Gets a component by index.
    #[inline]
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&C> {
        self.slots.get(index)?.as_ref()
    }

    /// Gets a mutable component by index.
    #[inline]
    #[must_use]
    pub fn get_mut(&mut self, index: usize) -> Option<&mut C> {
        self.slots.get_mut(index)?.as_mut()
    }

    /// Iterates `(index, &component)` over present slots, in index order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &C)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|c| (i, c)))
    }

    /// Iterates `(index, &mut component)` over present slots, in index order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (usize, &mut C)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_mut().map(|c| (i, c)))
    }

    /// Clears every slot, keeping the allocation.
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
        self.len = 0;
    }
}

/// Type-erased view of a component column.
///
/// The registry holds one boxed column per registered type and uses this
/// trait to clear an entity's slot in every column without knowing `C`.
pub trait ErasedStorage: Send + Sync {
    /// Clears presence at `index`. Returns true if a component was removed.
    fn remove_index(&mut self, index: usize) -> bool;

    /// Checks presence at `index`.
    fn contains_index(&self, index: usize) -> bool;

    /// Clears every slot.
    fn clear_all(&mut self);

    /// Name of the stored component type, for diagnostics.
    fn type_name(&self) -> &'static str;

    /// Downcast support.
    fn as_any(&self) -> &dyn Any;

    /// Mutable downcast support.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<C: Component> ErasedStorage for SparseArray<C> {
    fn remove_index(&mut self, index: usize) -> bool {
        self.remove(index).is_some()
    }

    fn contains_index(&self, index: usize) -> bool {
        self.contains(index)
    }

    fn clear_all(&mut self) {
        self.clear();
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<C>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Copy, Debug, PartialEq)]
    struct Mass(f32);

    #[test]
    fn test_insert_overwrites() {
        let mut storage = SparseArray::with_capacity(4);
        assert_eq!(storage.insert(2, Mass(1.0)), None);
        assert_eq!(storage.insert(2, Mass(2.0)), Some(Mass(1.0)));
        assert_eq!(storage.len(), 1);
        assert_eq!(storage.get(2), Some(&Mass(2.0)));
    }

    #[test]
    fn test_grows_past_capacity() {
        let mut storage = SparseArray::with_capacity(1);
        storage.insert(10, Mass(3.0));
        assert!(storage.capacity() >= 11);
        assert!(storage.contains(10));
        assert!(!storage.contains(9));
    }

    #[test]
    fn test_remove_is_noop_when_absent() {
        let mut storage: SparseArray<Mass> = SparseArray::default();
        assert_eq!(storage.remove(0), None);
        assert_eq!(storage.remove(100), None);
        assert!(storage.is_empty());
    }

    #[test]
    fn test_iter_skips_holes() {
        let mut storage = SparseArray::with_capacity(8);
        storage.insert(1, Mass(1.0));
        storage.insert(5, Mass(5.0));
        let indices: Vec<usize> = storage.iter().map(|(i, _)| i).collect();
        assert_eq!(indices, vec![1, 5]);
    }

    #[test]
    fn test_erased_remove() {
        let mut storage = SparseArray::with_capacity(2);
        storage.insert(0, Mass(1.0));
        let erased: &mut dyn ErasedStorage = &mut storage;
        assert!(erased.contains_index(0));
        assert!(erased.remove_index(0));
        assert!(!erased.remove_index(0));
        assert!(erased.type_name().ends_with("Mass"));
    }
}
