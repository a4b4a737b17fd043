//! # Queries
//!
//! Lazy, restartable iteration over entities holding a set of components.
//!
//! A query resolves its columns once, then walks entity indices in order and
//! yields `(Entity, (&A, &B, ..))` for every live index present in all
//! columns. Nothing is collected up front.

use super::component::Component;
use super::entity::Entity;
use super::registry::Registry;
use super::storage::SparseArray;
use crate::error::EcsResult;

/// A tuple of component types that can be fetched together.
///
/// Implemented for tuples of one to four component types.
pub trait Fetch<'r> {
    /// Resolved column references.
    type Columns: Copy;
    /// Item yielded per matching entity.
    type Item;

    /// Resolves every column.
    ///
    /// # Errors
    ///
    /// Fails if any component type is unregistered.
    fn columns(registry: &'r Registry) -> EcsResult<Self::Columns>;

    /// Fetches the components at `index`, or `None` if any is absent.
    fn fetch(columns: Self::Columns, index: usize) -> Option<Self::Item>;
}

macro_rules! impl_fetch {
    ($($name:ident),+) => {
        impl<'r, $($name: Component),+> Fetch<'r> for ($($name,)+) {
            type Columns = ($(&'r SparseArray<$name>,)+);
            type Item = ($(&'r $name,)+);

            fn columns(registry: &'r Registry) -> EcsResult<Self::Columns> {
                Ok(($(registry.components::<$name>()?,)+))
            }

            #[allow(non_snake_case)]
            #[inline]
            fn fetch(columns: Self::Columns, index: usize) -> Option<Self::Item> {
                let ($($name,)+) = columns;
                Some(($($name.get(index)?,)+))
            }
        }
    };
}

impl_fetch!(A);
impl_fetch!(A, B);
impl_fetch!(A, B, C);
impl_fetch!(A, B, C, D);

/// Iterator over entities matching `Q`.
///
/// Borrowing the registry immutably for `'r` keeps every matched entity
/// alive for the whole iteration.
pub struct Query<'r, Q: Fetch<'r>> {
    registry: &'r Registry,
    columns: Q::Columns,
    cursor: usize,
}

impl<'r, Q: Fetch<'r>> Query<'r, Q> {
    pub(crate) fn new(registry: &'r Registry, columns: Q::Columns) -> Self {
        Self {
            registry,
            columns,
            cursor: 0,
        }
    }

    /// Restarts iteration from the first entity index.
    pub fn rewind(&mut self) {
        self.cursor = 0;
    }
}

impl<'r, Q: Fetch<'r>> Clone for Query<'r, Q> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry,
            columns: self.columns,
            cursor: self.cursor,
        }
    }
}

impl<'r, Q: Fetch<'r>> Iterator for Query<'r, Q> {
    type Item = (Entity, Q::Item);

    fn next(&mut self) -> Option<Self::Item> {
        let bound = self.registry.index_bound();
        while self.cursor < bound {
            let index = self.cursor;
            self.cursor += 1;
            let Some(entity) = self.registry.entity_at(index) else {
                continue;
            };
            if let Some(item) = Q::fetch(self.columns, index) {
                return Some((entity, item));
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.registry.index_bound().saturating_sub(self.cursor)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Pos(i32);
    #[derive(Debug, PartialEq)]
    struct Vel(i32);

    #[test]
    fn test_query_matches_all_required() {
        let mut r = Registry::with_capacity(8);
        r.register_component::<Pos>().unwrap();
        r.register_component::<Vel>().unwrap();

        let a = r.spawn_with((Pos(1), Vel(10))).unwrap();
        let _b = r.spawn_with((Pos(2),)).unwrap();
        let c = r.spawn_with((Pos(3), Vel(30))).unwrap();

        let hits: Vec<(Entity, i32, i32)> = r
            .query::<(Pos, Vel)>()
            .unwrap()
            .map(|(e, (p, v))| (e, p.0, v.0))
            .collect();
        assert_eq!(hits, vec![(a, 1, 10), (c, 3, 30)]);
    }

    #[test]
    fn test_query_rewind() {
        let mut r = Registry::with_capacity(8);
        r.register_component::<Pos>().unwrap();
        for i in 0..3 {
            r.spawn_with((Pos(i),)).unwrap();
        }
        let mut q = r.query::<(Pos,)>().unwrap();
        assert_eq!(q.by_ref().count(), 3);
        assert_eq!(q.next(), None);
        q.rewind();
        assert_eq!(q.count(), 3);
    }

    #[test]
    fn test_query_skips_killed() {
        let mut r = Registry::with_capacity(8);
        r.register_component::<Pos>().unwrap();
        let a = r.spawn_with((Pos(1),)).unwrap();
        let b = r.spawn_with((Pos(2),)).unwrap();
        r.kill_entity(a);
        let found: Vec<Entity> = r.query::<(Pos,)>().unwrap().map(|(e, _)| e).collect();
        assert_eq!(found, vec![b]);
    }

    #[test]
    fn test_query_unregistered_fails() {
        let mut r = Registry::with_capacity(8);
        r.register_component::<Pos>().unwrap();
        assert!(r.query::<(Pos, Vel)>().is_err());
    }
}
