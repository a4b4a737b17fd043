//! Component bundles: tuples of components attached in one call.

use super::component::Component;
use super::entity::Entity;
use super::registry::Registry;
use crate::error::EcsResult;

/// A group of components that can be attached to an entity together.
///
/// Implemented for tuples of one to eight component values.
pub trait Bundle {
    /// Attaches every component to `entity`.
    ///
    /// # Errors
    ///
    /// Stops at the first unregistered component type.
    fn insert_into(self, registry: &mut Registry, entity: Entity) -> EcsResult<()>;
}

macro_rules! impl_bundle {
    ($($name:ident),+) => {
        impl<$($name: Component),+> Bundle for ($($name,)+) {
            #[allow(non_snake_case)]
            fn insert_into(self, registry: &mut Registry, entity: Entity) -> EcsResult<()> {
                let ($($name,)+) = self;
                $(registry.add_component(entity, $name)?;)+
                Ok(())
            }
        }
    };
}

impl_bundle!(A);
impl_bundle!(A, B);
impl_bundle!(A, B, C);
impl_bundle!(A, B, C, D);
impl_bundle!(A, B, C, D, E);
impl_bundle!(A, B, C, D, E, F);
impl_bundle!(A, B, C, D, E, F, G);
impl_bundle!(A, B, C, D, E, F, G, H);
