//! # ECS Error Types
//!
//! Contract violations surfaced by the [`Registry`](crate::Registry).

use crate::ecs::Entity;
use thiserror::Error;

/// Errors from registry operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EcsError {
    /// The component type was used before `register_component`.
    #[error("component type {0} is not registered")]
    ComponentNotRegistered(&'static str),

    /// `register_component` was called twice for the same type.
    #[error("component type {0} is already registered")]
    AlreadyRegistered(&'static str),

    /// The entity was killed (or never existed).
    #[error("entity {0} is not alive")]
    DeadEntity(Entity),

    /// A joined iteration named the same component type twice.
    #[error("component type {0} cannot be borrowed twice in one iteration")]
    AliasedComponent(&'static str),

    /// The entity does not carry the requested component.
    #[error("entity {entity} has no {component} component")]
    MissingComponent {
        /// Entity that was accessed.
        entity: Entity,
        /// Name of the missing component type.
        component: &'static str,
    },
}

/// Result type for registry operations.
pub type EcsResult<T> = Result<T, EcsError>;
