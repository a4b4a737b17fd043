//! # Entity Component System
//!
//! A sparse, type-erased column store with generational entity ids.
//!
//! ## Design Philosophy
//!
//! - Entities are bare ids; components are plain data in per-type columns
//! - Presence is explicit: a slot either holds a component or it does not
//! - Killed indices are recycled with a bumped generation
//! - Systems are free functions that borrow the registry

mod bundle;
mod component;
mod entity;
mod query;
mod registry;
mod storage;

pub use bundle::Bundle;
pub use component::Component;
pub use entity::Entity;
pub use query::{Fetch, Query};
pub use registry::{Registry, DEFAULT_ENTITY_CAPACITY};
pub use storage::{ErasedStorage, SparseArray};
