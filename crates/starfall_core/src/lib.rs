//! # STARFALL Core
//!
//! Simulation-side building blocks shared by the server and the client:
//! - An ECS registry with sparse per-type component columns
//! - Gameplay components and AABB collision
//! - Lock-free SPSC queues for handing packets to the simulation thread
//!
//! ## Architecture Rules
//!
//! 1. **The registry belongs to one thread** - the network layer never touches it
//! 2. **Entity graphs use ids** - never references
//! 3. **Stale ids are detectable** - every access checks the generation
//!
//! ## Example
//!
//! ```rust,ignore
//! use starfall_core::{components::Transform, Registry};
//!
//! let mut registry = Registry::new();
//! registry.register_component::<Transform>()?;
//! let ship = registry.spawn_with((Transform::at(100.0, 200.0),))?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]
#![allow(clippy::module_name_repetitions)]

pub mod collision;
pub mod components;
pub mod ecs;
pub mod error;
pub mod hierarchy;
pub mod math;
pub mod sync;

pub use collision::{is_colliding, Aabb};
pub use ecs::{Bundle, Component, Entity, Query, Registry, SparseArray};
pub use error::{EcsError, EcsResult};
pub use math::Vec2;
pub use sync::{spsc_queue, Consumer, Producer};
