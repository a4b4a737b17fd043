//! # Component System
//!
//! Components are plain data containers with no behavior. Systems are free
//! functions over the [`Registry`](super::Registry).

/// Marker trait for ECS components.
///
/// Any `'static + Send + Sync` type qualifies, which keeps the registry
/// movable across the simulation thread boundary.
///
/// # Example
///
/// ```rust,ignore
/// #[derive(Clone, Copy, Debug, Default, PartialEq)]
/// struct Score(u32);
///
/// registry.register_component::<Score>()?;
/// ```
pub trait Component: Send + Sync + 'static {}

impl<T: Send + Sync + 'static> Component for T {}
