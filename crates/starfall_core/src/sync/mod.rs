//! # Cross-Thread Queues
//!
//! The network I/O threads and the simulation thread never share the
//! registry. Decoded packets cross over through bounded SPSC ring buffers:
//!
//! ```text
//! I/O thread (tokio):   decode ──push──► [ring buffer] ──pop──► simulation
//!                                 full? drop newest       empty? None
//! ```
//!
//! Neither side ever blocks.

mod spsc;

pub use spsc::{spsc_queue, Consumer, Producer};
