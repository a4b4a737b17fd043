//! # STARFALL Networking
//!
//! Keeps an authoritative server registry and many client registries
//! consistent over two channels.
//!
//! ## Architecture
//!
//! - **Protocol**: fixed little-endian wire formats, one opcode byte first
//! - **Transport**: TCP for join/leave, one shared UDP socket for gameplay
//! - **Server**: fixed-tick simulation, one snapshot datagram per tick
//! - **Client**: applies newer snapshots, sends input every tick
//!
//! ## Threading Model
//!
//! ```text
//! CLIENT                                       SERVER
//!   |--- TCP  CONNECT_REQ ---------------------->|  session task
//!   |<-- TCP  CONNECT_ACK(player_id) ------------|
//!   |--- UDP  Input (every tick) --------------->|  SPSC -> simulation
//!   |<-- UDP  Snapshot (every tick) -------------|  simulation -> command
//!   |--- TCP  DISCONNECT_REQ ------------------->|
//! ```
//!
//! The registries are only ever touched by their simulation thread. Tokio
//! tasks hand data over through bounded queues that never block.
//!
//! ## Example
//!
//! ```rust,ignore
//! use starfall_networking::{GameServer, ServerConfig, ServerTransport};
//!
//! let config = ServerConfig::load("server.toml")?;
//! let (transport, channels) = runtime.block_on(ServerTransport::bind(&config))?;
//! let mut server = GameServer::new(&config, channels)?;
//! server.run(&stop)?; // Blocks, ticks at config.tick_rate
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod config;
pub mod error;
pub mod protocol;
pub mod server;
pub mod transport;

pub use client::{ApplyOutcome, ClientSynchronizer, GameClient};
pub use config::{ClientConfig, ServerConfig};
pub use error::{ConfigError, NetError, NetResult, ProtocolError, ProtocolResult};
pub use protocol::{InputFlags, Packet, PlayerInput, Snapshot};
pub use server::{ActorFactory, GameServer, ServerSynchronizer, TickLoop};
pub use transport::{ClientTransport, ServerTransport};

/// Largest datagram either side sends or accepts.
///
/// 1500-byte Ethernet MTU minus IPv4 and UDP headers.
pub const MAX_DATAGRAM_SIZE: usize = 1472;
