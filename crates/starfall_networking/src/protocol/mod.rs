//! # Network Protocol
//!
//! Opcode-prefixed binary messages, little-endian, fixed-length fields.
//!
//! ## Message Table
//!
//! ```text
//! ┌────────────────┬────────┬──────────────────────────────────────────┐
//! │ Message        │ Opcode │ Payload                                  │
//! ├────────────────┼────────┼──────────────────────────────────────────┤
//! │ CONNECT_REQ    │ 0x01   │ 32 B username, zero-padded               │
//! │ CONNECT_ACK    │ 0x02   │ 1 B player id                            │
//! │ DISCONNECT_REQ │ 0x03   │ -                                        │
//! │ Input          │ 0x10   │ 1 B player id, 1 B input bitmask         │
//! │ Snapshot       │ 0x20   │ 4 B tick, 2 B count, count × 22 B record │
//! └────────────────┴────────┴──────────────────────────────────────────┘
//! ```
//!
//! Control messages travel over TCP, gameplay messages over UDP. A UDP
//! payload never exceeds [`MAX_DATAGRAM_SIZE`](crate::MAX_DATAGRAM_SIZE).

mod packets;
mod serialization;

pub use packets::{
    ConnectAck, ConnectRequest, ControlMessage, EntityRecord, InputFlags, Opcode, Packet,
    PlayerInput, Snapshot,
};
pub use serialization::{decode, decode_input, decode_snapshot, PacketReader, PacketWriter};
