//! # Packet Definitions
//!
//! Every message used on the control (TCP) and gameplay (UDP) channels.
//!
//! ## Fixed-Size Design
//!
//! All packet types are `Copy` and fixed-size so that:
//! - Snapshots can sit in pre-allocated queue slots
//! - Decoding never allocates
//! - The encoded size of any packet is known up front

use starfall_core::components::{EntityKind, InputState};

/// First byte of every message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    /// Client -> Server (TCP): join request with username.
    ConnectRequest = 0x01,
    /// Server -> Client (TCP): join accepted, carries the player id.
    ConnectAck = 0x02,
    /// Client -> Server (TCP): leaving.
    DisconnectRequest = 0x03,
    /// Client -> Server (UDP): input for one tick.
    Input = 0x10,
    /// Server -> Client (UDP): world state for one tick.
    Snapshot = 0x20,
}

impl Opcode {
    /// Parses an opcode byte.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::ConnectRequest),
            0x02 => Some(Self::ConnectAck),
            0x03 => Some(Self::DisconnectRequest),
            0x10 => Some(Self::Input),
            0x20 => Some(Self::Snapshot),
            _ => None,
        }
    }

    /// Payload length of a control message, or `None` for gameplay opcodes.
    ///
    /// TCP frames are the opcode followed by exactly this many bytes.
    #[must_use]
    pub const fn control_payload_len(self) -> Option<usize> {
        match self {
            Self::ConnectRequest => Some(ConnectRequest::USERNAME_LEN),
            Self::ConnectAck => Some(1),
            Self::DisconnectRequest => Some(0),
            Self::Input | Self::Snapshot => None,
        }
    }
}

// =============================================================================
// CONTROL CHANNEL
// =============================================================================

/// Join request. The username is stored zero-padded.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ConnectRequest {
    /// Raw username bytes, NUL-padded.
    pub username: [u8; Self::USERNAME_LEN],
}

impl ConnectRequest {
    /// Fixed username field width.
    pub const USERNAME_LEN: usize = 32;

    /// Builds a request, truncating the name to 32 bytes on a char boundary.
    #[must_use]
    pub fn new(username: &str) -> Self {
        let mut end = username.len().min(Self::USERNAME_LEN);
        while !username.is_char_boundary(end) {
            end -= 1;
        }
        let mut raw = [0u8; Self::USERNAME_LEN];
        raw[..end].copy_from_slice(&username.as_bytes()[..end]);
        Self { username: raw }
    }

    /// Username up to the first NUL, with invalid UTF-8 replaced.
    #[must_use]
    pub fn username(&self) -> String {
        let len = self
            .username
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(Self::USERNAME_LEN);
        String::from_utf8_lossy(&self.username[..len]).into_owned()
    }
}

impl std::fmt::Debug for ConnectRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectRequest")
            .field("username", &self.username())
            .finish()
    }
}

/// Join accepted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConnectAck {
    /// Player id assigned by the server (1-based).
    pub player_id: u8,
}

/// Messages carried on the TCP control channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlMessage {
    /// Join request.
    ConnectRequest(ConnectRequest),
    /// Join accepted.
    ConnectAck(ConnectAck),
    /// Leave.
    DisconnectRequest,
}

// =============================================================================
// GAMEPLAY CHANNEL
// =============================================================================

/// Packed input bitmask.
///
/// `bit0=up, bit1=down, bit2=left, bit3=right, bit4=shoot`; the upper three
/// bits are ignored.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct InputFlags(pub u8);

impl InputFlags {
    /// Move up.
    pub const UP: u8 = 1 << 0;
    /// Move down.
    pub const DOWN: u8 = 1 << 1;
    /// Move left.
    pub const LEFT: u8 = 1 << 2;
    /// Move right.
    pub const RIGHT: u8 = 1 << 3;
    /// Fire.
    pub const SHOOT: u8 = 1 << 4;
    /// Every defined bit.
    pub const MASK: u8 = 0x1F;

    /// Checks a flag bit.
    #[inline]
    #[must_use]
    pub const fn has(self, flag: u8) -> bool {
        self.0 & flag != 0
    }

    /// Expands the mask into a component.
    #[must_use]
    pub const fn to_state(self) -> InputState {
        InputState {
            up: self.has(Self::UP),
            down: self.has(Self::DOWN),
            left: self.has(Self::LEFT),
            right: self.has(Self::RIGHT),
            shoot: self.has(Self::SHOOT),
        }
    }

    /// Packs a component into a mask.
    #[must_use]
    pub const fn from_state(state: &InputState) -> Self {
        let mut bits = 0;
        if state.up {
            bits |= Self::UP;
        }
        if state.down {
            bits |= Self::DOWN;
        }
        if state.left {
            bits |= Self::LEFT;
        }
        if state.right {
            bits |= Self::RIGHT;
        }
        if state.shoot {
            bits |= Self::SHOOT;
        }
        Self(bits)
    }
}

/// Input packet - Client -> Server.
///
/// Size: 2 bytes payload
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PlayerInput {
    /// Sender's player id.
    pub player_id: u8,
    /// Keys held this tick.
    pub input: InputFlags,
}

impl PlayerInput {
    /// Payload size in bytes.
    pub const SIZE: usize = 2;
}

/// State of one entity inside a snapshot.
///
/// Size: 22 bytes on the wire
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EntityRecord {
    /// Replication id (not the server's local entity id).
    pub network_id: u32,
    /// Type tag.
    pub kind: EntityKind,
    /// Current health, saturated to 255.
    pub health: u8,
    /// X position.
    pub x: f32,
    /// Y position.
    pub y: f32,
    /// X velocity.
    pub vx: f32,
    /// Y velocity.
    pub vy: f32,
}

impl EntityRecord {
    /// Encoded size in bytes.
    pub const SIZE: usize = 4 + 1 + 1 + 4 * 4;

    /// Zeroed record used to fill unused snapshot slots.
    pub const EMPTY: Self = Self {
        network_id: 0,
        kind: EntityKind::Player,
        health: 0,
        x: 0.0,
        y: 0.0,
        vx: 0.0,
        vy: 0.0,
    };
}

impl Default for EntityRecord {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// World state snapshot - Server -> Client.
///
/// ```text
/// ┌────────┬──────────┬──────────────┬─────────────────────────────┐
/// │ 0x20   │ tick u32 │ count u16    │ count × EntityRecord (22 B) │
/// └────────┴──────────┴──────────────┴─────────────────────────────┘
/// ```
#[derive(Clone, Copy, Debug)]
pub struct Snapshot {
    /// Server tick this snapshot represents.
    pub tick: u32,
    /// Number of valid records.
    pub entity_count: u16,
    /// Records (pre-allocated array).
    pub records: [EntityRecord; Self::MAX_RECORDS],
}

impl Snapshot {
    /// Bytes before the first record: opcode, tick, count.
    pub const HEADER_SIZE: usize = 1 + 4 + 2;

    /// Maximum records that fit in one datagram.
    pub const MAX_RECORDS: usize = (crate::MAX_DATAGRAM_SIZE - Self::HEADER_SIZE) / EntityRecord::SIZE;

    /// Creates an empty snapshot.
    #[must_use]
    pub const fn empty(tick: u32) -> Self {
        Self {
            tick,
            entity_count: 0,
            records: [EntityRecord::EMPTY; Self::MAX_RECORDS],
        }
    }

    /// Appends a record.
    ///
    /// Returns false if the snapshot is full.
    #[inline]
    pub fn push(&mut self, record: EntityRecord) -> bool {
        let count = usize::from(self.entity_count);
        if count >= Self::MAX_RECORDS {
            return false;
        }
        self.records[count] = record;
        self.entity_count += 1;
        true
    }

    /// Returns a slice of valid records.
    #[inline]
    #[must_use]
    pub fn records(&self) -> &[EntityRecord] {
        &self.records[..usize::from(self.entity_count)]
    }

    /// Returns true if no more records fit.
    #[inline]
    #[must_use]
    pub fn is_full(&self) -> bool {
        usize::from(self.entity_count) >= Self::MAX_RECORDS
    }

    /// Encoded size in bytes.
    #[inline]
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        Self::HEADER_SIZE + usize::from(self.entity_count) * EntityRecord::SIZE
    }
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::empty(0)
    }
}

impl PartialEq for Snapshot {
    fn eq(&self, other: &Self) -> bool {
        self.tick == other.tick && self.records() == other.records()
    }
}

/// Any decoded message.
#[derive(Clone, Copy, Debug, PartialEq)]
#[allow(clippy::large_enum_variant)]
pub enum Packet {
    /// TCP control message.
    Control(ControlMessage),
    /// UDP input.
    Input(PlayerInput),
    /// UDP snapshot (moved by value into a pre-allocated queue slot).
    Snapshot(Snapshot),
}
