//! # Packet Serialization
//!
//! Explicit little-endian encoding into a fixed, reusable buffer.
//!
//! ## Design
//!
//! - The writer owns a `MAX_DATAGRAM_SIZE` buffer and refuses to grow past it
//! - The reader never reads past the slice it was given
//! - Every failure is a [`ProtocolError`]; nothing panics on hostile input

use super::packets::{
    ConnectAck, ConnectRequest, ControlMessage, EntityRecord, InputFlags, Opcode, Packet,
    PlayerInput, Snapshot,
};
use crate::error::{ProtocolError, ProtocolResult};
use crate::MAX_DATAGRAM_SIZE;
use starfall_core::components::EntityKind;

/// Packet writer - encodes packets into a pre-allocated buffer.
///
/// Reuse one writer across ticks to avoid allocations.
#[derive(Clone)]
pub struct PacketWriter {
    buffer: [u8; MAX_DATAGRAM_SIZE],
    position: usize,
}

impl PacketWriter {
    /// Creates a new writer with a zeroed buffer.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            buffer: [0u8; MAX_DATAGRAM_SIZE],
            position: 0,
        }
    }

    /// Resets the writer for reuse.
    #[inline]
    pub fn reset(&mut self) {
        self.position = 0;
    }

    /// Returns the number of bytes written.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.position
    }

    /// Returns true if no bytes have been written.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.position == 0
    }

    /// Returns a slice of the written data.
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer[..self.position]
    }

    /// Copies the whole buffer out, for handing to the I/O context.
    #[inline]
    #[must_use]
    pub const fn to_datagram(&self) -> ([u8; MAX_DATAGRAM_SIZE], usize) {
        (self.buffer, self.position)
    }

    /// Writes raw bytes.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::Oversize`] if the bytes would exceed the datagram bound.
    #[inline]
    pub fn write_bytes(&mut self, bytes: &[u8]) -> ProtocolResult<()> {
        let end = self.position + bytes.len();
        if end > MAX_DATAGRAM_SIZE {
            return Err(ProtocolError::Oversize {
                size: end,
                max: MAX_DATAGRAM_SIZE,
            });
        }
        self.buffer[self.position..end].copy_from_slice(bytes);
        self.position = end;
        Ok(())
    }

    /// Writes a single byte.
    ///
    /// # Errors
    ///
    /// See [`PacketWriter::write_bytes`].
    #[inline]
    pub fn write_u8(&mut self, value: u8) -> ProtocolResult<()> {
        self.write_bytes(&[value])
    }

    /// Writes a u16 in little-endian format.
    ///
    /// # Errors
    ///
    /// See [`PacketWriter::write_bytes`].
    #[inline]
    pub fn write_u16(&mut self, value: u16) -> ProtocolResult<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    /// Writes a u32 in little-endian format.
    ///
    /// # Errors
    ///
    /// See [`PacketWriter::write_bytes`].
    #[inline]
    pub fn write_u32(&mut self, value: u32) -> ProtocolResult<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    /// Writes a f32 in little-endian format.
    ///
    /// # Errors
    ///
    /// See [`PacketWriter::write_bytes`].
    #[inline]
    pub fn write_f32(&mut self, value: f32) -> ProtocolResult<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    /// Encodes a join request.
    ///
    /// # Errors
    ///
    /// Never fails in practice; the frame is 33 bytes.
    pub fn encode_connect_request(&mut self, request: &ConnectRequest) -> ProtocolResult<&[u8]> {
        self.reset();
        self.write_u8(Opcode::ConnectRequest as u8)?;
        self.write_bytes(&request.username)?;
        Ok(self.as_slice())
    }

    /// Encodes a join acknowledgement.
    ///
    /// # Errors
    ///
    /// Never fails in practice; the frame is 2 bytes.
    pub fn encode_connect_ack(&mut self, ack: ConnectAck) -> ProtocolResult<&[u8]> {
        self.reset();
        self.write_u8(Opcode::ConnectAck as u8)?;
        self.write_u8(ack.player_id)?;
        Ok(self.as_slice())
    }

    /// Encodes a disconnect request.
    ///
    /// # Errors
    ///
    /// Never fails in practice; the frame is 1 byte.
    pub fn encode_disconnect(&mut self) -> ProtocolResult<&[u8]> {
        self.reset();
        self.write_u8(Opcode::DisconnectRequest as u8)?;
        Ok(self.as_slice())
    }

    /// Encodes any control message.
    ///
    /// # Errors
    ///
    /// See the per-message encoders.
    pub fn encode_control(&mut self, message: &ControlMessage) -> ProtocolResult<&[u8]> {
        match message {
            ControlMessage::ConnectRequest(request) => self.encode_connect_request(request),
            ControlMessage::ConnectAck(ack) => self.encode_connect_ack(*ack),
            ControlMessage::DisconnectRequest => self.encode_disconnect(),
        }
    }

    /// Encodes an input packet.
    ///
    /// # Errors
    ///
    /// Never fails in practice; the datagram is 3 bytes.
    pub fn encode_input(&mut self, input: PlayerInput) -> ProtocolResult<&[u8]> {
        self.reset();
        self.write_u8(Opcode::Input as u8)?;
        self.write_u8(input.player_id)?;
        self.write_u8(input.input.0)?;
        Ok(self.as_slice())
    }

    /// Encodes a snapshot.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::TooManyRecords`] if the count exceeds
    /// [`Snapshot::MAX_RECORDS`], [`ProtocolError::Oversize`] if the datagram
    /// would exceed [`MAX_DATAGRAM_SIZE`].
    pub fn encode_snapshot(&mut self, snapshot: &Snapshot) -> ProtocolResult<&[u8]> {
        self.reset();
        let count = usize::from(snapshot.entity_count);
        if count > Snapshot::MAX_RECORDS {
            return Err(ProtocolError::TooManyRecords {
                count,
                max: Snapshot::MAX_RECORDS,
            });
        }

        self.write_u8(Opcode::Snapshot as u8)?;
        self.write_u32(snapshot.tick)?;
        self.write_u16(snapshot.entity_count)?;
        for record in snapshot.records() {
            self.write_u32(record.network_id)?;
            self.write_u8(record.kind as u8)?;
            self.write_u8(record.health)?;
            self.write_f32(record.x)?;
            self.write_f32(record.y)?;
            self.write_f32(record.vx)?;
            self.write_f32(record.vy)?;
        }
        Ok(self.as_slice())
    }
}

impl Default for PacketWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PacketWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketWriter")
            .field("len", &self.position)
            .finish_non_exhaustive()
    }
}

/// Packet reader - decodes packets from a borrowed buffer.
#[derive(Debug)]
pub struct PacketReader<'a> {
    buffer: &'a [u8],
    position: usize,
}

impl<'a> PacketReader<'a> {
    /// Creates a new reader over `buffer`.
    #[must_use]
    pub const fn new(buffer: &'a [u8]) -> Self {
        Self {
            buffer,
            position: 0,
        }
    }

    /// Returns the number of bytes remaining.
    #[inline]
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.position)
    }

    /// Reads `N` bytes.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::Truncated`] if fewer than `N` bytes remain.
    #[inline]
    pub fn read_array<const N: usize>(&mut self) -> ProtocolResult<[u8; N]> {
        let end = self.position + N;
        let Some(bytes) = self.buffer.get(self.position..end) else {
            return Err(ProtocolError::Truncated {
                needed: end,
                got: self.buffer.len(),
            });
        };
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        self.position = end;
        Ok(out)
    }

    /// Reads a single byte.
    ///
    /// # Errors
    ///
    /// See [`PacketReader::read_array`].
    #[inline]
    pub fn read_u8(&mut self) -> ProtocolResult<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    /// Reads a u16 in little-endian format.
    ///
    /// # Errors
    ///
    /// See [`PacketReader::read_array`].
    #[inline]
    pub fn read_u16(&mut self) -> ProtocolResult<u16> {
        self.read_array().map(u16::from_le_bytes)
    }

    /// Reads a u32 in little-endian format.
    ///
    /// # Errors
    ///
    /// See [`PacketReader::read_array`].
    #[inline]
    pub fn read_u32(&mut self) -> ProtocolResult<u32> {
        self.read_array().map(u32::from_le_bytes)
    }

    /// Reads a f32 in little-endian format.
    ///
    /// # Errors
    ///
    /// See [`PacketReader::read_array`].
    #[inline]
    pub fn read_f32(&mut self) -> ProtocolResult<f32> {
        self.read_u32().map(f32::from_bits)
    }

    /// Reads and validates the leading opcode.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::Empty`] or [`ProtocolError::UnknownOpcode`].
    pub fn read_opcode(&mut self) -> ProtocolResult<Opcode> {
        if self.remaining() == 0 {
            return Err(ProtocolError::Empty);
        }
        let byte = self.read_u8()?;
        Opcode::from_u8(byte).ok_or(ProtocolError::UnknownOpcode(byte))
    }

    /// Decodes the body of a control message whose opcode was already read.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::Truncated`], or [`ProtocolError::UnexpectedOpcode`]
    /// for gameplay opcodes.
    pub fn read_control_body(&mut self, opcode: Opcode) -> ProtocolResult<ControlMessage> {
        match opcode {
            Opcode::ConnectRequest => Ok(ControlMessage::ConnectRequest(ConnectRequest {
                username: self.read_array()?,
            })),
            Opcode::ConnectAck => Ok(ControlMessage::ConnectAck(ConnectAck {
                player_id: self.read_u8()?,
            })),
            Opcode::DisconnectRequest => Ok(ControlMessage::DisconnectRequest),
            Opcode::Input | Opcode::Snapshot => Err(ProtocolError::UnexpectedOpcode(opcode as u8)),
        }
    }

    fn read_input_body(&mut self) -> ProtocolResult<PlayerInput> {
        let player_id = self.read_u8()?;
        let input = InputFlags(self.read_u8()?);
        Ok(PlayerInput { player_id, input })
    }

    fn read_snapshot_body(&mut self) -> ProtocolResult<Snapshot> {
        let tick = self.read_u32()?;
        let entity_count = self.read_u16()?;
        let count = usize::from(entity_count);
        if count > Snapshot::MAX_RECORDS {
            return Err(ProtocolError::TooManyRecords {
                count,
                max: Snapshot::MAX_RECORDS,
            });
        }
        // Check the whole body up front so a short datagram fails fast.
        let needed = self.position + count * EntityRecord::SIZE;
        if needed > self.buffer.len() {
            return Err(ProtocolError::Truncated {
                needed,
                got: self.buffer.len(),
            });
        }

        let mut snapshot = Snapshot::empty(tick);
        for _ in 0..count {
            let network_id = self.read_u32()?;
            let tag = self.read_u8()?;
            let kind = EntityKind::from_u8(tag).ok_or(ProtocolError::UnknownEntityKind(tag))?;
            let record = EntityRecord {
                network_id,
                kind,
                health: self.read_u8()?,
                x: self.read_f32()?,
                y: self.read_f32()?,
                vx: self.read_f32()?,
                vy: self.read_f32()?,
            };
            snapshot.push(record);
        }
        Ok(snapshot)
    }

    /// Decodes a complete message.
    ///
    /// Trailing bytes after a well-formed message are ignored.
    ///
    /// # Errors
    ///
    /// Any [`ProtocolError`] from the opcode or body.
    pub fn read_packet(&mut self) -> ProtocolResult<Packet> {
        match self.read_opcode()? {
            Opcode::Input => self.read_input_body().map(Packet::Input),
            Opcode::Snapshot => self.read_snapshot_body().map(Packet::Snapshot),
            control => self.read_control_body(control).map(Packet::Control),
        }
    }
}

/// Decodes any message from `bytes`.
///
/// # Errors
///
/// See [`PacketReader::read_packet`].
pub fn decode(bytes: &[u8]) -> ProtocolResult<Packet> {
    PacketReader::new(bytes).read_packet()
}

/// Decodes a datagram expected to carry an input packet.
///
/// # Errors
///
/// [`ProtocolError::UnexpectedOpcode`] for any other message.
pub fn decode_input(bytes: &[u8]) -> ProtocolResult<PlayerInput> {
    let mut reader = PacketReader::new(bytes);
    match reader.read_opcode()? {
        Opcode::Input => reader.read_input_body(),
        other => Err(ProtocolError::UnexpectedOpcode(other as u8)),
    }
}

/// Decodes a datagram expected to carry a snapshot.
///
/// # Errors
///
/// [`ProtocolError::UnexpectedOpcode`] for any other message.
pub fn decode_snapshot(bytes: &[u8]) -> ProtocolResult<Snapshot> {
    let mut reader = PacketReader::new(bytes);
    match reader.read_opcode()? {
        Opcode::Snapshot => reader.read_snapshot_body(),
        other => Err(ProtocolError::UnexpectedOpcode(other as u8)),
    }
}
