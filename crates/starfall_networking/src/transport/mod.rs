//! # Transport Layer
//!
//! Socket ownership for both channels, driven by tokio tasks.
//!
//! ## Design
//!
//! - TCP carries only the join/leave handshake, one connection per client
//! - UDP carries per-tick gameplay traffic over one socket
//! - Inbound datagrams are decoded on the I/O side and pushed into an SPSC
//!   queue; outbound datagrams arrive as commands from the simulation thread
//! - The simulation thread only ever calls non-blocking methods
//!
//! ```text
//!   ┌──────────── tokio workers ────────────┐     ┌─ simulation thread ─┐
//!   │ accept ─► session task (TCP) ─────────┼─────► SessionEvent       │
//!   │ UDP recv ─► decode ─► Producer ───────┼─────► Consumer::pop      │
//!   │ UDP send ◄─ command loop ◄────────────┼─────  ServerCommand      │
//!   └───────────────────────────────────────┘     └─────────────────────┘
//! ```

mod client;
mod server;

pub use client::{ClientChannels, ClientTransport};
pub use server::{InboundInput, PlayerIdPool, ServerChannels, ServerCommand, ServerTransport, SessionEvent};

use crate::error::{NetError, NetResult, ProtocolError};
use crate::protocol::{ConnectRequest, ControlMessage, Opcode, PacketReader, PacketWriter};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Malformed control frames tolerated before a session is closed.
pub const MAX_MALFORMED_FRAMES: u32 = 3;

/// Transport counters, shared between I/O tasks.
#[derive(Debug, Default)]
pub struct TransportStats {
    datagrams_received: AtomicU64,
    datagrams_sent: AtomicU64,
    malformed: AtomicU64,
    queue_drops: AtomicU64,
    send_errors: AtomicU64,
}

/// Point-in-time copy of [`TransportStats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TransportStatsSnapshot {
    /// Datagrams received.
    pub datagrams_received: u64,
    /// Datagrams sent.
    pub datagrams_sent: u64,
    /// Datagrams or frames that failed to decode.
    pub malformed: u64,
    /// Decoded packets dropped because the queue was full.
    pub queue_drops: u64,
    /// Failed sends.
    pub send_errors: u64,
}

impl TransportStats {
    #[inline]
    pub(crate) fn record_received(&self) {
        self.datagrams_received.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_sent(&self) {
        self.datagrams_sent.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_malformed(&self) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_queue_drop(&self) {
        self.queue_drops.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_send_error(&self) {
        self.send_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Reads every counter.
    #[must_use]
    pub fn snapshot(&self) -> TransportStatsSnapshot {
        TransportStatsSnapshot {
            datagrams_received: self.datagrams_received.load(Ordering::Relaxed),
            datagrams_sent: self.datagrams_sent.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            queue_drops: self.queue_drops.load(Ordering::Relaxed),
            send_errors: self.send_errors.load(Ordering::Relaxed),
        }
    }
}

/// Outcome of reading one control frame.
#[derive(Debug)]
pub(crate) enum Frame {
    /// A well-formed message.
    Message(ControlMessage),
    /// The frame could not be decoded; the stream is still usable.
    Malformed(ProtocolError),
    /// The peer closed the connection.
    Closed,
}

/// Reads one opcode-prefixed control frame.
///
/// # Errors
///
/// Socket errors other than a clean EOF.
pub(crate) async fn read_frame<R: AsyncRead + Unpin>(stream: &mut R) -> NetResult<Frame> {
    let mut opcode = [0u8; 1];
    match stream.read_exact(&mut opcode).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(Frame::Closed),
        Err(e) => return Err(NetError::Io(e)),
    }

    let Some(op) = Opcode::from_u8(opcode[0]) else {
        return Ok(Frame::Malformed(ProtocolError::UnknownOpcode(opcode[0])));
    };
    let Some(len) = op.control_payload_len() else {
        return Ok(Frame::Malformed(ProtocolError::UnexpectedOpcode(opcode[0])));
    };

    let mut payload = [0u8; ConnectRequest::USERNAME_LEN];
    match stream.read_exact(&mut payload[..len]).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(Frame::Closed),
        Err(e) => return Err(NetError::Io(e)),
    }

    Ok(match PacketReader::new(&payload[..len]).read_control_body(op) {
        Ok(message) => Frame::Message(message),
        Err(err) => Frame::Malformed(err),
    })
}

/// Writes one control frame.
///
/// # Errors
///
/// Socket errors, or a codec error (never for well-formed control messages).
pub(crate) async fn write_frame<W: AsyncWrite + Unpin>(
    stream: &mut W,
    message: &ControlMessage,
) -> NetResult<()> {
    let mut writer = PacketWriter::new();
    let bytes = writer.encode_control(message)?;
    stream.write_all(bytes).await?;
    stream.flush().await?;
    Ok(())
}
