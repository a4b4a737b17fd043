//! # Error Types
//!
//! - [`ProtocolError`]: a malformed or oversized message. Logged and dropped.
//! - [`ConfigError`]: invalid configuration. Fatal at startup.
//! - [`NetError`]: socket and handshake failures.

use std::io;
use std::net::SocketAddr;
use thiserror::Error;

/// Codec failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Zero-length message.
    #[error("empty message")]
    Empty,

    /// Message shorter than its opcode requires.
    #[error("message truncated: needed {needed} bytes, got {got}")]
    Truncated {
        /// Bytes required to finish decoding.
        needed: usize,
        /// Bytes available.
        got: usize,
    },

    /// First byte is not a known opcode.
    #[error("unknown opcode 0x{0:02x}")]
    UnknownOpcode(u8),

    /// Known opcode arriving on the wrong channel.
    #[error("unexpected opcode 0x{0:02x} on this channel")]
    UnexpectedOpcode(u8),

    /// Snapshot record with an unknown entity type tag.
    #[error("unknown entity kind {0}")]
    UnknownEntityKind(u8),

    /// Snapshot claims more records than a datagram can hold.
    #[error("snapshot has {count} records, at most {max} fit")]
    TooManyRecords {
        /// Claimed record count.
        count: usize,
        /// Maximum record count.
        max: usize,
    },

    /// Encoding would exceed the datagram size bound.
    #[error("encoded size {size} exceeds the {max}-byte datagram limit")]
    Oversize {
        /// Size the message would have had.
        size: usize,
        /// Maximum datagram size.
        max: usize,
    },
}

/// Result type for codec operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Configuration failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// Path that was read.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Config file is not valid TOML for this schema.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A field holds an unusable value.
    #[error("invalid config value for `{field}`: {reason}")]
    Invalid {
        /// Field name.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

/// Transport and handshake failures.
#[derive(Debug, Error)]
pub enum NetError {
    /// A listening socket could not be bound.
    #[error("failed to bind {kind} socket on {addr}: {source}")]
    Bind {
        /// "TCP" or "UDP".
        kind: &'static str,
        /// Requested address.
        addr: SocketAddr,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The control connection to the server could not be opened.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        /// Server address.
        addr: SocketAddr,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The server did not answer the join request in time.
    #[error("handshake timed out after {0:?}")]
    HandshakeTimeout(std::time::Duration),

    /// The server closed the control connection without accepting.
    #[error("server refused the connection")]
    Refused,

    /// The server answered with something other than `CONNECT_ACK`.
    #[error("handshake failed: {0}")]
    Handshake(#[from] ProtocolError),

    /// Any other socket error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Invalid configuration handed to the transport.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The I/O runtime could not be started.
    #[error("failed to start network runtime: {0}")]
    Runtime(#[source] io::Error),
}

/// Result type for transport operations.
pub type NetResult<T> = Result<T, NetError>;
