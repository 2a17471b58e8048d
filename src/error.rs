//! Error types for the transport core.
//!
//! The library core uses typed errors so callers can tell a dead peer from a
//! corrupt stream from a bad argument. Application plumbing (CLI, config
//! loading) uses `anyhow` on top of these.

use thiserror::Error;

/// The inbound byte stream violated the wire format.
///
/// Always fatal for the connection it was read from: the read loop stops and
/// the connection is torn down.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Length field smaller than the type tag it must cover.
    #[error("invalid frame length {0}")]
    InvalidLength(i32),

    /// Length field larger than the configured maximum frame size.
    #[error("frame length {length} exceeds maximum {max}")]
    FrameTooLarge {
        /// Declared length.
        length: u32,
        /// Configured maximum.
        max: u32,
    },

    /// Marker field was not the socket-variant zero marker.
    #[error("unexpected frame marker 0x{0:08x}")]
    BadMarker(u32),

    /// A field ran past the end of the payload.
    #[error("truncated {field}: needed {needed} bytes, {available} remaining")]
    Truncated {
        /// Name of the field being read.
        field: &'static str,
        /// Bytes the field needs.
        needed: usize,
        /// Bytes left in the payload.
        available: usize,
    },

    /// A string length prefix was negative.
    #[error("negative length {length} for {field}")]
    NegativeLength {
        /// Name of the field being read.
        field: &'static str,
        /// Raw length prefix.
        length: i32,
    },

    /// An element count was negative.
    #[error("negative element count {count} for {field}")]
    NegativeCount {
        /// Name of the list being read.
        field: &'static str,
        /// Raw count.
        count: i32,
    },

    /// Engine side only: a command op code outside the known set.
    #[error("unknown command op code {0}")]
    UnknownOpCode(i32),
}

/// An outbound command argument cannot be represented on the wire.
///
/// Raised at the call site before anything is written to the socket; the
/// encoder never truncates.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EncodeError {
    /// String field contains bytes outside the ASCII range.
    #[error("string field `{field}` contains non-ASCII text")]
    NonAscii {
        /// Name of the offending field.
        field: &'static str,
    },

    /// String field longer than an `i32` length prefix can describe.
    #[error("string field `{field}` is {len} bytes, too long for the wire")]
    StringTooLong {
        /// Name of the offending field.
        field: &'static str,
        /// Byte length of the string.
        len: usize,
    },

    /// Float field is NaN or infinite.
    #[error("float field `{field}` is not finite: {value}")]
    NonFinite {
        /// Name of the offending field.
        field: &'static str,
        /// Rejected value.
        value: f32,
    },

    /// List longer than an `i32` element count can describe.
    #[error("list `{field}` has {count} elements, too many for the wire")]
    TooManyElements {
        /// Name of the offending list.
        field: &'static str,
        /// Number of elements.
        count: usize,
    },

    /// Encoded frame would exceed the configured maximum frame size.
    #[error("encoded frame length {length} exceeds maximum {max}")]
    FrameTooLarge {
        /// Length the frame would have declared.
        length: usize,
        /// Configured maximum.
        max: u32,
    },
}

/// Connection-level failure.
#[derive(Debug, Error)]
pub enum LinkError {
    /// The peer closed the connection (zero-byte read).
    #[error("transport closed by peer")]
    TransportClosed,

    /// The connection's tasks have stopped; nothing can be sent.
    #[error("not connected")]
    NotConnected,

    /// The inbound stream is corrupt.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// An outbound command could not be encoded.
    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),

    /// Socket I/O failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
