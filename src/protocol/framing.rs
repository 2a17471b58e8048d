//! Frame codec for the editor↔engine socket protocol.
//!
//! ```text
//! [i32 LE length] [u32 LE marker = 0] [i32 LE type] [payload: length-4 bytes]
//! ```
//!
//! `length` covers the type tag and the payload, so a complete frame is
//! `HEADER_SIZE + length` bytes. A frame with an empty payload has
//! `length == 4`.

use bytes::{BufMut, BytesMut};

use super::wire::PayloadWriter;
use crate::error::{EncodeError, ProtocolError};

/// Length field plus marker field.
pub const HEADER_SIZE: usize = 8;

/// Size of the type tag that starts every frame body.
pub const TYPE_SIZE: usize = 4;

/// Marker value of the socket variant.
pub const FRAME_MARKER: u32 = 0;

/// Default cap on the length field (16 MB).
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 16 * 1024 * 1024;

/// A complete frame, borrowed from the receive buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameView<'a> {
    /// Message type tag.
    pub type_code: i32,
    /// Type-specific payload.
    pub payload: &'a [u8],
}

/// Outcome of one [`decode`] attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoded<'a> {
    /// A complete frame sits at the start of the input.
    Frame {
        /// The frame.
        frame: FrameView<'a>,
        /// Bytes the frame occupies, header included.
        consumed: usize,
    },
    /// The input holds only part of a frame.
    NeedMoreData {
        /// Bytes still missing before the frame (or its header) is complete.
        additional: usize,
    },
}

fn le_i32(bytes: &[u8], at: usize) -> i32 {
    i32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

fn le_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

/// Try to decode one frame from the start of `bytes`.
///
/// Never copies: the returned payload borrows from `bytes`.
///
/// # Errors
///
/// A length below [`TYPE_SIZE`], above `max_frame_size`, or a non-zero
/// marker is a [`ProtocolError`]; the stream cannot be resynchronized and
/// the connection must be closed.
pub fn decode(bytes: &[u8], max_frame_size: u32) -> Result<Decoded<'_>, ProtocolError> {
    if bytes.len() < HEADER_SIZE {
        return Ok(Decoded::NeedMoreData {
            additional: HEADER_SIZE - bytes.len(),
        });
    }

    let length = le_i32(bytes, 0);
    if length < TYPE_SIZE as i32 {
        return Err(ProtocolError::InvalidLength(length));
    }
    let length = length as u32;
    if length > max_frame_size {
        return Err(ProtocolError::FrameTooLarge {
            length,
            max: max_frame_size,
        });
    }

    let marker = le_u32(bytes, 4);
    if marker != FRAME_MARKER {
        return Err(ProtocolError::BadMarker(marker));
    }

    let total = HEADER_SIZE + length as usize;
    if bytes.len() < total {
        return Ok(Decoded::NeedMoreData {
            additional: total - bytes.len(),
        });
    }

    Ok(Decoded::Frame {
        frame: FrameView {
            type_code: le_i32(bytes, HEADER_SIZE),
            payload: &bytes[HEADER_SIZE + TYPE_SIZE..total],
        },
        consumed: total,
    })
}

/// Append one frame to `buf`, filling the payload through `write_payload`.
///
/// The length field is patched once the payload is known. On error `buf` is
/// restored to its previous length, so a rejected command leaves no partial
/// frame behind.
pub fn write_frame<F>(
    buf: &mut BytesMut,
    type_code: i32,
    max_frame_size: u32,
    write_payload: F,
) -> Result<(), EncodeError>
where
    F: FnOnce(&mut PayloadWriter<'_>) -> Result<(), EncodeError>,
{
    let start = buf.len();
    buf.put_i32_le(0);
    buf.put_u32_le(FRAME_MARKER);
    buf.put_i32_le(type_code);

    if let Err(e) = write_payload(&mut PayloadWriter::new(buf)) {
        buf.truncate(start);
        return Err(e);
    }

    let length = buf.len() - start - HEADER_SIZE;
    let max = max_frame_size.min(i32::MAX as u32);
    if length > max as usize {
        buf.truncate(start);
        return Err(EncodeError::FrameTooLarge { length, max });
    }
    buf[start..start + 4].copy_from_slice(&(length as i32).to_le_bytes());
    Ok(())
}

/// Encode a frame from an already-built payload.
pub fn encode_frame(type_code: i32, payload: &[u8]) -> Vec<u8> {
    let length = (TYPE_SIZE + payload.len()) as i32;
    let mut buf = Vec::with_capacity(HEADER_SIZE + TYPE_SIZE + payload.len());
    buf.extend_from_slice(&length.to_le_bytes());
    buf.extend_from_slice(&FRAME_MARKER.to_le_bytes());
    buf.extend_from_slice(&type_code.to_le_bytes());
    buf.extend_from_slice(payload);
    buf
}
