//! Field-level payload encoding.
//!
//! Every scalar is a fixed-width 4-byte little-endian value. Strings are an
//! `i32` byte length followed by the raw bytes, no terminator.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{EncodeError, ProtocolError};

/// Size of every scalar field on the wire.
pub const FIELD_SIZE: usize = 4;

/// Appends payload fields to a frame under construction.
///
/// Validation happens per field so a bad argument is reported before the
/// frame is handed to the socket.
#[derive(Debug)]
pub struct PayloadWriter<'a> {
    buf: &'a mut BytesMut,
}

impl<'a> PayloadWriter<'a> {
    pub(crate) fn new(buf: &'a mut BytesMut) -> Self {
        Self { buf }
    }

    /// Write a signed 32-bit integer.
    pub fn put_i32(&mut self, value: i32) {
        self.buf.put_i32_le(value);
    }

    /// Write an unsigned 32-bit integer.
    pub fn put_u32(&mut self, value: u32) {
        self.buf.put_u32_le(value);
    }

    /// Write a 32-bit float. NaN and infinities are rejected.
    pub fn put_f32(&mut self, field: &'static str, value: f32) -> Result<(), EncodeError> {
        if !value.is_finite() {
            return Err(EncodeError::NonFinite { field, value });
        }
        self.buf.put_f32_le(value);
        Ok(())
    }

    /// Write a length-prefixed ASCII string.
    pub fn put_str(&mut self, field: &'static str, value: &str) -> Result<(), EncodeError> {
        if !value.is_ascii() {
            return Err(EncodeError::NonAscii { field });
        }
        let Ok(len) = i32::try_from(value.len()) else {
            return Err(EncodeError::StringTooLong { field, len: value.len() });
        };
        self.buf.put_i32_le(len);
        self.buf.put_slice(value.as_bytes());
        Ok(())
    }

    /// Write an element count for a list that follows.
    pub fn put_count(&mut self, field: &'static str, count: usize) -> Result<(), EncodeError> {
        let Ok(count32) = i32::try_from(count) else {
            return Err(EncodeError::TooManyElements { field, count });
        };
        self.buf.put_i32_le(count32);
        Ok(())
    }
}

/// Reads payload fields from a decoded frame.
///
/// Every read is bounds-checked; running past the end of the payload is a
/// [`ProtocolError::Truncated`], never a panic.
#[derive(Debug, Clone)]
pub struct PayloadReader<'a> {
    buf: &'a [u8],
}

impl<'a> PayloadReader<'a> {
    /// Wrap a frame payload.
    pub fn new(payload: &'a [u8]) -> Self {
        Self { buf: payload }
    }

    /// Bytes not yet read.
    pub fn remaining(&self) -> usize {
        self.buf.len()
    }

    /// True once every byte has been read.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn ensure(&self, field: &'static str, needed: usize) -> Result<(), ProtocolError> {
        if self.buf.len() < needed {
            return Err(ProtocolError::Truncated {
                field,
                needed,
                available: self.buf.len(),
            });
        }
        Ok(())
    }

    /// Read a signed 32-bit integer.
    pub fn read_i32(&mut self, field: &'static str) -> Result<i32, ProtocolError> {
        self.ensure(field, FIELD_SIZE)?;
        Ok(self.buf.get_i32_le())
    }

    /// Read an unsigned 32-bit integer.
    pub fn read_u32(&mut self, field: &'static str) -> Result<u32, ProtocolError> {
        self.ensure(field, FIELD_SIZE)?;
        Ok(self.buf.get_u32_le())
    }

    /// Read a 32-bit float.
    pub fn read_f32(&mut self, field: &'static str) -> Result<f32, ProtocolError> {
        self.ensure(field, FIELD_SIZE)?;
        Ok(self.buf.get_f32_le())
    }

    /// Read an element count.
    ///
    /// `min_element_size` is the smallest wire size of one element; a count
    /// that cannot possibly fit in the remaining payload is rejected up front
    /// instead of driving a huge allocation.
    pub fn read_count(
        &mut self,
        field: &'static str,
        min_element_size: usize,
    ) -> Result<usize, ProtocolError> {
        let count = self.read_i32(field)?;
        if count < 0 {
            return Err(ProtocolError::NegativeCount { field, count });
        }
        let count = count as usize;
        self.ensure(field, count.saturating_mul(min_element_size))?;
        Ok(count)
    }

    /// Read a length-prefixed byte string without copying.
    pub fn read_bytes(&mut self, field: &'static str) -> Result<&'a [u8], ProtocolError> {
        let length = self.read_i32(field)?;
        if length < 0 {
            return Err(ProtocolError::NegativeLength { field, length });
        }
        let length = length as usize;
        self.ensure(field, length)?;
        let (head, tail) = self.buf.split_at(length);
        self.buf = tail;
        Ok(head)
    }

    /// Read a length-prefixed string.
    ///
    /// The wire carries ASCII by contract. Bytes that are not valid UTF-8
    /// are replaced rather than failing the whole connection.
    pub fn read_string(&mut self, field: &'static str) -> Result<String, ProtocolError> {
        let bytes = self.read_bytes(field)?;
        match std::str::from_utf8(bytes) {
            Ok(text) => Ok(text.to_owned()),
            Err(e) => {
                log::debug!("[Wire] {field} is not valid UTF-8 ({e}), converting lossily");
                Ok(String::from_utf8_lossy(bytes).into_owned())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn written(f: impl FnOnce(&mut PayloadWriter<'_>)) -> Vec<u8> {
        let mut buf = BytesMut::new();
        f(&mut PayloadWriter::new(&mut buf));
        buf.to_vec()
    }

    #[test]
    fn test_scalars_are_little_endian() {
        let bytes = written(|w| {
            w.put_i32(-1);
            w.put_u32(0xABCD_1234);
            w.put_f32("x", 1.0).unwrap();
        });
        assert_eq!(
            bytes,
            [0xFF, 0xFF, 0xFF, 0xFF, 0x34, 0x12, 0xCD, 0xAB, 0x00, 0x00, 0x80, 0x3F]
        );
    }

    #[test]
    fn test_string_is_length_prefixed_without_terminator() {
        let bytes = written(|w| w.put_str("name", "radius").unwrap());
        assert_eq!(&bytes[..4], &[6, 0, 0, 0]);
        assert_eq!(&bytes[4..], b"radius");
    }

    #[test]
    fn test_empty_string() {
        let bytes = written(|w| w.put_str("name", "").unwrap());
        assert_eq!(bytes, [0, 0, 0, 0]);
        let mut reader = PayloadReader::new(&bytes);
        assert_eq!(reader.read_string("name").unwrap(), "");
        assert!(reader.is_empty());
    }

    #[test]
    fn test_non_ascii_string_rejected() {
        let mut buf = BytesMut::new();
        let err = PayloadWriter::new(&mut buf).put_str("path", "caf\u{e9}").unwrap_err();
        assert_eq!(err, EncodeError::NonAscii { field: "path" });
        assert!(buf.is_empty(), "nothing may be written for a rejected field");
    }

    #[test]
    fn test_non_finite_float_rejected() {
        let mut buf = BytesMut::new();
        let mut writer = PayloadWriter::new(&mut buf);
        assert!(writer.put_f32("x", f32::NAN).is_err());
        assert!(writer.put_f32("x", f32::INFINITY).is_err());
        assert!(writer.put_f32("x", f32::NEG_INFINITY).is_err());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_reader_truncated_scalar() {
        let mut reader = PayloadReader::new(&[1, 2, 3]);
        assert_eq!(
            reader.read_i32("uid"),
            Err(ProtocolError::Truncated { field: "uid", needed: 4, available: 3 })
        );
    }

    #[test]
    fn test_reader_string_length_exceeds_payload() {
        let mut bytes = 10i32.to_le_bytes().to_vec();
        bytes.extend_from_slice(b"abc");
        let mut reader = PayloadReader::new(&bytes);
        assert_eq!(
            reader.read_string("text"),
            Err(ProtocolError::Truncated { field: "text", needed: 10, available: 3 })
        );
    }

    #[test]
    fn test_reader_negative_string_length() {
        let bytes = (-5i32).to_le_bytes();
        let mut reader = PayloadReader::new(&bytes);
        assert_eq!(
            reader.read_string("text"),
            Err(ProtocolError::NegativeLength { field: "text", length: -5 })
        );
    }

    #[test]
    fn test_reader_count_bounded_by_remaining() {
        // Claims a million u32 elements with only one present.
        let mut bytes = 1_000_000i32.to_le_bytes().to_vec();
        bytes.extend_from_slice(&7u32.to_le_bytes());
        let mut reader = PayloadReader::new(&bytes);
        assert!(matches!(
            reader.read_count("components", FIELD_SIZE),
            Err(ProtocolError::Truncated { field: "components", .. })
        ));
    }

    #[test]
    fn test_reader_negative_count() {
        let bytes = (-2i32).to_le_bytes();
        let mut reader = PayloadReader::new(&bytes);
        assert_eq!(
            reader.read_count("components", FIELD_SIZE),
            Err(ProtocolError::NegativeCount { field: "components", count: -2 })
        );
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let mut bytes = 2i32.to_le_bytes().to_vec();
        bytes.extend_from_slice(&[0xC3, 0x28]);
        let mut reader = PayloadReader::new(&bytes);
        let text = reader.read_string("text").unwrap();
        assert!(text.contains('\u{FFFD}'));
    }
}
