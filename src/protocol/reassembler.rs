//! Stream reassembly: raw socket reads in, complete frames out.
//!
//! A single read may carry zero, one or many frames plus a partial trailing
//! frame. Bytes land in one growable arena:
//!
//! ```text
//! 0            consumed_pos          read_pos           capacity
//! |  dispatched  |  received, pending  |  spare (next read) |
//! ```
//!
//! After every drain the pending tail is moved to offset 0, so the next read
//! always appends at `read_pos` and `consumed_pos` is back at zero.

use super::framing::{self, Decoded, FrameView, HEADER_SIZE};
use crate::config::Config;
use crate::error::{LinkError, ProtocolError};

/// Growable receive arena with explicit read/consumed offsets.
///
/// Invariant: `consumed_pos <= read_pos <= capacity`. The arena grows on
/// demand and never shrinks.
#[derive(Debug)]
pub struct ReceiveBuffer {
    buf: Vec<u8>,
    read_pos: usize,
    consumed_pos: usize,
}

impl ReceiveBuffer {
    /// Create an arena of at least `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: vec![0; capacity.max(HEADER_SIZE)],
            read_pos: 0,
            consumed_pos: 0,
        }
    }

    /// Arena size.
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// End of received data.
    pub fn read_pos(&self) -> usize {
        self.read_pos
    }

    /// Start of data not yet handed out as a frame.
    pub fn consumed_pos(&self) -> usize {
        self.consumed_pos
    }

    /// Received bytes not yet part of a dispatched frame.
    pub fn pending(&self) -> usize {
        self.read_pos - self.consumed_pos
    }

    /// Make room for at least `additional` bytes after `read_pos`.
    pub fn reserve(&mut self, additional: usize) {
        let needed = self.read_pos + additional;
        if needed > self.buf.len() {
            let grown = needed.max(self.buf.len() * 2);
            log::trace!("[Reassembler] growing receive buffer {} -> {grown}", self.buf.len());
            self.buf.resize(grown, 0);
        }
    }

    /// Spare region for the next read, at least `min` bytes long.
    pub fn spare_mut(&mut self, min: usize) -> &mut [u8] {
        self.reserve(min);
        &mut self.buf[self.read_pos..]
    }

    /// Mark `n` bytes of the spare region as received.
    pub fn commit(&mut self, n: usize) {
        debug_assert!(self.read_pos + n <= self.buf.len(), "commit past end of spare region");
        self.read_pos = (self.read_pos + n).min(self.buf.len());
    }

    /// Copy `bytes` in at `read_pos`, growing as needed.
    pub fn append(&mut self, bytes: &[u8]) {
        self.spare_mut(bytes.len())[..bytes.len()].copy_from_slice(bytes);
        self.read_pos += bytes.len();
    }

    fn unconsumed(&self) -> &[u8] {
        &self.buf[self.consumed_pos..self.read_pos]
    }

    fn advance(&mut self, n: usize) {
        debug_assert!(self.consumed_pos + n <= self.read_pos);
        self.consumed_pos += n;
    }

    /// Move pending bytes to offset 0.
    pub fn compact(&mut self) {
        if self.consumed_pos == 0 {
            return;
        }
        if self.consumed_pos < self.read_pos {
            self.buf.copy_within(self.consumed_pos..self.read_pos, 0);
        }
        self.read_pos -= self.consumed_pos;
        self.consumed_pos = 0;
    }

    /// Drop all pending bytes, keeping the allocation.
    pub fn clear(&mut self) {
        self.read_pos = 0;
        self.consumed_pos = 0;
    }
}

/// Turns an arbitrarily chunked byte stream into complete frames.
///
/// Owns its [`ReceiveBuffer`] exclusively. Frames are handed to the callback
/// as borrowed views in arrival order; the callback cannot touch the buffer.
#[derive(Debug)]
pub struct StreamReassembler {
    buffer: ReceiveBuffer,
    max_frame_size: u32,
    read_chunk_size: usize,
}

impl StreamReassembler {
    /// Create a reassembler.
    pub fn new(max_frame_size: u32, initial_capacity: usize, read_chunk_size: usize) -> Self {
        Self {
            buffer: ReceiveBuffer::with_capacity(initial_capacity),
            max_frame_size,
            read_chunk_size: read_chunk_size.max(1),
        }
    }

    /// Create a reassembler sized from configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.max_frame_size,
            config.initial_buffer_capacity,
            config.read_chunk_size,
        )
    }

    /// The receive arena.
    pub fn buffer(&self) -> &ReceiveBuffer {
        &self.buffer
    }

    /// True when a partial frame is buffered.
    pub fn has_partial(&self) -> bool {
        self.buffer.pending() > 0
    }

    /// Region the next socket read should fill.
    pub fn read_buf(&mut self) -> &mut [u8] {
        self.buffer.spare_mut(self.read_chunk_size)
    }

    /// Account for a read of `n` bytes into [`Self::read_buf`] and dispatch
    /// every frame now complete.
    ///
    /// Returns the number of frames dispatched.
    ///
    /// # Errors
    ///
    /// `n == 0` means the peer closed the stream: [`LinkError::TransportClosed`].
    /// Corrupt framing, or an error returned by `on_frame`, is
    /// [`LinkError::Protocol`].
    pub fn on_read_completed<F>(&mut self, n: usize, on_frame: F) -> Result<usize, LinkError>
    where
        F: FnMut(FrameView<'_>) -> Result<(), ProtocolError>,
    {
        if n == 0 {
            return Err(LinkError::TransportClosed);
        }
        self.buffer.commit(n);
        Ok(self.drain(on_frame)?)
    }

    /// Append `bytes` and dispatch every frame now complete.
    ///
    /// Returns the number of frames dispatched.
    pub fn on_bytes_received<F>(
        &mut self,
        bytes: &[u8],
        on_frame: F,
    ) -> Result<usize, ProtocolError>
    where
        F: FnMut(FrameView<'_>) -> Result<(), ProtocolError>,
    {
        self.buffer.append(bytes);
        self.drain(on_frame)
    }

    fn drain<F>(&mut self, mut on_frame: F) -> Result<usize, ProtocolError>
    where
        F: FnMut(FrameView<'_>) -> Result<(), ProtocolError>,
    {
        let mut frames = 0;
        let missing = loop {
            match framing::decode(self.buffer.unconsumed(), self.max_frame_size)? {
                Decoded::Frame { frame, consumed } => {
                    log::trace!(
                        "[Reassembler] frame type {} ({} payload bytes)",
                        frame.type_code,
                        frame.payload.len()
                    );
                    on_frame(frame)?;
                    self.buffer.advance(consumed);
                    frames += 1;
                }
                Decoded::NeedMoreData { additional } => break additional,
            }
        };
        self.buffer.compact();
        // Pre-size for the frame in progress so a large frame arrives in
        // as few reads as the socket allows.
        self.buffer.reserve(missing);
        Ok(frames)
    }

    /// Drop any buffered partial frame.
    pub fn reset(&mut self) {
        self.buffer.clear();
    }
}
