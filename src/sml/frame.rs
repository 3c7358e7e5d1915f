//! Bounded frame buffer.
//!
//! Thin wrapper over [`heapless::Vec`] whose only write path is
//! [`FrameBuffer::push`], which refuses to grow past `N` and reports
//! [`FrameError::CapacityExceeded`] instead.

use core::ops::Deref;

use heapless::Vec;

use super::TRAILER_LEN;
use crate::error::FrameError;

/// Fixed-capacity byte buffer holding one SML message.
#[derive(Debug, Clone, Default)]
pub struct FrameBuffer<const N: usize> {
    bytes: Vec<u8, N>,
}

impl<const N: usize> FrameBuffer<N> {
    pub const fn new() -> Self {
        Self { bytes: Vec::new() }
    }

    /// Append one byte at the write cursor.
    pub fn push(&mut self, byte: u8) -> Result<(), FrameError> {
        self.bytes
            .push(byte)
            .map_err(|_| FrameError::CapacityExceeded { capacity: N })
    }

    /// Discard all content; the write cursor returns to zero.
    pub fn clear(&mut self) {
        self.bytes.clear();
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn is_full(&self) -> bool {
        self.bytes.is_full()
    }

    /// The 3 bytes following the end sequence, if the frame is long enough.
    pub fn trailer(&self) -> Option<&[u8]> {
        let len = self.bytes.len();
        (len >= TRAILER_LEN).then(|| &self.bytes[len - TRAILER_LEN..])
    }

    /// Number of padding bytes the sender inserted before the end sequence.
    pub fn fill_bytes(&self) -> Option<u8> {
        self.trailer().map(|t| t[0])
    }

    /// Transmitted CRC, low byte first on the wire.
    pub fn transmitted_crc(&self) -> Option<u16> {
        self.trailer().map(|t| u16::from_le_bytes([t[1], t[2]]))
    }
}

impl<const N: usize> Deref for FrameBuffer<N> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.bytes
    }
}
