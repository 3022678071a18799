//! Staging buffer where one event is serialized before being emitted.

use bytes::{BufMut, Bytes, BytesMut};
use capture_common::consts::SCRATCH_SIZE_HALF;
use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("scratch buffer full: {needed} bytes needed, capacity is {capacity}")]
pub struct BufferFull {
    pub needed: usize,
    pub capacity: usize,
}

/// A growable byte buffer with a hard capacity.
///
/// Every write is bounds checked against the capacity: a write that doesn't
/// fit fails with [`BufferFull`] and leaves the content untouched.
#[derive(Debug)]
pub struct ScratchBuffer {
    buf: BytesMut,
    capacity: usize,
}

impl Default for ScratchBuffer {
    fn default() -> Self {
        Self::with_capacity(SCRATCH_SIZE_HALF)
    }
}

impl ScratchBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Bytes still available before the buffer is full.
    pub fn remaining(&self) -> usize {
        self.capacity - self.buf.len()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    pub fn truncate(&mut self, len: usize) {
        self.buf.truncate(len);
    }

    fn check(&self, needed: usize) -> Result<(), BufferFull> {
        if needed > self.capacity {
            Err(BufferFull {
                needed,
                capacity: self.capacity,
            })
        } else {
            Ok(())
        }
    }

    /// Write `bytes` at `offset`, zero-extending the buffer if needed.
    pub fn write(&mut self, offset: usize, bytes: &[u8]) -> Result<(), BufferFull> {
        let end = offset.saturating_add(bytes.len());
        self.check(end)?;
        if end > self.buf.len() {
            self.buf.resize(end, 0);
        }
        self.buf[offset..end].copy_from_slice(bytes);
        Ok(())
    }

    /// Append `len` zero bytes, returning their offset.
    pub fn reserve_zeroed(&mut self, len: usize) -> Result<usize, BufferFull> {
        let offset = self.buf.len();
        self.check(offset.saturating_add(len))?;
        self.buf.put_bytes(0, len);
        Ok(offset)
    }

    /// Append whatever `f` writes, returning its size.
    ///
    /// When the result doesn't fit the capacity, the appended bytes are
    /// discarded.
    pub fn append(&mut self, f: impl FnOnce(&mut BytesMut)) -> Result<usize, BufferFull> {
        let start = self.buf.len();
        f(&mut self.buf);
        let end = self.buf.len();
        if let Err(err) = self.check(end) {
            self.buf.truncate(start);
            return Err(err);
        }
        Ok(end - start)
    }

    /// Give `f` a zeroed window of up to `max` bytes at the end of the buffer
    /// and keep the number of bytes it reports as written.
    ///
    /// The window is clamped to the remaining room: if `f` uses all of a
    /// clamped window, the value may have been cut and the fill fails.
    pub fn fill(
        &mut self,
        max: usize,
        f: impl FnOnce(&mut [u8]) -> usize,
    ) -> Result<usize, BufferFull> {
        let start = self.buf.len();
        let window = max.min(self.remaining());
        self.buf.resize(start + window, 0);
        let written = f(&mut self.buf[start..]).min(window);
        self.buf.truncate(start + written);
        if window < max && written == window {
            self.buf.truncate(start);
            return Err(BufferFull {
                needed: start.saturating_add(max),
                capacity: self.capacity,
            });
        }
        Ok(written)
    }

    /// Copy out the content and reset the buffer for the next event.
    pub fn take(&mut self) -> Bytes {
        let out = Bytes::copy_from_slice(&self.buf);
        self.buf.clear();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_at_offset() {
        let mut scratch = ScratchBuffer::with_capacity(8);
        scratch.write(2, &[1, 2]).unwrap();
        assert_eq!(scratch.as_slice(), &[0, 0, 1, 2]);
        scratch.write(0, &[9]).unwrap();
        assert_eq!(scratch.as_slice(), &[9, 0, 1, 2]);
        assert_eq!(
            scratch.write(6, &[1, 2, 3]),
            Err(BufferFull {
                needed: 9,
                capacity: 8
            })
        );
        assert_eq!(scratch.len(), 4);
    }

    #[test]
    fn append_rolls_back_on_overflow() {
        let mut scratch = ScratchBuffer::with_capacity(4);
        assert_eq!(scratch.append(|buf| buf.put_u16_le(7)), Ok(2));
        assert!(scratch.append(|buf| buf.put_u32_le(7)).is_err());
        assert_eq!(scratch.as_slice(), &[7, 0]);
        assert_eq!(scratch.remaining(), 2);
    }

    #[test]
    fn fill_keeps_written_bytes() {
        let mut scratch = ScratchBuffer::with_capacity(16);
        let written = scratch
            .fill(8, |window| {
                assert_eq!(window.len(), 8);
                window[..3].copy_from_slice(b"abc");
                3
            })
            .unwrap();
        assert_eq!(written, 3);
        assert_eq!(scratch.as_slice(), b"abc");
    }

    #[test]
    fn fill_clamped_window() {
        let mut scratch = ScratchBuffer::with_capacity(4);
        // short values fit a clamped window
        assert_eq!(scratch.fill(100, |w| {
            w[0] = 1;
            1
        }), Ok(1));
        // a value using the whole clamped window may have been cut
        assert!(scratch.fill(100, |w| w.len()).is_err());
        assert_eq!(scratch.as_slice(), &[1]);
    }

    #[test]
    fn take_resets() {
        let mut scratch = ScratchBuffer::default();
        scratch.reserve_zeroed(3).unwrap();
        assert_eq!(scratch.take().as_ref(), &[0, 0, 0]);
        assert!(scratch.is_empty());
    }
}
