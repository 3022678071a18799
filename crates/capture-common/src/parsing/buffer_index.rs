//! `BufferIndex` points to a sub-slice of a record buffer. It allows to refer to
//! variable length parameters without copying them: the actual data is extracted
//! only when paired with the pointed at Bytes.

use bytes::Bytes;
use std::str::{Utf8Error, from_utf8};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferIndex {
    /// Start index of the slice
    start: u32,
    /// Length of the pointed-at slice
    len: u32,
}

impl BufferIndex {
    pub(crate) fn new(start: u32, len: u32) -> Self {
        Self { start, len }
    }

    pub fn start(&self) -> usize {
        self.start as usize
    }

    /// Return length of the pointed at slice
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// Return if the slice is empty
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Given a buffer, try to extract the pointed at slice of bytes.
    /// Returns `Err(IndexError::IndexOutsideBuffer)` when buffer is too short.
    pub fn bytes<'a>(&self, buffer: &'a Bytes) -> Result<&'a [u8], IndexError> {
        let start = self.start as usize;
        let end = start.checked_add(self.len as usize);
        match end {
            Some(end) if end <= buffer.len() => Ok(&buffer[start..end]),
            _ => Err(IndexError::IndexOutsideBuffer {
                start,
                end: end.unwrap_or(usize::MAX),
                len: buffer.len(),
            }),
        }
    }

    /// Try to parse the buffer pointed at as a NUL terminated utf8 string.
    /// Everything from the first NUL on is ignored.
    /// Returns `Err(IndexError::NotAString)` when invalid utf8 characters are encountered.
    pub fn string<'a>(&self, buffer: &'a Bytes) -> Result<&'a str, IndexError> {
        let bytes = self.bytes(buffer)?;
        let bytes = match bytes.iter().position(|c| *c == 0) {
            Some(nul) => &bytes[..nul],
            None => bytes,
        };
        from_utf8(bytes).map_err(|err| IndexError::NotAString {
            error: err,
            bytes: bytes.to_vec(),
        })
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IndexError {
    #[error("Index [{start}-{end}] is out of event buffer (len {len})")]
    IndexOutsideBuffer {
        start: usize,
        end: usize,
        len: usize,
    },
    #[error("Index is not pointing to a valid string. {bytes:?} {error:?}")]
    NotAString {
        #[source]
        error: Utf8Error,
        bytes: Vec<u8>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_bounds() {
        let buffer = Bytes::from_static(b"hello\0");
        assert_eq!(BufferIndex::new(0, 6).bytes(&buffer), Ok(&b"hello\0"[..]));
        assert_eq!(
            BufferIndex::new(4, 6).bytes(&buffer),
            Err(IndexError::IndexOutsideBuffer {
                start: 4,
                end: 10,
                len: 6
            })
        );
        assert!(BufferIndex::new(u32::MAX, u32::MAX).bytes(&buffer).is_err());
    }

    #[test]
    fn strings_stop_at_nul() {
        let buffer = Bytes::from_static(b"bash\0garbage");
        assert_eq!(BufferIndex::new(0, 12).string(&buffer), Ok("bash"));
        assert_eq!(BufferIndex::new(0, 4).string(&buffer), Ok("bash"));
        assert_eq!(BufferIndex::new(0, 0).string(&buffer), Ok(""));
    }

    #[test]
    fn invalid_utf8() {
        let buffer = Bytes::from_static(&[0xff, 0xfe, 0]);
        assert!(matches!(
            BufferIndex::new(0, 3).string(&buffer),
            Err(IndexError::NotAString { .. })
        ));
    }
}
