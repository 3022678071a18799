//! Fixed record header.
//!
//! Layout (packed, little-endian):
//! ```text
//! | ts: u64 | tid: u64 | len: u32 | type: u16 | nparams: u32 |
//! ```
//! followed by `nparams` length prefixes and the parameter payload.

use crate::{Tid, time::Timestamp};

pub const HEADER_SIZE: usize = 26;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventHeader {
    pub ts: Timestamp,
    pub tid: Tid,
    /// Total record length, header included.
    pub len: u32,
    pub event_type: u16,
    pub nparams: u32,
}

impl EventHeader {
    /// Read a header from the start of `buf`, `None` if it's too short.
    pub fn parse(buf: &[u8]) -> Option<Self> {
        let header = buf.get(..HEADER_SIZE)?;
        Some(Self {
            ts: Timestamp::from(u64::from_le_bytes(header[0..8].try_into().ok()?)),
            tid: Tid::from_raw(u64::from_le_bytes(header[8..16].try_into().ok()?)),
            len: u32::from_le_bytes(header[16..20].try_into().ok()?),
            event_type: u16::from_le_bytes(header[20..22].try_into().ok()?),
            nparams: u32::from_le_bytes(header[22..26].try_into().ok()?),
        })
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0; HEADER_SIZE];
        out[0..8].copy_from_slice(&self.ts.raw().to_le_bytes());
        out[8..16].copy_from_slice(&self.tid.as_raw().to_le_bytes());
        out[16..20].copy_from_slice(&self.len.to_le_bytes());
        out[20..22].copy_from_slice(&self.event_type.to_le_bytes());
        out[22..26].copy_from_slice(&self.nparams.to_le_bytes());
        out
    }
}
