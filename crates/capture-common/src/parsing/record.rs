//! Consumer side decoding of event records.
//!
//! [`EventRecord::parse`] walks the length-prefix array and builds a
//! bounds-checked view of every parameter. Nothing in the record is trusted:
//! prefix sums are computed with checked arithmetic and compared against the
//! declared total length before any parameter is exposed.

use bytes::Bytes;
use thiserror::Error;

use super::{
    buffer_index::{BufferIndex, IndexError},
    header::{EventHeader, HEADER_SIZE},
    param_type::{ParamType, PrefixWidth},
    schema::{EventSchema, EventType, MAX_EVENT_PARAMS},
    sockaddr::{self, AddrError, FdEntry, Sockaddr, Socktuple},
};
use crate::{Tid, time::Timestamp};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("buffer of {len} bytes is too short for a record header")]
    TruncatedHeader { len: usize },
    #[error("record declares {declared} bytes but only {available} are available")]
    TruncatedRecord { declared: u32, available: usize },
    #[error("unknown event type {0}")]
    UnknownEventType(u16),
    #[error("record declares {0} parameters")]
    TooManyParams(u32),
    #[error("parameters span {computed} bytes but record declares {declared}")]
    LengthMismatch { computed: u64, declared: u32 },
    #[error("parameter {index} ({ty}) has length {len}, expected {min}..={max}")]
    ParamOutOfBounds {
        index: usize,
        ty: ParamType,
        len: u32,
        min: u32,
        max: u32,
    },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParamError {
    #[error("parameter {0} not present")]
    Missing(usize),
    #[error("parameter has type {found}, expected {expected}")]
    WrongType {
        expected: &'static str,
        found: ParamType,
    },
    #[error("integer parameter has invalid size {0}")]
    InvalidSize(usize),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Addr(#[from] AddrError),
}

/// Location and type of a single decoded parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamView {
    pub ty: ParamType,
    index: BufferIndex,
}

/// A validated event record.
#[derive(Debug, Clone)]
pub struct EventRecord {
    buffer: Bytes,
    header: EventHeader,
    event_type: EventType,
    params: Vec<ParamView>,
}

/// One parameter, borrowed from its record.
#[derive(Debug, Clone, Copy)]
pub struct Param<'a> {
    pub ty: ParamType,
    pub data: &'a [u8],
}

impl EventRecord {
    /// Decode the record at the start of `buffer`. Bytes past the declared
    /// record length are ignored.
    pub fn parse(buffer: Bytes) -> Result<Self, DecodeError> {
        let header = EventHeader::parse(&buffer).ok_or(DecodeError::TruncatedHeader {
            len: buffer.len(),
        })?;
        let declared = header.len;
        if (declared as usize) > buffer.len() {
            return Err(DecodeError::TruncatedRecord {
                declared,
                available: buffer.len(),
            });
        }
        if (declared as usize) < HEADER_SIZE {
            return Err(DecodeError::LengthMismatch {
                computed: HEADER_SIZE as u64,
                declared,
            });
        }
        let buffer = buffer.slice(..declared as usize);

        let event_type = EventType::from_tag(header.event_type)
            .ok_or(DecodeError::UnknownEventType(header.event_type))?;
        if header.nparams as usize > MAX_EVENT_PARAMS {
            return Err(DecodeError::TooManyParams(header.nparams));
        }
        let schema = event_type.schema();
        let width = schema.prefix_width();
        let prefix_size = width.size();
        let nparams = header.nparams as usize;

        // The prefix array itself must fit the record.
        let payload_start = HEADER_SIZE as u64 + (nparams * prefix_size) as u64;
        if payload_start > declared as u64 {
            return Err(DecodeError::LengthMismatch {
                computed: payload_start,
                declared,
            });
        }

        let lengths: Vec<u32> = buffer[HEADER_SIZE..payload_start as usize]
            .chunks_exact(prefix_size)
            .map(|raw| match width {
                PrefixWidth::Short => u16::from_le_bytes([raw[0], raw[1]]) as u32,
                PrefixWidth::Large => u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]),
            })
            .collect();

        let computed = lengths
            .iter()
            .fold(payload_start, |acc, len| acc + *len as u64);
        if computed != declared as u64 {
            return Err(DecodeError::LengthMismatch { computed, declared });
        }

        // Newer producers may append parameters we don't know about, older
        // ones may send fewer: only the common prefix is decoded.
        let decoded = nparams.min(schema.nparams());
        let mut params = Vec::with_capacity(decoded);
        let mut offset = payload_start as u32;
        for (index, (info, len)) in schema.params.iter().zip(&lengths).enumerate() {
            let (min, max) = info.ty.bounds(width);
            if *len != 0 && (*len < min || *len > max) {
                return Err(DecodeError::ParamOutOfBounds {
                    index,
                    ty: info.ty,
                    len: *len,
                    min,
                    max,
                });
            }
            params.push(ParamView {
                ty: info.ty,
                index: BufferIndex::new(offset, *len),
            });
            offset += len;
        }

        Ok(Self {
            buffer,
            header,
            event_type,
            params,
        })
    }

    pub fn header(&self) -> &EventHeader {
        &self.header
    }

    pub fn timestamp(&self) -> Timestamp {
        self.header.ts
    }

    pub fn tid(&self) -> Tid {
        self.header.tid
    }

    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    pub fn schema(&self) -> EventSchema {
        self.event_type.schema()
    }

    /// Number of decoded parameters.
    pub fn nparams(&self) -> usize {
        self.params.len()
    }

    /// Raw bytes of the whole record.
    pub fn as_bytes(&self) -> &Bytes {
        &self.buffer
    }

    pub fn param(&self, index: usize) -> Result<Param<'_>, ParamError> {
        let view = self.params.get(index).ok_or(ParamError::Missing(index))?;
        Ok(Param {
            ty: view.ty,
            data: view.index.bytes(&self.buffer)?,
        })
    }

    /// Parameters in declared order.
    pub fn params(&self) -> impl Iterator<Item = Param<'_>> {
        // Views were validated against the record length in `parse`.
        self.params.iter().filter_map(|view| {
            view.index.bytes(&self.buffer).ok().map(|data| Param {
                ty: view.ty,
                data,
            })
        })
    }
}

impl<'a> Param<'a> {
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn expect(&self, ok: bool, expected: &'static str) -> Result<(), ParamError> {
        if ok {
            Ok(())
        } else {
            Err(ParamError::WrongType {
                expected,
                found: self.ty,
            })
        }
    }

    /// Zero-extended integer value, `None` if the parameter is empty.
    pub fn as_u64(&self) -> Result<Option<u64>, ParamError> {
        self.expect(!self.ty.is_variable(), "integer")?;
        let mut raw = [0; 8];
        match self.data.len() {
            0 => return Ok(None),
            len @ (1 | 2 | 4 | 8) => raw[..len].copy_from_slice(self.data),
            len => return Err(ParamError::InvalidSize(len)),
        }
        Ok(Some(u64::from_le_bytes(raw)))
    }

    /// Sign-extended integer value, `None` if the parameter is empty.
    pub fn as_i64(&self) -> Result<Option<i64>, ParamError> {
        Ok(self.as_u64()?.map(|value| {
            let bits = self.data.len() as u32 * 8;
            let shift = 64 - bits;
            ((value << shift) as i64) >> shift
        }))
    }

    /// Variant index and raw value of a dynamically typed parameter, `None`
    /// if the parameter is empty.
    pub fn as_dyn(&self) -> Result<Option<(u8, &'a [u8])>, ParamError> {
        self.expect(self.ty == ParamType::Dyn, "dyn")?;
        Ok(self.data.split_first().map(|(index, value)| (*index, value)))
    }

    /// String value without the terminating NUL.
    pub fn as_str(&self) -> Result<&'a str, ParamError> {
        self.expect(self.ty.is_string(), "string")?;
        let data = match self.data.iter().position(|c| *c == 0) {
            Some(nul) => &self.data[..nul],
            None => self.data,
        };
        std::str::from_utf8(data).map_err(|error| {
            ParamError::Index(IndexError::NotAString {
                error,
                bytes: data.to_vec(),
            })
        })
    }

    pub fn as_sockaddr(&self) -> Result<Option<Sockaddr>, ParamError> {
        self.expect(self.ty == ParamType::Sockaddr, "sockaddr")?;
        Ok(sockaddr::parse_sockaddr(self.data)?)
    }

    pub fn as_socktuple(&self) -> Result<Option<Socktuple>, ParamError> {
        self.expect(self.ty == ParamType::Socktuple, "socktuple")?;
        Ok(sockaddr::parse_socktuple(self.data)?)
    }

    pub fn as_fdlist(&self) -> Result<Vec<FdEntry>, ParamError> {
        self.expect(self.ty == ParamType::Fdlist, "fdlist")?;
        Ok(sockaddr::parse_fdlist(self.data)?)
    }
}

/// Iterates over a buffer holding several concatenated records.
///
/// A record with a valid header and an in-bounds length is skipped when it
/// fails to decode, since the next boundary is still known. Iteration stops
/// on a truncated record or a declared length shorter than the header.
pub struct RecordReader {
    buffer: Bytes,
    stopped: bool,
}

impl RecordReader {
    pub fn new(buffer: Bytes) -> Self {
        Self {
            buffer,
            stopped: false,
        }
    }

    /// Bytes not consumed yet.
    pub fn remaining(&self) -> usize {
        self.buffer.len()
    }

    /// True once a record boundary was lost. The unconsumed bytes are left
    /// in the buffer.
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Declared length of the record at the head of the buffer, if it can be
    /// used to reach the next record.
    fn next_boundary(&self) -> Option<usize> {
        let header = EventHeader::parse(&self.buffer)?;
        let len = header.len as usize;
        (HEADER_SIZE..=self.buffer.len()).contains(&len).then_some(len)
    }
}

impl Iterator for RecordReader {
    type Item = Result<EventRecord, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.stopped || self.buffer.is_empty() {
            return None;
        }
        match EventRecord::parse(self.buffer.clone()) {
            Ok(record) => {
                let _ = self.buffer.split_to(record.buffer.len());
                Some(Ok(record))
            }
            Err(err) => {
                match self.next_boundary() {
                    Some(len) => {
                        let _ = self.buffer.split_to(len);
                    }
                    None => self.stopped = true,
                }
                Some(Err(err))
            }
        }
    }
}
