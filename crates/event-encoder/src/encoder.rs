//! Serialization of one event into a wire record.
//!
//! An [`EventEncoder`] owns the scratch buffer for the duration of one event.
//! Parameters are pushed in schema order; each push writes the value after
//! the previous one and patches its slot in the length prefix array.
//!
//! Failures fall in three groups:
//! - unreadable values are never errors, they are encoded with length 0;
//! - capacity errors abort the event: later pushes fail and the caller picks
//!   a [`TruncationPolicy`];
//! - pushing a value the schema doesn't expect is a bug in the caller. Debug
//!   builds panic, release builds log and return [`EncodeError::Bug`].

use bytes::{BufMut, Bytes};
use capture_common::{
    CaptureSettings, Tid,
    consts::{DPI_LOOKAHEAD_SIZE, MAX_ARG_SIZE},
    parsing::{
        EventHeader, EventSchema, EventType, HEADER_SIZE, ParamType, PrefixWidth,
        sockaddr::FdEntry,
    },
    time::Timestamp,
};
use thiserror::Error;

use crate::{
    memory::{AddressSpace, MemoryReader, ReadError},
    scratch::{BufferFull, ScratchBuffer},
    snaplen::{SocketContext, effective_snaplen},
    sockaddr::{SocketEndpoint, SocketInfo, pack_addr, pack_tuple},
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error(transparent)]
    BufferFull(#[from] BufferFull),
    #[error("parameter of {len} bytes exceeds the size limit")]
    FrameFull { len: usize },
    #[error("event encoding aborted by a previous capacity error")]
    Aborted,
    #[error("{event}: {pushed} of {expected} parameters encoded")]
    Incomplete {
        event: EventType,
        pushed: usize,
        expected: usize,
    },
    #[error("schema mismatch: {0}")]
    Bug(#[from] SchemaBug),
}

/// Disagreement between an event schema and the values pushed for it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaBug {
    #[error("{event} has no parameter {index}")]
    IndexOutOfRange { event: EventType, index: usize },
    #[error("{event} parameter {index} is {expected}, got a {found} value")]
    TypeMismatch {
        event: EventType,
        index: usize,
        expected: ParamType,
        found: &'static str,
    },
}

/// Where the bytes of a string or buffer come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source<'a> {
    /// Data already available to the producer.
    Slice(&'a [u8]),
    /// A pointer into user or kernel memory.
    Memory { space: AddressSpace, addr: u64 },
    Null,
}

impl Source<'_> {
    pub fn user(addr: u64) -> Self {
        Self::Memory {
            space: AddressSpace::User,
            addr,
        }
    }

    pub fn kernel(addr: u64) -> Self {
        Self::Memory {
            space: AddressSpace::Kernel,
            addr,
        }
    }

    fn is_null(&self) -> bool {
        matches!(self, Source::Null | Source::Memory { addr: 0, .. })
    }

    /// Fill `buf` completely, or fail.
    fn read<M: MemoryReader + ?Sized>(&self, memory: &M, buf: &mut [u8]) -> Result<(), ReadError> {
        match self {
            Source::Slice(data) => {
                let src = data.get(..buf.len()).ok_or(ReadError::Short {
                    addr: 0,
                    len: buf.len(),
                    read: data.len(),
                })?;
                buf.copy_from_slice(src);
                Ok(())
            }
            Source::Memory { space, addr } => memory.read(*space, *addr, buf),
            Source::Null => Err(ReadError::Null),
        }
    }
}

impl<'a> From<&'a [u8]> for Source<'a> {
    fn from(data: &'a [u8]) -> Self {
        Source::Slice(data)
    }
}

impl<'a> From<&'a str> for Source<'a> {
    fn from(data: &'a str) -> Self {
        Source::Slice(data.as_bytes())
    }
}

/// A parameter value, before encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamValue<'a> {
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    /// NUL terminated string, cut at `MAX_ARG_SIZE` bytes.
    Str(Source<'a>),
    /// `len` bytes of opaque data. With a socket context the dynamic snaplen
    /// is applied.
    Bytes {
        source: Source<'a>,
        len: u32,
        snaplen: Option<SocketContext>,
    },
    /// Explicitly absent value, encoded with length 0.
    Empty,
}

impl<'a> ParamValue<'a> {
    pub fn str(value: &'a str) -> Self {
        ParamValue::Str(value.into())
    }

    pub fn bytes(data: &'a [u8]) -> Self {
        ParamValue::Bytes {
            source: Source::Slice(data),
            len: u32::try_from(data.len()).unwrap_or(u32::MAX),
            snaplen: None,
        }
    }

    /// Apply the dynamic snaplen to a byte buffer. Other values are returned
    /// unchanged.
    pub fn with_snaplen(self, ctx: SocketContext) -> Self {
        match self {
            ParamValue::Bytes { source, len, .. } => ParamValue::Bytes {
                source,
                len,
                snaplen: Some(ctx),
            },
            value => value,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ParamValue::I8(_) => "i8",
            ParamValue::I16(_) => "i16",
            ParamValue::I32(_) => "i32",
            ParamValue::I64(_) => "i64",
            ParamValue::U8(_) => "u8",
            ParamValue::U16(_) => "u16",
            ParamValue::U32(_) => "u32",
            ParamValue::U64(_) => "u64",
            ParamValue::Str(_) => "string",
            ParamValue::Bytes { .. } => "bytes",
            ParamValue::Empty => "empty",
        }
    }

    /// Whether this value can be stored in a parameter of type `ty`.
    fn accepts(&self, ty: ParamType) -> bool {
        use ParamType::*;
        match self {
            ParamValue::I8(_) => ty == Int8,
            ParamValue::I16(_) => ty == Int16,
            ParamValue::I32(_) => ty == Int32,
            ParamValue::I64(_) => matches!(ty, Int64 | Errno | Fd | Pid),
            ParamValue::U8(_) => matches!(ty, Uint8 | Flags8 | Enumflags8 | Sigtype),
            ParamValue::U16(_) => matches!(ty, Uint16 | Flags16 | Enumflags16 | Syscallid),
            ParamValue::U32(_) => {
                matches!(ty, Uint32 | Flags32 | Enumflags32 | Uid | Gid | Mode | Sigset)
            }
            ParamValue::U64(_) => matches!(ty, Uint64 | Reltime | Abstime),
            ParamValue::Str(_) => ty.is_string(),
            ParamValue::Bytes { .. } => matches!(ty, Bytebuf | Charbufarray),
            ParamValue::Empty => true,
        }
    }
}

/// What to do with an event whose encoding was cut short.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TruncationPolicy {
    #[default]
    Drop,
    /// Emit the record, with every missing parameter empty.
    EmitPartial,
}

/// An encoded record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub bytes: Bytes,
    /// Some parameters were not encoded and are empty.
    pub truncated: bool,
}

pub struct EventEncoder<'a, M: MemoryReader + ?Sized> {
    scratch: &'a mut ScratchBuffer,
    settings: &'a CaptureSettings,
    memory: &'a M,
    event_type: EventType,
    schema: EventSchema,
    width: PrefixWidth,
    ts: Timestamp,
    tid: Tid,
    next: usize,
    dyn_index: Option<u8>,
    aborted: bool,
}

impl<'a, M: MemoryReader + ?Sized> EventEncoder<'a, M> {
    /// Start a new record, reserving its header and length prefixes.
    pub fn begin(
        scratch: &'a mut ScratchBuffer,
        settings: &'a CaptureSettings,
        memory: &'a M,
        event_type: EventType,
        ts: Timestamp,
        tid: Tid,
    ) -> Result<Self, EncodeError> {
        let schema = event_type.schema();
        let width = schema.prefix_width();
        scratch.clear();
        scratch.reserve_zeroed(HEADER_SIZE + schema.nparams() * width.size())?;
        Ok(Self {
            scratch,
            settings,
            memory,
            event_type,
            schema,
            width,
            ts,
            tid,
            next: 0,
            dyn_index: None,
            aborted: false,
        })
    }

    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    /// Number of parameters pushed so far.
    pub fn pushed(&self) -> usize {
        self.next
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    /// Prefix the next value with a dynamic type index.
    pub fn with_dyn_index(&mut self, index: u8) -> &mut Self {
        self.dyn_index = Some(index);
        self
    }

    /// Encode the next parameter, returning its encoded length.
    pub fn push(&mut self, value: ParamValue<'_>) -> Result<u32, EncodeError> {
        self.encode(value.kind(), |ty| value.accepts(ty), |encoder| {
            encoder.write_value(value)
        })
    }

    /// Encode the next parameter as absent.
    pub fn push_empty(&mut self) -> Result<u32, EncodeError> {
        self.push(ParamValue::Empty)
    }

    /// Render a socket address. `None` encodes an absent address.
    pub fn push_sockaddr(&mut self, addr: Option<&SocketEndpoint>) -> Result<u32, EncodeError> {
        self.encode("sockaddr", |ty| ty == ParamType::Sockaddr, |encoder| {
            if let Some(addr) = addr {
                encoder.scratch.append(|buf| {
                    pack_addr(addr, buf);
                })?;
            }
            Ok(())
        })
    }

    /// Render the tuple of a socket. `None` encodes an absent tuple, as for
    /// sockets without a peer.
    pub fn push_socktuple(
        &mut self,
        sock: Option<&SocketInfo>,
        user_addr: Option<&SocketEndpoint>,
        inbound: bool,
    ) -> Result<u32, EncodeError> {
        self.encode("socktuple", |ty| ty == ParamType::Socktuple, |encoder| {
            let Some(sock) = sock else {
                return Ok(());
            };
            let mut packed = Ok(0);
            encoder.scratch.append(|buf| {
                packed = pack_tuple(sock, user_addr, inbound, buf);
            })?;
            if let Err(err) = packed {
                log::debug!("empty tuple: {err}");
            }
            Ok(())
        })
    }

    /// Render a list of file descriptors. `None` encodes an absent list.
    pub fn push_fdlist(&mut self, fds: Option<&[FdEntry]>) -> Result<u32, EncodeError> {
        self.encode("fdlist", |ty| ty == ParamType::Fdlist, |encoder| {
            let Some(fds) = fds else {
                return Ok(());
            };
            let fds = &fds[..fds.len().min(u16::MAX as usize)];
            encoder.scratch.append(|buf| {
                buf.put_u16_le(fds.len() as u16);
                for entry in fds {
                    buf.put_i64_le(entry.fd);
                    buf.put_u16_le(entry.flags);
                }
            })?;
            Ok(())
        })
    }

    /// Seal the record. Every parameter of the schema must have been pushed.
    pub fn finish(self) -> Result<Bytes, EncodeError> {
        if self.aborted {
            return Err(EncodeError::Aborted);
        }
        if self.next != self.schema.nparams() {
            return Err(EncodeError::Incomplete {
                event: self.event_type,
                pushed: self.next,
                expected: self.schema.nparams(),
            });
        }
        self.seal()
    }

    /// Seal the record, applying `policy` if it's incomplete.
    ///
    /// Returns `None` when the record is dropped.
    pub fn finish_with(self, policy: TruncationPolicy) -> Result<Option<Frame>, EncodeError> {
        let truncated = self.aborted || self.next < self.schema.nparams();
        if truncated && policy == TruncationPolicy::Drop {
            log::debug!(
                "dropping {}: {} of {} parameters encoded",
                self.event_type,
                self.next,
                self.schema.nparams()
            );
            return Ok(None);
        }
        // Prefixes of missing parameters were reserved as zeros.
        let bytes = self.seal()?;
        Ok(Some(Frame { bytes, truncated }))
    }

    fn seal(self) -> Result<Bytes, EncodeError> {
        let header = EventHeader {
            ts: self.ts,
            tid: self.tid,
            len: self.scratch.len() as u32,
            event_type: self.event_type.tag(),
            nparams: self.schema.nparams() as u32,
        };
        self.scratch.write(0, &header.to_bytes())?;
        Ok(self.scratch.take())
    }

    fn bug(&self, bug: SchemaBug) -> EncodeError {
        log::error!("schema mismatch: {bug}");
        if cfg!(debug_assertions) {
            panic!("schema mismatch: {bug}");
        }
        EncodeError::Bug(bug)
    }

    fn encode(
        &mut self,
        found: &'static str,
        accepts: impl FnOnce(ParamType) -> bool,
        write: impl FnOnce(&mut Self) -> Result<(), EncodeError>,
    ) -> Result<u32, EncodeError> {
        if self.aborted {
            return Err(EncodeError::Aborted);
        }
        let index = self.next;
        let Some(info) = self.schema.params.get(index) else {
            return Err(self.bug(SchemaBug::IndexOutOfRange {
                event: self.event_type,
                index,
            }));
        };
        if info.ty != ParamType::Dyn && !accepts(info.ty) {
            return Err(self.bug(SchemaBug::TypeMismatch {
                event: self.event_type,
                index,
                expected: info.ty,
                found,
            }));
        }

        let mark = self.scratch.len();
        let written = match self.dyn_index.take() {
            Some(dyn_index) => self
                .scratch
                .append(|buf| buf.put_u8(dyn_index))
                .map_err(EncodeError::from)
                .and_then(|_| write(self)),
            None => write(self),
        };
        let len = self.scratch.len() - mark;
        let written = written.and_then(|()| {
            if len > MAX_ARG_SIZE as usize {
                Err(EncodeError::FrameFull { len })
            } else {
                Ok(())
            }
        });
        if let Err(err) = written {
            log::debug!("{} parameter {index}: {err}", self.event_type);
            self.scratch.truncate(mark);
            self.aborted = true;
            return Err(err);
        }

        let prefix = HEADER_SIZE + index * self.width.size();
        match self.width {
            PrefixWidth::Short => self.scratch.write(prefix, &(len as u16).to_le_bytes())?,
            PrefixWidth::Large => self.scratch.write(prefix, &(len as u32).to_le_bytes())?,
        }
        self.next += 1;
        Ok(len as u32)
    }

    fn write_value(&mut self, value: ParamValue<'_>) -> Result<(), EncodeError> {
        let appended = match value {
            ParamValue::I8(v) => self.scratch.append(|buf| buf.put_i8(v)),
            ParamValue::I16(v) => self.scratch.append(|buf| buf.put_i16_le(v)),
            ParamValue::I32(v) => self.scratch.append(|buf| buf.put_i32_le(v)),
            ParamValue::I64(v) => self.scratch.append(|buf| buf.put_i64_le(v)),
            ParamValue::U8(v) => self.scratch.append(|buf| buf.put_u8(v)),
            ParamValue::U16(v) => self.scratch.append(|buf| buf.put_u16_le(v)),
            ParamValue::U32(v) => self.scratch.append(|buf| buf.put_u32_le(v)),
            ParamValue::U64(v) => self.scratch.append(|buf| buf.put_u64_le(v)),
            ParamValue::Str(source) => self.write_str(source),
            ParamValue::Bytes {
                source,
                len,
                snaplen,
            } => self.write_bytes(source, len, snaplen),
            ParamValue::Empty => Ok(0),
        };
        appended.map(|_| ()).map_err(EncodeError::from)
    }

    fn write_str(&mut self, source: Source<'_>) -> Result<usize, BufferFull> {
        let max = MAX_ARG_SIZE as usize;
        match source {
            _ if source.is_null() => Ok(0),
            Source::Slice(data) => {
                let end = data.iter().position(|c| *c == 0).unwrap_or(data.len());
                let data = &data[..end.min(max - 1)];
                self.scratch.append(|buf| {
                    buf.put_slice(data);
                    buf.put_u8(0);
                })
            }
            Source::Memory { space, addr } => {
                let memory = self.memory;
                self.scratch.fill(max, |window| {
                    memory.read_str(space, addr, window).unwrap_or_else(|err| {
                        log::trace!("unreadable string: {err}");
                        0
                    })
                })
            }
            Source::Null => Ok(0),
        }
    }

    fn write_bytes(
        &mut self,
        source: Source<'_>,
        len: u32,
        snaplen: Option<SocketContext>,
    ) -> Result<usize, BufferFull> {
        if source.is_null() || len == 0 {
            return Ok(0);
        }
        let mut len = len;

        if let Some(ctx) = snaplen {
            let mut lookahead = [0; DPI_LOOKAHEAD_SIZE];
            let lookahead = &mut lookahead[..(len as usize).min(DPI_LOOKAHEAD_SIZE)];
            if let Err(err) = source.read(self.memory, lookahead) {
                log::trace!("unreadable buffer: {err}");
                return Ok(0);
            }
            len = len.min(effective_snaplen(self.settings, ctx, lookahead));
        }
        let len = len.min(MAX_ARG_SIZE) as usize;

        if self.scratch.remaining() < len {
            return Err(BufferFull {
                needed: self.scratch.len() + len,
                capacity: self.scratch.capacity(),
            });
        }
        let memory = self.memory;
        self.scratch.fill(len, |window| match source.read(memory, window) {
            Ok(()) => window.len(),
            Err(err) => {
                log::trace!("unreadable buffer: {err}");
                0
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use capture_common::{
        consts::{SNAPLEN, SNAPLEN_EXTENDED},
        parsing::{EventRecord, Param, sockaddr::Socktuple},
    };
    use strum::IntoEnumIterator;

    use super::*;
    use crate::memory::NoMemory;

    const TS: u64 = 1_700_000_000_000_000_000;

    fn encoder<'a>(
        scratch: &'a mut ScratchBuffer,
        settings: &'a CaptureSettings,
        event_type: EventType,
    ) -> EventEncoder<'a, NoMemory> {
        EventEncoder::begin(scratch, settings, &NoMemory, event_type, TS.into(), Tid::from_raw(42))
            .unwrap()
    }

    /// A single mapped page starting with a string.
    struct OneString;

    const STRING_ADDR: u64 = 0x7000;

    impl MemoryReader for OneString {
        fn read(&self, _space: AddressSpace, addr: u64, buf: &mut [u8]) -> Result<(), ReadError> {
            let mut page = vec![0; 4096];
            page[..13].copy_from_slice(b"/usr/bin/cat\0");
            let start = addr.checked_sub(STRING_ADDR).ok_or(ReadError::Null)? as usize;
            let src = page.get(start..start + buf.len()).ok_or(ReadError::Null)?;
            buf.copy_from_slice(src);
            Ok(())
        }
    }

    #[test]
    fn connect_exit() {
        let mut scratch = ScratchBuffer::default();
        let settings = CaptureSettings::default();
        let sock = SocketInfo {
            local: SocketEndpoint::V4("10.0.0.1:40000".parse().unwrap()),
            peer: Some(SocketEndpoint::V4("10.0.0.2:443".parse().unwrap())),
        };
        let mut enc = encoder(&mut scratch, &settings, EventType::SOCKET_CONNECT_X);
        assert_eq!(enc.push(ParamValue::I64(0)).unwrap(), 8);
        assert_eq!(enc.push_socktuple(Some(&sock), None, false).unwrap(), 13);
        assert_eq!(enc.push(ParamValue::I64(3)).unwrap(), 8);
        let bytes = enc.finish().unwrap();

        assert_eq!(bytes.len(), HEADER_SIZE + 3 * 2 + 8 + 13 + 8);
        let record = EventRecord::parse(bytes).unwrap();
        assert_eq!(record.tid(), Tid::from_raw(42));
        assert_eq!(record.timestamp().raw(), TS);
        assert_eq!(record.event_type(), EventType::SOCKET_CONNECT_X);
        assert_eq!(record.param(0).unwrap().as_i64().unwrap(), Some(0));
        assert_eq!(
            record.param(1).unwrap().as_socktuple().unwrap(),
            Some(Socktuple::Inet {
                source: "10.0.0.1:40000".parse().unwrap(),
                dest: "10.0.0.2:443".parse().unwrap(),
            })
        );
        assert_eq!(record.param(2).unwrap().as_i64().unwrap(), Some(3));
    }

    #[test]
    fn strings() {
        let mut scratch = ScratchBuffer::default();
        let settings = CaptureSettings::default();
        let mut enc = EventEncoder::begin(
            &mut scratch,
            &settings,
            &OneString,
            EventType::SYSCALL_EXECVEAT_E,
            TS.into(),
            Tid::from_raw(1),
        )
        .unwrap();
        enc.push(ParamValue::I64(-100)).unwrap();
        assert_eq!(enc.push(ParamValue::Str(Source::user(STRING_ADDR))).unwrap(), 13);
        enc.push(ParamValue::U32(0)).unwrap();
        let record = EventRecord::parse(enc.finish().unwrap()).unwrap();
        assert_eq!(record.param(1).unwrap().as_str().unwrap(), "/usr/bin/cat");

        let mut enc = encoder(&mut scratch, &settings, EventType::SYSCALL_EXECVE_19_E);
        // an empty string keeps its terminator
        assert_eq!(enc.push(ParamValue::str("")).unwrap(), 1);
        let mut enc = encoder(&mut scratch, &settings, EventType::SYSCALL_EXECVE_19_E);
        assert_eq!(enc.push(ParamValue::str("ab\0cd")).unwrap(), 3);
        let mut enc = encoder(&mut scratch, &settings, EventType::SYSCALL_EXECVE_19_E);
        assert_eq!(enc.push(ParamValue::Str(Source::Null)).unwrap(), 0);
        let mut enc = encoder(&mut scratch, &settings, EventType::SYSCALL_EXECVE_19_E);
        // unreadable memory
        assert_eq!(enc.push(ParamValue::Str(Source::user(0x1234))).unwrap(), 0);
    }

    #[test]
    fn long_strings_are_cut() {
        let mut scratch = ScratchBuffer::default();
        let settings = CaptureSettings::default();
        let long = "x".repeat(100_000);
        let mut enc = encoder(&mut scratch, &settings, EventType::SYSCALL_EXECVE_19_E);
        assert_eq!(enc.push(ParamValue::str(&long)).unwrap(), MAX_ARG_SIZE);
        let record = EventRecord::parse(enc.finish().unwrap()).unwrap();
        assert_eq!(
            record.param(0).unwrap().as_str().unwrap().len(),
            MAX_ARG_SIZE as usize - 1
        );
    }

    #[test]
    fn byte_buffer_capped_at_max_arg_size() {
        let mut scratch = ScratchBuffer::default();
        let settings = CaptureSettings::default();
        let data = vec![0xab; 70_000];
        let mut enc = encoder(&mut scratch, &settings, EventType::SOCKET_SENDTO_X);
        enc.push(ParamValue::I64(70_000)).unwrap();
        assert_eq!(enc.push(ParamValue::bytes(&data)).unwrap(), MAX_ARG_SIZE);
        let record = EventRecord::parse(enc.finish().unwrap()).unwrap();
        assert_eq!(record.param(1).unwrap().data, &data[..MAX_ARG_SIZE as usize]);
    }

    #[test]
    fn byte_buffer_snaplen() {
        let mut scratch = ScratchBuffer::default();
        let mut settings = CaptureSettings::default();
        let mut request = b"GET / HTTP/1.1\r\n".to_vec();
        request.resize(3000, b'a');
        let ctx = SocketContext::new(40000, 80);

        let mut enc = encoder(&mut scratch, &settings, EventType::SOCKET_SENDTO_X);
        enc.push(ParamValue::I64(3000)).unwrap();
        let len = enc.push(ParamValue::bytes(&request).with_snaplen(ctx)).unwrap();
        assert_eq!(len, SNAPLEN);

        settings.dynamic_snaplen = true;
        let mut enc = encoder(&mut scratch, &settings, EventType::SOCKET_SENDTO_X);
        enc.push(ParamValue::I64(3000)).unwrap();
        let len = enc.push(ParamValue::bytes(&request).with_snaplen(ctx)).unwrap();
        assert_eq!(len, SNAPLEN_EXTENDED);
        let record = EventRecord::parse(enc.finish().unwrap()).unwrap();
        assert_eq!(record.param(1).unwrap().data, &request[..SNAPLEN_EXTENDED as usize]);
    }

    #[test]
    fn unreadable_buffers_are_empty() {
        let mut scratch = ScratchBuffer::default();
        let settings = CaptureSettings::default();
        let mut enc = encoder(&mut scratch, &settings, EventType::SOCKET_SENDTO_X);
        enc.push(ParamValue::I64(10)).unwrap();
        // a slice shorter than the declared length is a failed read
        let short = ParamValue::Bytes {
            source: Source::Slice(b"abc"),
            len: 10,
            snaplen: None,
        };
        assert_eq!(enc.push(short).unwrap(), 0);

        let mut enc = encoder(&mut scratch, &settings, EventType::SOCKET_SENDTO_X);
        enc.push(ParamValue::I64(10)).unwrap();
        let unmapped = ParamValue::Bytes {
            source: Source::user(0x1000),
            len: 10,
            snaplen: Some(SocketContext::new(1, 2)),
        };
        assert_eq!(enc.push(unmapped).unwrap(), 0);
        assert!(enc.finish().is_ok());
    }

    #[test]
    fn fdlist_and_sockaddr() {
        let mut scratch = ScratchBuffer::default();
        let settings = CaptureSettings::default();
        let fds = [FdEntry { fd: 3, flags: 1 }, FdEntry { fd: 7, flags: 4 }];
        let mut enc = encoder(&mut scratch, &settings, EventType::SYSCALL_POLL_E);
        assert_eq!(enc.push_fdlist(Some(&fds)).unwrap(), 2 + 2 * 10);
        enc.push(ParamValue::I64(-1)).unwrap();
        let record = EventRecord::parse(enc.finish().unwrap()).unwrap();
        assert_eq!(record.param(0).unwrap().as_fdlist().unwrap(), fds.to_vec());

        let addr = SocketEndpoint::V4("127.0.0.1:8080".parse().unwrap());
        let mut enc = encoder(&mut scratch, &settings, EventType::SOCKET_CONNECT_E);
        enc.push(ParamValue::I64(5)).unwrap();
        assert_eq!(enc.push_sockaddr(Some(&addr)).unwrap(), 7);
        enc.finish().unwrap();

        let mut enc = encoder(&mut scratch, &settings, EventType::SOCKET_CONNECT_X);
        enc.push(ParamValue::I64(-111)).unwrap();
        assert_eq!(enc.push_socktuple(None, None, false).unwrap(), 0);
    }

    #[test]
    fn large_payload_prefixes() {
        let mut scratch = ScratchBuffer::default();
        let settings = CaptureSettings::default();
        let mut enc = encoder(&mut scratch, &settings, EventType::ASYNCEVENT_E);
        enc.push(ParamValue::U32(2)).unwrap();
        enc.push(ParamValue::str("container")).unwrap();
        enc.push(ParamValue::bytes(b"{}")).unwrap();
        let bytes = enc.finish().unwrap();
        let prefixes = &bytes[HEADER_SIZE..HEADER_SIZE + 12];
        assert_eq!(prefixes, &[4, 0, 0, 0, 10, 0, 0, 0, 2, 0, 0, 0]);
        let record = EventRecord::parse(bytes).unwrap();
        assert_eq!(record.param(1).unwrap().as_str().unwrap(), "container");
    }

    #[test]
    fn dyn_index_counts_against_the_limit() {
        let mut scratch = ScratchBuffer::default();
        let settings = CaptureSettings::default();
        let mut enc = encoder(&mut scratch, &settings, EventType::ASYNCEVENT_E);
        assert_eq!(enc.with_dyn_index(1).push(ParamValue::U32(2)).unwrap(), 5);
        enc.push(ParamValue::str("x")).unwrap();
        let data = vec![0; MAX_ARG_SIZE as usize];
        let err = enc.with_dyn_index(0).push(ParamValue::bytes(&data)).unwrap_err();
        assert_eq!(err, EncodeError::FrameFull {
            len: MAX_ARG_SIZE as usize + 1
        });
        assert!(enc.is_aborted());
    }

    #[test]
    fn buffer_full_aborts_the_event() {
        let settings = CaptureSettings::default();
        let reserved = HEADER_SIZE + 2 * 2;
        let mut scratch = ScratchBuffer::with_capacity(reserved + 8 + 4);
        let mut enc = encoder(&mut scratch, &settings, EventType::SOCKET_SENDTO_X);
        enc.push(ParamValue::I64(16)).unwrap();
        assert!(matches!(
            enc.push(ParamValue::bytes(&[1; 16])),
            Err(EncodeError::BufferFull(_))
        ));
        assert_eq!(enc.push_empty(), Err(EncodeError::Aborted));
        assert_eq!(enc.finish(), Err(EncodeError::Aborted));

        let mut enc = encoder(&mut scratch, &settings, EventType::SOCKET_SENDTO_X);
        enc.push(ParamValue::I64(16)).unwrap();
        enc.push(ParamValue::bytes(&[1; 16])).unwrap_err();
        assert_eq!(enc.finish_with(TruncationPolicy::Drop), Ok(None));

        let mut enc = encoder(&mut scratch, &settings, EventType::SOCKET_SENDTO_X);
        enc.push(ParamValue::I64(16)).unwrap();
        enc.push(ParamValue::bytes(&[1; 16])).unwrap_err();
        let frame = enc.finish_with(TruncationPolicy::EmitPartial).unwrap().unwrap();
        assert!(frame.truncated);
        let record = EventRecord::parse(frame.bytes).unwrap();
        assert_eq!(record.param(0).unwrap().as_i64().unwrap(), Some(16));
        assert!(record.param(1).unwrap().is_empty());
    }

    #[test]
    fn complete_frames_are_not_truncated() {
        let mut scratch = ScratchBuffer::default();
        let settings = CaptureSettings::default();
        let enc = encoder(&mut scratch, &settings, EventType::SYSCALL_CLONE_20_E);
        let frame = enc.finish_with(TruncationPolicy::Drop).unwrap().unwrap();
        assert!(!frame.truncated);
        assert_eq!(frame.bytes.len(), HEADER_SIZE);
    }

    const DYN_INDEX: u8 = 1;

    /// A value storable in a parameter of type `ty`. Pre-rendered types are
    /// left empty.
    fn sample(ty: ParamType) -> ParamValue<'static> {
        use ParamType::*;
        match ty {
            Int8 => ParamValue::I8(-3),
            Int16 => ParamValue::I16(-300),
            Int32 => ParamValue::I32(-70_000),
            Int64 | Errno | Fd | Pid => ParamValue::I64(-5_000_000_000),
            Uint8 | Flags8 | Enumflags8 | Sigtype => ParamValue::U8(0xfe),
            Uint16 | Flags16 | Enumflags16 | Syscallid => ParamValue::U16(0xfffe),
            Uint32 | Flags32 | Enumflags32 | Uid | Gid | Mode | Sigset => {
                ParamValue::U32(0xffff_fffe)
            }
            Uint64 | Reltime | Abstime => ParamValue::U64(u64::MAX - 1),
            Dyn => ParamValue::U64(0x78),
            Charbuf | Fspath | Fsrelpath => ParamValue::str("/tmp/x"),
            Bytebuf | Charbufarray => ParamValue::bytes(b"\x00\x01\xff"),
            Sockaddr | Socktuple | Fdlist => ParamValue::Empty,
        }
    }

    fn assert_decoded(event: EventType, param: Param<'_>, value: ParamValue<'_>) {
        let ty = param.ty;
        let param = match param.as_dyn() {
            Ok(Some((index, data))) => {
                assert_eq!(index, DYN_INDEX, "{event} {ty}");
                Param {
                    ty: ParamType::Uint64,
                    data,
                }
            }
            _ => param,
        };
        if let Some(size) = param.ty.fixed_size() {
            assert_eq!(param.data.len() as u32, size, "{event} {ty}");
        }
        match value {
            ParamValue::I8(v) => assert_eq!(param.as_i64(), Ok(Some(v.into())), "{event} {ty}"),
            ParamValue::I16(v) => assert_eq!(param.as_i64(), Ok(Some(v.into())), "{event} {ty}"),
            ParamValue::I32(v) => assert_eq!(param.as_i64(), Ok(Some(v.into())), "{event} {ty}"),
            ParamValue::I64(v) => assert_eq!(param.as_i64(), Ok(Some(v)), "{event} {ty}"),
            ParamValue::U8(v) => assert_eq!(param.as_u64(), Ok(Some(v.into())), "{event} {ty}"),
            ParamValue::U16(v) => assert_eq!(param.as_u64(), Ok(Some(v.into())), "{event} {ty}"),
            ParamValue::U32(v) => assert_eq!(param.as_u64(), Ok(Some(v.into())), "{event} {ty}"),
            ParamValue::U64(v) => assert_eq!(param.as_u64(), Ok(Some(v)), "{event} {ty}"),
            ParamValue::Str(_) => assert_eq!(param.as_str(), Ok("/tmp/x"), "{event} {ty}"),
            ParamValue::Bytes { .. } => assert_eq!(param.data, b"\x00\x01\xff", "{event} {ty}"),
            ParamValue::Empty => assert!(param.is_empty(), "{event} {ty}"),
        }
    }

    #[test]
    fn every_schema_param_type_decodes_back() {
        let mut scratch = ScratchBuffer::default();
        let settings = CaptureSettings::default();
        let mut covered = HashSet::new();
        for event in EventType::iter() {
            let params = event.schema().params;
            let mut enc = encoder(&mut scratch, &settings, event);
            for info in params {
                if info.ty == ParamType::Dyn {
                    enc.with_dyn_index(DYN_INDEX);
                }
                enc.push(sample(info.ty)).unwrap();
                covered.insert(info.ty);
            }
            let record = EventRecord::parse(enc.finish().unwrap()).unwrap();
            assert_eq!(record.nparams(), params.len(), "{event}");
            for (index, info) in params.iter().enumerate() {
                let param = record.param(index).unwrap();
                assert_eq!(param.ty, info.ty, "{event}");
                assert_decoded(event, param, sample(info.ty));
            }
        }
        for ty in [
            ParamType::Uint8,
            ParamType::Uint16,
            ParamType::Uint32,
            ParamType::Uint64,
            ParamType::Flags16,
            ParamType::Flags32,
            ParamType::Sigtype,
            ParamType::Syscallid,
            ParamType::Abstime,
            ParamType::Dyn,
        ] {
            assert!(covered.contains(&ty), "{ty} not covered");
        }
    }

    #[test]
    fn unsigned_values_are_not_sign_extended() {
        let mut scratch = ScratchBuffer::default();
        let settings = CaptureSettings::default();
        let mut enc = encoder(&mut scratch, &settings, EventType::PROCEXIT_1_E);
        enc.push(ParamValue::I64(-1)).unwrap();
        enc.push(ParamValue::I64(0)).unwrap();
        enc.push(ParamValue::U8(0xff)).unwrap();
        enc.push(ParamValue::U8(0x80)).unwrap();
        enc.push(ParamValue::I64(1)).unwrap();
        let record = EventRecord::parse(enc.finish().unwrap()).unwrap();
        assert_eq!(record.param(0).unwrap().as_i64(), Ok(Some(-1)));
        assert_eq!(record.param(2).unwrap().as_u64(), Ok(Some(0xff)));
        assert_eq!(record.param(3).unwrap().as_u64(), Ok(Some(0x80)));
        assert_eq!(record.param(3).unwrap().as_i64(), Ok(Some(-128)));
    }

    #[test]
    fn missing_params() {
        let mut scratch = ScratchBuffer::default();
        let settings = CaptureSettings::default();
        let mut enc = encoder(&mut scratch, &settings, EventType::SOCKET_BIND_X);
        enc.push(ParamValue::I64(0)).unwrap();
        assert_eq!(
            enc.finish(),
            Err(EncodeError::Incomplete {
                event: EventType::SOCKET_BIND_X,
                pushed: 1,
                expected: 3
            })
        );
    }

    #[test]
    #[cfg_attr(debug_assertions, should_panic(expected = "schema mismatch"))]
    fn wrong_type_is_a_bug() {
        let mut scratch = ScratchBuffer::default();
        let settings = CaptureSettings::default();
        let mut enc = encoder(&mut scratch, &settings, EventType::SOCKET_BIND_X);
        let err = enc.push(ParamValue::U8(1)).unwrap_err();
        assert!(matches!(err, EncodeError::Bug(SchemaBug::TypeMismatch { .. })));
        // nothing was written
        assert_eq!(enc.pushed(), 0);
    }

    #[test]
    #[cfg_attr(debug_assertions, should_panic(expected = "schema mismatch"))]
    fn too_many_params_is_a_bug() {
        let mut scratch = ScratchBuffer::default();
        let settings = CaptureSettings::default();
        let mut enc = encoder(&mut scratch, &settings, EventType::SOCKET_BIND_E);
        enc.push(ParamValue::I64(3)).unwrap();
        let err = enc.push(ParamValue::I64(4)).unwrap_err();
        assert!(matches!(err, EncodeError::Bug(SchemaBug::IndexOutOfRange { index: 1, .. })));
    }
}
