//! # Event encoder
//!
//! Producer side of the capture protocol: turns the arguments of an observed
//! syscall into a wire record.
//!
//! A record is staged in a [`ScratchBuffer`] owned by the worker encoding the
//! event. Values are pushed through an [`EventEncoder`], which checks them
//! against the event schema, applies the size limits and reads pointed-to
//! data through a [`MemoryReader`]. Socket payloads can be cut to a dynamic
//! snaplen, decided by looking at ports and at the first bytes of data.
//!
//! ```ignore
//! let mut scratch = ScratchBuffer::default();
//! let mut encoder = EventEncoder::begin(&mut scratch, &settings, &memory, EventType::SOCKET_SENDTO_X, ts, tid)?;
//! encoder.push(ParamValue::I64(sent))?;
//! encoder.push(ParamValue::bytes(&data).with_snaplen(SocketContext::new(local, remote)))?;
//! let record = encoder.finish()?;
//! ```

pub mod encoder;
pub mod memory;
pub mod scratch;
pub mod snaplen;
pub mod sockaddr;

#[cfg(feature = "test-suite")]
pub mod test_suite;

pub use encoder::{
    EncodeError, EventEncoder, Frame, ParamValue, SchemaBug, Source, TruncationPolicy,
};
pub use memory::{AddressSpace, MemoryReader, NoMemory, ProcessMemory, ReadError};
pub use scratch::{BufferFull, ScratchBuffer};
pub use snaplen::{SocketContext, classify, effective_snaplen};
pub use sockaddr::{
    PackError, SocketEndpoint, SocketInfo, UnixEndpoint, UnixPath, pack_addr, pack_tuple,
};
