//! Access to the memory syscall arguments point to.
//!
//! Reads are best effort: the encoder turns every failure into a zero-length
//! parameter, so errors here are only logged.

use std::io::IoSliceMut;

use nix::{
    sys::uio::{RemoteIoVec, process_vm_readv},
    unistd::Pid,
};
use thiserror::Error;

/// Reads are split at this boundary so an unmapped page past the end of a
/// string doesn't fail the whole read.
const PAGE_SIZE: u64 = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressSpace {
    User,
    Kernel,
}

#[derive(Error, Debug)]
pub enum ReadError {
    #[error("null pointer")]
    Null,
    #[error("{0:?} memory is not readable from this source")]
    Unsupported(AddressSpace),
    #[error("reading {len} bytes at {addr:#x}")]
    Fault {
        addr: u64,
        len: usize,
        #[source]
        source: nix::Error,
    },
    #[error("short read at {addr:#x}: {read} of {len} bytes")]
    Short { addr: u64, len: usize, read: usize },
}

pub trait MemoryReader {
    /// Fill `buf` with the memory at `addr`. Partial reads are errors.
    fn read(&self, space: AddressSpace, addr: u64, buf: &mut [u8]) -> Result<(), ReadError>;

    /// Read a NUL terminated string into `buf`, returning the number of bytes
    /// written including the terminator. Strings longer than `buf` are cut
    /// and terminated.
    fn read_str(
        &self,
        space: AddressSpace,
        addr: u64,
        buf: &mut [u8],
    ) -> Result<usize, ReadError> {
        let Some(limit) = buf.len().checked_sub(1) else {
            return Ok(0);
        };
        let mut done = 0;
        while done < limit {
            let cursor = addr.checked_add(done as u64).ok_or(ReadError::Null)?;
            let chunk = ((PAGE_SIZE - cursor % PAGE_SIZE) as usize).min(limit - done);
            self.read(space, cursor, &mut buf[done..done + chunk])?;
            if let Some(nul) = buf[done..done + chunk].iter().position(|&b| b == 0) {
                return Ok(done + nul + 1);
            }
            done += chunk;
        }
        buf[limit] = 0;
        Ok(limit + 1)
    }
}

/// A source with nothing to read: every pointer is unavailable.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMemory;

impl MemoryReader for NoMemory {
    fn read(&self, space: AddressSpace, _addr: u64, _buf: &mut [u8]) -> Result<(), ReadError> {
        Err(ReadError::Unsupported(space))
    }
}

/// User memory of a live process, read with `process_vm_readv`.
#[derive(Debug, Clone, Copy)]
pub struct ProcessMemory {
    pid: Pid,
}

impl ProcessMemory {
    pub fn new(pid: Pid) -> Self {
        Self { pid }
    }

    pub fn current() -> Self {
        Self::new(Pid::this())
    }
}

impl MemoryReader for ProcessMemory {
    fn read(&self, space: AddressSpace, addr: u64, buf: &mut [u8]) -> Result<(), ReadError> {
        if space != AddressSpace::User {
            return Err(ReadError::Unsupported(space));
        }
        if addr == 0 {
            return Err(ReadError::Null);
        }
        if buf.is_empty() {
            return Ok(());
        }
        let len = buf.len();
        let remote = [RemoteIoVec {
            base: addr as usize,
            len,
        }];
        let read = process_vm_readv(self.pid, &mut [IoSliceMut::new(buf)], &remote)
            .map_err(|source| ReadError::Fault { addr, len, source })?;
        if read != len {
            return Err(ReadError::Short { addr, len, read });
        }
        Ok(())
    }
}
