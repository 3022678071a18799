//! Wire format of socket addresses, socket tuples and fd lists.
//!
//! ```text
//! sockaddr  INET   | family | addr[4]  | port: u16 |
//!           INET6  | family | addr[16] | port: u16 |
//!           UNIX   | family | path..NUL |
//! socktuple INET   | family | saddr[4]  | sport | daddr[4]  | dport |
//!           INET6  | family | saddr[16] | sport | daddr[16] | dport |
//!           UNIX   | family | source: u64 | dest: u64 | path..NUL |
//! fdlist           | count: u16 | (fd: i64, flags: u16) * count |
//! ```
//! Addresses are kept in network order, every other integer is little-endian.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddrV4, SocketAddrV6};

use strum::{Display, FromRepr};
use thiserror::Error;

/// Address family tags used on the wire.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, FromRepr)]
#[repr(u8)]
pub enum SocketFamily {
    Unspec = 0,
    Unix = 1,
    Inet = 2,
    Inet6 = 10,
}

pub const INET_ADDR_SIZE: usize = 1 + 4 + 2;
pub const INET6_ADDR_SIZE: usize = 1 + 16 + 2;
pub const INET_TUPLE_SIZE: usize = 1 + (4 + 2) * 2;
pub const INET6_TUPLE_SIZE: usize = 1 + (16 + 2) * 2;
pub const UNIX_TUPLE_HEADER_SIZE: usize = 1 + 8 + 8;
pub const FDLIST_ENTRY_SIZE: usize = 8 + 2;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddrError {
    #[error("unknown socket family {0}")]
    UnknownFamily(u8),
    #[error("{family} payload has invalid size {size}")]
    InvalidSize { family: SocketFamily, size: usize },
    #[error("fd list declares {count} entries but has {size} bytes")]
    InvalidFdList { count: usize, size: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sockaddr {
    Inet(SocketAddrV4),
    Inet6(SocketAddrV6),
    /// Path bytes, without the terminating NUL.
    Unix(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Socktuple {
    Inet {
        source: SocketAddrV4,
        dest: SocketAddrV4,
    },
    Inet6 {
        source: SocketAddrV6,
        dest: SocketAddrV6,
    },
    Unix {
        /// Kernel identifier of the source socket.
        source: u64,
        /// Kernel identifier of the destination socket.
        dest: u64,
        path: Vec<u8>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FdEntry {
    pub fd: i64,
    pub flags: u16,
}

fn family(buf: &[u8]) -> Result<SocketFamily, AddrError> {
    let tag = buf[0];
    SocketFamily::from_repr(tag).ok_or(AddrError::UnknownFamily(tag))
}

fn le_u16(buf: &[u8]) -> u16 {
    u16::from_le_bytes([buf[0], buf[1]])
}

fn le_u64(buf: &[u8]) -> u64 {
    let mut raw = [0; 8];
    raw.copy_from_slice(&buf[..8]);
    u64::from_le_bytes(raw)
}

fn v4(buf: &[u8]) -> SocketAddrV4 {
    SocketAddrV4::new(Ipv4Addr::new(buf[0], buf[1], buf[2], buf[3]), le_u16(&buf[4..]))
}

fn v6(buf: &[u8]) -> SocketAddrV6 {
    let mut octets = [0; 16];
    octets.copy_from_slice(&buf[..16]);
    SocketAddrV6::new(Ipv6Addr::from(octets), le_u16(&buf[16..]), 0, 0)
}

fn unix_path(buf: &[u8]) -> Vec<u8> {
    let end = buf.iter().position(|c| *c == 0).unwrap_or(buf.len());
    buf[..end].to_vec()
}

/// Decode a sockaddr parameter. An empty payload means "no address".
pub fn parse_sockaddr(buf: &[u8]) -> Result<Option<Sockaddr>, AddrError> {
    if buf.is_empty() {
        return Ok(None);
    }
    let family = family(buf)?;
    let invalid = || AddrError::InvalidSize {
        family,
        size: buf.len(),
    };
    match family {
        SocketFamily::Inet if buf.len() == INET_ADDR_SIZE => Ok(Some(Sockaddr::Inet(v4(&buf[1..])))),
        SocketFamily::Inet6 if buf.len() == INET6_ADDR_SIZE => {
            Ok(Some(Sockaddr::Inet6(v6(&buf[1..]))))
        }
        SocketFamily::Unix => Ok(Some(Sockaddr::Unix(unix_path(&buf[1..])))),
        SocketFamily::Unspec if buf.len() == 1 => Ok(None),
        _ => Err(invalid()),
    }
}

/// Decode a socktuple parameter. An empty payload means "no tuple".
pub fn parse_socktuple(buf: &[u8]) -> Result<Option<Socktuple>, AddrError> {
    if buf.is_empty() {
        return Ok(None);
    }
    let family = family(buf)?;
    let invalid = || AddrError::InvalidSize {
        family,
        size: buf.len(),
    };
    match family {
        SocketFamily::Inet if buf.len() == INET_TUPLE_SIZE => Ok(Some(Socktuple::Inet {
            source: v4(&buf[1..]),
            dest: v4(&buf[7..]),
        })),
        SocketFamily::Inet6 if buf.len() == INET6_TUPLE_SIZE => Ok(Some(Socktuple::Inet6 {
            source: v6(&buf[1..]),
            dest: v6(&buf[19..]),
        })),
        SocketFamily::Unix if buf.len() >= UNIX_TUPLE_HEADER_SIZE => Ok(Some(Socktuple::Unix {
            source: le_u64(&buf[1..]),
            dest: le_u64(&buf[9..]),
            path: unix_path(&buf[UNIX_TUPLE_HEADER_SIZE..]),
        })),
        _ => Err(invalid()),
    }
}

/// Decode an fdlist parameter. An empty payload is an empty list.
pub fn parse_fdlist(buf: &[u8]) -> Result<Vec<FdEntry>, AddrError> {
    if buf.is_empty() {
        return Ok(Vec::new());
    }
    let count = match buf.get(..2) {
        Some(raw) => le_u16(raw) as usize,
        None => return Err(AddrError::InvalidFdList { count: 0, size: 1 }),
    };
    let entries = &buf[2..];
    if entries.len() != count * FDLIST_ENTRY_SIZE {
        return Err(AddrError::InvalidFdList {
            count,
            size: buf.len(),
        });
    }
    Ok(entries
        .chunks_exact(FDLIST_ENTRY_SIZE)
        .map(|entry| FdEntry {
            fd: le_u64(entry) as i64,
            flags: le_u16(&entry[8..]),
        })
        .collect())
}
