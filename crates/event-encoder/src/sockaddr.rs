//! Packing of socket addresses and socket tuples into their wire format.
//!
//! See `capture_common::parsing::sockaddr` for the layout.

use std::{
    net::{SocketAddr, SocketAddrV4, SocketAddrV6},
    os::unix::ffi::OsStrExt,
};

use bytes::BufMut;
use capture_common::parsing::sockaddr::SocketFamily;
use nix::sys::socket::{SockaddrIn, SockaddrIn6, UnixAddr};
use thiserror::Error;

/// Size of `sun_path` in `struct sockaddr_un`.
pub const UNIX_PATH_MAX: usize = 108;

/// Address of a UNIX socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnixPath {
    /// Filesystem address.
    Pathname(Vec<u8>),
    /// Abstract namespace address, without its leading NUL.
    Abstract(Vec<u8>),
    /// No address available, eg. an unnamed peer.
    Unavailable,
}

impl UnixPath {
    /// Interpret a raw `sun_path`. Two leading NUL bytes are the
    /// "unavailable" sentinel, a single one marks an abstract address.
    pub fn from_raw(raw: &[u8]) -> Self {
        let raw = &raw[..raw.len().min(UNIX_PATH_MAX)];
        let until_nul = |bytes: &[u8]| match bytes.iter().position(|c| *c == 0) {
            Some(nul) => bytes[..nul].to_vec(),
            None => bytes.to_vec(),
        };
        match raw {
            [] | [0] | [0, 0, ..] => UnixPath::Unavailable,
            [0, name @ ..] => UnixPath::Abstract(until_nul(name)),
            path => UnixPath::Pathname(until_nul(path)),
        }
    }

    pub fn pathname(path: &str) -> Self {
        UnixPath::Pathname(path.as_bytes().to_vec())
    }

    pub fn abstract_name(name: &[u8]) -> Self {
        UnixPath::Abstract(name.to_vec())
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, UnixPath::Unavailable)
    }

    /// Bytes written on the wire, without the terminating NUL. Abstract
    /// names lose their leading NUL and everything past their first NUL.
    pub fn wire_name(&self) -> &[u8] {
        let (name, max) = match self {
            UnixPath::Pathname(path) => (path.as_slice(), UNIX_PATH_MAX - 1),
            // one byte is taken by the leading NUL
            UnixPath::Abstract(name) => (name.as_slice(), UNIX_PATH_MAX - 2),
            UnixPath::Unavailable => (&[][..], 0),
        };
        let name = &name[..name.len().min(max)];
        match name.iter().position(|c| *c == 0) {
            Some(nul) => &name[..nul],
            None => name,
        }
    }

    fn put<B: BufMut>(&self, out: &mut B) -> usize {
        let name = self.wire_name();
        out.put_slice(name);
        out.put_u8(0);
        name.len() + 1
    }
}

impl From<&UnixAddr> for UnixPath {
    fn from(addr: &UnixAddr) -> Self {
        if let Some(path) = addr.path() {
            UnixPath::Pathname(path.as_os_str().as_bytes().to_vec())
        } else if let Some(name) = addr.as_abstract() {
            UnixPath::Abstract(name.to_vec())
        } else {
            UnixPath::Unavailable
        }
    }
}

/// A UNIX socket: its kernel identifier and bound address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnixEndpoint {
    pub sock: u64,
    pub path: UnixPath,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEndpoint {
    V4(SocketAddrV4),
    V6(SocketAddrV6),
    Unix(UnixEndpoint),
}

impl SocketEndpoint {
    pub fn family(&self) -> SocketFamily {
        match self {
            SocketEndpoint::V4(_) => SocketFamily::Inet,
            SocketEndpoint::V6(_) => SocketFamily::Inet6,
            SocketEndpoint::Unix(_) => SocketFamily::Unix,
        }
    }

    /// Port of IP endpoints, `None` for UNIX sockets.
    pub fn port(&self) -> Option<u16> {
        match self {
            SocketEndpoint::V4(addr) => Some(addr.port()),
            SocketEndpoint::V6(addr) => Some(addr.port()),
            SocketEndpoint::Unix(_) => None,
        }
    }
}

impl From<SocketAddr> for SocketEndpoint {
    fn from(addr: SocketAddr) -> Self {
        match addr {
            SocketAddr::V4(addr) => SocketEndpoint::V4(addr),
            SocketAddr::V6(addr) => SocketEndpoint::V6(addr),
        }
    }
}

impl From<SockaddrIn> for SocketEndpoint {
    fn from(addr: SockaddrIn) -> Self {
        SocketEndpoint::V4(SocketAddrV4::new(addr.ip().into(), addr.port()))
    }
}

impl From<SockaddrIn6> for SocketEndpoint {
    fn from(addr: SockaddrIn6) -> Self {
        SocketEndpoint::V6(SocketAddrV6::new(addr.ip(), addr.port(), 0, 0))
    }
}

/// Kernel view of a socket, as returned by getsockname/getpeername.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketInfo {
    pub local: SocketEndpoint,
    /// `None` for sockets without a peer.
    pub peer: Option<SocketEndpoint>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PackError {
    #[error("address family {found} doesn't match socket family {expected}")]
    FamilyMismatch {
        expected: SocketFamily,
        found: SocketFamily,
    },
}

fn put_v4<B: BufMut>(out: &mut B, addr: &SocketAddrV4) {
    out.put_slice(&addr.ip().octets());
    out.put_u16_le(addr.port());
}

fn put_v6<B: BufMut>(out: &mut B, addr: &SocketAddrV6) {
    out.put_slice(&addr.ip().octets());
    out.put_u16_le(addr.port());
}

/// Write a socket address, returning the number of bytes written.
pub fn pack_addr<B: BufMut>(endpoint: &SocketEndpoint, out: &mut B) -> usize {
    out.put_u8(endpoint.family() as u8);
    1 + match endpoint {
        SocketEndpoint::V4(addr) => {
            put_v4(out, addr);
            4 + 2
        }
        SocketEndpoint::V6(addr) => {
            put_v6(out, addr);
            16 + 2
        }
        SocketEndpoint::Unix(unix) => unix.path.put(out),
    }
}

fn same_family(
    expected: &SocketEndpoint,
    found: Option<&SocketEndpoint>,
) -> Result<(), PackError> {
    match found {
        Some(found) if found.family() != expected.family() => Err(PackError::FamilyMismatch {
            expected: expected.family(),
            found: found.family(),
        }),
        _ => Ok(()),
    }
}

/// Pick (source, dest) of an IP tuple.
///
/// `user_addr` is the address passed to the syscall (sendto, recvfrom...):
/// when present it's preferred for the remote side, since the kernel doesn't
/// know the peer of unconnected datagram sockets.
fn ip_endpoints<'a>(
    sock: &'a SocketInfo,
    user_addr: Option<&'a SocketEndpoint>,
    inbound: bool,
) -> Option<(&'a SocketEndpoint, &'a SocketEndpoint)> {
    match (user_addr, inbound) {
        (None, true) => sock.peer.as_ref().map(|peer| (peer, &sock.local)),
        (None, false) => sock.peer.as_ref().map(|peer| (&sock.local, peer)),
        (Some(user), true) => {
            let source = match &sock.peer {
                Some(peer) if peer.port() != Some(0) => peer,
                _ => user,
            };
            Some((source, &sock.local))
        }
        (Some(user), false) => Some((&sock.local, user)),
    }
}

/// Write the tuple of a socket, returning the number of bytes written.
///
/// `inbound` tells whether the data flows from the peer to us: the source of
/// the tuple is always the side sending data.
pub fn pack_tuple<B: BufMut>(
    sock: &SocketInfo,
    user_addr: Option<&SocketEndpoint>,
    inbound: bool,
    out: &mut B,
) -> Result<usize, PackError> {
    same_family(&sock.local, sock.peer.as_ref())?;
    same_family(&sock.local, user_addr)?;

    out.put_u8(sock.local.family() as u8);
    let size = match &sock.local {
        SocketEndpoint::V4(_) => {
            match ip_endpoints(sock, user_addr, inbound) {
                Some((SocketEndpoint::V4(source), SocketEndpoint::V4(dest))) => {
                    put_v4(out, source);
                    put_v4(out, dest);
                }
                _ => out.put_bytes(0, (4 + 2) * 2),
            }
            1 + (4 + 2) * 2
        }
        SocketEndpoint::V6(_) => {
            match ip_endpoints(sock, user_addr, inbound) {
                Some((SocketEndpoint::V6(source), SocketEndpoint::V6(dest))) => {
                    put_v6(out, source);
                    put_v6(out, dest);
                }
                _ => out.put_bytes(0, (16 + 2) * 2),
            }
            1 + (16 + 2) * 2
        }
        SocketEndpoint::Unix(local) => {
            let peer = match &sock.peer {
                Some(SocketEndpoint::Unix(peer)) => Some(peer),
                _ => None,
            };
            let peer_sock = peer.map_or(0, |peer| peer.sock);
            let path = if inbound {
                out.put_u64_le(local.sock);
                out.put_u64_le(peer_sock);
                &local.path
            } else {
                out.put_u64_le(peer_sock);
                out.put_u64_le(local.sock);
                match (peer, user_addr) {
                    (Some(peer), _) if !peer.path.is_unavailable() => &peer.path,
                    (_, Some(SocketEndpoint::Unix(user))) => &user.path,
                    (Some(peer), None) => &peer.path,
                    _ => &UnixPath::Unavailable,
                }
            };
            1 + 8 + 8 + path.put(out)
        }
    };
    Ok(size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use capture_common::parsing::sockaddr::{Sockaddr, Socktuple, parse_sockaddr, parse_socktuple};

    fn v4(addr: &str) -> SocketEndpoint {
        SocketEndpoint::V4(addr.parse().unwrap())
    }

    fn unix(sock: u64, path: UnixPath) -> SocketEndpoint {
        SocketEndpoint::Unix(UnixEndpoint { sock, path })
    }

    #[test]
    fn inet_addr() {
        let mut out = Vec::new();
        assert_eq!(pack_addr(&v4("192.168.1.2:443"), &mut out), 7);
        assert_eq!(out, [2, 192, 168, 1, 2, 0xbb, 0x01]);
    }

    #[test]
    fn inet6_addr() {
        let mut out = Vec::new();
        let addr: SocketAddr = "[::1]:8080".parse().unwrap();
        assert_eq!(pack_addr(&addr.into(), &mut out), 19);
        assert_eq!(out[0], 10);
        assert_eq!(out[16], 1);
        assert_eq!(
            parse_sockaddr(&out).unwrap(),
            Some(Sockaddr::Inet6("[::1]:8080".parse().unwrap()))
        );
    }

    #[test]
    fn unix_abstract_address() {
        let mut out = Vec::new();
        let path = UnixPath::from_raw(b"\0\x01name\xff\0garbage");
        assert_eq!(path, UnixPath::abstract_name(b"\x01name\xff"));
        assert_eq!(pack_addr(&unix(0, path), &mut out), 1 + 7);
        assert_eq!(out, b"\x01\x01name\xff\0");
    }

    #[test]
    fn unix_unavailable_is_not_abstract() {
        let unavailable = UnixPath::from_raw(&[0; UNIX_PATH_MAX]);
        assert!(unavailable.is_unavailable());
        assert_ne!(unavailable, UnixPath::abstract_name(b""));

        let mut out = Vec::new();
        assert_eq!(pack_addr(&unix(0, unavailable), &mut out), 2);
        assert_eq!(out, [1, 0]);

        let mut out = Vec::new();
        pack_addr(&unix(0, UnixPath::abstract_name(b"db")), &mut out);
        assert_eq!(out, b"\x01db\0");
    }

    #[test]
    fn long_paths_are_truncated() {
        let path = UnixPath::from_raw(&[b'x'; 200]);
        let mut out = Vec::new();
        assert_eq!(pack_addr(&unix(0, path), &mut out), 1 + UNIX_PATH_MAX);
        assert_eq!(out.last(), Some(&0));

        let mut out = Vec::new();
        let path = UnixPath::abstract_name(&[b'y'; 200]);
        assert_eq!(pack_addr(&unix(0, path), &mut out), 1 + UNIX_PATH_MAX - 1);
    }

    #[test]
    fn from_nix_unix_addr() {
        let addr = UnixAddr::new("/tmp/x.sock").unwrap();
        assert_eq!(UnixPath::from(&addr), UnixPath::pathname("/tmp/x.sock"));
        let addr = UnixAddr::new_abstract(b"srv").unwrap();
        assert_eq!(UnixPath::from(&addr), UnixPath::abstract_name(b"srv"));
    }

    #[test]
    fn tuple_direction() {
        let sock = SocketInfo {
            local: v4("10.0.0.1:5000"),
            peer: Some(v4("10.0.0.2:80")),
        };
        let mut out = Vec::new();
        pack_tuple(&sock, None, false, &mut out).unwrap();
        assert_eq!(
            parse_socktuple(&out).unwrap(),
            Some(Socktuple::Inet {
                source: "10.0.0.1:5000".parse().unwrap(),
                dest: "10.0.0.2:80".parse().unwrap()
            })
        );

        let mut out = Vec::new();
        assert_eq!(pack_tuple(&sock, None, true, &mut out), Ok(13));
        assert_eq!(
            parse_socktuple(&out).unwrap(),
            Some(Socktuple::Inet {
                source: "10.0.0.2:80".parse().unwrap(),
                dest: "10.0.0.1:5000".parse().unwrap()
            })
        );
    }

    #[test]
    fn tuple_without_peer_is_zeroed() {
        let sock = SocketInfo {
            local: v4("10.0.0.1:5000"),
            peer: None,
        };
        let mut out = Vec::new();
        assert_eq!(pack_tuple(&sock, None, false, &mut out), Ok(13));
        assert_eq!(&out[1..], &[0; 12]);
    }

    #[test]
    fn tuple_prefers_user_address() {
        let sock = SocketInfo {
            local: v4("0.0.0.0:5353"),
            peer: None,
        };
        let user = v4("8.8.8.8:53");
        let mut out = Vec::new();
        pack_tuple(&sock, Some(&user), false, &mut out).unwrap();
        assert_eq!(
            parse_socktuple(&out).unwrap(),
            Some(Socktuple::Inet {
                source: "0.0.0.0:5353".parse().unwrap(),
                dest: "8.8.8.8:53".parse().unwrap()
            })
        );

        let mut out = Vec::new();
        pack_tuple(&sock, Some(&user), true, &mut out).unwrap();
        assert_eq!(
            parse_socktuple(&out).unwrap(),
            Some(Socktuple::Inet {
                source: "8.8.8.8:53".parse().unwrap(),
                dest: "0.0.0.0:5353".parse().unwrap()
            })
        );
    }

    #[test]
    fn tuple_family_mismatch() {
        let sock = SocketInfo {
            local: v4("10.0.0.1:5000"),
            peer: None,
        };
        let user: SocketEndpoint = "[::1]:53".parse::<SocketAddr>().unwrap().into();
        assert_eq!(
            pack_tuple(&sock, Some(&user), false, &mut Vec::new()),
            Err(PackError::FamilyMismatch {
                expected: SocketFamily::Inet,
                found: SocketFamily::Inet6
            })
        );
    }

    #[test]
    fn unix_tuple_outbound_falls_back_to_user_path() {
        let sock = SocketInfo {
            local: unix(0x1000, UnixPath::Unavailable),
            peer: Some(unix(0x2000, UnixPath::Unavailable)),
        };
        let user = unix(0, UnixPath::pathname("/run/app.sock"));
        let mut out = Vec::new();
        pack_tuple(&sock, Some(&user), false, &mut out).unwrap();
        assert_eq!(
            parse_socktuple(&out).unwrap(),
            Some(Socktuple::Unix {
                source: 0x2000,
                dest: 0x1000,
                path: b"/run/app.sock".to_vec()
            })
        );
    }

    #[test]
    fn unix_tuple_inbound_uses_local_path() {
        let sock = SocketInfo {
            local: unix(0x1000, UnixPath::pathname("/run/server.sock")),
            peer: Some(unix(0x2000, UnixPath::Unavailable)),
        };
        let mut out = Vec::new();
        let size = pack_tuple(&sock, None, true, &mut out).unwrap();
        assert_eq!(size, out.len());
        assert_eq!(
            parse_socktuple(&out).unwrap(),
            Some(Socktuple::Unix {
                source: 0x1000,
                dest: 0x2000,
                path: b"/run/server.sock".to_vec()
            })
        );
    }
}
