use std::{
    ffi::CString,
    io::Write,
    net::{SocketAddr, TcpListener, TcpStream, UdpSocket},
    os::{
        fd::{AsRawFd, RawFd},
        unix::net::{UnixListener, UnixStream},
    },
};

use anyhow::{Context, Result};
use bytes::Bytes;
use capture_common::{
    CaptureSettings, Tid,
    consts::SNAPLEN_EXTENDED,
    parsing::{EventRecord, EventType, sockaddr::Socktuple},
    test_runner::{TestCase, TestReport, TestSuite},
    time::Timestamp,
};
use nix::{
    sys::{
        socket::{SockaddrIn, UnixAddr, getpeername, getsockname},
        stat::fstat,
    },
    unistd::gettid,
};

use crate::{
    EventEncoder, MemoryReader, NoMemory, ParamValue, ProcessMemory, ScratchBuffer,
    SocketContext, SocketEndpoint, SocketInfo, Source, UnixEndpoint, UnixPath,
};

pub fn tests() -> TestSuite {
    TestSuite {
        name: "event-encoder",
        tests: vec![
            tcp_connect_tuple(),
            tcp_accepted_side(),
            udp_sendto_snaplen(),
            unix_connect_tuple(),
            process_memory_strings(),
        ],
    }
}

fn encode<M: MemoryReader + ?Sized>(
    settings: &CaptureSettings,
    memory: &M,
    event_type: EventType,
    f: impl FnOnce(&mut EventEncoder<'_, M>) -> Result<()>,
) -> Result<EventRecord> {
    let mut scratch = ScratchBuffer::default();
    let mut encoder = EventEncoder::begin(
        &mut scratch,
        settings,
        memory,
        event_type,
        Timestamp::now(),
        Tid::from(gettid()),
    )?;
    f(&mut encoder)?;
    let bytes: Bytes = encoder.finish()?;
    Ok(EventRecord::parse(bytes)?)
}

fn inet_info(fd: RawFd) -> Result<SocketInfo> {
    let local: SockaddrIn = getsockname(fd).context("getsockname")?;
    let peer: SockaddrIn = getpeername(fd).context("getpeername")?;
    Ok(SocketInfo {
        local: local.into(),
        peer: Some(peer.into()),
    })
}

fn tuple_of(record: &EventRecord, index: usize) -> Result<Option<Socktuple>> {
    Ok(record.param(index)?.as_socktuple()?)
}

/// Connect to a loopback listener and check the tuple of the client.
fn tcp_connect_tuple() -> TestCase {
    TestCase::new("tcp_connect_tuple", async {
        let mut report = TestReport::new();
        let result = (|| -> Result<()> {
            let listener = TcpListener::bind("127.0.0.1:0")?;
            let client = TcpStream::connect(listener.local_addr()?)?;
            let info = inet_info(client.as_raw_fd())?;
            let record = encode(
                &CaptureSettings::default(),
                &NoMemory,
                EventType::SOCKET_CONNECT_X,
                |encoder| {
                    encoder.push(ParamValue::I64(0))?;
                    encoder.push_socktuple(Some(&info), None, false)?;
                    encoder.push(ParamValue::I64(client.as_raw_fd() as i64))?;
                    Ok(())
                },
            )?;
            let (SocketAddr::V4(local), SocketAddr::V4(server)) =
                (client.local_addr()?, listener.local_addr()?)
            else {
                anyhow::bail!("expected IPv4 addresses");
            };
            report.expect_eq(
                "tuple",
                tuple_of(&record, 1)?,
                Some(Socktuple::Inet {
                    source: local,
                    dest: server,
                }),
            );
            Ok(())
        })();
        if let Err(err) = result {
            report.fail("tcp_connect_tuple", err);
        }
        report
    })
}

/// Data received by the server flows from the client: the client is the
/// source of the tuple.
fn tcp_accepted_side() -> TestCase {
    TestCase::new("tcp_accepted_side", async {
        let mut report = TestReport::new();
        let result = (|| -> Result<()> {
            let listener = TcpListener::bind("127.0.0.1:0")?;
            let mut client = TcpStream::connect(listener.local_addr()?)?;
            let (server, _) = listener.accept()?;
            client.write_all(b"ping")?;
            let info = inet_info(server.as_raw_fd())?;
            let record = encode(
                &CaptureSettings::default(),
                &NoMemory,
                EventType::SOCKET_RECVFROM_X,
                |encoder| {
                    encoder.push(ParamValue::I64(4))?;
                    encoder.push(ParamValue::bytes(b"ping"))?;
                    encoder.push_socktuple(Some(&info), None, true)?;
                    Ok(())
                },
            )?;
            let (SocketAddr::V4(client_addr), SocketAddr::V4(server_addr)) =
                (client.local_addr()?, server.local_addr()?)
            else {
                anyhow::bail!("expected IPv4 addresses");
            };
            report.expect_eq("data", record.param(1)?.data, &b"ping"[..]);
            report.expect_eq(
                "tuple",
                tuple_of(&record, 2)?,
                Some(Socktuple::Inet {
                    source: client_addr,
                    dest: server_addr,
                }),
            );
            Ok(())
        })();
        if let Err(err) = result {
            report.fail("tcp_accepted_side", err);
        }
        report
    })
}

/// An unconnected datagram socket gets its remote port from the destination
/// address of the syscall.
fn udp_sendto_snaplen() -> TestCase {
    TestCase::new("udp_sendto_snaplen", async {
        let mut report = TestReport::new();
        let result = (|| -> Result<()> {
            let receiver = UdpSocket::bind("127.0.0.1:0")?;
            let sender = UdpSocket::bind("127.0.0.1:0")?;
            let mut payload = b"POST /metrics HTTP/1.1\r\n".to_vec();
            payload.resize(3000, b'x');
            let dest = receiver.local_addr()?;
            sender.send_to(&payload, dest)?;

            let local: SockaddrIn = getsockname(sender.as_raw_fd())?;
            let info = SocketInfo {
                local: local.into(),
                peer: None,
            };
            let user_addr = SocketEndpoint::from(dest);
            let ctx = SocketContext::new(local.port(), 0).or_user_port(user_addr.port());
            let settings = CaptureSettings {
                dynamic_snaplen: true,
                ..Default::default()
            };

            let enter = encode(&settings, &NoMemory, EventType::SOCKET_SENDTO_E, |encoder| {
                encoder.push(ParamValue::I64(sender.as_raw_fd() as i64))?;
                encoder.push(ParamValue::U32(payload.len() as u32))?;
                encoder.push_socktuple(Some(&info), Some(&user_addr), false)?;
                Ok(())
            })?;
            let exit = encode(&settings, &NoMemory, EventType::SOCKET_SENDTO_X, |encoder| {
                encoder.push(ParamValue::I64(payload.len() as i64))?;
                encoder.push(ParamValue::bytes(&payload).with_snaplen(ctx))?;
                Ok(())
            })?;

            let SocketAddr::V4(dest) = dest else {
                anyhow::bail!("expected an IPv4 address");
            };
            match tuple_of(&enter, 2)? {
                Some(Socktuple::Inet { dest: found, .. }) => {
                    report.expect_eq("destination", found, dest)
                }
                other => report.fail("destination", other),
            }
            report.expect_eq(
                "snaplen",
                exit.param(1)?.data.len(),
                SNAPLEN_EXTENDED as usize,
            );
            Ok(())
        })();
        if let Err(err) = result {
            report.fail("udp_sendto_snaplen", err);
        }
        report
    })
}

fn unix_endpoint(fd: RawFd, addr: &UnixAddr) -> Result<UnixEndpoint> {
    Ok(UnixEndpoint {
        sock: fstat(fd)?.st_ino,
        path: UnixPath::from(addr),
    })
}

/// The client of a UNIX socket is unnamed: the tuple carries the path of the
/// server it connected to.
fn unix_connect_tuple() -> TestCase {
    TestCase::new("unix_connect_tuple", async {
        let mut report = TestReport::new();
        let path = std::env::temp_dir().join(format!("event-encoder-{}.sock", std::process::id()));
        let result = (|| -> Result<()> {
            let _ = std::fs::remove_file(&path);
            let _listener = UnixListener::bind(&path)?;
            let client = UnixStream::connect(&path)?;
            let fd = client.as_raw_fd();
            let local: UnixAddr = getsockname(fd)?;
            let peer: UnixAddr = getpeername(fd)?;
            let info = SocketInfo {
                local: SocketEndpoint::Unix(unix_endpoint(fd, &local)?),
                peer: Some(SocketEndpoint::Unix(UnixEndpoint {
                    sock: 0,
                    path: UnixPath::from(&peer),
                })),
            };
            let record = encode(
                &CaptureSettings::default(),
                &NoMemory,
                EventType::SOCKET_CONNECT_X,
                |encoder| {
                    encoder.push(ParamValue::I64(0))?;
                    encoder.push_socktuple(Some(&info), None, false)?;
                    encoder.push(ParamValue::I64(fd as i64))?;
                    Ok(())
                },
            )?;
            match tuple_of(&record, 1)? {
                Some(Socktuple::Unix { dest, path: found, .. }) => {
                    report.expect_eq("client socket", dest, fstat(fd)?.st_ino);
                    report.expect_eq(
                        "path",
                        found,
                        path.as_os_str().as_encoded_bytes().to_vec(),
                    );
                }
                other => report.fail("tuple", other),
            }
            Ok(())
        })();
        let _ = std::fs::remove_file(&path);
        if let Err(err) = result {
            report.fail("unix_connect_tuple", err);
        }
        report
    })
}

/// Strings and buffers read from the memory of this process.
fn process_memory_strings() -> TestCase {
    TestCase::new("process_memory_strings", async {
        let mut report = TestReport::new();
        let result = (|| -> Result<()> {
            let filename = CString::new("/usr/bin/env")?;
            let memory = ProcessMemory::current();
            let record = encode(
                &CaptureSettings::default(),
                &memory,
                EventType::SYSCALL_EXECVE_19_E,
                |encoder| {
                    encoder.push(ParamValue::Str(Source::user(filename.as_ptr() as u64)))?;
                    Ok(())
                },
            )?;
            report.expect_eq("filename", record.param(0)?.as_str()?, "/usr/bin/env");

            let data = vec![7u8; 5000];
            let record = encode(
                &CaptureSettings::default(),
                &memory,
                EventType::SOCKET_SENDTO_X,
                |encoder| {
                    encoder.push(ParamValue::I64(data.len() as i64))?;
                    encoder.push(ParamValue::Bytes {
                        source: Source::user(data.as_ptr() as u64),
                        len: data.len() as u32,
                        snaplen: None,
                    })?;
                    Ok(())
                },
            )?;
            report.expect_eq("buffer", record.param(1)?.data, &data[..]);

            // kernel memory is not readable from user space
            let record = encode(
                &CaptureSettings::default(),
                &memory,
                EventType::SYSCALL_EXECVE_19_E,
                |encoder| {
                    encoder.push(ParamValue::Str(Source::kernel(filename.as_ptr() as u64)))?;
                    Ok(())
                },
            )?;
            report.expect("kernel string is empty", record.param(0)?.is_empty());
            Ok(())
        })();
        if let Err(err) = result {
            report.fail("process_memory_strings", err);
        }
        report
    })
}
