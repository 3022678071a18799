//! Dynamic snaplen: decide how much of a network payload to keep.
//!
//! Payloads of well known protocols get a larger snaplen so that downstream
//! rules can see full requests. The decision only looks at the ports of the
//! socket and at the first [`DPI_LOOKAHEAD_SIZE`] bytes of data.

use capture_common::{
    CaptureSettings,
    consts::{
        DPI_LOOKAHEAD_SIZE, PORT_DNS, PORT_MONGODB, PORT_MYSQL, PORT_POSTGRES, SNAPLEN_DNS_UDP,
        SNAPLEN_EXTENDED, SNAPLEN_FULLCAPTURE_PORT,
    },
};

/// Ports of the socket a data buffer was read from or written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SocketContext {
    pub local_port: u16,
    pub remote_port: u16,
}

impl SocketContext {
    pub fn new(local_port: u16, remote_port: u16) -> Self {
        Self {
            local_port,
            remote_port,
        }
    }

    /// Unconnected sockets have no remote port: use the one of the address
    /// passed to the syscall, if any.
    pub fn or_user_port(mut self, user_port: Option<u16>) -> Self {
        if self.remote_port == 0 {
            self.remote_port = user_port.unwrap_or(0);
        }
        self
    }

    fn either(&self, port: u16) -> bool {
        self.local_port == port || self.remote_port == port
    }
}

const HTTP_METHODS: [&[u8; 4]; 7] = [b"GET ", b"POST", b"PUT ", b"DELE", b"TRAC", b"CONN", b"OPTI"];

/// MongoDB request op codes.
fn is_mongo_opcode(code: i32) -> bool {
    code == 1 || (2001..=2007).contains(&code)
}

fn mysql_command(lookahead: &[u8]) -> bool {
    lookahead.len() >= 5
        && (lookahead[..5].contains(&3) || (lookahead[2] == 0 && lookahead[3] == 0))
}

fn postgres_command(lookahead: &[u8]) -> bool {
    lookahead.len() >= 7
        && (matches!((lookahead[0], lookahead[1]), (b'Q' | b'P' | b'E', 0))
            || (lookahead[4] == 0 && lookahead[5] == 3 && lookahead[6] == 0))
}

fn mongo_header(lookahead: &[u8]) -> bool {
    lookahead.len() >= 16
        && is_mongo_opcode(i32::from_le_bytes([
            lookahead[12],
            lookahead[13],
            lookahead[14],
            lookahead[15],
        ]))
}

fn http_message(lookahead: &[u8]) -> bool {
    if lookahead.len() < 5 {
        return false;
    }
    let head = &lookahead[..4];
    HTTP_METHODS.iter().any(|method| head == &method[..]) || (head == b"HTTP" && lookahead[4] == b'/')
}

/// Compute the effective snaplen of a payload.
///
/// Never returns less than `base`. A lookahead shorter than a rule needs
/// simply doesn't match that rule.
pub fn classify(
    settings: &CaptureSettings,
    base: u32,
    lookahead: &[u8],
    local_port: u16,
    remote_port: u16,
) -> u32 {
    let lookahead = &lookahead[..lookahead.len().min(DPI_LOOKAHEAD_SIZE)];
    let ctx = SocketContext::new(local_port, remote_port);

    if settings.is_fullcapture_port(local_port) || settings.is_fullcapture_port(remote_port) {
        return base.max(SNAPLEN_FULLCAPTURE_PORT);
    }
    if remote_port == settings.statsd_port {
        return base.max(SNAPLEN_EXTENDED);
    }
    if remote_port == PORT_DNS {
        return base.max(SNAPLEN_DNS_UDP);
    }

    let extended = (ctx.either(PORT_MYSQL) && mysql_command(lookahead))
        || (ctx.either(PORT_POSTGRES) && postgres_command(lookahead))
        || ctx.either(PORT_MONGODB)
        || mongo_header(lookahead)
        || http_message(lookahead);
    if extended {
        base.max(SNAPLEN_EXTENDED)
    } else {
        base
    }
}

/// Snaplen to apply to a data buffer, honoring the dynamic snaplen switch.
pub fn effective_snaplen(settings: &CaptureSettings, ctx: SocketContext, lookahead: &[u8]) -> u32 {
    if !settings.dynamic_snaplen {
        return settings.snaplen;
    }
    let snaplen = classify(
        settings,
        settings.snaplen,
        lookahead,
        ctx.local_port,
        ctx.remote_port,
    );
    log::trace!("snaplen {snaplen} for {ctx:?}");
    snaplen
}

#[cfg(test)]
mod tests {
    use super::*;
    use capture_common::consts::{PORT_STATSD, SNAPLEN};

    fn settings() -> CaptureSettings {
        CaptureSettings {
            dynamic_snaplen: true,
            fullcapture_ports: Some(9000..=9010),
            ..Default::default()
        }
    }

    #[test]
    fn http_request() {
        assert_eq!(classify(&settings(), SNAPLEN, b"GET /", 40000, 8080), SNAPLEN_EXTENDED);
        assert_eq!(classify(&settings(), SNAPLEN, b"HTTP/1.1 200", 80, 40000), SNAPLEN_EXTENDED);
        assert_eq!(classify(&settings(), SNAPLEN, b"HTTPS", 80, 40000), SNAPLEN);
        // four bytes are not enough
        assert_eq!(classify(&settings(), SNAPLEN, b"GET ", 40000, 8080), SNAPLEN);
    }

    #[test]
    fn port_rules() {
        let s = settings();
        assert_eq!(classify(&s, SNAPLEN, b"", 9005, 1), SNAPLEN_FULLCAPTURE_PORT);
        assert_eq!(classify(&s, SNAPLEN, b"", 1, 9010), SNAPLEN_FULLCAPTURE_PORT);
        assert_eq!(classify(&s, SNAPLEN, b"", 1, PORT_STATSD), SNAPLEN_EXTENDED);
        // statsd and dns only match on the remote side
        assert_eq!(classify(&s, SNAPLEN, b"", PORT_STATSD, 1), SNAPLEN);
        assert_eq!(classify(&s, SNAPLEN, b"", 1, PORT_DNS), SNAPLEN_DNS_UDP);
        assert_eq!(classify(&s, SNAPLEN, b"", PORT_MONGODB, 1), SNAPLEN_EXTENDED);
    }

    #[test]
    fn never_below_base() {
        let s = settings();
        assert_eq!(classify(&s, 4000, b"", 1, PORT_DNS), 4000);
        assert_eq!(classify(&s, 20000, b"GET /", 1, 9001), 20000);
        assert_eq!(classify(&s, 7, b"nothing here", 1, 2), 7);
    }

    #[test]
    fn database_commands() {
        let s = settings();
        // COM_QUERY
        assert_eq!(classify(&s, SNAPLEN, &[0x21, 0, 0, 0, 3], 1, PORT_MYSQL), SNAPLEN_EXTENDED);
        assert_eq!(classify(&s, SNAPLEN, &[9, 9, 9, 9, 9], 1, PORT_MYSQL), SNAPLEN);
        // same bytes elsewhere mean nothing
        assert_eq!(classify(&s, SNAPLEN, &[0x21, 0, 0, 0, 3], 1, 2), SNAPLEN);

        assert_eq!(classify(&s, SNAPLEN, b"Q\0\0\0\x10ab", PORT_POSTGRES, 1), SNAPLEN_EXTENDED);
        assert_eq!(classify(&s, SNAPLEN, &[0, 0, 0, 8, 0, 3, 0], PORT_POSTGRES, 1), SNAPLEN_EXTENDED);
        assert_eq!(classify(&s, SNAPLEN, b"Q\0\0", PORT_POSTGRES, 1), SNAPLEN);
    }

    #[test]
    fn mongo_header_on_any_port() {
        let mut msg = [0u8; 16];
        msg[12..].copy_from_slice(&2004i32.to_le_bytes());
        assert_eq!(classify(&settings(), SNAPLEN, &msg, 1, 2), SNAPLEN_EXTENDED);
        msg[12..].copy_from_slice(&2013i32.to_le_bytes());
        assert_eq!(classify(&settings(), SNAPLEN, &msg, 1, 2), SNAPLEN);
        assert_eq!(classify(&settings(), SNAPLEN, &msg[..15], 1, 2), SNAPLEN);
    }

    #[test]
    fn dynamic_switch() {
        let mut s = settings();
        let ctx = SocketContext::new(40000, 80);
        assert_eq!(effective_snaplen(&s, ctx, b"GET / HTTP/1.1"), SNAPLEN_EXTENDED);
        s.dynamic_snaplen = false;
        assert_eq!(effective_snaplen(&s, ctx, b"GET / HTTP/1.1"), SNAPLEN);
    }

    #[test]
    fn user_port_fallback() {
        let ctx = SocketContext::new(5000, 0).or_user_port(Some(53));
        assert_eq!(ctx.remote_port, 53);
        let ctx = SocketContext::new(5000, 80).or_user_port(Some(53));
        assert_eq!(ctx.remote_port, 80);
    }
}
