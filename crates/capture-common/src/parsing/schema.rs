//! Per event type parameter lists.
//!
//! The parameter count and type sequence of a record are fully determined by
//! its event type. Tags and orderings are part of the wire ABI.

use strum::{Display, EnumIter, FromRepr};

use super::param_type::{ParamType, PrefixWidth};

/// Upper bound on the parameters of a single record.
pub const MAX_EVENT_PARAMS: usize = 32;

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, EnumIter, FromRepr)]
#[repr(u16)]
#[allow(non_camel_case_types)]
pub enum EventType {
    GENERIC_E = 0,
    GENERIC_X = 1,
    SOCKET_BIND_E = 20,
    SOCKET_BIND_X = 21,
    SOCKET_CONNECT_E = 22,
    SOCKET_CONNECT_X = 23,
    SOCKET_SENDTO_E = 30,
    SOCKET_SENDTO_X = 31,
    SOCKET_RECVFROM_E = 34,
    SOCKET_RECVFROM_X = 35,
    SYSCALL_POLL_E = 80,
    SYSCALL_POLL_X = 81,
    SYSCALL_PTRACE_E = 146,
    SYSCALL_PTRACE_X = 147,
    PROCEXIT_1_E = 182,
    PROCEXIT_1_X = 183,
    SYSCALL_CLONE_20_E = 222,
    SYSCALL_CLONE_20_X = 223,
    SYSCALL_FORK_20_E = 224,
    SYSCALL_FORK_20_X = 225,
    SYSCALL_VFORK_20_E = 226,
    SYSCALL_VFORK_20_X = 227,
    SYSCALL_EXECVE_19_E = 292,
    SYSCALL_EXECVE_19_X = 293,
    SYSCALL_EXECVEAT_E = 330,
    SYSCALL_EXECVEAT_X = 331,
    SYSCALL_CLONE3_E = 334,
    SYSCALL_CLONE3_X = 335,
    ASYNCEVENT_E = 402,
}

/// Schema level flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EventFlags {
    /// Length prefixes are `u32` instead of `u16`.
    pub large_payload: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamInfo {
    pub name: &'static str,
    pub ty: ParamType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventSchema {
    pub name: &'static str,
    pub flags: EventFlags,
    pub params: &'static [ParamInfo],
}

impl EventSchema {
    pub fn nparams(&self) -> usize {
        self.params.len()
    }

    pub fn prefix_width(&self) -> PrefixWidth {
        if self.flags.large_payload {
            PrefixWidth::Large
        } else {
            PrefixWidth::Short
        }
    }
}

const fn p(name: &'static str, ty: ParamType) -> ParamInfo {
    ParamInfo { name, ty }
}

const fn schema(name: &'static str, params: &'static [ParamInfo]) -> EventSchema {
    EventSchema {
        name,
        flags: EventFlags {
            large_payload: false,
        },
        params,
    }
}

use ParamType::*;

const NO_PARAMS: &[ParamInfo] = &[];

const GENERIC_PARAMS: &[ParamInfo] = &[p("id", Syscallid), p("nativeid", Uint16)];

const FD_ONLY_PARAMS: &[ParamInfo] = &[p("fd", Fd)];

const BIND_X_PARAMS: &[ParamInfo] = &[p("res", Errno), p("addr", Sockaddr), p("fd", Fd)];

const CONNECT_E_PARAMS: &[ParamInfo] = &[p("fd", Fd), p("addr", Sockaddr)];

const CONNECT_X_PARAMS: &[ParamInfo] = &[p("res", Errno), p("tuple", Socktuple), p("fd", Fd)];

const SENDTO_E_PARAMS: &[ParamInfo] = &[p("fd", Fd), p("size", Uint32), p("tuple", Socktuple)];

const SENDTO_X_PARAMS: &[ParamInfo] = &[p("res", Errno), p("data", Bytebuf)];

const RECVFROM_E_PARAMS: &[ParamInfo] = &[p("fd", Fd), p("size", Uint32)];

const RECVFROM_X_PARAMS: &[ParamInfo] = &[p("res", Errno), p("data", Bytebuf), p("tuple", Socktuple)];

const POLL_E_PARAMS: &[ParamInfo] = &[p("fds", Fdlist), p("timeout", Int64)];

const POLL_X_PARAMS: &[ParamInfo] = &[p("res", Errno), p("fds", Fdlist)];

const PTRACE_E_PARAMS: &[ParamInfo] = &[p("request", Flags16), p("pid", Pid)];

/// `addr` and `data` are prefixed by their variant index.
const PTRACE_X_PARAMS: &[ParamInfo] = &[
    p("res", Errno),
    p("addr", Dyn),
    p("data", Dyn),
    p("request", Flags16),
    p("pid", Pid),
];

const PROCEXIT_1_E_PARAMS: &[ParamInfo] = &[
    p("status", Errno),
    p("ret", Errno),
    p("sig", Sigtype),
    p("core", Uint8),
    p("reaper_tid", Pid),
];

const CLONE_X_PARAMS: &[ParamInfo] = &[
    p("res", Errno),
    p("exe", Charbuf),
    p("args", Bytebuf),
    p("tid", Pid),
    p("pid", Pid),
    p("ptid", Pid),
    p("cwd", Charbuf),
    p("fdlimit", Int64),
    p("pgft_maj", Uint64),
    p("pgft_min", Uint64),
    p("vm_size", Uint32),
    p("vm_rss", Uint32),
    p("vm_swap", Uint32),
    p("comm", Charbuf),
    p("cgroups", Bytebuf),
    p("flags", Flags32),
    p("uid", Uint32),
    p("gid", Uint32),
    p("vtid", Pid),
    p("vpid", Pid),
    p("pidns_init_start_ts", Uint64),
];

const EXECVE_E_PARAMS: &[ParamInfo] = &[p("filename", Fspath)];

const EXECVEAT_E_PARAMS: &[ParamInfo] = &[
    p("dirfd", Fd),
    p("pathname", Fsrelpath),
    p("flags", Flags32),
];

const EXECVE_X_PARAMS: &[ParamInfo] = &[
    p("res", Errno),
    p("exe", Charbuf),
    p("args", Bytebuf),
    p("tid", Pid),
    p("pid", Pid),
    p("ptid", Pid),
    p("cwd", Charbuf),
    p("fdlimit", Uint64),
    p("pgft_maj", Uint64),
    p("pgft_min", Uint64),
    p("vm_size", Uint32),
    p("vm_rss", Uint32),
    p("vm_swap", Uint32),
    p("comm", Charbuf),
    p("cgroups", Bytebuf),
    p("env", Bytebuf),
    p("tty", Uint32),
    p("vpgid", Pid),
    p("loginuid", Uint32),
    p("flags", Flags32),
    p("cap_inheritable", Uint64),
    p("cap_permitted", Uint64),
    p("cap_effective", Uint64),
    p("exe_ino", Uint64),
    p("exe_ino_ctime", Abstime),
    p("exe_ino_mtime", Abstime),
    p("uid", Uint32),
    p("trusted_exepath", Fspath),
    p("pgid", Pid),
    p("gid", Uint32),
];

const ASYNCEVENT_E_PARAMS: &[ParamInfo] = &[
    p("plugin_id", Uint32),
    p("name", Charbuf),
    p("data", Bytebuf),
];

/// Index of the parent tid in process creation exit events.
pub const LINEAGE_PTID_INDEX: usize = 5;
/// Index of the command name in process creation exit events.
pub const LINEAGE_COMM_INDEX: usize = 13;

impl EventType {
    /// Resolve a raw wire tag, `None` if the type is not known.
    pub fn from_tag(tag: u16) -> Option<Self> {
        Self::from_repr(tag)
    }

    pub fn tag(self) -> u16 {
        self as u16
    }

    pub fn schema(self) -> EventSchema {
        use EventType::*;
        match self {
            GENERIC_E => schema("syscall", GENERIC_PARAMS),
            GENERIC_X => schema("syscall", GENERIC_PARAMS),
            SOCKET_BIND_E => schema("bind", FD_ONLY_PARAMS),
            SOCKET_BIND_X => schema("bind", BIND_X_PARAMS),
            SOCKET_CONNECT_E => schema("connect", CONNECT_E_PARAMS),
            SOCKET_CONNECT_X => schema("connect", CONNECT_X_PARAMS),
            SOCKET_SENDTO_E => schema("sendto", SENDTO_E_PARAMS),
            SOCKET_SENDTO_X => schema("sendto", SENDTO_X_PARAMS),
            SOCKET_RECVFROM_E => schema("recvfrom", RECVFROM_E_PARAMS),
            SOCKET_RECVFROM_X => schema("recvfrom", RECVFROM_X_PARAMS),
            SYSCALL_POLL_E => schema("poll", POLL_E_PARAMS),
            SYSCALL_POLL_X => schema("poll", POLL_X_PARAMS),
            SYSCALL_PTRACE_E => schema("ptrace", PTRACE_E_PARAMS),
            SYSCALL_PTRACE_X => schema("ptrace", PTRACE_X_PARAMS),
            PROCEXIT_1_E => schema("procexit", PROCEXIT_1_E_PARAMS),
            PROCEXIT_1_X => schema("procexit", NO_PARAMS),
            SYSCALL_CLONE_20_E => schema("clone", NO_PARAMS),
            SYSCALL_CLONE_20_X => schema("clone", CLONE_X_PARAMS),
            SYSCALL_FORK_20_E => schema("fork", NO_PARAMS),
            SYSCALL_FORK_20_X => schema("fork", CLONE_X_PARAMS),
            SYSCALL_VFORK_20_E => schema("vfork", NO_PARAMS),
            SYSCALL_VFORK_20_X => schema("vfork", CLONE_X_PARAMS),
            SYSCALL_EXECVE_19_E => schema("execve", EXECVE_E_PARAMS),
            SYSCALL_EXECVE_19_X => schema("execve", EXECVE_X_PARAMS),
            SYSCALL_EXECVEAT_E => schema("execveat", EXECVEAT_E_PARAMS),
            SYSCALL_EXECVEAT_X => schema("execveat", EXECVE_X_PARAMS),
            SYSCALL_CLONE3_E => schema("clone3", NO_PARAMS),
            SYSCALL_CLONE3_X => schema("clone3", CLONE_X_PARAMS),
            ASYNCEVENT_E => EventSchema {
                name: "asyncevent",
                flags: EventFlags {
                    large_payload: true,
                },
                params: ASYNCEVENT_E_PARAMS,
            },
        }
    }

    /// Process creation exit events, which carry the new thread lineage.
    pub fn is_lineage(self) -> bool {
        use EventType::*;
        matches!(
            self,
            SYSCALL_CLONE_20_X
                | SYSCALL_FORK_20_X
                | SYSCALL_VFORK_20_X
                | SYSCALL_EXECVE_19_X
                | SYSCALL_EXECVEAT_X
                | SYSCALL_CLONE3_X
        )
    }

    /// Enter events have even tags, exit events odd ones.
    pub fn is_exit(self) -> bool {
        self.tag() % 2 == 1
    }
}
