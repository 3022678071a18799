use std::fmt;

use nix::unistd::Pid;

/// Kernel thread id as carried by record headers.
///
/// Tid `0` stands for "no thread" (kernel context) and never identifies a
/// user task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Tid(u64);

impl Tid {
    pub const KERNEL: Tid = Tid(0);

    pub const fn from_raw(tid: u64) -> Self {
        Self(tid)
    }

    pub const fn as_raw(self) -> u64 {
        self.0
    }

    pub fn is_kernel(self) -> bool {
        self.0 == 0
    }
}

impl From<Pid> for Tid {
    fn from(pid: Pid) -> Self {
        Self(pid.as_raw() as u64)
    }
}

impl fmt::Display for Tid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
