use std::{
    fmt,
    ops::{Add, Sub},
};

use nix::time::{ClockId, clock_gettime};

/// Nanoseconds since the epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Timestamp(u64);

impl Timestamp {
    pub fn now() -> Self {
        match clock_gettime(ClockId::CLOCK_REALTIME) {
            Ok(ts) => Self(ts.tv_sec() as u64 * 1_000_000_000 + ts.tv_nsec() as u64),
            Err(err) => {
                log::warn!("reading realtime clock: {err}");
                Self(0)
            }
        }
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl From<u64> for Timestamp {
    fn from(ns: u64) -> Self {
        Self(ns)
    }
}

impl Add<u64> for Timestamp {
    type Output = Timestamp;

    fn add(self, ns: u64) -> Self::Output {
        Self(self.0.saturating_add(ns))
    }
}

impl Sub for Timestamp {
    type Output = Timestamp;

    fn sub(self, rhs: Timestamp) -> Self::Output {
        Self(self.0.saturating_sub(rhs.0))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09}", self.0 / 1_000_000_000, self.0 % 1_000_000_000)
    }
}
