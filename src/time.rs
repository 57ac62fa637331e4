//! Elapsed-time accumulation: the session's logical replay clock.
//!
//! A session's elapsed time is the running sum of every `delay` carried by a
//! data/timing event, normalized so `nsec` always stays in `[0, 1_000_000_000)`.
//! It never decreases and is the only coordinate `restart` resumes from.

use std::cmp::Ordering;
use std::fmt;

const NSEC_PER_SEC: u32 = 1_000_000_000;

/// A `(sec, nsec)` pair, used both for the interval between two events
/// (a "delay") and for the session's cumulative elapsed time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ElapsedTime {
    pub sec: i64,
    pub nsec: u32,
}

/// A delay is structurally identical to an elapsed-time value; the alias
/// exists so call sites read as intent, matching the wire protocol's
/// separate `TimeSpec` use for "interval since last event" versus
/// "cumulative position".
pub type Delay = ElapsedTime;

impl ElapsedTime {
    pub const ZERO: ElapsedTime = ElapsedTime { sec: 0, nsec: 0 };

    pub fn new(sec: i64, nsec: u32) -> Self {
        let mut t = ElapsedTime { sec, nsec };
        t.normalize();
        t
    }

    fn normalize(&mut self) {
        if self.nsec >= NSEC_PER_SEC {
            self.sec = self.sec.saturating_add((self.nsec / NSEC_PER_SEC) as i64);
            self.nsec %= NSEC_PER_SEC;
        }
    }

    /// Saturating addition, normalized modulo 1e9 nanoseconds, matching the
    /// spec's accumulation rule for `ctx.elapsed`.
    #[must_use]
    pub fn add(self, delay: Delay) -> Self {
        let mut nsec = self.nsec as u64 + delay.nsec as u64;
        let mut sec = self.sec.saturating_add(delay.sec);
        if nsec >= NSEC_PER_SEC as u64 {
            sec = sec.saturating_add(1);
            nsec -= NSEC_PER_SEC as u64;
        }
        ElapsedTime {
            sec,
            nsec: nsec as u32,
        }
    }
}

impl PartialOrd for ElapsedTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ElapsedTime {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.sec, self.nsec).cmp(&(other.sec, other.nsec))
    }
}

impl fmt::Display for ElapsedTime {
    /// Renders as `<sec>.<nsec9>`, matching the timing-file schema.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09}", self.sec, self.nsec)
    }
}
