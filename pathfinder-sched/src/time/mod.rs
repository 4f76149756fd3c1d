/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Absolute-time arithmetic over the monotonic clock.
//!
//! [`Timestamp`] is a normalised `(seconds, nanoseconds)` pair, the same shape
//! as a POSIX `timespec`, so it converts losslessly to the value handed to
//! `clock_nanosleep(TIMER_ABSTIME)`.  All arithmetic is integer-only: adding a
//! period in microseconds never loses precision, no matter how many periods
//! have elapsed since the release grid was started.
//!
//! The free functions [`add_microseconds`] and [`compare`] are the two
//! primitives the release bookkeeping is built on.  They are pure and
//! infallible.

pub mod clock;

use std::cmp::Ordering;
use std::fmt;

pub use clock::{Clock, ManualClock, MonotonicClock};

// ── Constants ─────────────────────────────────────────────────────────────────

pub const NANOS_PER_SEC: u64 = 1_000_000_000;
pub const NANOS_PER_MICRO: u64 = 1_000;

// ── Timestamp ─────────────────────────────────────────────────────────────────

/// An absolute point on the monotonic clock.
///
/// Invariant: `nanos < 1_000_000_000`.  Every constructor normalises, so the
/// derived `Ord` (seconds first, then nanoseconds) is the correct total order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp {
    secs: i64,
    nanos: u32,
}

impl Timestamp {
    /// Build a timestamp, carrying any whole seconds held in `nanos`.
    pub const fn new(secs: i64, nanos: u32) -> Self {
        let carry = (nanos as u64 / NANOS_PER_SEC) as i64;
        Self {
            secs: secs + carry,
            nanos: (nanos as u64 % NANOS_PER_SEC) as u32,
        }
    }

    pub const fn secs(&self) -> i64 {
        self.secs
    }

    pub const fn nanos(&self) -> u32 {
        self.nanos
    }

    /// `self` advanced by `us` microseconds.
    pub fn add_micros(self, us: u64) -> Self {
        self.add_nanos(us.saturating_mul(NANOS_PER_MICRO))
    }

    /// `self` advanced by `ns` nanoseconds, carrying into seconds.
    pub fn add_nanos(self, ns: u64) -> Self {
        let whole_secs = (ns / NANOS_PER_SEC) as i64;
        let total_nanos = u64::from(self.nanos) + ns % NANOS_PER_SEC;

        Self {
            secs: self
                .secs
                .saturating_add(whole_secs)
                .saturating_add((total_nanos / NANOS_PER_SEC) as i64),
            nanos: (total_nanos % NANOS_PER_SEC) as u32,
        }
    }

    /// Nanoseconds from `earlier` to `self`, or `0` if `earlier` is later.
    pub fn saturating_nanos_since(&self, earlier: Timestamp) -> u64 {
        if *self <= earlier {
            return 0;
        }
        let secs = (self.secs - earlier.secs) as u64;
        let nanos = i64::from(self.nanos) - i64::from(earlier.nanos);
        secs.saturating_mul(NANOS_PER_SEC).saturating_add_signed(nanos)
    }

    /// Whole microseconds from `earlier` to `self`, or `0` if `earlier` is later.
    pub fn saturating_micros_since(&self, earlier: Timestamp) -> u64 {
        self.saturating_nanos_since(earlier) / NANOS_PER_MICRO
    }

    pub fn from_timespec(ts: &libc::timespec) -> Self {
        // The kernel never hands back a negative tv_nsec.
        Self::new(ts.tv_sec as i64, ts.tv_nsec.max(0) as u32)
    }

    pub fn to_timespec(self) -> libc::timespec {
        libc::timespec {
            tv_sec: self.secs as libc::time_t,
            tv_nsec: self.nanos as libc::c_long,
        }
    }
}

/// Matches the `"<sec> sec <nsec> nsec"` pair used in the event log.
impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} sec {} nsec", self.secs, self.nanos)
    }
}

// ── Free functions ────────────────────────────────────────────────────────────

/// Returns `t` advanced by `us` microseconds.
pub fn add_microseconds(t: Timestamp, us: u64) -> Timestamp {
    t.add_micros(us)
}

/// Total order on absolute timestamps.
pub fn compare(a: &Timestamp, b: &Timestamp) -> Ordering {
    a.secs.cmp(&b.secs).then(a.nanos.cmp(&b.nanos))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
