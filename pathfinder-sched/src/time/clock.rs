/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Clock sources for the release grid.
//!
//! [`MonotonicClock`] reads `CLOCK_MONOTONIC` and suspends with an absolute
//! `clock_nanosleep`, so a task that is preempted between computing its next
//! release and going to sleep still wakes at the right instant.
//!
//! [`ManualClock`] is a shared, hand-driven clock.  Sleeping on it simply
//! moves time forward to the requested instant, which makes activation
//! sequences fully deterministic in tests and offline simulations.

use std::sync::{Arc, Mutex, PoisonError};

use tracing::warn;

use super::Timestamp;

/// Source of absolute time plus an absolute-time sleep primitive.
pub trait Clock: Send {
    /// Current absolute time.
    fn now(&self) -> Timestamp;

    /// Suspend the calling thread until `deadline` has been reached.
    ///
    /// Returns immediately if `deadline` is already in the past.
    fn sleep_until(&self, deadline: Timestamp);
}

// ── MonotonicClock ────────────────────────────────────────────────────────────

/// `CLOCK_MONOTONIC` with `TIMER_ABSTIME` sleeps.
#[derive(Debug, Clone, Copy, Default)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn now(&self) -> Timestamp {
        let mut ts = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        // SAFETY: `ts` is a valid, exclusively borrowed timespec.
        let rc = unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts) };
        debug_assert_eq!(rc, 0, "CLOCK_MONOTONIC is always available on Linux");
        Timestamp::from_timespec(&ts)
    }

    fn sleep_until(&self, deadline: Timestamp) {
        let ts = deadline.to_timespec();
        loop {
            // SAFETY: `ts` outlives the call; the remainder pointer may be null
            // for absolute sleeps.
            let rc = unsafe {
                libc::clock_nanosleep(
                    libc::CLOCK_MONOTONIC,
                    libc::TIMER_ABSTIME,
                    &ts,
                    std::ptr::null_mut(),
                )
            };
            match rc {
                0 => return,
                // A signal woke us early; the target is absolute so just retry.
                libc::EINTR => continue,
                code => {
                    warn!(
                        code,
                        deadline = %deadline,
                        "clock_nanosleep failed, activation released early"
                    );
                    return;
                }
            }
        }
    }
}

// ── ManualClock ───────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct ManualState {
    now: Timestamp,
    sleeps: u64,
}

/// Hand-driven clock shared between clones.
///
/// Every clone observes and moves the same instant.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    state: Arc<Mutex<ManualState>>,
}

impl ManualClock {
    pub fn starting_at(t: Timestamp) -> Self {
        Self {
            state: Arc::new(Mutex::new(ManualState { now: t, sleeps: 0 })),
        }
    }

    /// Move time forward by `us` microseconds.
    pub fn advance_micros(&self, us: u64) {
        let mut state = self.lock();
        state.now = state.now.add_micros(us);
    }

    /// Number of `sleep_until` calls that actually had to wait.
    pub fn sleep_count(&self) -> u64 {
        self.lock().sleeps
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.lock().now
    }

    fn sleep_until(&self, deadline: Timestamp) {
        let mut state = self.lock();
        if deadline > state.now {
            state.now = deadline;
            state.sleeps += 1;
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotonic_clock_never_goes_backwards() {
        let clock = MonotonicClock;
        let mut prev = clock.now();
        for _ in 0..1_000 {
            let now = clock.now();
            assert!(now >= prev);
            prev = now;
        }
    }

    #[test]
    fn monotonic_sleep_until_reaches_deadline() {
        let clock = MonotonicClock;
        let target = clock.now().add_micros(2_000);
        clock.sleep_until(target);
        assert!(clock.now() >= target);
    }

    #[test]
    fn monotonic_sleep_until_past_returns_immediately() {
        let clock = MonotonicClock;
        let start = clock.now();
        clock.sleep_until(Timestamp::new(start.secs() - 10, 0));
        // Generous bound: we only need to show no real wait happened.
        assert!(clock.now().saturating_micros_since(start) < 500_000);
    }

    #[test]
    fn manual_clock_sleep_jumps_forward() {
        let clock = ManualClock::starting_at(Timestamp::new(10, 0));
        clock.sleep_until(Timestamp::new(10, 500));
        assert_eq!(clock.now(), Timestamp::new(10, 500));
        assert_eq!(clock.sleep_count(), 1);
    }

    #[test]
    fn manual_clock_sleep_into_past_is_a_no_op() {
        let clock = ManualClock::starting_at(Timestamp::new(10, 0));
        clock.sleep_until(Timestamp::new(9, 0));
        assert_eq!(clock.now(), Timestamp::new(10, 0));
        assert_eq!(clock.sleep_count(), 0);
    }

    #[test]
    fn manual_clock_clones_share_time() {
        let a = ManualClock::starting_at(Timestamp::new(1, 0));
        let b = a.clone();
        a.advance_micros(1_500);
        assert_eq!(b.now(), Timestamp::new(1, 1_500_000));
    }
}
