/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Periodic activation: the per-task release grid.
//!
//! # Fixed-rate releases
//! Each release is computed from the previous *scheduled* release, never from
//! the time the task actually woke up:
//!
//! ```text
//! epoch + offset ──P──► r1 ──P──► r2 ──P──► r3 ...
//! ```
//!
//! This keeps the grid drift-free for the lifetime of the process.  The cost
//! is that an overrun is not absorbed: if the task body runs past `r(k+1)`,
//! the next wait returns at once and the task free-runs through the missed
//! period(s) until it catches up with the grid.  Each of those activations
//! still carries its own (already past, or nearly past) deadline, so every
//! overrun shows up as a `Missed` verdict instead of being silently
//! resynchronised away.
//!
//! # Suspension
//! Waiting is delegated to [`Clock::sleep_until`], an absolute-time sleep.
//! Nothing here spins: under `SCHED_FIFO` a spinning high-priority task would
//! starve every lower-priority one.

use std::cmp::Ordering;

use tracing::trace;

use crate::task::ReleaseTiming;
use crate::time::{add_microseconds, compare, Clock, Timestamp};

// ── Activation ────────────────────────────────────────────────────────────────

/// What a call to [`PeriodicActivation::wait_next_activation`] hands back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Activation {
    /// 1-based activation counter.
    pub index: u64,

    /// Scheduled release time of this activation.
    pub release: Timestamp,

    /// Absolute deadline of this activation (the next release).
    pub deadline: Timestamp,

    /// `false` when the release was already in the past on entry, i.e. the
    /// previous activation overran and no suspension took place.
    pub slept: bool,
}

// ── PeriodicActivation ────────────────────────────────────────────────────────

/// Release bookkeeping for one task.
///
/// Owned by exactly one task thread; not shared.
#[derive(Debug)]
pub struct PeriodicActivation<C: Clock> {
    clock: C,
    timing: ReleaseTiming,
    next_release: Timestamp,
    activations: u64,
}

impl<C: Clock> PeriodicActivation<C> {
    /// Start the release grid now: the first release is `now + offset`.
    pub fn start(timing: ReleaseTiming, clock: C) -> Self {
        let epoch = clock.now();
        Self::start_at(timing, clock, epoch)
    }

    /// Start the release grid at a caller-chosen `epoch`: the first release is
    /// `epoch + offset`.
    ///
    /// Used to put every task of a task set on one shared grid.
    pub fn start_at(timing: ReleaseTiming, clock: C, epoch: Timestamp) -> Self {
        debug_assert!(timing.period_us > 0, "period must be validated before start");
        let next_release = add_microseconds(epoch, timing.offset_us);
        trace!(
            period_us = timing.period_us,
            offset_us = timing.offset_us,
            first_release = %next_release,
            "release grid started"
        );
        Self {
            clock,
            timing,
            next_release,
            activations: 0,
        }
    }

    /// Block until the next release, then advance the grid by one period.
    ///
    /// On return, [`next_release`](Self::next_release) equals the deadline of
    /// the activation that just began.  If the release is already due the
    /// call returns without sleeping and still advances by exactly one period.
    pub fn wait_next_activation(&mut self) -> Activation {
        let release = self.next_release;
        let now = self.clock.now();

        let slept = match compare(&now, &release) {
            Ordering::Less => {
                self.clock.sleep_until(release);
                true
            }
            Ordering::Equal | Ordering::Greater => false,
        };

        self.next_release = add_microseconds(release, self.timing.period_us);
        self.activations += 1;

        if !slept {
            trace!(
                activation = self.activations,
                late_us = now.saturating_micros_since(release),
                "release already due, no suspension"
            );
        }

        Activation {
            index: self.activations,
            release,
            deadline: self.next_release,
            slept,
        }
    }

    /// Next scheduled release; after a wait, the current deadline.
    pub fn next_release(&self) -> Timestamp {
        self.next_release
    }

    /// Number of activations released so far.
    pub fn activations(&self) -> u64 {
        self.activations
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::ManualClock;

    const T0: Timestamp = Timestamp::new(1_000, 0);

    fn timing(period_us: u64, offset_us: u64) -> ReleaseTiming {
        ReleaseTiming {
            period_us,
            offset_us,
        }
    }

    #[test]
    fn start_sets_first_release_to_now_plus_offset() {
        let clock = ManualClock::starting_at(T0);
        let act = PeriodicActivation::start(timing(25_000, 3_000), clock);
        assert_eq!(act.next_release(), T0.add_micros(3_000));
        assert_eq!(act.activations(), 0);
    }

    #[test]
    fn start_at_uses_the_given_epoch() {
        let clock = ManualClock::starting_at(T0);
        let epoch = T0.add_micros(7);
        let act = PeriodicActivation::start_at(timing(25_000, 0), clock, epoch);
        assert_eq!(act.next_release(), epoch);
    }

    #[test]
    fn first_wait_with_zero_offset_returns_at_start_without_sleeping() {
        let clock = ManualClock::starting_at(T0);
        let mut act = PeriodicActivation::start(timing(25_000, 0), clock.clone());

        let a = act.wait_next_activation();
        assert_eq!(a.index, 1);
        assert_eq!(a.release, T0);
        assert_eq!(a.deadline, T0.add_micros(25_000));
        assert!(!a.slept);
        assert_eq!(clock.now(), T0);
    }

    #[test]
    fn wait_sleeps_until_release_when_early() {
        let clock = ManualClock::starting_at(T0);
        let mut act = PeriodicActivation::start(timing(10_000, 4_000), clock.clone());

        let a = act.wait_next_activation();
        assert!(a.slept);
        assert_eq!(clock.now(), T0.add_micros(4_000));
        assert_eq!(clock.sleep_count(), 1);
    }

    #[test]
    fn deadlines_advance_by_exactly_one_period() {
        let clock = ManualClock::starting_at(T0);
        let mut act = PeriodicActivation::start(timing(25_000, 0), clock.clone());

        let mut prev = act.wait_next_activation();
        for _ in 0..20 {
            // Work of varying length, always shorter than the period.
            clock.advance_micros(1_000 + prev.index * 700);
            let next = act.wait_next_activation();
            assert_eq!(next.deadline, prev.deadline.add_micros(25_000));
            assert_eq!(next.release, prev.deadline);
            assert!(next.slept);
            prev = next;
        }
    }

    #[test]
    fn overrun_returns_immediately_and_keeps_grid() {
        let clock = ManualClock::starting_at(T0);
        let mut act = PeriodicActivation::start(timing(25_000, 0), clock.clone());

        let first = act.wait_next_activation();
        clock.advance_micros(50_000); // 2P of work

        let second = act.wait_next_activation();
        assert!(!second.slept, "overrun must not suspend");
        assert_eq!(second.release, first.deadline);
        assert_eq!(second.deadline, T0.add_micros(50_000));
        assert_eq!(clock.now(), T0.add_micros(50_000));

        // Still behind: the grid is not resynchronised to "now".
        clock.advance_micros(10);
        let third = act.wait_next_activation();
        assert!(!third.slept);
        assert_eq!(third.deadline, T0.add_micros(75_000));
    }

    #[test]
    fn release_exactly_at_now_does_not_sleep() {
        let clock = ManualClock::starting_at(T0);
        let mut act = PeriodicActivation::start(timing(1_000, 0), clock.clone());
        act.wait_next_activation();
        clock.advance_micros(1_000);
        let a = act.wait_next_activation();
        assert!(!a.slept);
        assert_eq!(clock.sleep_count(), 0);
    }

    #[test]
    fn grid_holds_across_periods_offsets_and_overruns() {
        for period in [1, 7, 1_000, 5_000, 25_000, 1_000_000] {
            for offset in [0, period / 2, period - 1] {
                let clock = ManualClock::starting_at(T0);
                let mut act = PeriodicActivation::start(timing(period, offset), clock.clone());

                let mut prev = act.wait_next_activation();
                assert_eq!(prev.release, T0.add_micros(offset));
                for k in 1..200u64 {
                    // Every fifth activation overruns by up to three periods.
                    let work = if k % 5 == 0 { period * (1 + k % 3) } else { k * 37 % period };
                    clock.advance_micros(work);

                    let next = act.wait_next_activation();
                    assert_eq!(next.release, prev.deadline, "P={period} O={offset} k={k}");
                    assert_eq!(next.deadline, next.release.add_micros(period));
                    prev = next;
                }
                assert_eq!(prev.release, T0.add_micros(offset + 199 * period));
            }
        }
    }

    mod prop {
        use super::*;
        use proptest::collection::vec;
        use proptest::prelude::*;

        /// Period, offset below it, and per-activation work shorter than it.
        fn short_work() -> impl Strategy<Value = (u64, u64, Vec<u64>)> {
            (1u64..=1_000_000).prop_flat_map(|p| (Just(p), 0..p, vec(0..p, 1..64)))
        }

        /// Period, offset below it, and work of up to three periods.
        fn any_work() -> impl Strategy<Value = (u64, u64, Vec<u64>)> {
            (1u64..=1_000_000).prop_flat_map(|p| (Just(p), 0..p, vec(0..3 * p, 1..64)))
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(256))]

            #[test]
            fn prop_work_within_period_sleeps_to_each_release(
                (period, offset, work) in short_work(),
            ) {
                let clock = ManualClock::starting_at(T0);
                let mut act = PeriodicActivation::start(timing(period, offset), clock.clone());

                let first = act.wait_next_activation();
                prop_assert_eq!(first.release, T0.add_micros(offset));
                prop_assert_eq!(first.slept, offset > 0);

                let mut prev = first;
                for w in work {
                    clock.advance_micros(w);
                    let next = act.wait_next_activation();
                    prop_assert!(next.slept);
                    prop_assert_eq!(clock.now(), next.release);
                    prop_assert_eq!(next.release, prev.deadline);
                    prop_assert_eq!(next.deadline, prev.deadline.add_micros(period));
                    prev = next;
                }
            }

            #[test]
            fn prop_overruns_never_move_the_grid(
                (period, offset, work) in any_work(),
            ) {
                let clock = ManualClock::starting_at(T0);
                let mut act = PeriodicActivation::start(timing(period, offset), clock.clone());

                let mut prev = act.wait_next_activation();
                for (k, w) in work.into_iter().enumerate() {
                    clock.advance_micros(w);
                    let before = clock.now();
                    let next = act.wait_next_activation();

                    prop_assert_eq!(next.slept, before < next.release);
                    prop_assert_eq!(next.release, prev.deadline);
                    prop_assert_eq!(next.deadline, next.release.add_micros(period));
                    prop_assert_eq!(
                        next.release,
                        T0.add_micros(offset + (k as u64 + 1) * period)
                    );
                    prop_assert!(clock.now() >= next.release);
                    prev = next;
                }
            }
        }
    }
}
