/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Release grid behaviour against the real monotonic clock and a manual one.

use std::sync::Arc;
use std::time::Duration;

use pathfinder_sched::activation::PeriodicActivation;
use pathfinder_sched::config::TaskSetConfig;
use pathfinder_sched::deadline::DeadlineOutcome;
use pathfinder_sched::eventlog::{EventKind, MemorySink};
use pathfinder_sched::runner::TaskRunner;
use pathfinder_sched::task::ReleaseTiming;
use pathfinder_sched::time::{Clock, ManualClock, MonotonicClock, Timestamp};

const PERIOD_US: u64 = 25_000;

#[test]
fn real_clock_releases_on_the_25ms_grid() {
    let clock = MonotonicClock;
    let t0 = clock.now();
    let timing = ReleaseTiming {
        period_us: PERIOD_US,
        offset_us: 0,
    };
    let mut grid = PeriodicActivation::start_at(timing, clock, t0);

    for k in 0..3u64 {
        let a = grid.wait_next_activation();
        assert_eq!(a.release, t0.add_micros(k * PERIOD_US));
        assert_eq!(a.deadline, t0.add_micros((k + 1) * PERIOD_US));
        // Never woken before the scheduled release.
        assert!(MonotonicClock.now() >= a.release);
    }
}

#[test]
fn real_clock_wakes_close_to_the_release() {
    let clock = MonotonicClock;
    let t0 = clock.now();
    let timing = ReleaseTiming {
        period_us: 5_000,
        offset_us: 2_000,
    };
    let mut grid = PeriodicActivation::start_at(timing, clock, t0);

    let a = grid.wait_next_activation();
    assert!(a.slept);
    assert_eq!(a.release, t0.add_micros(2_000));
    let late_us = MonotonicClock.now().saturating_micros_since(a.release);
    // Generous: CI machines are noisy, but a missed wakeup would be far worse.
    assert!(late_us < 20_000, "woke {late_us}us after release");
}

#[test]
fn overrun_on_the_real_clock_skips_the_sleep() {
    let clock = MonotonicClock;
    let timing = ReleaseTiming {
        period_us: 2_000,
        offset_us: 0,
    };
    let mut grid = PeriodicActivation::start(timing, clock);

    let first = grid.wait_next_activation();
    // Work for twice the period.
    std::thread::sleep(Duration::from_micros(4_000));
    let second = grid.wait_next_activation();

    assert!(!second.slept);
    assert_eq!(second.release, first.deadline);
    assert_eq!(second.deadline, first.deadline.add_micros(2_000));
}

#[test]
fn reference_task_on_a_manual_clock_meets_every_deadline() {
    let t0 = Timestamp::new(100, 0);
    let clock = ManualClock::starting_at(t0);
    let sink = Arc::new(MemorySink::new());

    let spec = TaskSetConfig::reference().tasks()[0].clone();
    let wcet = spec.wcet_us;
    let work_clock = clock.clone();
    let mut task = TaskRunner::new(spec, clock.clone(), sink.clone())
        .with_work(move |_: Duration| work_clock.advance_micros(wcet))
        .start_at(t0);

    let reports: Vec<_> = (0..4).map(|_| task.step()).collect();

    for (k, r) in reports.iter().enumerate() {
        let k = k as u64;
        assert_eq!(r.activation.release, t0.add_micros(k * PERIOD_US));
        assert_eq!(r.finished, t0.add_micros(k * PERIOD_US + wcet));
        assert_eq!(r.verdict.outcome, DeadlineOutcome::Met);
    }

    let kinds: Vec<EventKind> = sink.records().iter().map(|r| r.kind).collect();
    assert_eq!(
        kinds,
        [EventKind::Activation, EventKind::DeadlineMet].repeat(4)
    );
}

#[test]
fn overrunning_task_misses_then_recovers_on_the_fixed_grid() {
    let t0 = Timestamp::new(5, 0);
    let clock = ManualClock::starting_at(t0);
    let sink = Arc::new(MemorySink::new());

    let mut spec = TaskSetConfig::reference().tasks()[0].clone();
    spec.max_dmiss = 0;

    // First activation runs 2P, the rest are short.
    let work_clock = clock.clone();
    let mut budgets = vec![2 * PERIOD_US, 1_000, 1_000, 1_000].into_iter();
    let mut task = TaskRunner::new(spec, clock.clone(), sink)
        .with_work(move |_: Duration| work_clock.advance_micros(budgets.next().unwrap_or(0)))
        .start_at(t0);

    let r1 = task.step();
    assert_eq!(r1.verdict.outcome, DeadlineOutcome::Missed);
    assert_eq!(r1.verdict.lateness_us, PERIOD_US);

    // Release 2 (t0+P) is already past: no sleep, completes at t0+2P+1ms,
    // after its deadline t0+2P.
    let r2 = task.step();
    assert!(!r2.activation.slept);
    assert_eq!(r2.activation.release, t0.add_micros(PERIOD_US));
    assert_eq!(r2.verdict.outcome, DeadlineOutcome::Missed);

    // Release 3 (t0+2P) is also past, but the work fits before t0+3P.
    let r3 = task.step();
    assert!(!r3.activation.slept);
    assert_eq!(r3.verdict.outcome, DeadlineOutcome::Met);

    // Back on the grid: release 4 needs a real sleep.
    let r4 = task.step();
    assert!(r4.activation.slept);
    assert_eq!(r4.activation.release, t0.add_micros(3 * PERIOD_US));

    let stats = task.stats();
    assert_eq!((stats.met, stats.missed), (2, 2));
    assert_eq!(stats.max_consecutive_misses, 2);
}
