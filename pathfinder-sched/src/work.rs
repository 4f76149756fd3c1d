/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Task bodies.
//!
//! The scheduler does not care what a task computes, only that the body runs
//! once per activation, synchronously, for roughly its budget.  [`SpinWork`]
//! stands in for the real computation by burning CPU; tests substitute
//! deterministic doubles.

use std::hint::black_box;
use std::time::{Duration, Instant};

/// One unit of task computation.
pub trait Workload: Send {
    /// Run for approximately `budget`.
    fn run(&mut self, budget: Duration);
}

/// CPU-bound filler: spins until `budget` of wall time has elapsed.
///
/// Spinning is the point here: it models computation, so under `SCHED_FIFO`
/// it holds the CPU exactly like a real control-law evaluation would.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpinWork;

impl Workload for SpinWork {
    fn run(&mut self, budget: Duration) {
        let end = Instant::now() + budget;
        let mut acc = 0u64;
        while Instant::now() < end {
            acc = black_box(acc.wrapping_add(1));
        }
    }
}

impl<F> Workload for F
where
    F: FnMut(Duration) + Send,
{
    fn run(&mut self, budget: Duration) {
        self(budget)
    }
}
