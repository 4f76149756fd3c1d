/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Deadline classification and per-task miss accounting.
//!
//! [`DeadlineMonitor::check`] is the pure comparison: an activation that
//! completes *at* its deadline has met it; one nanosecond later it has
//! missed.  The monitor value additionally tracks counters and the current
//! run of consecutive misses, and raises a fault flag once that run reaches
//! the task's `max_dmiss`.  A miss never stops or restarts the task.

use std::cmp::Ordering;
use std::fmt;

use crate::time::{compare, Timestamp};

// ── DeadlineOutcome ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadlineOutcome {
    Met,
    Missed,
}

impl fmt::Display for DeadlineOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeadlineOutcome::Met => f.write_str("met"),
            DeadlineOutcome::Missed => f.write_str("missed"),
        }
    }
}

// ── DeadlineVerdict ───────────────────────────────────────────────────────────

/// Result of [`DeadlineMonitor::observe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeadlineVerdict {
    pub outcome: DeadlineOutcome,

    /// Length of the current miss streak, including this activation.
    pub consecutive_misses: u32,

    /// `true` exactly when the streak reaches `max_dmiss`.  Reported once per
    /// streak, not on every further miss.
    pub fault: bool,

    /// How far past the deadline completion happened, µs (`0` when met).
    pub lateness_us: u64,
}

// ── DeadlineStats ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeadlineStats {
    pub met: u64,
    pub missed: u64,
    pub faults: u64,
    pub max_consecutive_misses: u32,
    pub worst_lateness_us: u64,
}

impl DeadlineStats {
    pub fn total(&self) -> u64 {
        self.met + self.missed
    }

    /// Fraction of activations that missed, `0.0` before any activation.
    pub fn miss_ratio(&self) -> f64 {
        match self.total() {
            0 => 0.0,
            n => self.missed as f64 / n as f64,
        }
    }
}

// ── DeadlineMonitor ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct DeadlineMonitor {
    max_dmiss: u32,
    consecutive: u32,
    stats: DeadlineStats,
}

impl DeadlineMonitor {
    /// `max_dmiss == 0` disables fault reporting.
    pub fn new(max_dmiss: u32) -> Self {
        Self {
            max_dmiss,
            ..Self::default()
        }
    }

    /// `Missed` iff `now` is strictly after `deadline`.
    pub fn check(now: Timestamp, deadline: Timestamp) -> DeadlineOutcome {
        match compare(&now, &deadline) {
            Ordering::Greater => DeadlineOutcome::Missed,
            Ordering::Less | Ordering::Equal => DeadlineOutcome::Met,
        }
    }

    /// Classify one completion and update the counters.
    pub fn observe(&mut self, now: Timestamp, deadline: Timestamp) -> DeadlineVerdict {
        let outcome = Self::check(now, deadline);
        let lateness_us = now.saturating_micros_since(deadline);

        let mut fault = false;
        match outcome {
            DeadlineOutcome::Met => {
                self.stats.met += 1;
                self.consecutive = 0;
            }
            DeadlineOutcome::Missed => {
                self.stats.missed += 1;
                self.consecutive = self.consecutive.saturating_add(1);
                self.stats.max_consecutive_misses =
                    self.stats.max_consecutive_misses.max(self.consecutive);
                self.stats.worst_lateness_us = self.stats.worst_lateness_us.max(lateness_us);
                if self.max_dmiss > 0 && self.consecutive == self.max_dmiss {
                    fault = true;
                    self.stats.faults += 1;
                }
            }
        }

        DeadlineVerdict {
            outcome,
            consecutive_misses: self.consecutive,
            fault,
            lateness_us,
        }
    }

    pub fn stats(&self) -> DeadlineStats {
        self.stats
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
