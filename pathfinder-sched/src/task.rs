/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Core task data structures for the periodic scheduler.
//!
//! ```text
//! YAML / built-in table ──► TaskSpec ──(Scheduler)──► TaskRunner ──► RunningTask
//!                            ↑ immutable after validation     ↑ owns PeriodicActivation
//! ```
//!
//! # Ownership model
//! A validated `TaskSpec` is **cloned** into exactly one `TaskRunner`; from
//! then on the runner's thread is the only reader.  Nothing in a spec changes
//! while the task set is running (the task set is fixed before start).

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

// ── Scheduling policy ─────────────────────────────────────────────────────────

/// Linux scheduling policy for a task thread.
///
/// `Fifo` is the discipline the control application is designed for.
/// `Normal` exists so the task set can be exercised on hosts without
/// real-time privileges (priorities are then meaningless to the kernel).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedPolicy {
    /// `SCHED_OTHER` – standard Linux CFS scheduling.
    #[serde(alias = "other")]
    Normal,
    /// `SCHED_FIFO` – real-time run-to-block at fixed priority.
    #[default]
    Fifo,
    /// `SCHED_RR` – real-time round-robin.
    #[serde(alias = "rr")]
    RoundRobin,
}

impl SchedPolicy {
    /// Convert to the policy constant expected by `pthread_setschedparam`.
    pub fn to_linux_int(self) -> i32 {
        match self {
            SchedPolicy::Normal => libc::SCHED_OTHER,
            SchedPolicy::Fifo => libc::SCHED_FIFO,
            SchedPolicy::RoundRobin => libc::SCHED_RR,
        }
    }

    /// `true` for the fixed-priority real-time classes.
    pub fn is_realtime(self) -> bool {
        !matches!(self, SchedPolicy::Normal)
    }
}

impl fmt::Display for SchedPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SchedPolicy::Normal => "normal",
            SchedPolicy::Fifo => "fifo",
            SchedPolicy::RoundRobin => "rr",
        };
        f.write_str(s)
    }
}

impl FromStr for SchedPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "normal" | "other" => Ok(SchedPolicy::Normal),
            "fifo" => Ok(SchedPolicy::Fifo),
            "rr" | "round_robin" => Ok(SchedPolicy::RoundRobin),
            other => Err(format!(
                "unknown scheduling policy '{other}' (valid: normal, fifo, rr)"
            )),
        }
    }
}

// ── CPU affinity ──────────────────────────────────────────────────────────────

/// CPU affinity constraint for a task thread.
///
/// The priority-inversion scenario only plays out deterministically on a
/// single CPU, so the usual setup pins every task to the same core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CpuAffinity {
    /// No constraint – the thread inherits the process CPU set.
    #[default]
    Any,

    /// Pinned to a set of CPUs expressed as a bitmask.
    ///
    /// Bit N being set means CPU N is allowed.  E.g. `0x0C` = CPUs 2 and 3.
    Pinned(u64),
}

impl CpuAffinity {
    /// Pin to exactly one CPU.  CPUs beyond 63 are not representable and
    /// yield `Any`.
    pub fn single(cpu: u32) -> Self {
        1u64.checked_shl(cpu).map_or(CpuAffinity::Any, CpuAffinity::Pinned)
    }

    /// CPU ids selected by a `Pinned` mask, lowest first.  Empty for `Any`.
    pub fn cpus(&self) -> Vec<u32> {
        match self {
            CpuAffinity::Any => Vec::new(),
            CpuAffinity::Pinned(mask) => (0..64).filter(|c| (mask >> c) & 1 == 1).collect(),
        }
    }
}

// ── Release timing ────────────────────────────────────────────────────────────

/// The two numbers that define a task's release grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReleaseTiming {
    /// Distance between consecutive releases, µs.  Always `> 0`.
    pub period_us: u64,
    /// Delay of the first release after the grid epoch, µs.  `< period_us`.
    pub offset_us: u64,
}

// ── TaskSpec ──────────────────────────────────────────────────────────────────

/// Static description of one periodic task.
///
/// Built by [`TaskSetConfig`](crate::config::TaskSetConfig) and only ever
/// handed out after validation, so `period_us > 0`, `offset_us < period_us`
/// and the priority fits the policy.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskSpec {
    // ── Identity ──────────────────────────────────────────────────────────────
    /// Stable small integer, printed as `Thread <id>` in the event log.
    pub id: u32,

    /// Human-readable name; also used as the OS thread name.
    pub name: String,

    // ── Scheduling parameters ─────────────────────────────────────────────────
    /// Linux scheduling policy.
    pub policy: SchedPolicy,

    /// Fixed priority (1–99 for FIFO/RR, 0 for Normal).  Higher runs first.
    pub priority: i32,

    /// CPU affinity constraint.
    pub affinity: CpuAffinity,

    // ── Timing (all in microseconds) ──────────────────────────────────────────
    /// Task period in µs.  The deadline is implicit: the next release.
    pub period_us: u64,

    /// Offset of the first release from the grid epoch, in µs.
    pub offset_us: u64,

    /// Declared worst-case execution time in µs.  Sizes the simulated work;
    /// never enforced.
    pub wcet_us: u64,

    // ── Resources & fault reporting ───────────────────────────────────────────
    /// Resource partition this task touches once per activation, if any.
    pub resource: Option<String>,

    /// Consecutive deadline misses tolerated before a fault is logged.
    /// `0` disables fault reporting.
    pub max_dmiss: u32,
}

impl TaskSpec {
    pub fn timing(&self) -> ReleaseTiming {
        ReleaseTiming {
            period_us: self.period_us,
            offset_us: self.offset_us,
        }
    }

    /// CPU utilisation fraction: `wcet_us / period_us`.
    ///
    /// Returns `0.0` when `period_us` is zero to avoid division by zero.
    pub fn utilization(&self) -> f64 {
        if self.period_us == 0 {
            0.0
        } else {
            self.wcet_us as f64 / self.period_us as f64
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(period_us: u64, wcet_us: u64) -> TaskSpec {
        TaskSpec {
            id: 1,
            name: "t".into(),
            policy: SchedPolicy::Fifo,
            priority: 10,
            affinity: CpuAffinity::Any,
            period_us,
            offset_us: 0,
            wcet_us,
            resource: None,
            max_dmiss: 0,
        }
    }

    // ── SchedPolicy ───────────────────────────────────────────────────────────

    #[test]
    fn sched_policy_maps_to_libc_constants() {
        assert_eq!(SchedPolicy::Normal.to_linux_int(), libc::SCHED_OTHER);
        assert_eq!(SchedPolicy::Fifo.to_linux_int(), libc::SCHED_FIFO);
        assert_eq!(SchedPolicy::RoundRobin.to_linux_int(), libc::SCHED_RR);
    }

    #[test]
    fn sched_policy_parses_cli_spellings() {
        assert_eq!("fifo".parse::<SchedPolicy>(), Ok(SchedPolicy::Fifo));
        assert_eq!("RR".parse::<SchedPolicy>(), Ok(SchedPolicy::RoundRobin));
        assert_eq!("other".parse::<SchedPolicy>(), Ok(SchedPolicy::Normal));
        assert!("deadline".parse::<SchedPolicy>().is_err());
    }

    #[test]
    fn sched_policy_display_round_trips_through_from_str() {
        for p in [SchedPolicy::Normal, SchedPolicy::Fifo, SchedPolicy::RoundRobin] {
            assert_eq!(p.to_string().parse::<SchedPolicy>(), Ok(p));
        }
    }

    #[test]
    fn only_normal_is_not_realtime() {
        assert!(!SchedPolicy::Normal.is_realtime());
        assert!(SchedPolicy::Fifo.is_realtime());
        assert!(SchedPolicy::RoundRobin.is_realtime());
    }

    // ── CpuAffinity ───────────────────────────────────────────────────────────

    #[test]
    fn cpu_affinity_bitmask_lists_selected_cpus() {
        let aff = CpuAffinity::Pinned(0b0000_1100); // CPUs 2 and 3
        assert_eq!(aff.cpus(), vec![2, 3]);
        assert_eq!(CpuAffinity::Pinned(1 << 63).cpus(), vec![63]);
    }

    #[test]
    fn cpu_affinity_single_sets_one_bit() {
        assert_eq!(CpuAffinity::single(5), CpuAffinity::Pinned(1 << 5));
        assert_eq!(CpuAffinity::single(64), CpuAffinity::Any);
    }

    #[test]
    fn cpu_affinity_any_lists_no_cpus() {
        assert!(CpuAffinity::Any.cpus().is_empty());
    }

    // ── TaskSpec ──────────────────────────────────────────────────────────────

    #[test]
    fn utilization_is_wcet_over_period() {
        assert!((spec(25_000, 5_000).utilization() - 0.2).abs() < 1e-9);
        assert_eq!(spec(0, 5_000).utilization(), 0.0);
    }

    #[test]
    fn timing_carries_period_and_offset() {
        let mut s = spec(50_000, 5_000);
        s.offset_us = 1_000;
        assert_eq!(
            s.timing(),
            ReleaseTiming {
                period_us: 50_000,
                offset_us: 1_000
            }
        );
    }
}
