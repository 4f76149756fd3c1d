/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Pathfinder-sched – fixed-priority periodic task executive
//!
//! Module layout:
//!
//! ```text
//! lib.rs
//! ├── time/         – Timestamp arithmetic, monotonic and manual clocks
//! ├── task.rs       – TaskSpec, scheduling policy, CPU affinity
//! ├── config/       – built-in reference table, YAML loading, validation
//! ├── activation.rs – fixed-rate release grid (wait_next_activation)
//! ├── deadline.rs   – met/missed classification, max_dmiss faults
//! ├── sync/         – priority-inheritance mutex, shared resource partitions
//! ├── work.rs       – task bodies (spin load, test doubles)
//! ├── eventlog.rs   – event log line format, sinks, summary parser
//! ├── runner.rs     – per-task activation loop
//! └── scheduler/    – thread spawn, RT attributes, start gate, join
//! ```

pub mod activation;
pub mod config;
pub mod deadline;
pub mod eventlog;
pub mod runner;
pub mod scheduler;
pub mod sync;
pub mod task;
pub mod time;
pub mod work;
