/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Task-set validation errors.
//!
//! Every variant names the offending task or resource so the message can be
//! printed as-is before the process exits.  Nothing is started when
//! validation fails.

use thiserror::Error;

use crate::task::SchedPolicy;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("task set is empty")]
    NoTasks,

    #[error("task id {0} appears more than once")]
    DuplicateTaskId(u32),

    /// Fixed-priority scheduling needs a strict order between any two tasks.
    #[error("tasks {first} and {second} share priority {priority}")]
    DuplicatePriority { priority: i32, first: u32, second: u32 },

    #[error("task {task} has a zero period")]
    ZeroPeriod { task: u32 },

    #[error("task {task}: offset {offset_us}us must be smaller than period {period_us}us")]
    OffsetOutOfRange {
        task: u32,
        offset_us: u64,
        period_us: u64,
    },

    #[error("task {task}: priority {priority} is outside 1..=99 required by policy {policy}")]
    PriorityOutOfRange {
        task: u32,
        priority: i32,
        policy: SchedPolicy,
    },

    #[error("task {task} references unknown resource '{resource}'")]
    UnknownResource { task: u32, resource: String },

    #[error("resource '{0}' is declared more than once")]
    DuplicateResource(String),

    #[error("resource '{0}' has a zero-length critical section")]
    ZeroCriticalSection(String),

    /// `task == 0` when the CPU came from a command-line override.
    #[error("task {task}: CPU {cpu} is outside the supported range 0..64")]
    CpuOutOfRange { task: u32, cpu: u32 },
}
