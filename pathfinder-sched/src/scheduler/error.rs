/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Structured error types for scheduler startup and shutdown.
//!
//! Every startup failure is fatal and happens before the start gate opens, so
//! when [`Scheduler::start()`](super::Scheduler::start) returns an error no
//! task has executed a single activation.

use thiserror::Error;

use super::rt::RtSetupError;
use crate::sync::LockError;

#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A resource lock could not be built.  Never downgraded to "no lock".
    #[error(transparent)]
    Lock(#[from] LockError),

    /// A task thread could not apply its policy, priority or affinity.
    #[error("task {task}: {source}")]
    RtSetup {
        task: u32,
        #[source]
        source: RtSetupError,
    },

    #[error("locking process memory: {0}")]
    LockMemory(#[source] RtSetupError),

    #[error("failed to spawn thread for task {task}: {source}")]
    ThreadSpawn {
        task: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("task {task} references unknown resource '{resource}'")]
    UnknownResource { task: u32, resource: String },

    #[error("task {task} thread panicked")]
    TaskPanicked { task: u32 },
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_init_failure_converts_to_lock_error() {
        let lock = LockError::Init {
            name: "data_bus".into(),
            call: "pthread_mutex_init",
            source: std::io::Error::from_raw_os_error(libc::ENOMEM),
        };
        let message = lock.to_string();

        let err = SchedulerError::from(lock);
        assert!(matches!(
            err,
            SchedulerError::Lock(LockError::Init {
                call: "pthread_mutex_init",
                ..
            })
        ));
        // Transparent: the lock's own message is surfaced unchanged.
        assert_eq!(err.to_string(), message);
    }
}
