/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Shared-resource locking with the priority-inheritance protocol.
//!
//! * [`InheritingMutex`] – a `pthread_mutex_t` created with
//!   `PTHREAD_PRIO_INHERIT`.  The kernel boosts a holder to the priority of
//!   its highest-priority waiter for as long as the lock is held.
//! * [`SharedResource`] – one partition of shared state (a counter) that can
//!   only be reached through its `InheritingMutex`.
//!
//! Without inheritance a medium-priority task can preempt a low-priority
//! holder indefinitely while a high-priority task waits on the lock; that is
//! the failure mode being modelled, and [`LockProtocol::None`] reproduces it
//! on purpose.

pub mod mutex;
pub mod resource;

use thiserror::Error;

pub use mutex::{InheritingMutex, InheritingMutexGuard, LockProtocol};
pub use resource::SharedResource;

/// Lock failures.
///
/// `Init` is fatal at startup: a lock that could not be built must never be
/// replaced by "no lock".  `Acquire` is reported per activation and the
/// critical section is skipped.
#[derive(Debug, Error)]
pub enum LockError {
    /// A pthread call failed while building the mutex.
    #[error("failed to initialise lock '{name}': {call} failed: {source}")]
    Init {
        name: String,
        call: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// `pthread_mutex_lock` / `pthread_mutex_trylock` returned an error.
    #[error("failed to acquire lock '{name}': {source}")]
    Acquire {
        name: String,
        #[source]
        source: std::io::Error,
    },
}
