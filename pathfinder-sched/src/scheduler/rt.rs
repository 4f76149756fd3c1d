/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Real-time attributes for task threads.
//!
//! Each task thread applies its own attributes as the first thing it does,
//! before reporting ready: policy and priority via
//! `pthread_setschedparam(pthread_self(), ..)`, then CPU affinity via
//! `sched_setaffinity(0, ..)`.  Nothing is inherited from the spawning
//! thread.

use std::io;
use std::mem;

use thiserror::Error;
use tracing::debug;

use crate::task::{CpuAffinity, SchedPolicy, TaskSpec};

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum RtSetupError {
    #[error("cannot set policy {policy} priority {priority}: {source}")]
    SchedParam {
        policy: SchedPolicy,
        priority: i32,
        #[source]
        source: io::Error,
    },

    #[error("cannot pin thread to CPUs {cpus:?}: {source}")]
    Affinity {
        cpus: Vec<u32>,
        #[source]
        source: io::Error,
    },

    #[error("mlockall failed: {0}")]
    LockMemory(#[source] io::Error),
}

impl RtSetupError {
    /// `true` when the host simply lacks real-time privileges
    /// (no `CAP_SYS_NICE`, RLIMIT_RTPRIO of 0, ...).
    pub fn is_permission_denied(&self) -> bool {
        let source = match self {
            RtSetupError::SchedParam { source, .. }
            | RtSetupError::Affinity { source, .. }
            | RtSetupError::LockMemory(source) => source,
        };
        source.kind() == io::ErrorKind::PermissionDenied
    }
}

// ── ThreadParams ──────────────────────────────────────────────────────────────

/// Scheduling attributes for one task thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadParams {
    pub policy: SchedPolicy,
    pub priority: i32,
    pub affinity: CpuAffinity,
}

impl ThreadParams {
    pub fn for_task(spec: &TaskSpec) -> Self {
        Self {
            policy: spec.policy,
            priority: spec.priority,
            affinity: spec.affinity,
        }
    }

    /// Priority handed to the kernel.  `SCHED_OTHER` only accepts 0.
    pub fn kernel_priority(&self) -> i32 {
        if self.policy.is_realtime() {
            self.priority
        } else {
            0
        }
    }

    /// Apply policy and priority, then affinity, to the calling thread.
    ///
    /// Priority first: a `SCHED_OTHER` thread pinned onto a CPU saturated by
    /// real-time work does not get to run again.
    pub fn apply_to_current_thread(&self) -> Result<(), RtSetupError> {
        let param = libc::sched_param {
            sched_priority: self.kernel_priority(),
        };
        // SAFETY: pthread_self() is always a valid handle for the caller and
        // `param` outlives the call.
        let rc = unsafe {
            libc::pthread_setschedparam(libc::pthread_self(), self.policy.to_linux_int(), &param)
        };
        if rc != 0 {
            return Err(RtSetupError::SchedParam {
                policy: self.policy,
                priority: self.priority,
                source: io::Error::from_raw_os_error(rc),
            });
        }

        if let CpuAffinity::Pinned(_) = self.affinity {
            set_current_affinity(&self.affinity.cpus())?;
        }

        debug!(
            policy = %self.policy,
            priority = param.sched_priority,
            affinity = ?self.affinity,
            "thread attributes applied"
        );
        Ok(())
    }
}

// ── Process / thread helpers ──────────────────────────────────────────────────

fn set_current_affinity(cpus: &[u32]) -> Result<(), RtSetupError> {
    // SAFETY: cpu_set_t is plain data; zeroed is a valid (empty) set, and
    // every CPU id is below 64, well inside CPU_SETSIZE.
    let rc = unsafe {
        let mut set: libc::cpu_set_t = mem::zeroed();
        libc::CPU_ZERO(&mut set);
        for &cpu in cpus {
            libc::CPU_SET(cpu as usize, &mut set);
        }
        libc::sched_setaffinity(0, mem::size_of::<libc::cpu_set_t>(), &set)
    };
    if rc != 0 {
        return Err(RtSetupError::Affinity {
            cpus: cpus.to_vec(),
            source: io::Error::last_os_error(),
        });
    }
    Ok(())
}

/// CPUs the calling thread is currently allowed to run on (ids below 64).
pub fn allowed_cpus() -> io::Result<Vec<u32>> {
    // SAFETY: zeroed cpu_set_t is valid; the kernel fills it in.
    unsafe {
        let mut set: libc::cpu_set_t = mem::zeroed();
        if libc::sched_getaffinity(0, mem::size_of::<libc::cpu_set_t>(), &mut set) != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok((0..64u32)
            .filter(|&cpu| libc::CPU_ISSET(cpu as usize, &set))
            .collect())
    }
}

/// `(policy, priority)` of the calling thread as the kernel reports them.
pub fn current_thread_sched() -> io::Result<(i32, i32)> {
    let mut policy: libc::c_int = 0;
    let mut param = libc::sched_param { sched_priority: 0 };
    // SAFETY: both out-pointers are valid for the duration of the call.
    let rc = unsafe { libc::pthread_getschedparam(libc::pthread_self(), &mut policy, &mut param) };
    if rc != 0 {
        return Err(io::Error::from_raw_os_error(rc));
    }
    Ok((policy, param.sched_priority))
}

/// Lock current and future pages into RAM.
pub fn lock_memory() -> Result<(), RtSetupError> {
    // SAFETY: mlockall takes no pointers.
    if unsafe { libc::mlockall(libc::MCL_CURRENT | libc::MCL_FUTURE) } != 0 {
        return Err(RtSetupError::LockMemory(io::Error::last_os_error()));
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn normal() -> ThreadParams {
        ThreadParams {
            policy: SchedPolicy::Normal,
            priority: 42,
            affinity: CpuAffinity::Any,
        }
    }

    #[test]
    fn normal_policy_always_uses_kernel_priority_zero() {
        assert_eq!(normal().kernel_priority(), 0);
        let fifo = ThreadParams {
            policy: SchedPolicy::Fifo,
            ..normal()
        };
        assert_eq!(fifo.kernel_priority(), 42);
    }

    #[test]
    fn normal_policy_applies_without_privileges() {
        std::thread::spawn(|| {
            normal().apply_to_current_thread().unwrap();
            let (policy, prio) = current_thread_sched().unwrap();
            assert_eq!(policy, libc::SCHED_OTHER);
            assert_eq!(prio, 0);
        })
        .join()
        .unwrap();
    }

    #[test]
    fn pinning_to_an_allowed_cpu_restricts_the_thread() {
        let cpus = allowed_cpus().unwrap();
        assert!(!cpus.is_empty());
        let target = cpus[0];

        std::thread::spawn(move || {
            let params = ThreadParams {
                affinity: CpuAffinity::single(target),
                ..normal()
            };
            params.apply_to_current_thread().unwrap();
            assert_eq!(allowed_cpus().unwrap(), vec![target]);
        })
        .join()
        .unwrap();
    }

    #[test]
    fn realtime_failure_is_reported_not_ignored() {
        let result = std::thread::spawn(|| {
            ThreadParams {
                policy: SchedPolicy::Fifo,
                priority: 10,
                affinity: CpuAffinity::Any,
            }
            .apply_to_current_thread()
        })
        .join()
        .unwrap();

        // Either the host grants SCHED_FIFO or the error says why not.
        if let Err(e) = result {
            assert!(matches!(e, RtSetupError::SchedParam { priority: 10, .. }));
            assert!(e.is_permission_denied());
        }
    }

    #[test]
    fn for_task_copies_scheduling_fields() {
        let spec = crate::config::TaskSetConfig::reference().tasks()[0].clone();
        let p = ThreadParams::for_task(&spec);
        assert_eq!(p.policy, SchedPolicy::Fifo);
        assert_eq!(p.priority, 90);
        assert_eq!(p.affinity, CpuAffinity::Any);
    }
}
