/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! One partition of shared state behind an [`InheritingMutex`].

use std::time::Duration;

use tracing::debug;

use super::{InheritingMutex, LockError, LockProtocol};

/// A shared counter that can only be read or mutated inside its lock.
///
/// Owned by the scheduler and handed out as `Arc<SharedResource>` to exactly
/// the tasks configured to use it.  There is no other access path.
#[derive(Debug)]
pub struct SharedResource {
    counter: InheritingMutex<u64>,
    critical_section_us: u64,
}

impl SharedResource {
    /// Build the partition and its lock.
    ///
    /// # Errors
    /// Propagates [`LockError::Init`]; the caller must treat it as fatal.
    pub fn new(
        name: impl Into<String>,
        critical_section_us: u64,
        protocol: LockProtocol,
    ) -> Result<Self, LockError> {
        let counter = InheritingMutex::new(name, 0, protocol)?;
        debug!(
            resource = counter.name(),
            critical_section_us,
            protocol = %protocol,
            "shared resource created"
        );
        Ok(Self {
            counter,
            critical_section_us,
        })
    }

    pub fn name(&self) -> &str {
        self.counter.name()
    }

    pub fn protocol(&self) -> LockProtocol {
        self.counter.protocol()
    }

    /// How long one critical section is meant to hold the lock.
    pub fn critical_section(&self) -> Duration {
        Duration::from_micros(self.critical_section_us)
    }

    /// Run `f` with exclusive access to the counter.
    ///
    /// The lock is released (and any inherited priority dropped) before this
    /// returns, including when `f` panics.
    pub fn access<R>(&self, f: impl FnOnce(&mut u64) -> R) -> Result<R, LockError> {
        let mut guard = self.counter.lock()?;
        Ok(f(&mut *guard))
    }

    /// Current counter value, read under the lock.
    pub fn value(&self) -> Result<u64, LockError> {
        self.access(|c| *c)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_mutates_under_the_lock() {
        let r = SharedResource::new("data_bus", 200, LockProtocol::Inherit).unwrap();
        let after = r.access(|c| {
            *c += 3;
            *c
        });
        assert_eq!(after.unwrap(), 3);
        assert_eq!(r.value().unwrap(), 3);
    }

    #[test]
    fn exposes_name_protocol_and_section_length() {
        let r = SharedResource::new("control_bus", 150, LockProtocol::None).unwrap();
        assert_eq!(r.name(), "control_bus");
        assert_eq!(r.protocol(), LockProtocol::None);
        assert_eq!(r.critical_section(), Duration::from_micros(150));
    }

    #[test]
    fn lock_is_released_after_a_panicking_section() {
        let r = SharedResource::new("bus", 1, LockProtocol::Inherit).unwrap();
        let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ = r.access(|_| panic!("boom"));
        }));
        assert!(res.is_err());
        assert_eq!(r.value().unwrap(), 0);
    }
}
