/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! `pthread_mutex_t` wrapper carrying a priority protocol.

use std::cell::UnsafeCell;
use std::fmt;
use std::marker::PhantomData;
use std::mem::MaybeUninit;
use std::ops::{Deref, DerefMut};

use tracing::error;

use super::LockError;

// ── LockProtocol ──────────────────────────────────────────────────────────────

/// Priority protocol of an [`InheritingMutex`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockProtocol {
    /// `PTHREAD_PRIO_INHERIT`: the holder runs at the priority of its
    /// highest-priority waiter until it unlocks.
    #[default]
    Inherit,

    /// `PTHREAD_PRIO_NONE`: a plain mutex.  Blocking time is unbounded
    /// whenever a medium-priority task preempts the holder.
    None,
}

impl LockProtocol {
    fn to_raw(self) -> libc::c_int {
        match self {
            LockProtocol::Inherit => libc::PTHREAD_PRIO_INHERIT,
            LockProtocol::None => libc::PTHREAD_PRIO_NONE,
        }
    }
}

impl fmt::Display for LockProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockProtocol::Inherit => f.write_str("priority-inheritance"),
            LockProtocol::None => f.write_str("none"),
        }
    }
}

// ── Attribute guard ───────────────────────────────────────────────────────────

/// Destroys an initialised `pthread_mutexattr_t` when dropped.
///
/// Borrows the storage so the attribute is never moved after init.
struct MutexAttr<'a>(&'a mut MaybeUninit<libc::pthread_mutexattr_t>);

impl Drop for MutexAttr<'_> {
    fn drop(&mut self) {
        // SAFETY: only constructed after a successful pthread_mutexattr_init.
        unsafe {
            libc::pthread_mutexattr_destroy(self.0.as_mut_ptr());
        }
    }
}

fn check(rc: libc::c_int, name: &str, call: &'static str) -> Result<(), LockError> {
    if rc == 0 {
        Ok(())
    } else {
        Err(LockError::Init {
            name: name.to_owned(),
            call,
            source: std::io::Error::from_raw_os_error(rc),
        })
    }
}

// ── InheritingMutex ───────────────────────────────────────────────────────────

/// Mutual-exclusion lock around a `T`, backed by a POSIX mutex configured
/// with a [`LockProtocol`].
///
/// The raw mutex lives in its own heap allocation so its address never
/// changes, even when the `InheritingMutex` value itself is moved.
pub struct InheritingMutex<T> {
    raw: Box<UnsafeCell<libc::pthread_mutex_t>>,
    data: UnsafeCell<T>,
    name: String,
    protocol: LockProtocol,
}

// SAFETY: access to `data` is serialised by `raw`; `T: Send` is enough for
// the value to be handed between threads through the lock.
unsafe impl<T: Send> Send for InheritingMutex<T> {}
unsafe impl<T: Send> Sync for InheritingMutex<T> {}

impl<T> InheritingMutex<T> {
    /// Create a lock with the given protocol.
    ///
    /// # Errors
    /// [`LockError::Init`] if any of `pthread_mutexattr_init`,
    /// `pthread_mutexattr_setprotocol` or `pthread_mutex_init` fails
    /// (e.g. `ENOMEM`, or `ENOTSUP` on a libc without PI support).
    pub fn new(
        name: impl Into<String>,
        value: T,
        protocol: LockProtocol,
    ) -> Result<Self, LockError> {
        let name = name.into();

        let mut storage = MaybeUninit::<libc::pthread_mutexattr_t>::uninit();
        // SAFETY: `storage` is valid for writes of a pthread_mutexattr_t.
        check(
            unsafe { libc::pthread_mutexattr_init(storage.as_mut_ptr()) },
            &name,
            "pthread_mutexattr_init",
        )?;
        let attr = MutexAttr(&mut storage);

        // SAFETY: `attr` was initialised above and is not moved.
        check(
            unsafe { libc::pthread_mutexattr_setprotocol(attr.0.as_mut_ptr(), protocol.to_raw()) },
            &name,
            "pthread_mutexattr_setprotocol",
        )?;

        let raw = Box::new(UnsafeCell::new(libc::PTHREAD_MUTEX_INITIALIZER));
        // SAFETY: `raw` points to owned, pinned storage; `attr` is initialised.
        check(
            unsafe { libc::pthread_mutex_init(raw.get(), attr.0.as_ptr()) },
            &name,
            "pthread_mutex_init",
        )?;
        drop(attr);

        Ok(Self {
            raw,
            data: UnsafeCell::new(value),
            name,
            protocol,
        })
    }

    /// Block until the lock is acquired.
    ///
    /// With [`LockProtocol::Inherit`] the current holder is boosted to this
    /// thread's priority while we wait.
    pub fn lock(&self) -> Result<InheritingMutexGuard<'_, T>, LockError> {
        // SAFETY: `raw` was initialised in `new` and is destroyed only in Drop.
        let rc = unsafe { libc::pthread_mutex_lock(self.raw.get()) };
        if rc != 0 {
            return Err(self.acquire_error(rc));
        }
        Ok(InheritingMutexGuard {
            mutex: self,
            _not_send: PhantomData,
        })
    }

    /// Acquire the lock only if it is free right now.
    pub fn try_lock(&self) -> Result<Option<InheritingMutexGuard<'_, T>>, LockError> {
        // SAFETY: as in `lock`.
        let rc = unsafe { libc::pthread_mutex_trylock(self.raw.get()) };
        match rc {
            0 => Ok(Some(InheritingMutexGuard {
                mutex: self,
                _not_send: PhantomData,
            })),
            libc::EBUSY => Ok(None),
            code => Err(self.acquire_error(code)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn protocol(&self) -> LockProtocol {
        self.protocol
    }

    fn acquire_error(&self, rc: libc::c_int) -> LockError {
        LockError::Acquire {
            name: self.name.clone(),
            source: std::io::Error::from_raw_os_error(rc),
        }
    }
}

impl<T> Drop for InheritingMutex<T> {
    fn drop(&mut self) {
        // SAFETY: `&mut self` guarantees no guard is alive.
        unsafe {
            libc::pthread_mutex_destroy(self.raw.get());
        }
    }
}

impl<T> fmt::Debug for InheritingMutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InheritingMutex")
            .field("name", &self.name)
            .field("protocol", &self.protocol)
            .finish_non_exhaustive()
    }
}

// ── Guard ─────────────────────────────────────────────────────────────────────

/// RAII guard; unlocks (and drops any inherited priority) on drop.
///
/// Not `Send`: a POSIX mutex must be unlocked by the thread that locked it.
pub struct InheritingMutexGuard<'a, T> {
    mutex: &'a InheritingMutex<T>,
    _not_send: PhantomData<*const ()>,
}

impl<T> Deref for InheritingMutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the guard proves the lock is held by this thread.
        unsafe { &*self.mutex.data.get() }
    }
}

impl<T> DerefMut for InheritingMutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: the guard proves the lock is held by this thread.
        unsafe { &mut *self.mutex.data.get() }
    }
}

impl<T> Drop for InheritingMutexGuard<'_, T> {
    fn drop(&mut self) {
        // SAFETY: this thread owns the lock.
        let rc = unsafe { libc::pthread_mutex_unlock(self.mutex.raw.get()) };
        if rc != 0 {
            error!(
                lock = %self.mutex.name,
                error = %std::io::Error::from_raw_os_error(rc),
                "pthread_mutex_unlock failed"
            );
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn failed_init_call_is_a_fatal_init_error() {
        assert!(check(0, "bus", "pthread_mutex_init").is_ok());

        let err = check(libc::ENOMEM, "bus", "pthread_mutex_init").unwrap_err();
        match &err {
            LockError::Init { name, call, source } => {
                assert_eq!(name, "bus");
                assert_eq!(*call, "pthread_mutex_init");
                assert_eq!(source.raw_os_error(), Some(libc::ENOMEM));
            }
            other => panic!("expected Init, got {other:?}"),
        }
        assert!(err.to_string().contains("pthread_mutex_init"));
    }

    #[test]
    fn new_inheriting_mutex_succeeds() {
        let m = InheritingMutex::new("bus", 0u32, LockProtocol::Inherit).unwrap();
        assert_eq!(m.name(), "bus");
        assert_eq!(m.protocol(), LockProtocol::Inherit);
    }

    #[test]
    fn plain_protocol_is_supported_too() {
        let m = InheritingMutex::new("plain", 1u32, LockProtocol::None).unwrap();
        assert_eq!(*m.lock().unwrap(), 1);
    }

    #[test]
    fn guard_gives_mutable_access_and_unlocks_on_drop() {
        let m = InheritingMutex::new("bus", 0u64, LockProtocol::Inherit).unwrap();
        {
            let mut g = m.lock().unwrap();
            *g += 5;
        }
        assert_eq!(*m.lock().unwrap(), 5);
    }

    #[test]
    fn try_lock_reports_busy_from_another_thread() {
        let m = Arc::new(InheritingMutex::new("bus", (), LockProtocol::Inherit).unwrap());
        let _held = m.lock().unwrap();

        let other = Arc::clone(&m);
        let busy = thread::spawn(move || other.try_lock().map(|g| g.is_none()))
            .join()
            .unwrap()
            .unwrap();
        assert!(busy, "lock held by the test thread must look busy elsewhere");
    }

    #[test]
    fn try_lock_succeeds_when_free() {
        let m = InheritingMutex::new("bus", 7u8, LockProtocol::Inherit).unwrap();
        let g = m.try_lock().unwrap();
        assert_eq!(g.as_deref(), Some(&7));
    }

    #[test]
    fn moving_the_mutex_keeps_it_usable() {
        let m = InheritingMutex::new("bus", 0u32, LockProtocol::Inherit).unwrap();
        let mut v = vec![m];
        let moved = v.pop().unwrap();
        *moved.lock().unwrap() += 1;
        assert_eq!(*moved.lock().unwrap(), 1);
    }

    #[test]
    fn debug_output_names_the_lock() {
        let m = InheritingMutex::new("data_bus", 0u32, LockProtocol::Inherit).unwrap();
        let s = format!("{m:?}");
        assert!(s.contains("data_bus"));
        assert!(s.contains("Inherit"));
    }
}
