//! Sessions and exchanges (`spec.md` §4.6).
//!
//! A [`Session`] is a logical connection; an [`Exchange`] is what a caller
//! actually sends requests through, acquired with `exchange_begin` and
//! released by dropping it. The three [`ExchangeMgmt`] modes differ only in
//! what begin/drop do to get from one to the other: `Atomic` hands back the
//! session's own phone untouched, `Serialize` spins on a session-owned
//! exclusion flag around that phone, `Parallel` hands back a private
//! cloned phone (reused from a per-session free list where possible) so
//! concurrent exchanges never contend.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, Ordering};

use spin::Mutex;

use crate::error::AsyncError;
use crate::ids::PhoneHandle;
use crate::syscalls::Syscalls;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeMgmt {
    /// One message per exchange; no serialization needed.
    Atomic,
    /// Exchanges serialize on a lock owned by the session.
    Serialize,
    /// Each exchange gets its own cloned phone.
    Parallel,
}

struct SessionInner {
    /// Held only in `Serialize` mode, for the duration of one exchange.
    /// A plain spin flag rather than a real mutex: the fibril executor is
    /// the thing responsible for yielding a blocked fibril, this just
    /// needs to be correct under concurrent carrier threads.
    serialize_locked: AtomicBool,
    /// Spare cloned phones parked here between `Parallel` exchanges so a
    /// session under steady load isn't forever cloning and hanging up
    /// phones — the same cache HelenOS's async session keeps.
    phone_cache: Mutex<Vec<PhoneHandle>>,
}

pub struct Session<S: Syscalls> {
    syscalls: Arc<S>,
    base_phone: PhoneHandle,
    mgmt: ExchangeMgmt,
    inner: SessionInner,
}

impl<S: Syscalls> Session<S> {
    pub fn new(syscalls: Arc<S>, base_phone: PhoneHandle, mgmt: ExchangeMgmt) -> Arc<Self> {
        Arc::new(Session {
            syscalls,
            base_phone,
            mgmt,
            inner: SessionInner {
                serialize_locked: AtomicBool::new(false),
                phone_cache: Mutex::new(Vec::new()),
            },
        })
    }

    pub fn mgmt(&self) -> ExchangeMgmt {
        self.mgmt
    }

    pub fn syscalls(&self) -> &Arc<S> {
        &self.syscalls
    }

    /// Acquires an exchange. In `Serialize` mode this spins until the
    /// session's exclusion flag is free — a real build yields the calling
    /// fibril back to the executor on each failed attempt rather than
    /// busy-spinning; that hookup belongs to the executor, not here. In
    /// `Parallel` mode it pops a cached phone or clones a fresh one.
    pub fn exchange_begin(self: &Arc<Self>) -> Result<Exchange<S>, AsyncError> {
        match self.mgmt {
            ExchangeMgmt::Atomic => Ok(Exchange {
                session: self.clone(),
                phone: self.base_phone,
                holds_serialize: false,
                parallel: false,
            }),
            ExchangeMgmt::Serialize => {
                while self
                    .inner
                    .serialize_locked
                    .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                    .is_err()
                {
                    core::hint::spin_loop();
                }
                Ok(Exchange {
                    session: self.clone(),
                    phone: self.base_phone,
                    holds_serialize: true,
                    parallel: false,
                })
            }
            ExchangeMgmt::Parallel => {
                let cached = self.inner.phone_cache.lock().pop();
                let phone = match cached {
                    Some(p) => p,
                    None => self.syscalls.clone_phone(self.base_phone)?,
                };
                Ok(Exchange {
                    session: self.clone(),
                    phone,
                    holds_serialize: false,
                    parallel: true,
                })
            }
        }
    }
}

/// An acquired exchange. Dropping it is `exchange_end`: releases the
/// serialize flag or returns the cloned phone to the session's cache,
/// depending on management mode.
pub struct Exchange<S: Syscalls> {
    session: Arc<Session<S>>,
    phone: PhoneHandle,
    holds_serialize: bool,
    parallel: bool,
}

impl<S: Syscalls> Exchange<S> {
    pub fn phone(&self) -> PhoneHandle {
        self.phone
    }

    pub fn syscalls(&self) -> &Arc<S> {
        self.session.syscalls()
    }
}

impl<S: Syscalls> Drop for Exchange<S> {
    fn drop(&mut self) {
        if self.holds_serialize {
            self.session.inner.serialize_locked.store(false, Ordering::Release);
        }
        if self.parallel {
            self.session.inner.phone_cache.lock().push(self.phone);
        }
    }
}

#[cfg(test)]
mod tests {
    use core::sync::atomic::Ordering;

    use crate::test_support::MockSyscalls;
    use crate::PhoneHandle;

    use super::*;

    #[test]
    fn test_atomic_exchanges_reuse_the_session_phone() {
        let syscalls = MockSyscalls::new();
        let session = Session::new(syscalls, PhoneHandle(1), ExchangeMgmt::Atomic);

        let a = session.exchange_begin().unwrap();
        assert_eq!(a.phone(), PhoneHandle(1));
        drop(a);
        let b = session.exchange_begin().unwrap();
        assert_eq!(b.phone(), PhoneHandle(1));
    }

    #[test]
    fn test_serialize_exchanges_release_the_flag_on_drop() {
        let syscalls = MockSyscalls::new();
        let session = Session::new(syscalls, PhoneHandle(7), ExchangeMgmt::Serialize);

        let first = session.exchange_begin().unwrap();
        assert!(session.inner.serialize_locked.load(Ordering::Acquire));
        drop(first);
        assert!(!session.inner.serialize_locked.load(Ordering::Acquire));

        // A second exchange can now be acquired without spinning forever.
        let second = session.exchange_begin().unwrap();
        assert_eq!(second.phone(), PhoneHandle(7));
    }

    #[test]
    fn test_parallel_exchanges_clone_then_reuse_cached_phones() {
        let syscalls = MockSyscalls::new();
        let session = Session::new(syscalls.clone(), PhoneHandle(1), ExchangeMgmt::Parallel);

        let first = session.exchange_begin().unwrap();
        let second = session.exchange_begin().unwrap();
        assert_ne!(first.phone(), second.phone());
        assert_eq!(syscalls.clones_issued.load(Ordering::Relaxed), 2);

        drop(first);
        drop(second);

        // Both prior phones are cached; a third exchange must not clone again.
        let _third = session.exchange_begin().unwrap();
        let _fourth = session.exchange_begin().unwrap();
        assert_eq!(syscalls.clones_issued.load(Ordering::Relaxed), 2);
    }
}
