//! Userspace async IPC framework (`spec.md` §4.6): sessions, exchanges,
//! fibrils, `aid_t`-keyed requests and the composite handshakes built on
//! top of them. Layered over the raw call/answer/forward protocol the
//! kernel core implements — this crate never talks to that core directly,
//! only through the [`syscalls::Syscalls`] trait, the same narrow-boundary
//! discipline the kernel core uses for its own [`Scheduler`]-equivalent
//! collaborator.
//!
//! [`Scheduler`]: https://doc.rust-lang.org/nightly/core/task/index.html

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod composite;
pub mod error;
pub mod executor;
pub mod ids;
pub mod request;
pub mod session;
pub mod syscalls;

pub use error::AsyncError;
pub use executor::Executor;
pub use ids::{AsyncId, PhoneHandle};
pub use request::{AsyncReply, Requests};
pub use session::{Exchange, ExchangeMgmt, Session};
pub use syscalls::{Syscalls, WaitEvent};

/// A fake [`Syscalls`] used only by this crate's own unit tests, plus a
/// tiny bounded `block_on` for polling a future without pulling in an
/// executor crate just to test one.
#[cfg(test)]
pub(crate) mod test_support {
    use alloc::sync::Arc;
    use core::future::Future;
    use core::pin::Pin;
    use core::sync::atomic::{AtomicU64, Ordering};
    use core::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

    use spin::Mutex;

    use crate::error::AsyncError;
    use crate::ids::{AsyncId, PhoneHandle};
    use crate::syscalls::{Syscalls, WaitEvent};

    #[derive(Default)]
    pub struct MockSyscalls {
        next_id: AtomicU64,
        next_phone: AtomicU64,
        pub clones_issued: AtomicU64,
        pub events: Mutex<alloc::collections::VecDeque<WaitEvent>>,
    }

    impl MockSyscalls {
        pub fn new() -> Arc<Self> {
            Arc::new(Self {
                next_id: AtomicU64::new(1),
                next_phone: AtomicU64::new(100),
                clones_issued: AtomicU64::new(0),
                events: Mutex::new(alloc::collections::VecDeque::new()),
            })
        }

        fn fresh_id(&self) -> AsyncId {
            AsyncId(self.next_id.fetch_add(1, Ordering::Relaxed))
        }
    }

    impl Syscalls for MockSyscalls {
        fn call_async_fast(&self, _phone: PhoneHandle, _method: u64, _a1: u64, _a2: u64) -> Result<AsyncId, AsyncError> {
            Ok(self.fresh_id())
        }

        fn call_async(&self, _phone: PhoneHandle, _method: u64, _args: [u64; 5]) -> Result<AsyncId, AsyncError> {
            Ok(self.fresh_id())
        }

        fn wait(&self, _timeout_us: Option<u64>) -> Option<WaitEvent> {
            self.events.lock().pop_front()
        }

        fn answer_fast(&self, _id: AsyncId, _retval: i64, _a1: u64, _a2: u64) -> Result<(), AsyncError> {
            Ok(())
        }

        fn answer(&self, _id: AsyncId, _retval: i64, _args: [u64; 5]) -> Result<(), AsyncError> {
            Ok(())
        }

        fn forward_fast(&self, _id: AsyncId, _phone: PhoneHandle, _method: u64, _a1: u64) -> Result<(), AsyncError> {
            Ok(())
        }

        fn hangup(&self, _phone: PhoneHandle) -> Result<(), AsyncError> {
            Ok(())
        }

        fn clone_phone(&self, _phone: PhoneHandle) -> Result<PhoneHandle, AsyncError> {
            self.clones_issued.fetch_add(1, Ordering::Relaxed);
            Ok(PhoneHandle(self.next_phone.fetch_add(1, Ordering::Relaxed)))
        }

        fn connect_to_me(&self, _phone: PhoneHandle, _iface: u64, _arg1: u64, _arg2: u64) -> Result<(), AsyncError> {
            Ok(())
        }

        fn data_read_start(&self, _phone: PhoneHandle, _size: usize) -> Result<AsyncId, AsyncError> {
            Ok(self.fresh_id())
        }

        fn data_write_start(&self, _phone: PhoneHandle, _size: usize) -> Result<AsyncId, AsyncError> {
            Ok(self.fresh_id())
        }

        fn share_out_start(&self, _phone: PhoneHandle, _size: usize, _flags: u32) -> Result<AsyncId, AsyncError> {
            Ok(self.fresh_id())
        }

        fn share_in_start(&self, _phone: PhoneHandle, _size: usize) -> Result<AsyncId, AsyncError> {
            Ok(self.fresh_id())
        }
    }

    fn noop_raw_waker() -> RawWaker {
        fn clone(_: *const ()) -> RawWaker {
            noop_raw_waker()
        }
        fn noop(_: *const ()) {}
        let vtable = &RawWakerVTable::new(clone, noop, noop, noop);
        RawWaker::new(core::ptr::null(), vtable)
    }

    /// Polls `future` up to `max_polls` times with a waker that does
    /// nothing, returning the output as soon as it's ready. Good enough
    /// for tests that complete a request before ever polling, or that
    /// don't rely on being woken mid-poll.
    pub fn block_on<F: Future>(mut future: Pin<&mut F>, max_polls: u32) -> Option<F::Output> {
        let waker = unsafe { Waker::from_raw(noop_raw_waker()) };
        let mut cx = Context::from_waker(&waker);
        for _ in 0..max_polls {
            if let Poll::Ready(value) = future.as_mut().poll(&mut cx) {
                return Some(value);
            }
        }
        None
    }
}
