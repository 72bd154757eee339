//! `aid_t`-keyed request lifecycle (`spec.md` §4.6, "Request lifecycle").
//!
//! `async_send_N` enqueues a call and hands back an opaque id; `wait_for`/
//! `wait_timeout` suspend the calling fibril until that specific answer
//! shows up, independent of what order other answers for the same task
//! arrive in; `forget` relinquishes interest so a late answer is freed
//! silently instead of waking anything. The table here is exactly the
//! "storage cell for the eventual answer" the spec describes — delivery
//! into it is [`crate::executor`]'s job, not this module's.

use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use core::future::Future;
use core::pin::Pin;
use core::sync::atomic::{AtomicU64, Ordering};
use core::task::{Context, Poll, Waker};

use spin::Mutex;

use crate::error::AsyncError;
use crate::ids::AsyncId;
use crate::session::Exchange;
use crate::syscalls::Syscalls;

/// What a completed request carries back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AsyncReply {
    pub retval: i64,
    pub args: [u64; 5],
}

#[derive(Clone, Copy)]
enum SlotState {
    Pending,
    Ready(AsyncReply),
    /// `forget`ed before an answer arrived; the eventual answer is
    /// dropped on the floor instead of waking anyone.
    Forgotten,
}

struct Slot {
    state: SlotState,
    waker: Option<Waker>,
}

/// Owns the table every in-flight request for one task is tracked in, plus
/// the logical clock `wait_timeout` deadlines are measured against. The
/// clock only ever advances when [`crate::executor::Executor::run`] pumps
/// the underlying `wait` syscall, in units of whatever timeout it asked
/// for — there is no wall clock available to a `no_std` future otherwise.
/// Normally one `Requests` lives for the lifetime of the task and is
/// shared by every fibril through an `Arc`.
pub struct Requests<S: Syscalls> {
    syscalls: Arc<S>,
    table: Mutex<BTreeMap<AsyncId, Slot>>,
    clock_us: AtomicU64,
}

impl<S: Syscalls> Requests<S> {
    pub fn new(syscalls: Arc<S>) -> Arc<Self> {
        Arc::new(Requests {
            syscalls,
            table: Mutex::new(BTreeMap::new()),
            clock_us: AtomicU64::new(0),
        })
    }

    pub fn syscalls(&self) -> &Arc<S> {
        &self.syscalls
    }

    pub fn now_us(&self) -> u64 {
        self.clock_us.load(Ordering::Acquire)
    }

    pub(crate) fn advance_clock(&self, delta_us: u64) {
        self.clock_us.fetch_add(delta_us, Ordering::AcqRel);
    }

    /// Starts tracking an id minted by a syscall other than `send`/
    /// `send_fast` — the composite operations in [`crate::composite`] use
    /// this directly since their announcement step returns its own id.
    pub(crate) fn track(&self, id: AsyncId) {
        self.table.lock().insert(
            id,
            Slot {
                state: SlotState::Pending,
                waker: None,
            },
        );
    }

    /// `async_send_0`..`async_send_5` collapse to this: method plus up to
    /// five scalar args, all via the full five-argument syscall.
    pub fn send(&self, exch: &Exchange<S>, method: u64, args: [u64; 5]) -> Result<AsyncId, AsyncError> {
        let id = exch.syscalls().call_async(exch.phone(), method, args)?;
        self.track(id);
        Ok(id)
    }

    /// Fast one-argument path (`call_async_fast`), used when a protocol
    /// only ever needs `a1`.
    pub fn send_fast(&self, exch: &Exchange<S>, method: u64, a1: u64) -> Result<AsyncId, AsyncError> {
        let id = exch.syscalls().call_async_fast(exch.phone(), method, a1, 0)?;
        self.track(id);
        Ok(id)
    }

    /// Delivers one completed answer into the table, matched by id.
    /// Called by the executor's dispatch loop, never directly by request
    /// code. A `Forgotten` slot is simply dropped here — nobody is
    /// waiting and nobody ever will be.
    pub(crate) fn complete(&self, id: AsyncId, reply: AsyncReply) {
        let mut table = self.table.lock();
        if let Some(slot) = table.get_mut(&id) {
            match slot.state {
                SlotState::Forgotten => {
                    table.remove(&id);
                }
                _ => {
                    slot.state = SlotState::Ready(reply);
                    if let Some(waker) = slot.waker.take() {
                        drop(table);
                        waker.wake();
                    }
                }
            }
        }
    }

    /// `async_forget(aid)`: stop caring about `id`. If the answer already
    /// arrived the slot is simply dropped now; otherwise it is left in
    /// place marked `Forgotten` so `complete` frees it later without
    /// waking anyone.
    pub fn forget(&self, id: AsyncId) {
        let mut table = self.table.lock();
        if let Some(slot) = table.get_mut(&id) {
            if matches!(slot.state, SlotState::Ready(_)) {
                table.remove(&id);
            } else {
                slot.state = SlotState::Forgotten;
                slot.waker = None;
            }
        }
    }

    /// `async_wait_for(aid, &retval)`: suspends until `id`'s answer
    /// arrives. Never times out.
    pub fn wait_for<'a>(self: &'a Arc<Self>, id: AsyncId) -> WaitFor<'a, S> {
        WaitFor { requests: self, id }
    }

    /// `async_wait_timeout(aid, &retval, usec)`: as `wait_for`, but
    /// resolves to `AsyncError::Timeout` if `usec` elapses first. Timing
    /// out still leaves the slot in the table, in effect forgetting it
    /// (spec.md §4.6: "the caller stops waiting and the eventual answer
    /// is dropped") so a later `complete` call frees it quietly.
    pub fn wait_timeout<'a>(self: &'a Arc<Self>, id: AsyncId, timeout_us: u64) -> WaitTimeout<'a, S> {
        WaitTimeout {
            requests: self,
            id,
            deadline_us: None,
            timeout_us,
        }
    }
}

pub struct WaitFor<'a, S: Syscalls> {
    requests: &'a Arc<Requests<S>>,
    id: AsyncId,
}

impl<'a, S: Syscalls> Future for WaitFor<'a, S> {
    type Output = AsyncReply;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut table = self.requests.table.lock();
        match table.get_mut(&self.id) {
            Some(slot) => match slot.state {
                SlotState::Ready(reply) => {
                    table.remove(&self.id);
                    Poll::Ready(reply)
                }
                _ => {
                    slot.waker = Some(cx.waker().clone());
                    Poll::Pending
                }
            },
            // Already delivered and consumed, or never tracked — treat as
            // an immediate (stale) wakeup rather than hang forever.
            None => Poll::Ready(AsyncReply { retval: 0, args: [0; 5] }),
        }
    }
}

pub struct WaitTimeout<'a, S: Syscalls> {
    requests: &'a Arc<Requests<S>>,
    id: AsyncId,
    /// Computed on first poll from `requests.now_us()`, so the deadline
    /// reflects when the wait actually started rather than when it was
    /// constructed.
    deadline_us: Option<u64>,
    timeout_us: u64,
}

impl<'a, S: Syscalls> Future for WaitTimeout<'a, S> {
    type Output = Result<AsyncReply, AsyncError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let deadline = *self.deadline_us.get_or_insert(self.requests.now_us() + self.timeout_us);

        let mut table = self.requests.table.lock();
        if let Some(slot) = table.get_mut(&self.id) {
            if let SlotState::Ready(reply) = slot.state {
                table.remove(&self.id);
                return Poll::Ready(Ok(reply));
            }
            if self.requests.now_us() >= deadline {
                slot.state = SlotState::Forgotten;
                slot.waker = None;
                return Poll::Ready(Err(AsyncError::Timeout));
            }
            slot.waker = Some(cx.waker().clone());
        }
        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use core::pin::pin;

    use crate::session::Session;
    use crate::test_support::{block_on, MockSyscalls};
    use crate::{ExchangeMgmt, PhoneHandle};

    use super::*;

    #[test]
    fn test_wait_for_sees_answer_that_arrived_before_the_poll() {
        let syscalls = MockSyscalls::new();
        let requests = Requests::new(syscalls);
        let session = Session::new(requests.syscalls().clone(), PhoneHandle(1), ExchangeMgmt::Atomic);
        let exch = session.exchange_begin().unwrap();

        let id = requests.send(&exch, 17, [1, 2, 0, 0, 0]).unwrap();
        requests.complete(id, AsyncReply { retval: 42, args: [0; 5] });

        let fut = requests.wait_for(id);
        let mut fut = pin!(fut);
        let reply = block_on(fut.as_mut(), 4).expect("answer was already posted");
        assert_eq!(reply.retval, 42);
    }

    #[test]
    fn test_forget_before_answer_drops_it_silently_on_arrival() {
        let syscalls = MockSyscalls::new();
        let requests = Requests::new(syscalls);
        let session = Session::new(requests.syscalls().clone(), PhoneHandle(1), ExchangeMgmt::Atomic);
        let exch = session.exchange_begin().unwrap();

        let id = requests.send(&exch, 9, [0; 5]).unwrap();
        requests.forget(id);
        // The late answer must not panic, nor resurrect a waiter.
        requests.complete(id, AsyncReply { retval: -3, args: [0; 5] });

        assert!(requests.table.lock().get(&id).is_none());
    }

    #[test]
    fn test_wait_timeout_expires_without_an_answer() {
        let syscalls = MockSyscalls::new();
        let requests = Requests::new(syscalls);
        let session = Session::new(requests.syscalls().clone(), PhoneHandle(1), ExchangeMgmt::Atomic);
        let exch = session.exchange_begin().unwrap();

        let id = requests.send(&exch, 1, [0; 5]).unwrap();
        let fut = requests.wait_timeout(id, 10);
        let mut fut = pin!(fut);

        // First poll establishes the deadline at clock=0; nothing has
        // advanced it yet, so it stays pending.
        assert!(block_on(fut.as_mut(), 1).is_none());

        requests.advance_clock(20);
        let result = block_on(fut.as_mut(), 1).expect("deadline has elapsed");
        assert_eq!(result, Err(AsyncError::Timeout));

        // The late answer, once it arrives, is dropped rather than panicking.
        requests.complete(id, AsyncReply { retval: 1, args: [0; 5] });
    }
}
