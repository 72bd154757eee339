//! Sleeping wait queues.
//!
//! A `Waitqueue` is a list of blocked thread ids. The "release the
//! condition lock, then block" transition is made atomic with respect to a
//! concurrent waker by splitting it into two steps: [`Waitqueue::prepare_to_wait`]
//! registers the calling thread as a waiter and must be called *while the
//! caller still holds the lock guarding the condition being waited on*;
//! only after that lock is released does the caller call
//! [`WaitTicket::wait`] to actually block. Since every producer that
//! mutates the condition and then calls `wake` must also take that same
//! lock first, the registration and the mutation can never interleave —
//! either the waiter is already registered by the time the producer's
//! `wake` runs (and gets woken), or the producer's mutation is already
//! visible by the time the waiter re-checks the condition (and it never
//! calls `prepare_to_wait` at all). There is no window in which a `wake`
//! can land on a queue with nobody registered while a genuine sleeper is
//! transitioning, so `wake` with nobody waiting is a true no-op: it is
//! never counted or later observed by an unrelated sleeper, matching
//! `spec.md` §4.1's "wake with `FIRST` on empty wq is a no-op, never
//! counted."

use alloc::collections::VecDeque;
use alloc::sync::Arc;

use crate::sync::spinlock::Spinlock;
use crate::sync::{Scheduler, ThreadId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakePolicy {
    /// Wake only the longest-waiting thread.
    First,
    /// Wake every waiting thread (used when a box-wide condition changes,
    /// e.g. `ipc_cleanup` making every outstanding wait futile).
    All,
}

struct WaitqueueInner {
    waiters: VecDeque<ThreadId>,
}

/// A FIFO sleep/wake queue parameterized over the external [`Scheduler`].
pub struct Waitqueue {
    inner: Spinlock<WaitqueueInner>,
}

impl Waitqueue {
    pub const fn new() -> Self {
        Self {
            inner: Spinlock::new(WaitqueueInner {
                waiters: VecDeque::new(),
            }),
        }
    }

    /// Registers the calling thread as a waiter. The caller must still hold
    /// the lock guarding whatever condition it just found false — the same
    /// lock every producer of that condition takes before mutating it and
    /// calling [`Self::wake`] — so this registration and any concurrent
    /// mutation are strictly ordered by that lock. Only once the caller has
    /// released that lock should it call [`WaitTicket::wait`] to actually
    /// block.
    pub fn prepare_to_wait(&self, scheduler: &dyn Scheduler) -> WaitTicket<'_> {
        let me = scheduler.current_thread();
        self.inner.lock().waiters.push_back(me);
        WaitTicket { queue: self, me }
    }

    /// Wakes waiters per `policy`. A `wake` with nobody currently
    /// registered is a genuine no-op: nothing is recorded for a future
    /// sleeper to observe.
    pub fn wake(&self, scheduler: &dyn Scheduler, policy: WakePolicy) {
        let mut inner = self.inner.lock();
        match policy {
            WakePolicy::First => {
                if let Some(id) = inner.waiters.pop_front() {
                    drop(inner);
                    scheduler.wake(id);
                }
            }
            WakePolicy::All => {
                let woken: alloc::vec::Vec<ThreadId> = inner.waiters.drain(..).collect();
                drop(inner);
                for id in woken {
                    scheduler.wake(id);
                }
            }
        }
    }
}

impl Default for Waitqueue {
    fn default() -> Self {
        Self::new()
    }
}

/// A thread's registered place in a [`Waitqueue`], obtained from
/// [`Waitqueue::prepare_to_wait`] while still holding the condition lock.
/// Consumed by [`Self::wait`] after that lock has been released.
pub struct WaitTicket<'a> {
    queue: &'a Waitqueue,
    me: ThreadId,
}

impl<'a> WaitTicket<'a> {
    /// Blocks until woken or `timeout_us` elapses. Returns `true` if woken,
    /// `false` on timeout.
    ///
    /// Callers that need "check a condition, then sleep if still false"
    /// semantics must re-check the condition under their own lock after this
    /// returns `true`, since a wakeup only promises "something changed", not
    /// "your condition now holds".
    pub fn wait(self, scheduler: &dyn Scheduler, timeout_us: Option<u64>) -> bool {
        let woken = scheduler.block_current(timeout_us);
        if !woken {
            // Timed out: remove ourselves if we're still registered (a
            // racing wake may have already popped us).
            let mut inner = self.queue.inner.lock();
            inner.waiters.retain(|&id| id != self.me);
        }
        woken
    }
}

/// Shared handle to a scheduler, threaded through the engine so call sites
/// don't need a generic parameter on every function.
pub type SchedulerHandle = Arc<dyn Scheduler>;
