//! A sleeping mutex: blocks the calling thread (via the injected
//! [`Scheduler`]) instead of spinning when contended. Used for per-phone
//! state (`spec.md` §4.4: "per-phone sleeping mutex") where a holder may be
//! blocked arbitrarily long inside a call, so spinning would be wasteful.

use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};

use crate::sync::spinlock::Spinlock;
use crate::sync::waitqueue::{SchedulerHandle, WakePolicy, Waitqueue};

pub struct Mutex<T> {
    locked: Spinlock<bool>,
    queue: Waitqueue,
    value: UnsafeCell<T>,
}

// SAFETY: access to `value` is only ever granted through a `MutexGuard`,
// which is only handed out while `locked` is held true by this mutex alone.
unsafe impl<T: Send> Send for Mutex<T> {}
unsafe impl<T: Send> Sync for Mutex<T> {}

impl<T> Mutex<T> {
    pub const fn new(value: T) -> Self {
        Self {
            locked: Spinlock::new(false),
            queue: Waitqueue::new(),
            value: UnsafeCell::new(value),
        }
    }

    /// Blocks until the lock is acquired.
    pub fn lock(&self, scheduler: &SchedulerHandle) -> MutexGuard<'_, T> {
        loop {
            let ticket = {
                let mut locked = self.locked.lock();
                if !*locked {
                    *locked = true;
                    return MutexGuard {
                        mutex: self,
                        scheduler: scheduler.clone(),
                    };
                }
                // Register while still holding `locked`, so the guard that
                // clears it and calls `wake` can never run in the window
                // between our check and our registration.
                self.queue.prepare_to_wait(scheduler.as_ref())
            };
            ticket.wait(scheduler.as_ref(), None);
        }
    }

    pub fn try_lock(&self, scheduler: &SchedulerHandle) -> Option<MutexGuard<'_, T>> {
        let mut locked = self.locked.lock();
        if *locked {
            None
        } else {
            *locked = true;
            Some(MutexGuard {
                mutex: self,
                scheduler: scheduler.clone(),
            })
        }
    }
}

pub struct MutexGuard<'a, T> {
    mutex: &'a Mutex<T>,
    scheduler: SchedulerHandle,
}

impl<T> Deref for MutexGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        // SAFETY: holding a `MutexGuard` implies `locked == true` was set by
        // us and will not be cleared until this guard is dropped.
        unsafe { &*self.mutex.value.get() }
    }
}

impl<T> DerefMut for MutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.mutex.value.get() }
    }
}

impl<T> Drop for MutexGuard<'_, T> {
    fn drop(&mut self) {
        *self.mutex.locked.lock() = false;
        self.mutex.queue.wake(self.scheduler.as_ref(), WakePolicy::First);
    }
}
