//! Thin wrappers over `spin::Mutex` distinguishing two lock flavors used by
//! the IPC core: an ordinary spinlock for short critical sections that are
//! never taken from interrupt context, and an IRQ-disabling variant for the
//! one queue an interrupt handler can touch directly — `irq_notifs`.

use core::ops::{Deref, DerefMut};

use spin::{Mutex, MutexGuard};

/// A plain spinlock. Guards answerbox state, phone state and the call pool;
/// never held across a block on a [`super::Waitqueue`].
pub struct Spinlock<T> {
    inner: Mutex<T>,
}

impl<T> Spinlock<T> {
    pub const fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
        }
    }

    pub fn lock(&self) -> SpinlockGuard<'_, T> {
        SpinlockGuard {
            guard: self.inner.lock(),
        }
    }

    pub fn try_lock(&self) -> Option<SpinlockGuard<'_, T>> {
        self.inner.try_lock().map(|guard| SpinlockGuard { guard })
    }
}

pub struct SpinlockGuard<'a, T> {
    guard: MutexGuard<'a, T>,
}

impl<T> Deref for SpinlockGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for SpinlockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

/// A spinlock taken with interrupts disabled on the current CPU for its
/// entire hold time, restoring the prior interrupt state on drop. The only
/// user is `Answerbox::irq_notifs`: an interrupt handler enqueuing a
/// notification must not be interrupted by itself while holding this lock.
pub struct IrqSpinlock<T> {
    inner: Mutex<T>,
}

impl<T> IrqSpinlock<T> {
    pub const fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
        }
    }

    pub fn lock(&self) -> IrqSpinlockGuard<'_, T> {
        let were_enabled = crate::arch::interrupts_enabled();
        crate::arch::disable_interrupts();
        IrqSpinlockGuard {
            guard: self.inner.lock(),
            restore_interrupts: were_enabled,
        }
    }
}

pub struct IrqSpinlockGuard<'a, T> {
    guard: MutexGuard<'a, T>,
    restore_interrupts: bool,
}

impl<T> Deref for IrqSpinlockGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for IrqSpinlockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T> Drop for IrqSpinlockGuard<'_, T> {
    fn drop(&mut self) {
        if self.restore_interrupts {
            crate::arch::enable_interrupts();
        }
    }
}
