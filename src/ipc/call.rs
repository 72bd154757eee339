//! The call object pool.
//!
//! Every `Call` lives in one global [`CallPool`] (a `slab::Slab` behind a
//! spinlock) and is addressed everywhere else by the `Copy` [`CallId`]
//! handle rather than by reference. Three of the four answerbox sequences
//! only ever push at the back and pop from the front, so they hold plain
//! `VecDeque<CallId>`s; `dispatched_calls` is answered or forwarded out of
//! arrival order, so it needs O(1) removal from the middle and is built as
//! an intrusive doubly-linked list over the pool (see `CallLink` below and
//! `answerbox.rs`'s `DispatchedList`).

use alloc::sync::{Arc, Weak};
use lazy_static::lazy_static;
use slab::Slab;

use crate::ipc::phone::Phone;
use crate::ipc::IpcError;
use crate::sync::spinlock::Spinlock;
use crate::task::Task;

/// Opaque handle into the global call pool. Cheap to copy, store in queues,
/// and pass across lock boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallId(usize);

/// Flags bitset from `spec.md` rendered as an explicit struct of booleans
/// rather than a numeric bitfield, per the design notes' call to replace
/// flag bitsets with structs (the wire format to userspace packs these back
/// into bits at the syscall boundary, not modeled here).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallFlags {
    pub answered: bool,
    pub forwarded: bool,
    pub discard_answer: bool,
    pub notification: bool,
}

/// Where a call's backing storage came from. Replaces the source's
/// `STATIC_ALLOC` flag with a sum type, per the design notes: calls
/// allocated with `alloc_static` are reserved ahead of time so they can
/// never fail to allocate (used for the kernel's own safety-critical
/// synthetic calls — forced hangups, cleanup's fabricated `HangUp`
/// answers); freeing one requires [`CallPool::free_static`] rather than the
/// ordinary [`CallPool::free`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStorage {
    Pooled,
    Borrowed,
}

/// Out-of-band payload reference. Large-payload transfer is realized by a
/// kernel-managed buffer in the source; modeled here as an opaque
/// address/length pair since address-space management is out of scope.
#[derive(Debug, Clone, Copy)]
pub struct OobBuffer {
    pub addr: usize,
    pub len: usize,
}

/// Intrusive link used only while a call sits in `dispatched_calls`. A call
/// carries at most one list membership at a time, matching the source's
/// single `link_t` field.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct CallLink {
    pub prev: Option<CallId>,
    pub next: Option<CallId>,
}

pub struct Call {
    pub sender: Weak<Task>,
    pub callerbox: Arc<super::answerbox::Answerbox>,
    pub method: u64,
    pub args: [u64; 5],
    pub retval: i64,
    pub flags: CallFlags,
    pub phone: Option<Arc<Phone>>,
    pub buffer: Option<OobBuffer>,
    pub(crate) storage: CallStorage,
    pub(crate) link: CallLink,
}

impl Call {
    fn new(sender: Weak<Task>, callerbox: Arc<super::answerbox::Answerbox>) -> Self {
        Call {
            sender,
            callerbox,
            method: 0,
            args: [0; 5],
            retval: 0,
            flags: CallFlags::default(),
            phone: None,
            buffer: None,
            storage: CallStorage::Pooled,
            link: CallLink::default(),
        }
    }

    /// Releases the out-of-band buffer, if any. Called by the pool before
    /// the slot is reclaimed.
    fn release_buffer(&mut self) {
        self.buffer = None;
    }
}

pub struct CallPool {
    slab: Spinlock<Slab<Call>>,
}

impl CallPool {
    fn new() -> Self {
        Self {
            slab: Spinlock::new(Slab::new()),
        }
    }

    /// `alloc(flags)`: every freshly allocated call has `callerbox =
    /// sender_task.answerbox`, `sender = current_task`, no buffer, no flags.
    /// Fails with [`IpcError::OutOfMemory`] only in the sense that a real
    /// slab can be exhausted; this in-memory pool grows on demand, so the
    /// failure path exists for API fidelity and for a future bounded build.
    pub fn alloc(
        &self,
        sender: &Arc<Task>,
        callerbox: Arc<super::answerbox::Answerbox>,
    ) -> Result<CallId, IpcError> {
        let call = Call::new(Arc::downgrade(sender), callerbox);
        let mut slab = self.slab.lock();
        let key = slab.insert(call);
        Ok(CallId(key))
    }

    /// `alloc_static(storage)`: reserves a slot that is guaranteed to
    /// succeed — used for the kernel's own synthetic calls that must never
    /// fail to allocate (forced `PHONE_HUNGUP`, cleanup's fabricated
    /// `HangUp` answers).
    pub fn alloc_static(
        &self,
        sender: &Arc<Task>,
        callerbox: Arc<super::answerbox::Answerbox>,
    ) -> CallId {
        let mut call = Call::new(Arc::downgrade(sender), callerbox);
        call.storage = CallStorage::Borrowed;
        let mut slab = self.slab.lock();
        let key = slab.insert(call);
        CallId(key)
    }

    /// `free(call)`: returns a dynamically allocated call to the pool,
    /// releasing its out-of-band buffer first. Asserts `storage ==
    /// Pooled` — freeing a borrowed call through the generic path is a
    /// kernel bug, not a recoverable error.
    pub fn free(&self, id: CallId) {
        let mut slab = self.slab.lock();
        let call = &mut slab[id.0];
        assert_eq!(
            call.storage,
            CallStorage::Pooled,
            "attempted to free a borrowed call through the pooled path"
        );
        call.release_buffer();
        slab.remove(id.0);
    }

    /// Frees a call allocated with [`Self::alloc_static`].
    pub fn free_static(&self, id: CallId) {
        let mut slab = self.slab.lock();
        let call = &mut slab[id.0];
        call.release_buffer();
        slab.remove(id.0);
    }

    pub fn with<R>(&self, id: CallId, f: impl FnOnce(&Call) -> R) -> R {
        let slab = self.slab.lock();
        f(&slab[id.0])
    }

    pub fn with_mut<R>(&self, id: CallId, f: impl FnOnce(&mut Call) -> R) -> R {
        let mut slab = self.slab.lock();
        f(&mut slab[id.0])
    }

    pub(crate) fn link(&self, id: CallId) -> CallLink {
        self.slab.lock()[id.0].link
    }

    pub(crate) fn set_link(&self, id: CallId, link: CallLink) {
        self.slab.lock()[id.0].link = link;
    }
}

/// Frees a call regardless of its storage kind — used by cleanup paths that
/// drain a queue wholesale and don't care which `alloc` flavor produced each
/// entry.
pub fn free_any(id: CallId) {
    let storage = CALL_POOL.with(id, |call| call.storage);
    match storage {
        CallStorage::Pooled => CALL_POOL.free(id),
        CallStorage::Borrowed => CALL_POOL.free_static(id),
    }
}

lazy_static! {
    /// The single global call pool. Calls must be able to move between two
    /// different tasks' answerboxes (sender's queues to `callerbox.answers`),
    /// so this cannot be scoped per-task — it has to be one shared arena.
    pub static ref CALL_POOL: CallPool = CallPool::new();
}
