//! One-directional capability from a sending task to a target answerbox.

use alloc::sync::{Arc, Weak};
use core::sync::atomic::{AtomicU64, Ordering};

use crate::ipc::answerbox::Answerbox;
use crate::ipc::call::{CallFlags, CallId, CALL_POOL};
use crate::ipc::IpcError;
use crate::sync::mutex::Mutex;
use crate::sync::waitqueue::SchedulerHandle;
use crate::task::Task;

/// System method used for the synthetic notification a phone's peer
/// receives on hangup. Namespaced high like the source's system calls
/// (`spec.md` §6: "system (method-namespaced-high) calls").
pub const METHOD_PHONE_HUNGUP: u64 = 0xffff_0001;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhoneState {
    Free,
    Connecting,
    Connected,
    Hungup,
    Slammed,
}

struct PhoneInner {
    state: PhoneState,
    target: Option<Arc<Answerbox>>,
}

pub struct Phone {
    pub owner_task: Weak<Task>,
    pub slot: usize,
    inner: Mutex<PhoneInner>,
    active_calls: AtomicU64,
}

impl Phone {
    /// `init(phone)`: state `FREE`, no target, `active_calls = 0`.
    pub fn new(owner_task: Weak<Task>, slot: usize) -> Self {
        Phone {
            owner_task,
            slot,
            inner: Mutex::new(PhoneInner {
                state: PhoneState::Free,
                target: None,
            }),
            active_calls: AtomicU64::new(0),
        }
    }

    pub fn state(&self, scheduler: &SchedulerHandle) -> PhoneState {
        self.inner.lock(scheduler).state
    }

    pub fn active_calls(&self) -> u64 {
        self.active_calls.load(Ordering::Acquire)
    }

    /// `FREE → CONNECTING` on an outgoing connect request.
    pub fn begin_connect(&self, scheduler: &SchedulerHandle) -> Result<(), IpcError> {
        let mut inner = self.inner.lock(scheduler);
        if inner.state != PhoneState::Free {
            return Err(IpcError::Limit);
        }
        inner.state = PhoneState::Connecting;
        Ok(())
    }

    /// `connect(phone, box)`: transitions `CONNECTING → CONNECTED`;
    /// appends phone to the box's peer set under the box lock.
    pub fn connect(
        self: &Arc<Self>,
        target: &Arc<Answerbox>,
        scheduler: &SchedulerHandle,
    ) -> Result<(), IpcError> {
        let mut inner = self.inner.lock(scheduler);
        if inner.state != PhoneState::Connecting {
            return Err(IpcError::NotConnected);
        }
        inner.state = PhoneState::Connected;
        inner.target = Some(target.clone());
        drop(inner);
        target.add_peer_phone(self);
        Ok(())
    }

    /// Connects a `FREE` phone straight to `target` without the
    /// `begin_connect`/`connect` handshake. Used only to seed the
    /// naming-service phone on task creation (`SPEC_FULL.md` §3); ordinary
    /// connects always go through the two-step protocol.
    pub(crate) fn force_connect(self: &Arc<Self>, target: &Arc<Answerbox>, scheduler: &SchedulerHandle) {
        let mut inner = self.inner.lock(scheduler);
        inner.state = PhoneState::Connected;
        inner.target = Some(target.clone());
        drop(inner);
        target.add_peer_phone(self);
    }

    /// `CONNECTING → FREE` on rejection.
    pub fn reject_connect(&self, scheduler: &SchedulerHandle) {
        let mut inner = self.inner.lock(scheduler);
        if inner.state == PhoneState::Connecting {
            inner.state = PhoneState::Free;
            inner.target = None;
        }
    }

    /// `CONNECTED → SLAMMED`, used by `Answerbox::cleanup` to forcibly
    /// detach every peer when its owning task dies.
    pub fn slam(&self, scheduler: &SchedulerHandle) {
        let mut inner = self.inner.lock(scheduler);
        if inner.state == PhoneState::Connected {
            inner.state = PhoneState::Slammed;
            inner.target = None;
            crate::ipc::stats::STATS.record_slam();
            crate::kdebug!(
                "phone slot {} on task {:?}: CONNECTED -> SLAMMED (peer answerbox torn down)",
                self.slot,
                self.owner_task.upgrade().map(|t| t.id().as_u64())
            );
        }
    }

    /// `HUNGUP → FREE` once `active_calls` reaches zero. Called after every
    /// decrement; a no-op unless the phone is actually in `HUNGUP`.
    pub fn maybe_release(&self, scheduler: &SchedulerHandle) {
        if self.active_calls.load(Ordering::Acquire) != 0 {
            return;
        }
        let mut inner = self.inner.lock(scheduler);
        if inner.state == PhoneState::Hungup {
            inner.state = PhoneState::Free;
        }
    }

    pub(crate) fn decrement_active_calls(&self, scheduler: &SchedulerHandle) {
        self.active_calls.fetch_sub(1, Ordering::AcqRel);
        self.maybe_release(scheduler);
    }

    /// Increments `active_calls` for a call that never went through
    /// `send_call`'s acceptance check — used by `ipc_backsend_err`, which
    /// balances the decrement the answer path will still perform on this
    /// call even though the phone was never consulted for acceptance.
    pub(crate) fn force_increment_active_calls(&self) {
        self.active_calls.fetch_add(1, Ordering::AcqRel);
    }

    /// `hangup(phone)`. If the phone is `FREE`, `HUNGUP` or `CONNECTING`
    /// this is an error with no side effect. Otherwise the phone is
    /// detached from its box's peer set and, unless it was already
    /// `SLAMMED`, a synthetic `PHONE_HUNGUP` call with `DISCARD_ANSWER` is
    /// sent so the peer observes the hangup uniformly. The re-check of
    /// `state != SLAMMED` right before sending that notification guards
    /// against a slam landing between releasing and re-acquiring the
    /// phone lock — preserved from the source on purpose.
    pub fn hangup(
        self: &Arc<Self>,
        sender: &Arc<Task>,
        scheduler: &SchedulerHandle,
    ) -> Result<(), IpcError> {
        let initial_state = self.inner.lock(scheduler).state;
        if matches!(
            initial_state,
            PhoneState::Free | PhoneState::Hungup | PhoneState::Connecting
        ) {
            return Err(IpcError::NotConnected);
        }

        let target = {
            let mut inner = self.inner.lock(scheduler);
            inner.target.take()
        };
        if let Some(ref target_box) = target {
            target_box.remove_peer_phone(self);
        }

        let already_slammed = {
            let mut inner = self.inner.lock(scheduler);
            let was = inner.state == PhoneState::Slammed;
            inner.state = PhoneState::Hungup;
            was
        };

        if !already_slammed {
            if let Some(target_box) = target {
                send_phone_hungup(self, sender, &target_box, scheduler);
            }
        }

        crate::ipc::stats::STATS.record_hangup();
        crate::kdebug!(
            "phone slot {} on task {}: {:?} -> HUNGUP",
            self.slot,
            sender.id().as_u64(),
            initial_state
        );
        self.maybe_release(scheduler);
        Ok(())
    }

    /// `call(phone, call) → Ok | PhoneError`. Requires `CONNECTED`.
    /// Increments `active_calls` unless the call is a forwarded one
    /// (which retains the counter from its original send), records
    /// `call.phone = phone`, appends to the target box's `calls`, and
    /// wakes one waiter.
    pub fn send_call(
        self: &Arc<Self>,
        call_id: CallId,
        scheduler: &SchedulerHandle,
    ) -> Result<(), IpcError> {
        let (state, target) = {
            let inner = self.inner.lock(scheduler);
            (inner.state, inner.target.clone())
        };
        match state {
            PhoneState::Connected => {}
            PhoneState::Hungup | PhoneState::Slammed => return Err(IpcError::HangUp),
            _ => return Err(IpcError::NotConnected),
        }
        let target = target.ok_or(IpcError::NotConnected)?;

        let forwarded = CALL_POOL.with(call_id, |call| call.flags.forwarded);
        if !forwarded {
            self.active_calls.fetch_add(1, Ordering::AcqRel);
        }
        CALL_POOL.with_mut(call_id, |call| call.phone = Some(self.clone()));
        if let Err(err) = target.push_call(call_id, scheduler) {
            // The box was cleaned up in the narrow window between reading
            // `target` above and appending to it. Undo the bookkeeping we
            // just did so the caller's synchronous-failure path is exact.
            if !forwarded {
                self.active_calls.fetch_sub(1, Ordering::AcqRel);
            }
            CALL_POOL.with_mut(call_id, |call| call.phone = None);
            return Err(err);
        }
        crate::ipc::stats::STATS.record_call_sent();
        Ok(())
    }

    pub fn snapshot(&self, scheduler: &SchedulerHandle) -> PhoneSnapshot {
        let inner = self.inner.lock(scheduler);
        PhoneSnapshot {
            slot: self.slot,
            state: inner.state,
            active_calls: self.active_calls.load(Ordering::Acquire),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PhoneSnapshot {
    pub slot: usize,
    pub state: PhoneState,
    pub active_calls: u64,
}

fn send_phone_hungup(
    _phone: &Arc<Phone>,
    sender: &Arc<Task>,
    target_box: &Arc<Answerbox>,
    scheduler: &SchedulerHandle,
) {
    let sender_box = sender.answerbox();
    let call_id = CALL_POOL.alloc_static(sender, sender_box);
    CALL_POOL.with_mut(call_id, |call| {
        call.method = METHOD_PHONE_HUNGUP;
        call.flags = CallFlags {
            discard_answer: true,
            ..CallFlags::default()
        };
        // No `call.phone` and no `active_calls` increment: this
        // notification never goes through `Phone::send_call`'s accounting,
        // so there is nothing for the answer path to decrement later.
    });
    // If the target box was already torn down, the notification is simply
    // moot — its owner is gone and nobody will ever read it.
    if target_box.push_call(call_id, scheduler).is_err() {
        CALL_POOL.free_static(call_id);
    }
}
