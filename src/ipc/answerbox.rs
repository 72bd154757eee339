//! Per-task inbox: four ordered sequences of calls plus the set of phones
//! currently connected to it.

use alloc::collections::VecDeque;
use alloc::sync::{Arc, Weak};
use alloc::vec::Vec;

use crate::ipc::call::{CallId, CallLink, CALL_POOL};
use crate::ipc::limits::IRQ_NOTIF_QUEUE_CAP;
use crate::ipc::phone::Phone;
use crate::ipc::IpcError;
use crate::sync::spinlock::{IrqSpinlock, Spinlock};
use crate::sync::waitqueue::{SchedulerHandle, WakePolicy, Waitqueue};
use crate::task::Task;

/// Intrusive doubly-linked list of `dispatched_calls`. Calls here are
/// removed from arbitrary positions (`ipc_answer`/`ipc_forward`, which act
/// on whichever call a server happens to be replying to, not necessarily
/// the one dispatched first), so plain push/pop at the ends is not enough —
/// unlike `calls`, `answers` and `irq_notifs`, which stay `VecDeque`s.
#[derive(Default)]
pub(crate) struct DispatchedList {
    head: Option<CallId>,
    tail: Option<CallId>,
    len: usize,
}

impl DispatchedList {
    fn push_back(&mut self, id: CallId) {
        let mut link = CallLink::default();
        link.prev = self.tail;
        CALL_POOL.set_link(id, link);
        if let Some(tail) = self.tail {
            let mut tail_link = CALL_POOL.link(tail);
            tail_link.next = Some(id);
            CALL_POOL.set_link(tail, tail_link);
        } else {
            self.head = Some(id);
        }
        self.tail = Some(id);
        self.len += 1;
    }

    /// Removes `id` from wherever it sits in the list in O(1) — no scan,
    /// since the call's own embedded link already names its neighbors.
    fn remove(&mut self, id: CallId) {
        let link = CALL_POOL.link(id);
        match link.prev {
            Some(prev) => {
                let mut prev_link = CALL_POOL.link(prev);
                prev_link.next = link.next;
                CALL_POOL.set_link(prev, prev_link);
            }
            None => self.head = link.next,
        }
        match link.next {
            Some(next) => {
                let mut next_link = CALL_POOL.link(next);
                next_link.prev = link.prev;
                CALL_POOL.set_link(next, next_link);
            }
            None => self.tail = link.prev,
        }
        CALL_POOL.set_link(id, CallLink::default());
        self.len -= 1;
    }

    fn drain_all(&mut self) -> Vec<CallId> {
        let mut out = Vec::with_capacity(self.len);
        let mut cursor = self.head;
        while let Some(id) = cursor {
            let link = CALL_POOL.link(id);
            CALL_POOL.set_link(id, CallLink::default());
            out.push(id);
            cursor = link.next;
        }
        self.head = None;
        self.tail = None;
        self.len = 0;
        out
    }

    fn len(&self) -> usize {
        self.len
    }
}

struct AnswerboxInner {
    calls: VecDeque<CallId>,
    dispatched: DispatchedList,
    answers: VecDeque<CallId>,
    peer_phones: Vec<Weak<Phone>>,
    active: bool,
}

pub struct Answerbox {
    owner: Weak<Task>,
    inner: Spinlock<AnswerboxInner>,
    irq_notifs: IrqSpinlock<VecDeque<CallId>>,
    wq: Waitqueue,
}

/// What `wait()` handed back, tagged with which of the four sequences it
/// came from — mirrors the `ANSWERED`/`NOTIFICATION` tag bits the real
/// `wait` syscall packs into its returned id (`spec.md` §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitSource {
    IrqNotif,
    Answer,
    Call,
}

pub struct WaitResult {
    pub call: CallId,
    pub source: WaitSource,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AnswerboxSnapshot {
    pub calls: usize,
    pub dispatched: usize,
    pub answers: usize,
    pub irq_notifs: usize,
    pub peer_phones: usize,
    pub active: bool,
}

impl Answerbox {
    /// `init(box, task)`: prepare an empty box owned by `task`; `active =
    /// true`.
    pub fn new(owner: Weak<Task>) -> Self {
        Answerbox {
            owner,
            inner: Spinlock::new(AnswerboxInner {
                calls: VecDeque::new(),
                dispatched: DispatchedList::default(),
                answers: VecDeque::new(),
                peer_phones: Vec::new(),
                active: true,
            }),
            irq_notifs: IrqSpinlock::new(VecDeque::new()),
            wq: Waitqueue::new(),
        }
    }

    pub fn owner(&self) -> Option<Arc<Task>> {
        self.owner.upgrade()
    }

    pub fn is_active(&self) -> bool {
        self.inner.lock().active
    }

    pub(crate) fn add_peer_phone(&self, phone: &Arc<Phone>) {
        self.inner.lock().peer_phones.push(Arc::downgrade(phone));
    }

    pub(crate) fn remove_peer_phone(&self, phone: &Arc<Phone>) {
        let mut inner = self.inner.lock();
        inner
            .peer_phones
            .retain(|weak| !weak.ptr_eq(&Arc::downgrade(phone)));
    }

    /// Appends a freshly-sent call to `calls` and wakes one waiter. Called
    /// by `Phone::send_call`. Fails with [`IpcError::HangUp`] if `active`
    /// was already cleared — "once cleared, no new calls accept."
    pub(crate) fn push_call(&self, id: CallId, scheduler: &SchedulerHandle) -> Result<(), IpcError> {
        {
            let mut inner = self.inner.lock();
            if !inner.active {
                return Err(IpcError::HangUp);
            }
            inner.calls.push_back(id);
        }
        self.wq.wake(scheduler.as_ref(), WakePolicy::First);
        Ok(())
    }

    /// Appends a fully-formed answer to `answers` and wakes one waiter.
    /// Called by the IPC engine's `answer`/`ipc_backsend_err`.
    pub(crate) fn push_answer(&self, id: CallId, scheduler: &SchedulerHandle) {
        {
            let mut inner = self.inner.lock();
            inner.answers.push_back(id);
        }
        self.wq.wake(scheduler.as_ref(), WakePolicy::First);
    }

    /// Appends a kernel-synthesized `NOTIFICATION` call under the
    /// IRQ-disabled inner lock and wakes one waiter. Returns
    /// [`IpcError::Limit`] if the soft queue cap is exceeded, so a
    /// misbehaving driver's IRQ pseudocode cannot grow the global call pool
    /// without bound.
    pub fn notify(&self, id: CallId, scheduler: &SchedulerHandle) -> Result<(), IpcError> {
        {
            let mut notifs = self.irq_notifs.lock();
            if notifs.len() >= IRQ_NOTIF_QUEUE_CAP {
                return Err(IpcError::Limit);
            }
            notifs.push_back(id);
        }
        self.wq.wake(scheduler.as_ref(), WakePolicy::First);
        Ok(())
    }

    /// Removes `id` from `dispatched_calls`. Used by `answer`/`forward`.
    pub(crate) fn take_dispatched(&self, id: CallId) {
        self.inner.lock().dispatched.remove(id);
    }

    pub(crate) fn push_dispatched(&self, id: CallId) {
        self.inner.lock().dispatched.push_back(id);
    }

    /// `wait(box, timeout, flags) → Call | None`. Priority order
    /// `irq_notifs > answers > calls`; returns `None` on timeout. When the
    /// source is `calls`, the call moves atomically to `dispatched`. When
    /// the source is `answers`, the call's phone has its `active_calls`
    /// decremented (the sender's half of the answer round-trip).
    pub fn wait(
        &self,
        scheduler: &SchedulerHandle,
        timeout_us: Option<u64>,
    ) -> Option<WaitResult> {
        loop {
            if let Some(id) = self.irq_notifs.lock().pop_front() {
                return Some(WaitResult {
                    call: id,
                    source: WaitSource::IrqNotif,
                });
            }

            let ticket = {
                let mut inner = self.inner.lock();
                if let Some(id) = inner.answers.pop_front() {
                    drop(inner);
                    if let Some(phone) = CALL_POOL.with(id, |call| call.phone.clone()) {
                        phone.decrement_active_calls(scheduler);
                    }
                    crate::ipc::stats::STATS.record_answer_delivered();
                    return Some(WaitResult {
                        call: id,
                        source: WaitSource::Answer,
                    });
                }
                if let Some(id) = inner.calls.pop_front() {
                    inner.dispatched.push_back(id);
                    return Some(WaitResult {
                        call: id,
                        source: WaitSource::Call,
                    });
                }
                if !inner.active && inner.dispatched.len() == 0 {
                    // Box was cleaned up and is fully drained: nothing will
                    // ever arrive again.
                    return None;
                }
                // Register as a waiter while `inner` is still locked, so a
                // concurrent producer either mutates before this point (and
                // we've already observed it above) or after this point (and
                // finds us registered) — never in between.
                self.wq.prepare_to_wait(scheduler.as_ref())
            };

            if !ticket.wait(scheduler.as_ref(), timeout_us) {
                return None;
            }
            // Woken: loop back and re-check every list. A wake that turns out
            // to still find everything empty (e.g. the "cleanup just ran"
            // race) simply falls through to the `!inner.active` check above
            // and returns `None`, or blocks again if the box is still active
            // — this is the "restart internally" behavior the contract
            // allows.
        }
    }

    /// `cleanup(box)`: drains every list, fabricates `HangUp`-reason
    /// answers for each outstanding dispatched call, detaches all
    /// connected peer phones by marking them `SLAMMED`, clears `active`.
    pub fn cleanup(&self, owner: &Arc<Task>, scheduler: &SchedulerHandle) {
        let (drained_calls, drained_dispatched, drained_answers, peers) = {
            let mut inner = self.inner.lock();
            inner.active = false;
            let calls: Vec<CallId> = inner.calls.drain(..).collect();
            let dispatched = inner.dispatched.drain_all();
            let answers: Vec<CallId> = inner.answers.drain(..).collect();
            let peers: Vec<Weak<Phone>> = inner.peer_phones.drain(..).collect();
            (calls, dispatched, answers, peers)
        };

        for phone in peers.iter().filter_map(Weak::upgrade) {
            phone.slam(scheduler);
        }

        // Calls never dequeued by the owner and calls already handed to the
        // owner but not yet answered both get a fabricated HANGUP answer
        // routed back to whoever sent them.
        for id in drained_calls.into_iter().chain(drained_dispatched) {
            crate::ipc::engine::fabricate_hangup_answer(id, scheduler);
        }

        // Answers already queued for the (now dying) owner are simply
        // freed; nobody will ever read them.
        for id in drained_answers {
            if let Some(phone) = CALL_POOL.with(id, |call| call.phone.clone()) {
                phone.decrement_active_calls(scheduler);
            }
            crate::ipc::call::free_any(id);
        }

        let _ = owner;
    }

    pub fn snapshot(&self) -> AnswerboxSnapshot {
        let inner = self.inner.lock();
        AnswerboxSnapshot {
            calls: inner.calls.len(),
            dispatched: inner.dispatched.len(),
            answers: inner.answers.len(),
            irq_notifs: self.irq_notifs.lock().len(),
            peer_phones: inner.peer_phones.len(),
            active: inner.active,
        }
    }
}
