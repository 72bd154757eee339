//! The IPC engine: synchronous calls, answering, back-send errors,
//! forwarding and task-death cleanup. This is where the lock-ordering and
//! accounting rules from `spec.md` §4.5/§5 actually get enforced; the
//! other modules only provide the data structures.

use alloc::sync::Arc;

use crate::ipc::answerbox::Answerbox;
use crate::ipc::call::{free_any, CallId, CALL_POOL};
use crate::ipc::limits::CLEANUP_DEADLOCK_THRESHOLD;
use crate::ipc::phone::{Phone, PhoneState};
use crate::ipc::IpcError;
use crate::sync::waitqueue::SchedulerHandle;
use crate::task::Task;

/// What a synchronous call came back with. `None` means the caller's
/// deadline elapsed before an answer arrived — a local condition, not a
/// protocol error (`spec.md` §4.5).
pub struct SyncReply {
    pub retval: i64,
    pub args: [u64; 5],
}

/// `call_sync`: allocates a private per-call answerbox (standing in for the
/// source's stack-local one — ours is heap-allocated and kept alive only by
/// the call's own `callerbox` reference, which is just as short-lived in
/// practice), issues the call on `phone`, and waits on that private box.
/// Reuses `Answerbox::wait`/`engine::answer` rather than adding a kernel
/// fast path, exactly as the source does.
pub fn call_sync(
    sender: &Arc<Task>,
    phone: &Arc<Phone>,
    method: u64,
    args: [u64; 5],
    timeout_us: Option<u64>,
    scheduler: &SchedulerHandle,
) -> Result<Option<SyncReply>, IpcError> {
    let private_box = Arc::new(Answerbox::new(Arc::downgrade(sender)));
    let call_id = CALL_POOL.alloc(sender, private_box.clone())?;
    CALL_POOL.with_mut(call_id, |call| {
        call.method = method;
        call.args = args;
    });

    // `send` never fails synchronously: a rejected phone (not connected,
    // hung up) still gets a synthetic answer routed to `private_box`, so
    // the `wait` below observes a uniform result either way.
    send(phone, call_id, scheduler);

    match private_box.wait(scheduler, timeout_us) {
        Some(result) => {
            let reply = CALL_POOL.with(result.call, |call| SyncReply {
                retval: call.retval,
                args: call.args,
            });
            free_any(result.call);
            Ok(Some(reply))
        }
        None => {
            // Deadline elapsed. The call may still be anywhere downstream
            // (queued, dispatched, even already answered and racing us).
            // Mark it `discard_answer` so whichever of `answer`/
            // `fabricate_hangup_answer` eventually processes it frees it on
            // the spot instead of leaving it, and the private box it
            // references, allocated forever.
            CALL_POOL.with_mut(call_id, |call| call.flags.discard_answer = true);
            Ok(None)
        }
    }
}

/// `send(phone, call)`: the uniform entry point for handing a freshly
/// allocated call to a phone. A rejected phone (not `CONNECTED`, hung up,
/// slammed) never surfaces synchronously — the failure is delivered as a
/// synthetic answer via `backsend_err` instead, so the send path looks the
/// same to a caller whether the call was accepted, rejected up front, or
/// rejected later by the peer (`spec.md` §4.4: "Failures are reported by a
/// synthetic answer delivered back to the caller so the send path is
/// uniform"). `forward` does not go through here: it already has its own
/// distinct error code (`Forwarded`) and does not want `NotConnected`/
/// `HangUp` surfacing verbatim to the original caller.
pub fn send(phone: &Arc<Phone>, call_id: CallId, scheduler: &SchedulerHandle) {
    if let Err(err) = phone.send_call(call_id, scheduler) {
        backsend_err(call_id, err.as_retval(), Some(phone), scheduler);
    }
}

/// `answer(box, call)`: removes the call from `dispatched` under the box
/// lock, marks it `ANSWERED`, appends it to `call.callerbox.answers`, wakes
/// `callerbox.wq` `FIRST`. A `DISCARD_ANSWER` call is freed on the spot
/// instead, including the `active_calls` decrement it would otherwise have
/// received from `Answerbox::wait`'s consumption of the `answers` queue —
/// since a discarded answer never reaches that queue, nothing else will
/// ever perform that decrement.
pub fn answer(dispatching_box: &Arc<Answerbox>, call_id: CallId, scheduler: &SchedulerHandle) {
    dispatching_box.take_dispatched(call_id);

    let (callerbox, discard) = CALL_POOL.with_mut(call_id, |call| {
        call.flags.answered = true;
        (call.callerbox.clone(), call.flags.discard_answer)
    });

    if discard {
        if let Some(phone) = CALL_POOL.with(call_id, |call| call.phone.clone()) {
            phone.decrement_active_calls(scheduler);
        }
        free_any(call_id);
        return;
    }

    callerbox.push_answer(call_id, scheduler);
}

/// Utility for a call that must fail before ever being delivered (e.g. the
/// target phone was already hung up). The call is given `retval` and
/// routed directly into `callerbox.answers` with `ANSWERED|FORWARDED`
/// semantics indistinguishable to the caller from a real forward failure.
///
/// Increments the originating phone's `active_calls` even though the phone
/// was never consulted for acceptance — this balances the decrement
/// `Answerbox::wait` will still perform when the caller eventually consumes
/// this synthetic answer from its `answers` queue. Skipping this increment
/// is a tempting "simplification" that silently undercounts `active_calls`;
/// don't.
pub fn backsend_err(
    call_id: CallId,
    retval: i64,
    phone: Option<&Arc<Phone>>,
    scheduler: &SchedulerHandle,
) {
    crate::kwarn!(
        "backsend_err: call {:?} failing before delivery with retval {}",
        call_id,
        retval
    );
    if let Some(phone) = phone {
        phone.force_increment_active_calls();
    }
    let callerbox = CALL_POOL.with_mut(call_id, |call| {
        call.retval = retval;
        call.flags.answered = true;
        call.flags.forwarded = true;
        call.callerbox.clone()
    });
    callerbox.push_answer(call_id, scheduler);
}

/// Rewrite applied to a call's method/args as part of a forward. `None`
/// entries leave the corresponding field untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct ForwardRewrite {
    pub method: Option<u64>,
    pub args: [Option<u64>; 5],
}

/// `forward(call, new_phone, old_box, mode)`: removes the call from
/// `old_box` (the dispatching side) and resends it via `new_phone`. The
/// forwarded call retains its original phone's `active_calls` increment —
/// `Phone::send_call` skips incrementing when `flags.forwarded` is set, so
/// this function must set that flag before calling it.
pub fn forward(
    old_box: &Arc<Answerbox>,
    call_id: CallId,
    new_phone: &Arc<Phone>,
    rewrite: ForwardRewrite,
    scheduler: &SchedulerHandle,
) -> Result<(), IpcError> {
    old_box.take_dispatched(call_id);

    CALL_POOL.with_mut(call_id, |call| {
        if let Some(method) = rewrite.method {
            call.method = method;
        }
        for (slot, value) in call.args.iter_mut().zip(rewrite.args.iter()) {
            if let Some(v) = value {
                *slot = *v;
            }
        }
        call.flags.forwarded = true;
    });

    match new_phone.send_call(call_id, scheduler) {
        Ok(()) => {
            crate::ipc::stats::STATS.record_forward();
            Ok(())
        }
        Err(err) => {
            // The original request was already consumed (dequeued from
            // `old_box`); the original caller sees `Forwarded`, delivered
            // as a synthetic answer per the post-acceptance failure policy.
            backsend_err(call_id, IpcError::Forwarded.as_retval(), None, scheduler);
            let _ = err;
            Err(IpcError::Forwarded)
        }
    }
}

/// Synthesizes a `HangUp` answer for a call that was sitting in a dying
/// task's `calls` or `dispatched_calls` when its answerbox was cleaned up.
pub(crate) fn fabricate_hangup_answer(call_id: CallId, scheduler: &SchedulerHandle) {
    crate::kwarn!(
        "fabricate_hangup_answer: call {:?} orphaned by task teardown",
        call_id
    );
    let (callerbox, phone, discard) = CALL_POOL.with_mut(call_id, |call| {
        call.retval = IpcError::HangUp.as_retval();
        call.flags.answered = true;
        (
            call.callerbox.clone(),
            call.phone.clone(),
            call.flags.discard_answer,
        )
    });

    if discard {
        if let Some(phone) = phone {
            phone.decrement_active_calls(scheduler);
        }
        free_any(call_id);
        return;
    }

    callerbox.push_answer(call_id, scheduler);
}

/// `ipc_cleanup`: invoked during task teardown. Hangs up every outgoing
/// phone, detaches every peer phone connected to this task's answerbox
/// (via `Answerbox::cleanup`, which also fabricates `HangUp` answers for
/// anything still queued), then waits for every outstanding answer this
/// task is still owed, freeing each as it arrives. Exits only once every
/// phone has reached `FREE` — including ones that were `CONNECTING` at
/// entry and may still transition — bounded by a deadlock-probe counter so
/// a persistently contended phone lock panics with a diagnostic instead of
/// spinning forever.
pub fn ipc_cleanup(task: &Arc<Task>, scheduler: &SchedulerHandle) {
    crate::kdebug!("ipc_cleanup: entering for task {}", task.id().as_u64());
    let answerbox = task.answerbox();
    answerbox.cleanup(task, scheduler);

    for phone in task.phones() {
        // `hangup` is a no-op (returns an error we intentionally discard)
        // on phones that are already `FREE`/`HUNGUP`/`CONNECTING`; only
        // `CONNECTED`/`SLAMMED` phones have real work to do here. Phones
        // still `CONNECTING` at this point are retried below, once they
        // land on `CONNECTED` or `FREE`.
        let _ = phone.hangup(task, scheduler);
    }

    let mut attempt: u32 = 0;
    loop {
        // A phone that was `CONNECTING` at entry may have since landed on
        // `CONNECTED` (peer accepted) or stayed there; retry the hangup so
        // it doesn't sit there forever waiting for a pass that already
        // happened before it was eligible.
        for phone in task.phones() {
            if phone.state(scheduler) == PhoneState::Connected {
                let _ = phone.hangup(task, scheduler);
            }
        }

        let all_free = task
            .phones()
            .iter()
            .all(|phone| phone.state(scheduler) == PhoneState::Free);
        if all_free {
            break;
        }

        attempt += 1;
        if attempt >= CLEANUP_DEADLOCK_THRESHOLD {
            if let Some((slot, _)) = task
                .phones()
                .iter()
                .enumerate()
                .find(|(_, phone)| phone.state(scheduler) != PhoneState::Free)
            {
                panic!(
                    "ipc_cleanup: phone slot {} failed to reach FREE after {} attempts",
                    slot, attempt
                );
            }
        }

        // A phone stuck in `HUNGUP` is waiting on outstanding answers to
        // drain; pump the box's `wait` so those answers get consumed (and
        // their phones' `active_calls` decremented, letting `HUNGUP ->
        // FREE` fire) instead of busy-spinning on the state check alone.
        match answerbox.wait(scheduler, Some(0)) {
            Some(result) => free_any(result.call),
            None => core::hint::spin_loop(),
        }
    }
    crate::kdebug!(
        "ipc_cleanup: exiting for task {} after {} retry attempts",
        task.id().as_u64(),
        attempt
    );
}
