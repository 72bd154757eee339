//! Property tests for the invariants `spec.md` §8 names P1–P7.
//!
//! Exercises the real `aurora_kernel` IPC engine — call pool, answerbox,
//! phone, engine — against the `MockScheduler` double in `common/`. No
//! kernel code is mocked; only the scheduler (blocking/waking threads) is.

mod common;

use std::sync::Arc;

use aurora_kernel::ipc::answerbox::WaitSource;
use aurora_kernel::ipc::call::CALL_POOL;
use aurora_kernel::ipc::engine;
use aurora_kernel::ipc::phone::PhoneState;
use aurora_kernel::task::{directory, Task};
use common::MockScheduler;
use proptest::prelude::*;

fn connect(from: &Arc<Task>, slot: usize, to: &Arc<Task>, scheduler: &aurora_kernel::sync::SchedulerHandle) {
    let phone = from.phone(slot).unwrap();
    phone.begin_connect(scheduler).unwrap();
    phone.connect(&to.answerbox(), scheduler).unwrap();
}

/// P1. FIFO per phone: calls sent through the same phone arrive at the
/// callee in send order.
#[test]
fn p1_fifo_per_phone() {
    let scheduler = MockScheduler::new();
    scheduler.register_current();
    let handle: aurora_kernel::sync::SchedulerHandle = scheduler.clone();

    let a = Task::spawn();
    let b = Task::spawn();
    directory::register(&a);
    directory::register(&b);
    connect(&a, 1, &b, &handle);

    let phone = a.phone(1).unwrap().clone();
    let mut sent = Vec::new();
    for method in [10u64, 20, 30, 40] {
        let call_id = CALL_POOL.alloc(&a, a.answerbox()).unwrap();
        CALL_POOL.with_mut(call_id, |call| call.method = method);
        engine::send(&phone, call_id, &handle);
        sent.push(method);
    }

    let mut received = Vec::new();
    for _ in 0..sent.len() {
        let result = b.answerbox().wait(&handle, Some(0)).expect("call pending");
        assert_eq!(result.source, WaitSource::Call);
        received.push(CALL_POOL.with(result.call, |call| call.method));
    }
    assert_eq!(sent, received, "calls on one phone must arrive in send order");
}

proptest! {
    /// Same property, driven by proptest over arbitrary method sequences
    /// instead of one literal fixture.
    #[test]
    fn p1_fifo_per_phone_arbitrary(methods in prop::collection::vec(0u64..1000, 1..12)) {
        let scheduler = MockScheduler::new();
        scheduler.register_current();
        let handle: aurora_kernel::sync::SchedulerHandle = scheduler.clone();

        let a = Task::spawn();
        let b = Task::spawn();
        directory::register(&a);
        directory::register(&b);
        connect(&a, 2, &b, &handle);
        let phone = a.phone(2).unwrap().clone();

        for &m in &methods {
            let call_id = CALL_POOL.alloc(&a, a.answerbox()).unwrap();
            CALL_POOL.with_mut(call_id, |call| call.method = m);
            engine::send(&phone, call_id, &handle);
        }

        let mut received = Vec::new();
        for _ in 0..methods.len() {
            let result = b.answerbox().wait(&handle, Some(0)).unwrap();
            received.push(CALL_POOL.with(result.call, |call| call.method));
        }
        prop_assert_eq!(methods, received);
    }
}

/// P2. Answer pairing: every answered call produces exactly one answer and
/// decrements `active_calls` exactly once.
#[test]
fn p2_answer_pairing() {
    let scheduler = MockScheduler::new();
    scheduler.register_current();
    let handle: aurora_kernel::sync::SchedulerHandle = scheduler.clone();

    let a = Task::spawn();
    let b = Task::spawn();
    directory::register(&a);
    directory::register(&b);
    connect(&a, 1, &b, &handle);
    let phone = a.phone(1).unwrap().clone();

    let call_id = CALL_POOL.alloc(&a, a.answerbox()).unwrap();
    CALL_POOL.with_mut(call_id, |call| call.method = 17);
    engine::send(&phone, call_id, &handle);
    assert_eq!(phone.active_calls(), 1);

    let dispatched = b.answerbox().wait(&handle, Some(0)).unwrap();
    CALL_POOL.with_mut(dispatched.call, |call| call.retval = 0);
    engine::answer(&b.answerbox(), dispatched.call, &handle);

    // Exactly one answer shows up on the caller's box.
    let answered = a.answerbox().wait(&handle, Some(0)).unwrap();
    assert_eq!(answered.source, WaitSource::Answer);
    assert_eq!(answered.call, dispatched.call);
    assert!(a.answerbox().wait(&handle, Some(0)).is_none(), "only one answer should be queued");

    // `active_calls` only ever decremented by that single consumption.
    assert_eq!(phone.active_calls(), 0);
}

/// P3. No leak on task death: after `ipc_cleanup`, every phone is `FREE`,
/// the answerbox is empty, and nothing is left dangling.
///
/// Exercises both directions at once: `c` has an unanswered call sitting in
/// `a`'s own `calls` queue when `a` dies (must be fabricated into a `HangUp`
/// answer back to `c`, not silently dropped), and `a` has a fully-drained
/// outgoing phone to `d` (must collapse straight to `FREE`).
#[test]
fn p3_no_leak_on_task_death() {
    let scheduler = MockScheduler::new();
    scheduler.register_current();
    let handle: aurora_kernel::sync::SchedulerHandle = scheduler.clone();

    let a = Task::spawn();
    let c = Task::spawn();
    let d = Task::spawn();
    directory::register(&a);
    directory::register(&c);
    directory::register(&d);

    connect(&c, 1, &a, &handle);
    let c_to_a = c.phone(1).unwrap().clone();
    let pending = CALL_POOL.alloc(&c, c.answerbox()).unwrap();
    engine::send(&c_to_a, pending, &handle);

    connect(&a, 2, &d, &handle);
    let a_to_d = a.phone(2).unwrap().clone();
    let outgoing = CALL_POOL.alloc(&a, a.answerbox()).unwrap();
    engine::send(&a_to_d, outgoing, &handle);
    let at_d = d.answerbox().wait(&handle, Some(0)).unwrap();
    engine::answer(&d.answerbox(), at_d.call, &handle);
    let answered = a.answerbox().wait(&handle, Some(0)).unwrap();
    let _ = CALL_POOL.with(answered.call, |call| call.retval);
    assert_eq!(a_to_d.active_calls(), 0, "fully answered before death");

    engine::ipc_cleanup(&a, &handle);

    for p in a.phones() {
        assert_eq!(p.state(&handle), PhoneState::Free, "every phone must end up FREE");
    }
    let snap = a.answerbox().snapshot();
    assert_eq!(snap.calls, 0);
    assert_eq!(snap.dispatched, 0);
    assert_eq!(snap.answers, 0);

    // `c`'s outstanding request is accounted for: a synthetic `HangUp`
    // answer, not silence.
    let to_c = c.answerbox().wait(&handle, Some(0)).expect("hangup answer for c");
    assert_eq!(
        CALL_POOL.with(to_c.call, |call| call.retval),
        aurora_kernel::ipc::IpcError::HangUp.as_retval()
    );
    assert_eq!(c_to_a.state(&handle), PhoneState::Slammed);
}

/// P4. SLAM visibility: if the callee dies while the caller holds a
/// `CONNECTED` phone, the caller's next send yields a synthetic `HangUp`.
#[test]
fn p4_slam_visibility() {
    let scheduler = MockScheduler::new();
    scheduler.register_current();
    let handle: aurora_kernel::sync::SchedulerHandle = scheduler.clone();

    let a = Task::spawn();
    let b = Task::spawn();
    directory::register(&a);
    directory::register(&b);
    connect(&a, 5, &b, &handle);
    let phone = a.phone(5).unwrap().clone();

    engine::ipc_cleanup(&b, &handle);
    assert_eq!(phone.state(&handle), PhoneState::Slammed);

    let call_id = CALL_POOL.alloc(&a, a.answerbox()).unwrap();
    engine::send(&phone, call_id, &handle);

    let answer = a.answerbox().wait(&handle, Some(0)).expect("synthetic hangup answer");
    let retval = CALL_POOL.with(answer.call, |call| call.retval);
    assert_eq!(retval, aurora_kernel::ipc::IpcError::HangUp.as_retval());
}

/// P5. Wait priority: notif > answer > request, checked across three
/// successive `wait` calls.
#[test]
fn p5_wait_priority() {
    let scheduler = MockScheduler::new();
    scheduler.register_current();
    let handle: aurora_kernel::sync::SchedulerHandle = scheduler.clone();

    let a = Task::spawn();
    let b = Task::spawn();
    directory::register(&a);
    directory::register(&b);
    connect(&a, 1, &b, &handle);
    let phone = a.phone(1).unwrap().clone();

    // A request queued for `b`.
    let req_id = CALL_POOL.alloc(&a, a.answerbox()).unwrap();
    engine::send(&phone, req_id, &handle);

    // An unrelated already-answered call queued as an answer for `b`.
    let other_phone = b.phone(2).unwrap().clone();
    other_phone.begin_connect(&handle).unwrap();
    other_phone.connect(&a.answerbox(), &handle).unwrap();
    let own_call = CALL_POOL.alloc(&b, b.answerbox()).unwrap();
    engine::send(&other_phone, own_call, &handle);
    let dispatched = a.answerbox().wait(&handle, Some(0)).unwrap();
    engine::answer(&a.answerbox(), dispatched.call, &handle);

    // An IRQ notification synthesized directly onto `b`'s box.
    let notif_id = CALL_POOL.alloc_static(&b, b.answerbox());
    CALL_POOL.with_mut(notif_id, |call| call.flags.notification = true);
    b.answerbox().notify(notif_id, &handle).unwrap();

    let first = b.answerbox().wait(&handle, Some(0)).unwrap();
    assert_eq!(first.source, WaitSource::IrqNotif);
    let second = b.answerbox().wait(&handle, Some(0)).unwrap();
    assert_eq!(second.source, WaitSource::Answer);
    let third = b.answerbox().wait(&handle, Some(0)).unwrap();
    assert_eq!(third.source, WaitSource::Call);
}

/// P6. Forward preserves sender identity: the original caller's answer
/// carries the final answerer's identity and routes to the caller's own
/// box, regardless of how many hops the forward took.
#[test]
fn p6_forward_preserves_sender_identity() {
    let scheduler = MockScheduler::new();
    scheduler.register_current();
    let handle: aurora_kernel::sync::SchedulerHandle = scheduler.clone();

    let a = Task::spawn();
    let b = Task::spawn();
    let c = Task::spawn();
    directory::register(&a);
    directory::register(&b);
    directory::register(&c);
    connect(&a, 1, &b, &handle);
    connect(&b, 1, &c, &handle);

    let phone_ab = a.phone(1).unwrap().clone();
    let phone_bc = b.phone(1).unwrap().clone();

    let call_id = CALL_POOL.alloc(&a, a.answerbox()).unwrap();
    CALL_POOL.with_mut(call_id, |call| call.method = 100);
    engine::send(&phone_ab, call_id, &handle);

    let at_b = b.answerbox().wait(&handle, Some(0)).unwrap();
    assert_eq!(at_b.call, call_id);

    let rewrite = engine::ForwardRewrite {
        method: Some(200),
        args: [Some(7), None, None, None, None],
    };
    engine::forward(&b.answerbox(), at_b.call, &phone_bc, rewrite, &handle).unwrap();

    let at_c = c.answerbox().wait(&handle, Some(0)).unwrap();
    assert_eq!(
        CALL_POOL.with(at_c.call, |call| (call.method, call.args[0])),
        (200, 7)
    );
    CALL_POOL.with_mut(at_c.call, |call| call.retval = 5);
    engine::answer(&c.answerbox(), at_c.call, &handle);

    let at_a = a.answerbox().wait(&handle, Some(0)).unwrap();
    assert_eq!(at_a.source, WaitSource::Answer);
    let (retval, callerbox_is_a) = CALL_POOL.with(at_a.call, |call| {
        (call.retval, Arc::ptr_eq(&call.callerbox, &a.answerbox()))
    });
    assert_eq!(retval, 5);
    assert!(callerbox_is_a, "answer must route to the original caller's own box");
}

/// P7. Lock-ordering discipline under real concurrency: two tasks
/// connecting to each other and hanging up from both sides at once must
/// not deadlock (answerbox-before-phone, low-address-phone-first is
/// exercised by `Answerbox::cleanup`/`Phone::hangup` taking both locks).
#[test]
fn p7_no_deadlock_under_concurrent_teardown() {
    let scheduler = MockScheduler::new();
    let a = Task::spawn();
    let b = Task::spawn();
    directory::register(&a);
    directory::register(&b);

    scheduler.register_current();
    let handle: aurora_kernel::sync::SchedulerHandle = scheduler.clone();
    connect(&a, 1, &b, &handle);
    connect(&b, 1, &a, &handle);

    let a2 = a.clone();
    let b2 = b.clone();
    let sched_a = scheduler.clone();
    let sched_b = scheduler.clone();
    let t1 = scheduler.spawn(move |_| {
        let handle: aurora_kernel::sync::SchedulerHandle = sched_a;
        engine::ipc_cleanup(&a2, &handle);
    });
    let t2 = scheduler.spawn(move |_| {
        let handle: aurora_kernel::sync::SchedulerHandle = sched_b;
        engine::ipc_cleanup(&b2, &handle);
    });
    t1.join().expect("task a cleanup must not deadlock");
    t2.join().expect("task b cleanup must not deadlock");
}
