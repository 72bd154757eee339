//! Task: the unit of protection the IPC core actually needs to know about
//! — its answerbox and its phone array. Address-space and thread ownership
//! are out of scope; a real build layers those on top of this struct.

use alloc::sync::{Arc, Weak};
use core::sync::atomic::{AtomicU64, Ordering};

use crate::ipc::answerbox::Answerbox;
use crate::ipc::limits::MAX_PHONES_PER_TASK;
use crate::ipc::phone::Phone;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(u64);

impl TaskId {
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

pub struct Task {
    id: TaskId,
    answerbox: Arc<Answerbox>,
    phones: [Arc<Phone>; MAX_PHONES_PER_TASK],
}

impl Task {
    /// Reserved phone slot pre-connected to the naming service on newly
    /// spawned tasks, supplementing the distilled spec with the source's
    /// `ipc_phone_0` convenience (see `SPEC_FULL.md` §3).
    pub const NS_PHONE_SLOT: usize = 0;

    /// Allocates a fresh task id and constructs the task with an empty,
    /// active answerbox and `MAX_PHONES_PER_TASK` free phones. Each phone
    /// and the answerbox hold a `Weak` back-reference to this task, which
    /// is why construction goes through `Arc::new_cyclic`.
    pub fn spawn() -> Arc<Task> {
        let id = TaskId(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed));
        Arc::new_cyclic(|weak_task| Task {
            id,
            answerbox: Arc::new(Answerbox::new(weak_task.clone())),
            phones: core::array::from_fn(|slot| Arc::new(Phone::new(weak_task.clone(), slot))),
        })
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn answerbox(&self) -> Arc<Answerbox> {
        self.answerbox.clone()
    }

    pub fn phone(&self, slot: usize) -> Option<&Arc<Phone>> {
        self.phones.get(slot)
    }

    pub fn phones(&self) -> &[Arc<Phone>; MAX_PHONES_PER_TASK] {
        &self.phones
    }
}

/// Weak reference a task is looked up through, matching the "never hand out
/// a reference outliving the directory lock without a taken refcount"
/// discipline `spec.md` §9 calls for.
pub type TaskWeak = Weak<Task>;
