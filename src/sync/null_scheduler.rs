//! A trivial [`Scheduler`] used before the real scheduler exists (early
//! boot, spawning the root task) and anywhere single-threaded code needs a
//! handle to satisfy an API that is otherwise always driven by the real
//! scheduler or a test's `MockScheduler`. Locks are assumed uncontended in
//! these contexts, so blocking is modeled as "already available".

use crate::sync::{Scheduler, ThreadId};

#[derive(Default)]
pub struct NullScheduler;

impl Scheduler for NullScheduler {
    fn current_thread(&self) -> ThreadId {
        ThreadId(0)
    }

    fn block_current(&self, _timeout_us: Option<u64>) -> bool {
        true
    }

    fn wake(&self, _thread: ThreadId) {}
}
