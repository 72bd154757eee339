//! Deterministic scheduler double for exercising `aurora_kernel` from plain
//! `cargo test` code. Implements `aurora_kernel::sync::Scheduler` over real
//! OS threads parked with `std::thread::park`/`Thread::unpark` — there is no
//! actual kernel scheduler to drive here, but park/unpark gives exactly the
//! "block this thread, wake it from another" primitive the trait asks for,
//! with none of the nondeterminism of a condvar-based wait loop.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, Thread};
use std::time::{Duration, Instant};

use aurora_kernel::sync::{Scheduler, ThreadId};

thread_local! {
    static CURRENT: std::cell::RefCell<Option<ThreadId>> = std::cell::RefCell::new(None);
}

struct Slot {
    thread: Thread,
    woken: AtomicBool,
}

#[derive(Default)]
pub struct MockScheduler {
    next_id: AtomicU64,
    slots: Mutex<HashMap<u64, Arc<Slot>>>,
}

impl MockScheduler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicU64::new(1),
            slots: Mutex::new(HashMap::new()),
        })
    }

    /// Registers the calling OS thread as a fresh logical `ThreadId`. Every
    /// test "actor" (a task's single thread of execution) must call this
    /// once before touching the scheduler — mirrors a real kernel assigning
    /// a `ThreadId` the first time a thread traps in.
    pub fn register_current(&self) -> ThreadId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let slot = Arc::new(Slot {
            thread: thread::current(),
            woken: AtomicBool::new(false),
        });
        self.slots.lock().unwrap().insert(id, slot);
        let tid = ThreadId(id);
        CURRENT.with(|c| *c.borrow_mut() = Some(tid));
        tid
    }

    /// Runs `f` on a fresh OS thread pre-registered with its own `ThreadId`,
    /// for tests that need two or more actors truly running concurrently
    /// (e.g. the hangup-race scenario in `ipc_scenarios.rs`).
    pub fn spawn<F>(self: &Arc<Self>, f: F) -> thread::JoinHandle<()>
    where
        F: FnOnce(ThreadId) + Send + 'static,
    {
        let me = self.clone();
        thread::spawn(move || {
            let id = me.register_current();
            f(id);
        })
    }
}

impl Scheduler for MockScheduler {
    fn current_thread(&self) -> ThreadId {
        CURRENT.with(|c| {
            c.borrow()
                .expect("thread never registered via MockScheduler::register_current")
        })
    }

    fn block_current(&self, timeout_us: Option<u64>) -> bool {
        let id = self.current_thread();
        let slot = self
            .slots
            .lock()
            .unwrap()
            .get(&id.0)
            .expect("block_current on unregistered thread")
            .clone();

        let deadline = timeout_us.map(|us| Instant::now() + Duration::from_micros(us));
        loop {
            if slot.woken.swap(false, Ordering::AcqRel) {
                return true;
            }
            match deadline {
                None => thread::park(),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return slot.woken.swap(false, Ordering::AcqRel);
                    }
                    thread::park_timeout(deadline - now);
                }
            }
        }
    }

    fn wake(&self, thread: ThreadId) {
        if let Some(slot) = self.slots.lock().unwrap().get(&thread.0) {
            slot.woken.store(true, Ordering::Release);
            slot.thread.unpark();
        }
    }
}
