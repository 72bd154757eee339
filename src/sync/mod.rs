//! Synchronization primitives the IPC core is built on.
//!
//! The core never talks to a real scheduler directly; it blocks and wakes
//! threads through the [`Scheduler`] trait so the engine can be exercised
//! under a deterministic `MockScheduler` in `tests/` without pulling in the
//! real preemptive scheduler. This mirrors the teacher kernel's habit of
//! keeping `scheduler.rs` behind a narrow table of fixed-size static state
//! rather than reaching across module boundaries for private fields.

pub mod mutex;
pub mod null_scheduler;
pub mod spinlock;
pub mod waitqueue;

pub use mutex::Mutex;
pub use null_scheduler::NullScheduler;
pub use spinlock::{IrqSpinlock, Spinlock};
pub use waitqueue::{SchedulerHandle, WakePolicy, Waitqueue};

/// A thread id as seen by the IPC core. Opaque; the scheduler hands these
/// out and is the only thing that interprets them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(pub u64);

/// External collaborator boundary: blocking and waking a thread.
///
/// Everything the IPC core needs from a scheduler is "put this thread to
/// sleep" and "make that thread runnable again" — it never touches run
/// queues, priorities, or time slices. A real port implements this over the
/// actual scheduler; `tests/` implements it over a `VecDeque` of runnable
/// ids and a simulated clock.
pub trait Scheduler: Send + Sync {
    /// Id of the thread calling into the IPC core on the current CPU.
    fn current_thread(&self) -> ThreadId;

    /// Blocks `current_thread()` until woken, or until `timeout_us`
    /// microseconds elapse if `Some`. Returns `true` if woken, `false` on
    /// timeout. Must be called with the waitqueue's internal lock already
    /// released by the caller (the `Waitqueue` arranges this atomically).
    fn block_current(&self, timeout_us: Option<u64>) -> bool;

    /// Marks `thread` runnable. Idempotent: waking an already-runnable
    /// thread is a no-op.
    fn wake(&self, thread: ThreadId);
}
