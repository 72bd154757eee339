//! External collaborator boundary: the syscall surface this framework is
//! built on (`spec.md` §6). Real userspace tasks implement this over actual
//! traps into the kernel core; tests implement it over an in-process fake
//! that behaves like one task's view of `aurora-kernel`'s IPC engine. The
//! framework itself never assumes anything more than this trait gives it —
//! same discipline as the kernel core's own `Scheduler` boundary.

use crate::error::AsyncError;
use crate::ids::{AsyncId, PhoneHandle};

/// One event handed back by [`Syscalls::wait`] — the userspace-side
/// counterpart of the kernel core's `WaitResult`, carrying the two tag
/// bits (`answered`, `notification`) the real `wait` syscall packs into
/// the returned id (`spec.md` §6).
#[derive(Debug, Clone, Copy)]
pub struct WaitEvent {
    pub id: AsyncId,
    pub retval: i64,
    pub args: [u64; 5],
    pub answered: bool,
    pub notification: bool,
}

pub trait Syscalls: Send + Sync {
    /// `call_async_fast(phone, method, a1, a2)`: one-arg async send.
    fn call_async_fast(
        &self,
        phone: PhoneHandle,
        method: u64,
        a1: u64,
        a2: u64,
    ) -> Result<AsyncId, AsyncError>;

    /// `call_async(phone, &call)`: full five-argument async send.
    fn call_async(&self, phone: PhoneHandle, method: u64, args: [u64; 5]) -> Result<AsyncId, AsyncError>;

    /// Underlying primitive `async_manager` drives: blocks the calling
    /// fibril's carrier thread until an event is ready or `timeout_us`
    /// elapses. Priority order (IRQ notif > answer > request) is the
    /// kernel core's, not this framework's, to enforce.
    fn wait(&self, timeout_us: Option<u64>) -> Option<WaitEvent>;

    fn answer_fast(&self, id: AsyncId, retval: i64, a1: u64, a2: u64) -> Result<(), AsyncError>;
    fn answer(&self, id: AsyncId, retval: i64, args: [u64; 5]) -> Result<(), AsyncError>;

    /// `forward_fast(call_id, phone, method, a1)`.
    fn forward_fast(&self, id: AsyncId, phone: PhoneHandle, method: u64, a1: u64) -> Result<(), AsyncError>;

    fn hangup(&self, phone: PhoneHandle) -> Result<(), AsyncError>;

    /// Clones the underlying phone so a `Parallel`-managed session can hand
    /// concurrent exchanges independent phones instead of serializing them
    /// on one (`spec.md` §4.6, "Parallel ... clones the underlying phone").
    fn clone_phone(&self, phone: PhoneHandle) -> Result<PhoneHandle, AsyncError>;

    /// `async_connect_to_me` equivalent: asks the peer reachable via
    /// `phone` to open a callback phone back to this task on `iface`.
    fn connect_to_me(&self, phone: PhoneHandle, iface: u64, arg1: u64, arg2: u64) -> Result<(), AsyncError>;

    /// Announces an outgoing data-read transfer of `size` bytes and
    /// returns once the peer has claimed (or declined) it.
    fn data_read_start(&self, phone: PhoneHandle, size: usize) -> Result<AsyncId, AsyncError>;
    /// Announces an outgoing data-write transfer of `size` bytes.
    fn data_write_start(&self, phone: PhoneHandle, size: usize) -> Result<AsyncId, AsyncError>;

    /// Offers a memory region of `size` bytes to be mapped into the peer's
    /// address space (`async_share_out_start`).
    fn share_out_start(&self, phone: PhoneHandle, size: usize, flags: u32) -> Result<AsyncId, AsyncError>;
    /// Requests `size` bytes of the peer's address space be mapped into
    /// this task's (`async_share_in_start_*`).
    fn share_in_start(&self, phone: PhoneHandle, size: usize) -> Result<AsyncId, AsyncError>;
}
