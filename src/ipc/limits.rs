//! Compile-time tunables. The kernel core has no runtime configuration
//! surface — these are the direct analogues of HelenOS's `IPC_MAX_PHONES`
//! and `DEADLOCK_THRESHOLD` constants.

/// Phones a single task may hold open at once. HelenOS's `IPC_MAX_PHONES`
/// is 16 on every architecture it ships; kept identical here since nothing
/// in this core depends on it being tunable per-arch.
pub const MAX_PHONES_PER_TASK: usize = 16;

/// Bound on `ipc_cleanup`'s phone-restart retry loop (see `engine.rs`). A
/// phone lock that stays contended for this many attempts is treated as a
/// deadlock and panics with the offending phone index rather than spinning
/// forever.
pub const CLEANUP_DEADLOCK_THRESHOLD: u32 = 100_000;

/// Soft cap on `irq_notifs` depth. The source kernel has no hard cap
/// (`ipc_call_t` structs are carved out of reserved kernel memory
/// specifically set aside for notifications it cannot fail to deliver), but
/// a pool-backed implementation needs a concrete bound so `notify()` can
/// fail fast rather than grow the global pool without limit under a
/// misbehaving driver.
pub const IRQ_NOTIF_QUEUE_CAP: usize = 256;
