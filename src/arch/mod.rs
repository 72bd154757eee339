//! Architecture-specific glue for the IPC core.
//!
//! The scheduler, address-space management and interrupt controllers are
//! external collaborators (see `SPEC_FULL.md` §2); this module only exposes
//! the sliver of arch-specific behavior the core actually calls into:
//! halting the bootstrap CPU and the IRQ-disable/enable pair used by
//! [`crate::sync::IrqSpinlock`].

#[cfg(not(test))]
use x86_64::instructions::interrupts;

/// Parks the current CPU forever. Used by the panic handler and by
/// `kernel_main` once there is nothing left to schedule.
#[cfg(not(test))]
pub fn halt_loop() -> ! {
    loop {
        interrupts::disable();
        interrupts::enable_and_hlt();
    }
}

/// Under `cargo test` this crate runs as an ordinary hosted process (see
/// `lib.rs`'s `cfg_attr(not(test), no_std)`), where `cli`/`sti` are
/// privileged and fault outside ring 0 — same reasoning as `serial.rs`'s
/// hardware-sink split. `IrqSpinlock` is exercised directly by
/// `tests/ipc_scenarios.rs`/`tests/ipc_properties.rs` (IRQ notification
/// scenarios), so the real instructions must not run there; a plain
/// thread-local flag stands in for "are interrupts enabled" instead.
#[cfg(test)]
pub fn halt_loop() -> ! {
    loop {
        core::hint::spin_loop();
    }
}

#[cfg(test)]
std::thread_local! {
    static TEST_INTERRUPTS_ENABLED: core::cell::Cell<bool> = const { core::cell::Cell::new(true) };
}

/// Runs `f` with interrupts disabled on the current CPU, restoring the prior
/// flag on return. This is the primitive [`crate::sync::IrqSpinlock`] is
/// built on, mirroring `irq_lock`/`irq_unlock` in the source kernel.
#[inline]
#[cfg(not(test))]
pub fn without_interrupts<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    interrupts::without_interrupts(f)
}

#[inline]
#[cfg(test)]
pub fn without_interrupts<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    let were_enabled = interrupts_enabled();
    disable_interrupts();
    let result = f();
    if were_enabled {
        enable_interrupts();
    }
    result
}

/// Whether interrupts are currently enabled on this CPU.
#[inline]
#[cfg(not(test))]
pub fn interrupts_enabled() -> bool {
    interrupts::are_enabled()
}

#[inline]
#[cfg(test)]
pub fn interrupts_enabled() -> bool {
    TEST_INTERRUPTS_ENABLED.with(|flag| flag.get())
}

/// Disables interrupts on this CPU unconditionally. Paired with
/// [`enable_interrupts`] by [`crate::sync::IrqSpinlock`], which remembers the
/// flag from before the call and only re-enables if it was set.
#[inline]
#[cfg(not(test))]
pub fn disable_interrupts() {
    interrupts::disable();
}

#[inline]
#[cfg(test)]
pub fn disable_interrupts() {
    TEST_INTERRUPTS_ENABLED.with(|flag| flag.set(false));
}

#[inline]
#[cfg(not(test))]
pub fn enable_interrupts() {
    interrupts::enable();
}

#[inline]
#[cfg(test)]
pub fn enable_interrupts() {
    TEST_INTERRUPTS_ENABLED.with(|flag| flag.set(true));
}

/// Stub identifier for the currently executing CPU. A real port would read
/// this out of a per-CPU GS-relative structure populated by the (external)
/// scheduler; the IPC core only needs *some* stable small integer to sort
/// two phones' addresses deterministically in tests, so a single-CPU
/// constant is sufficient here.
#[inline]
pub fn current_cpu_id() -> u32 {
    0
}
