//! Lightweight atomic counters observing the IPC core, grounded in the
//! teacher kernel's habit of keeping plain atomics next to the subsystem
//! they describe (`scheduler.rs`'s per-queue run counters). Supplements the
//! source's `ipc_print_task` introspection (see `Answerbox::snapshot`)
//! with aggregate numbers cheap enough to read on every `kdebug!` call.

use core::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct IpcStats {
    pub calls_sent: AtomicU64,
    pub answers_delivered: AtomicU64,
    pub forwards: AtomicU64,
    pub hangups: AtomicU64,
    pub slams: AtomicU64,
}

impl IpcStats {
    const fn new() -> Self {
        Self {
            calls_sent: AtomicU64::new(0),
            answers_delivered: AtomicU64::new(0),
            forwards: AtomicU64::new(0),
            hangups: AtomicU64::new(0),
            slams: AtomicU64::new(0),
        }
    }

    pub fn record_call_sent(&self) {
        self.calls_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_answer_delivered(&self) {
        self.answers_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_forward(&self) {
        self.forwards.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_hangup(&self) {
        self.hangups.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_slam(&self) {
        self.slams.fetch_add(1, Ordering::Relaxed);
    }
}

pub static STATS: IpcStats = IpcStats::new();
