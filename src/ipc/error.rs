//! The error model for the IPC core (`SPEC_FULL.md` §2, "Error handling").
//!
//! A single enum covers every outcome a caller of this crate can observe.
//! `core::fmt::Display` is hand-rolled since `core::error::Error` is still
//! unstable on the MSRV this kernel targets and the teacher crate never
//! pulls in `std` outside test builds.

use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpcError {
    /// Slab exhaustion. Returned synchronously from send only if the
    /// caller requested a non-blocking allocation.
    OutOfMemory,
    /// Phone is not in `CONNECTED`.
    NotConnected,
    /// Peer gone. Delivered as a synthetic answer, never as a local
    /// return, so callers observe it uniformly regardless of when the
    /// peer died relative to the send.
    HangUp,
    /// A forward was attempted but could not be completed; the caller's
    /// original request was already consumed.
    Forwarded,
    /// A resource ceiling was reached (phone slots, ids).
    Limit,
    /// Killing task 1 (init), or addressing an unknown callee.
    PermissionDenied,
    /// Unknown task id.
    NoEntry,
}

impl IpcError {
    /// Maps an error to the negative-retval convention synthetic answers
    /// carry back to userspace (mirroring the source's negated-errno
    /// `retval` values), so a caller sees the same shape of result whether
    /// a failure was returned synchronously or delivered as an answer.
    pub const fn as_retval(self) -> i64 {
        match self {
            IpcError::OutOfMemory => -1,
            IpcError::NotConnected => -2,
            IpcError::HangUp => -3,
            IpcError::Forwarded => -4,
            IpcError::Limit => -5,
            IpcError::PermissionDenied => -6,
            IpcError::NoEntry => -7,
        }
    }
}

impl fmt::Display for IpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            IpcError::OutOfMemory => "out of memory",
            IpcError::NotConnected => "phone not connected",
            IpcError::HangUp => "peer hung up",
            IpcError::Forwarded => "forward could not be completed",
            IpcError::Limit => "resource limit reached",
            IpcError::PermissionDenied => "permission denied",
            IpcError::NoEntry => "no such entry",
        };
        f.write_str(msg)
    }
}
