//! Error kinds observable at the userspace async boundary.
//!
//! Mirrors the kernel core's `IpcError` one-for-one (same negative-retval
//! convention, same names) plus `Timeout`, which is local-only: the kernel
//! has no cancellation primitive, so a timed-out wait just stops waiting
//! while the real answer, if it ever arrives, is silently discarded.

use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsyncError {
    OutOfMemory,
    NotConnected,
    HangUp,
    Forwarded,
    Limit,
    PermissionDenied,
    NoEntry,
    /// `async_wait_timeout` deadline elapsed before the answer arrived.
    Timeout,
}

impl AsyncError {
    /// Recovers the error a synthetic answer's `retval` encodes, matching
    /// the kernel core's `IpcError::as_retval` table. `None` means the
    /// retval is an ordinary (non-error) application value.
    pub const fn from_retval(retval: i64) -> Option<Self> {
        match retval {
            -1 => Some(AsyncError::OutOfMemory),
            -2 => Some(AsyncError::NotConnected),
            -3 => Some(AsyncError::HangUp),
            -4 => Some(AsyncError::Forwarded),
            -5 => Some(AsyncError::Limit),
            -6 => Some(AsyncError::PermissionDenied),
            -7 => Some(AsyncError::NoEntry),
            _ => None,
        }
    }
}

impl fmt::Display for AsyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            AsyncError::OutOfMemory => "out of memory",
            AsyncError::NotConnected => "phone not connected",
            AsyncError::HangUp => "peer hung up",
            AsyncError::Forwarded => "forward could not be completed",
            AsyncError::Limit => "resource limit reached",
            AsyncError::PermissionDenied => "permission denied",
            AsyncError::NoEntry => "no such entry",
            AsyncError::Timeout => "wait deadline elapsed",
        };
        f.write_str(msg)
    }
}
