//! Kernel IPC core: the call/answer/forward/hangup protocol tasks use to
//! talk to each other.
//!
//! Dependency order mirrors the module layout: `call` (the object pool)
//! has no dependents inside this crate; `answerbox` and `phone` are
//! mutually aware (an answerbox tracks its connected phones, a phone
//! targets an answerbox); `engine` ties both together into the
//! call/answer/forward/cleanup protocol.

pub mod answerbox;
pub mod call;
pub mod engine;
mod error;
pub mod limits;
pub mod phone;
pub mod stats;

pub use error::IpcError;
