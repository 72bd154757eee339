//! Opaque handles a userspace task juggles. Neither is ever interpreted
//! here — both are only ever handed back to the `Syscalls` collaborator
//! that minted them.

/// An in-flight asynchronous request, as returned by `async_send_N`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AsyncId(pub u64);

/// A phone capability, from the userspace side. Stands in for the kernel
/// core's `Phone` without this crate depending on it — the two halves of
/// the system only ever agree on the wire shape `Syscalls` presents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PhoneHandle(pub u64);
