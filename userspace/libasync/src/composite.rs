//! Composite operations built on top of plain request/answer: data
//! read/write handshakes, callback connections, shared-memory setup
//! (`spec.md` §4.6, "Composite operations").

use alloc::sync::Arc;

use crate::error::AsyncError;
use crate::ids::PhoneHandle;
use crate::request::{AsyncReply, Requests};
use crate::session::Exchange;
use crate::syscalls::Syscalls;

/// Data-read handshake: announces an incoming transfer of `size` bytes,
/// then awaits the peer's claim/decline. The actual byte movement happens
/// through the kernel-managed buffer the announcement names — moving
/// those bytes is the collaborator's job, not this framework's, exactly as
/// the announcement step here only carries size/offset, never the payload
/// itself.
pub async fn data_read<S: Syscalls>(
    exch: &Exchange<S>,
    requests: &Arc<Requests<S>>,
    size: usize,
) -> Result<AsyncReply, AsyncError> {
    let id = exch.syscalls().data_read_start(exch.phone(), size)?;
    requests.track(id);
    Ok(requests.wait_for(id).await)
}

/// Data-write handshake: the write-side counterpart of [`data_read`].
pub async fn data_write<S: Syscalls>(
    exch: &Exchange<S>,
    requests: &Arc<Requests<S>>,
    size: usize,
) -> Result<AsyncReply, AsyncError> {
    let id = exch.syscalls().data_write_start(exch.phone(), size)?;
    requests.track(id);
    Ok(requests.wait_for(id).await)
}

/// Callback connection: asks the peer reachable through `exch` to open a
/// phone back to this task on `iface`. Synchronous at this framework's
/// level — HelenOS's `async_connect_to_me` has no `aid_t` of its own, the
/// peer either grants or refuses the callback phone inline.
pub fn connect_to_me<S: Syscalls>(exch: &Exchange<S>, iface: u64, arg1: u64, arg2: u64) -> Result<(), AsyncError> {
    exch.syscalls().connect_to_me(exch.phone(), iface, arg1, arg2)
}

/// Shares `size` bytes of this task's address space out to the peer
/// (`async_share_out_start`).
pub async fn share_out<S: Syscalls>(
    exch: &Exchange<S>,
    requests: &Arc<Requests<S>>,
    size: usize,
    flags: u32,
) -> Result<AsyncReply, AsyncError> {
    let id = exch.syscalls().share_out_start(exch.phone(), size, flags)?;
    requests.track(id);
    Ok(requests.wait_for(id).await)
}

/// Requests `size` bytes of the peer's address space be mapped into this
/// task's (`async_share_in_start_*`).
pub async fn share_in<S: Syscalls>(
    exch: &Exchange<S>,
    requests: &Arc<Requests<S>>,
    size: usize,
) -> Result<AsyncReply, AsyncError> {
    let id = exch.syscalls().share_in_start(exch.phone(), size)?;
    requests.track(id);
    Ok(requests.wait_for(id).await)
}

/// `async_hangup`: tears down a session's underlying phone directly,
/// bypassing exchange acquisition (there is nothing left to serialize
/// against once the session is going away).
pub fn hangup<S: Syscalls>(syscalls: &Arc<S>, phone: PhoneHandle) -> Result<(), AsyncError> {
    syscalls.hangup(phone)
}

#[cfg(test)]
mod tests {
    use core::pin::pin;

    use crate::ids::AsyncId;
    use crate::session::Session;
    use crate::syscalls::WaitEvent;
    use crate::test_support::{block_on, MockSyscalls};
    use crate::{ExchangeMgmt, PhoneHandle};

    use super::*;

    #[test]
    fn test_data_read_resolves_once_the_peer_answers() {
        let syscalls = MockSyscalls::new();
        let requests = Requests::new(syscalls.clone());
        let session = Session::new(syscalls.clone(), PhoneHandle(1), ExchangeMgmt::Atomic);
        let exch = session.exchange_begin().unwrap();

        syscalls.events.lock().push_back(WaitEvent {
            id: AsyncId(1),
            retval: 0,
            args: [0; 5],
            answered: true,
            notification: false,
        });

        let fut = data_read(&exch, &requests, 64);
        let mut fut = pin!(fut);
        // First poll issues `data_read_start` and suspends; the canned
        // event above only becomes visible once something calls `wait`
        // and routes it through `Requests::complete`, which here is done
        // by hand rather than via an executor.
        assert!(block_on(fut.as_mut(), 1).is_none());
        let event = syscalls.events.lock().pop_front().unwrap();
        requests.complete(event.id, AsyncReply { retval: event.retval, args: event.args });

        let reply = block_on(fut.as_mut(), 1).expect("answer delivered").unwrap();
        assert_eq!(reply.retval, 0);
    }

    #[test]
    fn test_connect_to_me_is_synchronous() {
        let syscalls = MockSyscalls::new();
        let session = Session::new(syscalls, PhoneHandle(1), ExchangeMgmt::Atomic);
        let exch = session.exchange_begin().unwrap();

        assert!(connect_to_me(&exch, 3, 0, 0).is_ok());
    }

    #[test]
    fn test_hangup_reaches_the_syscalls_collaborator() {
        let syscalls = MockSyscalls::new();
        assert!(hangup(&syscalls, PhoneHandle(1)).is_ok());
    }
}
