//! The OS primitives the multiplexor is built on.
//!
//! [`System`] is the real implementation. Tests substitute their own to
//! inject failures and observe scheduling changes.

use std::io;
use std::sync::Arc;

use crate::handle::Handle;
use crate::interest::NetEvents;
use crate::signaler::{self, Signaler};
use crate::wait_event::WaitEvent;

/// Binding, introspection and scheduling primitives.
pub trait Platform {
    /// Associate `handle` with `event` so that any of `events` signals it.
    ///
    /// Must fail with `ENOTSOCK` when `handle` is not a socket.
    fn bind(&self, handle: Handle, event: &mut WaitEvent, events: NetEvents) -> io::Result<()>;

    /// Report which of `events` are pending on the socket `handle`.
    fn query(&self, handle: Handle, events: NetEvents) -> io::Result<NetEvents>;

    /// Resolve a handle that `bind` rejected as "not a socket".
    fn signaler(&self, handle: Handle) -> Option<Arc<Signaler>>;

    /// Current scheduling priority of the calling thread, as a nice value.
    ///
    /// [`System`] reads the nice value of the calling thread on Linux and
    /// Android, and of the whole process on other unix targets.
    fn priority(&self) -> io::Result<i32>;

    /// Change the scheduling priority of the calling thread.
    ///
    /// [`System`] has the same per-target scope as for [`priority`]: on
    /// targets other than Linux and Android every thread of the process is
    /// boosted while a call blocks.
    ///
    /// [`priority`]: Platform::priority
    fn set_priority(&self, nice: i32) -> io::Result<()>;

    /// Give up the rest of the current time slice.
    fn yield_now(&self) {
        std::thread::yield_now();
    }
}

/// The platform backed by the host OS.
#[derive(Debug, Clone, Copy, Default)]
pub struct System;

impl Platform for System {
    fn bind(&self, handle: Handle, event: &mut WaitEvent, events: NetEvents) -> io::Result<()> {
        crate::sys::socket_type(handle.raw())?;
        event.attach(handle, events)
    }

    fn query(&self, handle: Handle, events: NetEvents) -> io::Result<NetEvents> {
        crate::sys::socket_type(handle.raw())?;
        crate::sys::pending_events(handle.raw(), events)
    }

    fn signaler(&self, handle: Handle) -> Option<Arc<Signaler>> {
        signaler::lookup(handle)
    }

    fn priority(&self) -> io::Result<i32> {
        crate::sys::priority()
    }

    fn set_priority(&self, nice: i32) -> io::Result<()> {
        crate::sys::set_priority(nice)
    }
}

/// Whether `err` is the binding primitive's "this is not a socket" answer.
pub(crate) fn is_not_socket(err: &io::Error) -> bool {
    err.raw_os_error() == Some(libc::ENOTSOCK)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interest::Interest;
    use std::os::unix::net::UnixStream;

    #[test]
    fn system_binds_sockets() {
        let (a, _b) = UnixStream::pair().unwrap();
        let mut event = WaitEvent::new().unwrap();
        System
            .bind(Handle::of(&a), &mut event, NetEvents::implied_by(Interest::WRITE))
            .unwrap();
        assert_eq!(event.attached(), 1);
    }

    #[test]
    fn system_rejects_signalers_as_not_sockets() {
        let signaler = Signaler::new().unwrap();
        let mut event = WaitEvent::new().unwrap();
        let err = System
            .bind(signaler.handle(), &mut event, NetEvents::implied_by(Interest::READ))
            .unwrap_err();
        assert!(is_not_socket(&err));
        assert_eq!(event.attached(), 0);

        let resolved = System.signaler(signaler.handle()).unwrap();
        assert!(Arc::ptr_eq(&resolved, &signaler));
    }

    #[test]
    fn system_bind_reports_bad_descriptors() {
        let mut event = WaitEvent::new().unwrap();
        let err = System
            .bind(Handle::from_raw(-1), &mut event, NetEvents::READ)
            .unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::EBADF));
        assert!(!is_not_socket(&err));
    }
}
