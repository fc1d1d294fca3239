//! Test doubles.

use std::io;
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::handle::Handle;
use crate::interest::NetEvents;
use crate::platform::{Platform, System};
use crate::signaler::Signaler;
use crate::wait_event::WaitEvent;

/// Install a test logger once; later calls are no-ops.
pub(crate) fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A platform that delegates socket work to [`System`] but simulates
/// scheduling, counts calls and can be told to fail.
pub(crate) struct Recording {
    priority: AtomicI32,
    changes: AtomicUsize,
    yields: AtomicUsize,
    refuse_boost: bool,
    fail_bind: Option<(Handle, i32)>,
    fail_query: Option<(Handle, i32)>,
}

impl Recording {
    pub(crate) fn new() -> Self {
        Recording {
            priority: AtomicI32::new(0),
            changes: AtomicUsize::new(0),
            yields: AtomicUsize::new(0),
            refuse_boost: false,
            fail_bind: None,
            fail_query: None,
        }
    }

    /// Reject any attempt to raise the priority, like an unprivileged user.
    pub(crate) fn refuse_boost(mut self) -> Self {
        self.refuse_boost = true;
        self
    }

    /// Make `bind` fail for `handle` with the given errno.
    pub(crate) fn fail_bind(mut self, handle: Handle, errno: i32) -> Self {
        self.fail_bind = Some((handle, errno));
        self
    }

    /// Make `query` fail for `handle` with the given errno.
    pub(crate) fn fail_query(mut self, handle: Handle, errno: i32) -> Self {
        self.fail_query = Some((handle, errno));
        self
    }

    pub(crate) fn current_priority(&self) -> i32 {
        self.priority.load(Ordering::SeqCst)
    }

    pub(crate) fn priority_changes(&self) -> usize {
        self.changes.load(Ordering::SeqCst)
    }

    pub(crate) fn yields(&self) -> usize {
        self.yields.load(Ordering::SeqCst)
    }
}

impl Platform for Recording {
    fn bind(&self, handle: Handle, event: &mut WaitEvent, events: NetEvents) -> io::Result<()> {
        match self.fail_bind {
            Some((failing, errno)) if failing == handle => Err(io::Error::from_raw_os_error(errno)),
            _ => System.bind(handle, event, events),
        }
    }

    fn query(&self, handle: Handle, events: NetEvents) -> io::Result<NetEvents> {
        match self.fail_query {
            Some((failing, errno)) if failing == handle => Err(io::Error::from_raw_os_error(errno)),
            _ => System.query(handle, events),
        }
    }

    fn signaler(&self, handle: Handle) -> Option<Arc<Signaler>> {
        System.signaler(handle)
    }

    fn priority(&self) -> io::Result<i32> {
        Ok(self.current_priority())
    }

    fn set_priority(&self, nice: i32) -> io::Result<()> {
        if self.refuse_boost && nice < self.current_priority() {
            return Err(io::Error::from_raw_os_error(libc::EACCES));
        }
        self.priority.store(nice, Ordering::SeqCst);
        self.changes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn yield_now(&self) {
        self.yields.fetch_add(1, Ordering::SeqCst);
        std::thread::yield_now();
    }
}
