//! The shared wait event of a multiplexing call.
//!
//! One `WaitEvent` exists per call. Sockets are attached to its OS poller;
//! signalers are handed a [`WaitHandle`] and call [`WaitHandle::set`] when
//! they fire. Dropping the event detaches every socket, so nothing outlives
//! the call that created it.

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use polling::{Event, Events, Poller};
use slab::Slab;

use crate::handle::Handle;
use crate::interest::NetEvents;

static NEXT_ID: AtomicU64 = AtomicU64::new(0);

/// Outcome of a blocking wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStatus {
    /// A socket became ready or the event was set.
    Signaled,
    /// The timeout elapsed first.
    TimedOut,
}

/// State shared between the event and the handles given to signalers.
struct Shared {
    id: u64,
    poller: Poller,
    /// Set by `WaitHandle::set()`; never reset during the event's lifetime.
    signaled: AtomicBool,
}

/// The single waitable object a multiplexing call blocks on.
pub struct WaitEvent {
    shared: Arc<Shared>,
    /// Attached sockets, keyed by their poller key.
    sources: Slab<Handle>,
    events: Events,
}

impl WaitEvent {
    /// Create a fresh, unsignaled event with its own OS poller.
    pub fn new() -> io::Result<Self> {
        let shared = Shared {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            poller: Poller::new()?,
            signaled: AtomicBool::new(false),
        };
        Ok(WaitEvent {
            shared: Arc::new(shared),
            sources: Slab::new(),
            events: Events::new(),
        })
    }

    /// The notification side of this event, for signalers.
    pub fn handle(&self) -> WaitHandle {
        WaitHandle(self.shared.clone())
    }

    /// Attach a socket so that readiness for `events` signals this event.
    ///
    /// The caller must keep the descriptor open until the event is dropped.
    pub fn attach(&mut self, handle: Handle, events: NetEvents) -> io::Result<()> {
        let entry = self.sources.vacant_entry();
        let mut interest = Event::new(entry.key(), events.needs_readable(), events.needs_writable());
        // Urgent data only wakes backends with priority events (epoll, poll).
        interest.set_priority(events.contains(NetEvents::OOB));

        // add() is unsafe because we must delete before the fd is closed;
        // Drop takes care of that.
        unsafe {
            self.shared.poller.add(handle.raw(), interest)?;
        }
        entry.insert(handle);
        Ok(())
    }

    /// Number of sockets currently attached.
    pub fn attached(&self) -> usize {
        self.sources.len()
    }

    /// Block until a socket is ready, the event is set, or `timeout` elapses.
    ///
    /// `None` waits indefinitely, as does a timeout too large to express as
    /// a deadline. Wakeups that carry neither a readiness event nor a
    /// `set()` are waited out against the original deadline.
    pub fn wait(&mut self, timeout: Option<Duration>) -> io::Result<WaitStatus> {
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));

        loop {
            if self.shared.signaled.load(Ordering::Acquire) {
                return Ok(WaitStatus::Signaled);
            }

            let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));
            self.events.clear();
            let ready = match self.shared.poller.wait(&mut self.events, remaining) {
                Ok(n) => n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => 0,
                Err(err) => return Err(err),
            };

            if ready > 0 || self.shared.signaled.load(Ordering::Acquire) {
                return Ok(WaitStatus::Signaled);
            }
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    return Ok(WaitStatus::TimedOut);
                }
            }
        }
    }
}

impl Drop for WaitEvent {
    fn drop(&mut self) {
        for handle in self.sources.drain() {
            let borrowed = unsafe { std::os::fd::BorrowedFd::borrow_raw(handle.raw()) };
            // Ignore errors: the caller may already have closed the fd.
            let _ = self.shared.poller.delete(&borrowed);
        }
    }
}

impl fmt::Debug for WaitEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaitEvent")
            .field("id", &self.shared.id)
            .field("attached", &self.sources.len())
            .finish()
    }
}

/// A reference to a [`WaitEvent`] that can only signal it.
///
/// Handles compare equal when they refer to the same event.
#[derive(Clone)]
pub struct WaitHandle(Arc<Shared>);

impl WaitHandle {
    /// Identifier of the underlying event, unique within the process.
    pub fn id(&self) -> u64 {
        self.0.id
    }

    /// Signal the event, waking the thread blocked on it.
    pub fn set(&self) {
        self.0.signaled.store(true, Ordering::Release);
        if let Err(err) = self.0.poller.notify() {
            log::warn!("failed to notify wait event {}: {}", self.0.id, err);
        }
    }
}

impl PartialEq for WaitHandle {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for WaitHandle {}

impl fmt::Debug for WaitHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("WaitHandle").field(&self.0.id).finish()
    }
}
