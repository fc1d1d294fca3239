//! Signalers: cross-thread wakeup objects that can sit in an interest set.
//!
//! A signaler's handle is the read end of a pipe, so the socket binding
//! primitive rejects it with `ENOTSOCK`. The multiplexor then looks the
//! handle up in the process-wide registry and asks the signaler to set its
//! wait event on the next `send()`.

use std::collections::HashMap;
use std::io;
use std::os::unix::io::{AsRawFd, OwnedFd, RawFd};
use std::sync::{Arc, Mutex, OnceLock, Weak};

use crate::handle::Handle;
use crate::wait_event::WaitHandle;

/// Live signalers, keyed by the descriptor that serves as their handle.
static REGISTRY: OnceLock<Mutex<HashMap<RawFd, Weak<Signaler>>>> = OnceLock::new();

fn registry() -> &'static Mutex<HashMap<RawFd, Weak<Signaler>>> {
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Resolve a handle to the live signaler it belongs to, if any.
pub fn lookup(handle: Handle) -> Option<Arc<Signaler>> {
    let signalers = registry().lock().unwrap();
    signalers.get(&handle.raw()).and_then(Weak::upgrade)
}

struct State {
    /// Signals sent but not yet received.
    pending: usize,
    /// Wait events to set on the next `send()`.
    waiters: Vec<WaitHandle>,
}

/// An inter-thread wakeup object.
pub struct Signaler {
    reader: OwnedFd,
    writer: OwnedFd,
    state: Mutex<State>,
}

impl Signaler {
    /// Create a signaler and make it resolvable through [`lookup`].
    pub fn new() -> io::Result<Arc<Signaler>> {
        let (reader, writer) = crate::sys::pipe()?;
        let signaler = Arc::new(Signaler {
            reader,
            writer,
            state: Mutex::new(State {
                pending: 0,
                waiters: Vec::new(),
            }),
        });
        registry()
            .lock()
            .unwrap()
            .insert(signaler.reader.as_raw_fd(), Arc::downgrade(&signaler));
        Ok(signaler)
    }

    /// The handle to put in an interest set.
    pub fn handle(&self) -> Handle {
        Handle::from_raw(self.reader.as_raw_fd())
    }

    /// Send one signal and wake every registered wait event.
    ///
    /// Registered wait events are removed as they are set; that removal is
    /// how a waiter later learns this signaler fired.
    pub fn send(&self) -> io::Result<()> {
        let mut state = self.state.lock().unwrap();
        state.pending += 1;

        let byte = 1u8;
        let n = unsafe {
            libc::write(
                self.writer.as_raw_fd(),
                &byte as *const u8 as *const libc::c_void,
                1,
            )
        };
        if n < 0 {
            let err = io::Error::last_os_error();
            // A full pipe still leaves the signal recorded in `pending`.
            if err.kind() != io::ErrorKind::WouldBlock {
                state.pending -= 1;
                return Err(err);
            }
        }

        for waiter in state.waiters.drain(..) {
            log::trace!("signaler {} setting wait event {}", self.reader.as_raw_fd(), waiter.id());
            waiter.set();
        }
        Ok(())
    }

    /// Consume one pending signal. Returns `false` if none was pending.
    pub fn try_recv(&self) -> io::Result<bool> {
        let mut state = self.state.lock().unwrap();
        if state.pending == 0 {
            return Ok(false);
        }

        let mut byte = 0u8;
        let n = unsafe {
            libc::read(
                self.reader.as_raw_fd(),
                &mut byte as *mut u8 as *mut libc::c_void,
                1,
            )
        };
        if n < 0 {
            let err = io::Error::last_os_error();
            // An empty pipe means `send` hit a full one; the count still holds.
            if err.kind() != io::ErrorKind::WouldBlock {
                return Err(err);
            }
        }
        state.pending -= 1;
        Ok(true)
    }

    /// Ask to have `waiter` set on the next `send()`.
    ///
    /// If a signal is already pending the waiter is set right away and not
    /// recorded, exactly as if `send()` had raced ahead of the registration.
    pub fn add_waiting_event(&self, waiter: WaitHandle) {
        let mut state = self.state.lock().unwrap();
        if state.pending > 0 {
            waiter.set();
            return;
        }
        state.waiters.push(waiter);
    }

    /// Withdraw `waiter`. Returns `true` if it was still registered, i.e.
    /// this signaler has not fired since it was added.
    pub fn remove_waiting_event(&self, waiter: &WaitHandle) -> bool {
        let mut state = self.state.lock().unwrap();
        match state.waiters.iter().position(|w| w == waiter) {
            Some(index) => {
                state.waiters.swap_remove(index);
                true
            }
            None => false,
        }
    }

    /// Number of wait events currently registered.
    pub fn waiting_events(&self) -> usize {
        self.state.lock().unwrap().waiters.len()
    }
}

impl AsRawFd for Signaler {
    fn as_raw_fd(&self) -> RawFd {
        self.reader.as_raw_fd()
    }
}

impl Drop for Signaler {
    fn drop(&mut self) {
        // Unregister before the descriptor is closed and can be reused.
        let fd = self.reader.as_raw_fd();
        let mut signalers = registry().lock().unwrap();
        if signalers.get(&fd).is_some_and(|w| w.strong_count() == 0) {
            signalers.remove(&fd);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wait_event::{WaitEvent, WaitStatus};
    use std::time::Duration;

    #[test]
    fn lookup_finds_live_signaler() {
        let signaler = Signaler::new().unwrap();
        let found = lookup(signaler.handle()).expect("signaler should be registered");
        assert!(Arc::ptr_eq(&found, &signaler));
    }

    #[test]
    fn lookup_forgets_dropped_signaler() {
        let signaler = Signaler::new().unwrap();
        let handle = signaler.handle();
        drop(signaler);

        // Other tests may reuse the descriptor, but never leave a dead entry.
        let signalers = registry().lock().unwrap();
        assert!(signalers
            .get(&handle.raw())
            .map_or(true, |w| w.strong_count() > 0));
    }

    #[test]
    fn remove_without_send_reports_still_registered() {
        let signaler = Signaler::new().unwrap();
        let event = WaitEvent::new().unwrap();

        signaler.add_waiting_event(event.handle());
        assert_eq!(signaler.waiting_events(), 1);
        assert!(signaler.remove_waiting_event(&event.handle()));
        assert_eq!(signaler.waiting_events(), 0);
    }

    #[test]
    fn send_sets_and_removes_waiters() {
        let signaler = Signaler::new().unwrap();
        let mut event = WaitEvent::new().unwrap();

        signaler.add_waiting_event(event.handle());
        signaler.send().unwrap();

        assert_eq!(signaler.waiting_events(), 0);
        assert!(!signaler.remove_waiting_event(&event.handle()));
        assert_eq!(
            event.wait(Some(Duration::ZERO)).unwrap(),
            WaitStatus::Signaled
        );
    }

    #[test]
    fn pending_signal_fires_on_registration() {
        let signaler = Signaler::new().unwrap();
        signaler.send().unwrap();

        let mut event = WaitEvent::new().unwrap();
        signaler.add_waiting_event(event.handle());

        assert_eq!(signaler.waiting_events(), 0);
        assert!(!signaler.remove_waiting_event(&event.handle()));
        assert_eq!(event.wait(None).unwrap(), WaitStatus::Signaled);
    }

    #[test]
    fn recv_consumes_signals_in_order() {
        let signaler = Signaler::new().unwrap();
        assert!(!signaler.try_recv().unwrap());

        signaler.send().unwrap();
        signaler.send().unwrap();
        assert!(signaler.try_recv().unwrap());
        assert!(signaler.try_recv().unwrap());
        assert!(!signaler.try_recv().unwrap());
    }

    #[test]
    fn failed_recv_keeps_the_signal_pending() {
        let signaler = Signaler::new().unwrap();
        signaler.send().unwrap();

        // Swap the read end for a descriptor that cannot be read from.
        let dir = std::fs::File::open("/").unwrap();
        let reader = signaler.reader.as_raw_fd();
        assert_eq!(unsafe { libc::dup2(dir.as_raw_fd(), reader) }, reader);

        assert!(signaler.try_recv().is_err());
        assert_eq!(signaler.state.lock().unwrap().pending, 1);

        // The signal still fires the next registration.
        let event = WaitEvent::new().unwrap();
        signaler.add_waiting_event(event.handle());
        assert_eq!(signaler.waiting_events(), 0);
    }

    #[test]
    fn handle_is_not_a_socket() {
        let signaler = Signaler::new().unwrap();
        let err = crate::sys::socket_type(signaler.handle().raw()).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::ENOTSOCK));
    }
}
