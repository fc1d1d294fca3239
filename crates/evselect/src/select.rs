//! The readiness multiplexor.
//!
//! A call runs in five stages:
//!
//! 1. Every handle is bound to a fresh [`WaitEvent`]. Handles the binding
//!    primitive rejects as "not a socket" are resolved to signalers, which
//!    are asked to set the event when they fire.
//! 2. The caller blocks on the event, with its priority raised so the
//!    thread that wakes it is not starved, and yields once after waking.
//! 3. Every signaler is deregistered. One that no longer holds our event
//!    removed it while firing, so it is one of the triggers.
//! 4. Sockets are introspected for pending events.
//! 5. The interest sets are rewritten to the triggered handles.
//!
//! Steps 3 and the release of the event run on every exit path.

use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::handle::{Handle, HandleSet};
use crate::interest::{Interest, NetEvents};
use crate::platform::{is_not_socket, Platform, System};
use crate::priority::PriorityGuard;
use crate::signaler::Signaler;
use crate::wait_event::{WaitEvent, WaitHandle, WaitStatus};

/// How a handle was classified by the binding step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Socket,
    Signaler,
}

/// Working state for one handle during one call.
#[derive(Debug)]
struct Entry {
    interest: Interest,
    events: NetEvents,
    source: Option<Source>,
    triggered: bool,
}

/// Signalers holding our wait event. Dropping this deregisters them all.
struct Registrations {
    waiter: WaitHandle,
    signalers: Vec<(Handle, Arc<Signaler>)>,
    limit: usize,
}

impl Registrations {
    fn new(waiter: WaitHandle, limit: usize) -> Self {
        Registrations {
            waiter,
            signalers: Vec::new(),
            limit,
        }
    }

    fn register(&mut self, handle: Handle, signaler: Arc<Signaler>) {
        assert!(
            self.signalers.len() < self.limit,
            "more signaler registrations than the {} handles supplied",
            self.limit
        );
        signaler.add_waiting_event(self.waiter.clone());
        self.signalers.push((handle, signaler));
    }

    /// Deregister from every signaler. Returns the handles of those that
    /// fired, i.e. no longer had our event registered.
    fn release(&mut self) -> Vec<Handle> {
        let waiter = &self.waiter;
        self.signalers
            .drain(..)
            .filter(|(_, signaler)| !signaler.remove_waiting_event(waiter))
            .map(|(handle, _)| handle)
            .collect()
    }
}

impl Drop for Registrations {
    fn drop(&mut self) {
        self.release();
    }
}

/// Emulates `select(2)` on top of a single wait event.
#[derive(Debug, Default)]
pub struct Multiplexor<P: Platform = System> {
    platform: P,
    config: Config,
}

impl<P: Platform> Multiplexor<P> {
    /// A multiplexor over `platform` with the default [`Config`].
    pub fn new(platform: P) -> Self {
        Multiplexor {
            platform,
            config: Config::default(),
        }
    }

    pub fn with_config(platform: P, config: Config) -> Self {
        Multiplexor { platform, config }
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Wait until a handle in one of the sets is ready or `timeout` elapses.
    ///
    /// Absent sets are skipped; `None` as the timeout blocks indefinitely.
    /// On return every supplied set holds only the handles that triggered.
    /// A triggered handle stays in every set it was supplied in.
    ///
    /// Returns the number of distinct triggered handles, `0` on timeout, or
    /// the OS error that aborted the call (the sets are then empty).
    ///
    /// # Panics
    ///
    /// If a handle bound as a socket is later reported not to be one.
    pub fn select(
        &self,
        mut read: Option<&mut HandleSet>,
        mut write: Option<&mut HandleSet>,
        mut except: Option<&mut HandleSet>,
        timeout: Option<Duration>,
    ) -> io::Result<usize> {
        let mut entries = collect(read.as_deref(), write.as_deref(), except.as_deref());

        let result = self.multiplex(&mut entries, timeout);

        let triggered =
            |handle: Handle| result.is_ok() && entries.get(&handle).is_some_and(|e| e.triggered);
        for set in [read.as_deref_mut(), write.as_deref_mut(), except.as_deref_mut()]
            .into_iter()
            .flatten()
        {
            set.retain(&triggered);
        }
        result
    }

    fn multiplex(
        &self,
        entries: &mut BTreeMap<Handle, Entry>,
        timeout: Option<Duration>,
    ) -> io::Result<usize> {
        let mut event = WaitEvent::new()?;
        let mut registrations = Registrations::new(event.handle(), entries.len());

        let status = self
            .classify(entries, &mut event, &mut registrations)
            .and_then(|()| self.wait(&mut event, timeout));

        // Deregister whatever happened above, before looking at the outcome.
        let fired = registrations.release();

        match status? {
            // A pure poll introspects every handle whatever the poller saw.
            WaitStatus::TimedOut if timeout == Some(Duration::ZERO) => {
                self.resolve(entries, &fired)
            }
            WaitStatus::TimedOut => {
                log::trace!("select timed out after {:?}", timeout);
                Ok(0)
            }
            WaitStatus::Signaled => self.resolve(entries, &fired),
        }
    }

    /// Bind every handle, registering the ones that turn out to be signalers.
    fn classify(
        &self,
        entries: &mut BTreeMap<Handle, Entry>,
        event: &mut WaitEvent,
        registrations: &mut Registrations,
    ) -> io::Result<()> {
        for (&handle, entry) in entries.iter_mut() {
            match self.platform.bind(handle, event, entry.events) {
                Ok(()) => {
                    log::trace!("{:?} bound as socket for {:?}", handle, entry.interest);
                    entry.source = Some(Source::Socket);
                }
                Err(err) if is_not_socket(&err) => {
                    let Some(signaler) = self.platform.signaler(handle) else {
                        log::error!("{:?} is neither a socket nor a signaler", handle);
                        return Err(err);
                    };
                    log::trace!("{:?} registered as signaler", handle);
                    registrations.register(handle, signaler);
                    entry.source = Some(Source::Signaler);
                }
                Err(err) => {
                    log::error!("binding {:?} to the wait event failed: {}", handle, err);
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    /// Block on the event, applying the fairness correction unless this is
    /// a pure poll.
    fn wait(&self, event: &mut WaitEvent, timeout: Option<Duration>) -> io::Result<WaitStatus> {
        if timeout == Some(Duration::ZERO) {
            return event.wait(timeout);
        }

        let _boost = self
            .config
            .boost
            .map(|level| PriorityGuard::raise(&self.platform, level));

        let status = event.wait(timeout)?;
        if status == WaitStatus::Signaled && self.config.yield_after_wake {
            self.platform.yield_now();
        }
        Ok(status)
    }

    /// Decide which handles triggered. Returns how many did.
    fn resolve(&self, entries: &mut BTreeMap<Handle, Entry>, fired: &[Handle]) -> io::Result<usize> {
        let mut count = 0;
        for (&handle, entry) in entries.iter_mut() {
            entry.triggered = match entry.source {
                Some(Source::Socket) => match self.platform.query(handle, entry.events) {
                    Ok(pending) => !pending.is_empty(),
                    Err(err) if is_not_socket(&err) => {
                        panic!("{:?} was bound as a socket but is not one", handle)
                    }
                    Err(err) => {
                        log::error!("querying events of {:?} failed: {}", handle, err);
                        return Err(err);
                    }
                },
                Some(Source::Signaler) => fired.contains(&handle),
                None => unreachable!("{:?} was never classified", handle),
            };
            if entry.triggered {
                count += 1;
            }
        }
        log::trace!("select woke with {} of {} handles triggered", count, entries.len());
        Ok(count)
    }
}

/// Merge the interest sets into one entry per distinct handle.
fn collect(
    read: Option<&HandleSet>,
    write: Option<&HandleSet>,
    except: Option<&HandleSet>,
) -> BTreeMap<Handle, Entry> {
    let mut entries: BTreeMap<Handle, Entry> = BTreeMap::new();
    for (set, interest) in [
        (read, Interest::READ),
        (write, Interest::WRITE),
        (except, Interest::EXCEPT),
    ] {
        for handle in set.into_iter().flat_map(|s| s.iter()) {
            let entry = entries.entry(handle).or_insert(Entry {
                interest: Interest::empty(),
                events: NetEvents::empty(),
                source: None,
                triggered: false,
            });
            entry.interest |= interest;
            entry.events = NetEvents::implied_by(entry.interest);
        }
    }
    entries
}
