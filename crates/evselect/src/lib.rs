//! evselect: `select(2)`-style readiness multiplexing over one wait event.
//!
//! Each call binds every socket in the interest sets to a single, freshly
//! created wait event and asks every [`Signaler`] in the sets to set that
//! event when it fires. The caller blocks once; afterwards the sets are
//! rewritten to the handles that actually triggered.
//!
//! Sockets and signalers are told apart by the binding call itself: a
//! signaler's handle is not a socket, so binding it fails with `ENOTSOCK`.
//!
//! ```no_run
//! use std::time::Duration;
//! use evselect::{HandleSet, Signaler};
//!
//! let signaler = Signaler::new().unwrap();
//! let mut read = HandleSet::new();
//! read.insert(signaler.handle()).unwrap();
//!
//! let n = evselect::select(Some(&mut read), None, None, Some(Duration::from_secs(1))).unwrap();
//! assert!(n == 0 || read.contains(signaler.handle()));
//! ```

#[cfg(not(unix))]
compile_error!("evselect currently supports unix targets only");

pub mod config;
pub mod ffi;
pub mod handle;
pub mod interest;
pub mod platform;
mod priority;
pub mod select;
pub mod signaler;
mod sys;
pub mod wait_event;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use handle::{Handle, HandleSet, MAX_HANDLES};
pub use interest::{Interest, NetEvents};
pub use platform::{Platform, System};
pub use select::Multiplexor;
pub use signaler::Signaler;
pub use wait_event::{WaitEvent, WaitHandle, WaitStatus};

use std::io;
use std::sync::OnceLock;
use std::time::Duration;

static MULTIPLEXOR: OnceLock<Multiplexor<System>> = OnceLock::new();

/// The process-wide multiplexor over the host OS, with the default config.
pub fn system() -> &'static Multiplexor<System> {
    MULTIPLEXOR.get_or_init(|| Multiplexor::new(System))
}

/// Wait for readiness using the process-wide multiplexor.
///
/// See [`Multiplexor::select`].
pub fn select(
    read: Option<&mut HandleSet>,
    write: Option<&mut HandleSet>,
    except: Option<&mut HandleSet>,
    timeout: Option<Duration>,
) -> io::Result<usize> {
    system().select(read, write, except, timeout)
}
