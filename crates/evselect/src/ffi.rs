//! C ABI export.
//!
//! `evselect_select` has the shape of `select(2)` with `fd_set`s laid out
//! as a count followed by an array of descriptors.

use std::os::raw::c_int;
use std::os::unix::io::RawFd;
use std::time::Duration;

use crate::handle::{Handle, HandleSet, MAX_HANDLES};

/// An interest set as seen from C.
#[repr(C)]
pub struct RawHandleSet {
    pub count: u32,
    pub handles: [RawFd; MAX_HANDLES],
}

impl RawHandleSet {
    /// Copy into a `HandleSet`. A `count` past the array end is clamped.
    fn load(&self) -> HandleSet {
        let count = (self.count as usize).min(MAX_HANDLES);
        let mut set = HandleSet::new();
        for &fd in &self.handles[..count] {
            // Cannot fail: at most MAX_HANDLES distinct handles.
            let _ = set.insert(Handle::from_raw(fd));
        }
        set
    }

    fn store(&mut self, set: &HandleSet) {
        for (slot, handle) in self.handles.iter_mut().zip(set.iter()) {
            *slot = handle.raw();
        }
        self.count = set.len() as u32;
    }
}

/// Convert a `timeval` into the millisecond granularity the wait uses.
fn timeout_from_timeval(tv: &libc::timeval) -> Duration {
    let secs = (tv.tv_sec as i64).max(0) as u64;
    let micros = (tv.tv_usec as i64).max(0) as u64;
    Duration::from_millis(secs.saturating_mul(1000).saturating_add(micros / 1000))
}

/// Wait for readiness on the given sets. Returns the number of triggered
/// handles, 0 on timeout, or -1 with `errno` set.
///
/// `nfds` is accepted for signature compatibility and ignored. Null sets are
/// skipped and a null `timeout` blocks indefinitely.
///
/// Every non-null pointer must point to a valid object for the duration of
/// the call.
#[no_mangle]
pub extern "C" fn evselect_select(
    _nfds: c_int,
    readfds: *mut RawHandleSet,
    writefds: *mut RawHandleSet,
    exceptfds: *mut RawHandleSet,
    timeout: *const libc::timeval,
) -> c_int {
    let raw_read = unsafe { readfds.as_mut() };
    let raw_write = unsafe { writefds.as_mut() };
    let raw_except = unsafe { exceptfds.as_mut() };
    let timeout = unsafe { timeout.as_ref() }.map(timeout_from_timeval);

    let mut read = raw_read.as_deref().map(RawHandleSet::load);
    let mut write = raw_write.as_deref().map(RawHandleSet::load);
    let mut except = raw_except.as_deref().map(RawHandleSet::load);

    let result = crate::select(read.as_mut(), write.as_mut(), except.as_mut(), timeout);

    for (raw, set) in [(raw_read, &read), (raw_write, &write), (raw_except, &except)] {
        if let (Some(raw), Some(set)) = (raw, set) {
            raw.store(set);
        }
    }

    match result {
        Ok(n) => n as c_int,
        Err(err) => {
            crate::sys::set_errno(err.raw_os_error().unwrap_or(libc::EIO));
            -1
        }
    }
}
