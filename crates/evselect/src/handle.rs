//! Handles and interest sets.
//!
//! A `HandleSet` plays the role of an `fd_set`: an insertion-ordered,
//! duplicate-free list of descriptors that a multiplexing call rewrites in
//! place to the subset that triggered.

use std::io;
use std::os::unix::io::{AsRawFd, RawFd};

/// Maximum number of handles a single `HandleSet` can hold.
pub const MAX_HANDLES: usize = 1024;

/// An OS descriptor the multiplexor can wait on: either a socket or the
/// descriptor of a [`Signaler`](crate::Signaler).
///
/// The multiplexor never owns the descriptor behind a `Handle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Handle(RawFd);

impl Handle {
    /// Wrap a raw descriptor.
    pub const fn from_raw(fd: RawFd) -> Self {
        Handle(fd)
    }

    /// Borrow the descriptor of anything that has one.
    pub fn of(source: &impl AsRawFd) -> Self {
        Handle(source.as_raw_fd())
    }

    /// Returns the raw descriptor.
    pub const fn raw(self) -> RawFd {
        self.0
    }
}

impl From<RawFd> for Handle {
    fn from(fd: RawFd) -> Self {
        Handle(fd)
    }
}

/// A bounded, ordered set of handles for one readiness direction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandleSet {
    handles: Vec<Handle>,
}

impl HandleSet {
    /// Create an empty set.
    pub fn new() -> Self {
        HandleSet {
            handles: Vec::new(),
        }
    }

    /// Add a handle. Adding a handle that is already present is a no-op.
    ///
    /// Fails with `InvalidInput` once the set holds [`MAX_HANDLES`] entries.
    pub fn insert(&mut self, handle: Handle) -> io::Result<()> {
        if self.contains(handle) {
            return Ok(());
        }
        if self.handles.len() >= MAX_HANDLES {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "handle set is full",
            ));
        }
        self.handles.push(handle);
        Ok(())
    }

    /// Remove a handle. Returns whether it was present.
    pub fn remove(&mut self, handle: Handle) -> bool {
        match self.handles.iter().position(|&h| h == handle) {
            Some(index) => {
                self.handles.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.handles.contains(&handle)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Iterate over the handles in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = Handle> + '_ {
        self.handles.iter().copied()
    }

    pub fn clear(&mut self) {
        self.handles.clear();
    }

    /// Keep only the handles matching `keep`, preserving order.
    pub(crate) fn retain(&mut self, mut keep: impl FnMut(Handle) -> bool) {
        self.handles.retain(|&h| keep(h));
    }
}

impl<'a> IntoIterator for &'a HandleSet {
    type Item = Handle;
    type IntoIter = std::iter::Copied<std::slice::Iter<'a, Handle>>;

    fn into_iter(self) -> Self::IntoIter {
        self.handles.iter().copied()
    }
}
