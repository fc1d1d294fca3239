//! Thin wrappers over the unix calls the multiplexor needs.

use std::io;
use std::os::unix::io::{FromRawFd, OwnedFd, RawFd};

use crate::interest::NetEvents;

/// Set a file descriptor to non-blocking mode.
pub(crate) fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    let result = unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) };
    if result < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Set FD_CLOEXEC on a file descriptor.
fn set_cloexec(fd: RawFd) -> io::Result<()> {
    let result = unsafe { libc::fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC) };
    if result < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Create a non-blocking, close-on-exec pipe. Returns `(reader, writer)`.
pub(crate) fn pipe() -> io::Result<(OwnedFd, OwnedFd)> {
    let mut fds: [libc::c_int; 2] = [0; 2];
    let result = unsafe { libc::pipe(fds.as_mut_ptr()) };
    if result < 0 {
        return Err(io::Error::last_os_error());
    }
    let reader = unsafe { OwnedFd::from_raw_fd(fds[0]) };
    let writer = unsafe { OwnedFd::from_raw_fd(fds[1]) };
    for fd in fds {
        set_nonblocking(fd)?;
        set_cloexec(fd)?;
    }
    Ok((reader, writer))
}

/// Returns the `SO_TYPE` of a socket.
///
/// Fails with `ENOTSOCK` for descriptors that are not sockets.
pub(crate) fn socket_type(fd: RawFd) -> io::Result<libc::c_int> {
    let mut kind: libc::c_int = 0;
    let mut len: libc::socklen_t = std::mem::size_of::<libc::c_int>() as libc::socklen_t;
    let result = unsafe {
        libc::getsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_TYPE,
            &mut kind as *mut _ as *mut libc::c_void,
            &mut len,
        )
    };
    if result < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(kind)
}

/// Report the events currently pending on `fd`, restricted to `mask`.
///
/// Uses a zero-timeout `poll(2)`, so it never blocks.
pub(crate) fn pending_events(fd: RawFd, mask: NetEvents) -> io::Result<NetEvents> {
    let mut requested: libc::c_short = 0;
    if mask.needs_readable() {
        requested |= libc::POLLIN;
    }
    if mask.needs_writable() {
        requested |= libc::POLLOUT;
    }
    if mask.contains(NetEvents::OOB) {
        requested |= libc::POLLPRI;
    }

    let mut pfd = libc::pollfd {
        fd,
        events: requested,
        revents: 0,
    };
    loop {
        let result = unsafe { libc::poll(&mut pfd, 1, 0) };
        if result >= 0 {
            break;
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }

    let revents = pfd.revents;
    if revents & libc::POLLNVAL != 0 {
        return Err(io::Error::from_raw_os_error(libc::EBADF));
    }

    let mut events = NetEvents::empty();
    if revents & libc::POLLIN != 0 {
        // Readable covers both data and pending connections on a listener.
        events |= NetEvents::READ | NetEvents::ACCEPT;
    }
    if revents & libc::POLLOUT != 0 {
        events |= NetEvents::WRITE | NetEvents::CONNECT;
    }
    if revents & libc::POLLPRI != 0 {
        events |= NetEvents::OOB;
    }
    if revents & libc::POLLHUP != 0 {
        events |= NetEvents::CLOSE;
    }
    if revents & libc::POLLERR != 0 {
        events |= NetEvents::CONNECT_FAILED | NetEvents::CLOSE;
    }
    Ok(events & mask)
}

// ── Scheduling ──────────────────────────────────────────────────────

// `PRIO_PROCESS` with id 0 names the calling thread on Linux, where nice
// values are per thread. Elsewhere it names the whole process.

/// Nice value of the calling thread (of the process outside Linux).
pub(crate) fn priority() -> io::Result<i32> {
    // getpriority() may legitimately return -1, so errno is the only signal.
    set_errno(0);
    let value = unsafe { libc::getpriority(libc::PRIO_PROCESS, 0) };
    if value == -1 {
        let err = io::Error::last_os_error();
        if err.raw_os_error().unwrap_or(0) != 0 {
            return Err(err);
        }
    }
    Ok(value)
}

/// Set the nice value of the calling thread (of the process outside Linux).
pub(crate) fn set_priority(nice: i32) -> io::Result<()> {
    let result = unsafe { libc::setpriority(libc::PRIO_PROCESS, 0, nice) };
    if result < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

// ── errno ───────────────────────────────────────────────────────────

#[cfg(any(target_os = "linux", target_os = "android"))]
fn errno_location() -> *mut libc::c_int {
    unsafe { libc::__errno_location() }
}

#[cfg(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "dragonfly"
))]
fn errno_location() -> *mut libc::c_int {
    unsafe { libc::__error() }
}

#[cfg(any(target_os = "openbsd", target_os = "netbsd"))]
fn errno_location() -> *mut libc::c_int {
    unsafe { libc::__errno() }
}

/// Overwrite the calling thread's `errno`.
pub(crate) fn set_errno(value: libc::c_int) {
    unsafe { *errno_location() = value };
}
