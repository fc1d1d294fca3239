//! Readiness directions and the network-event mask they imply.

use bitflags::bitflags;

bitflags! {
    /// The directions a handle was asked about.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Interest: u8 {
        const READ = 0b001;
        const WRITE = 0b010;
        const EXCEPT = 0b100;
    }
}

bitflags! {
    /// Network events a socket is bound for, and that introspection reports.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct NetEvents: u32 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const OOB = 1 << 2;
        const ACCEPT = 1 << 3;
        const CONNECT = 1 << 4;
        const CLOSE = 1 << 5;
        const CONNECT_FAILED = 1 << 8;
    }
}

impl NetEvents {
    /// Events that readiness in `interest` depends on.
    ///
    /// Readability also covers peer close and pending connections,
    /// writability covers connect completion, and the exceptional direction
    /// covers out-of-band data and failed connects.
    pub fn implied_by(interest: Interest) -> Self {
        let mut events = NetEvents::empty();
        if interest.contains(Interest::READ) {
            events |= NetEvents::READ | NetEvents::CLOSE | NetEvents::ACCEPT;
        }
        if interest.contains(Interest::WRITE) {
            events |= NetEvents::WRITE | NetEvents::CONNECT;
        }
        if interest.contains(Interest::EXCEPT) {
            events |= NetEvents::OOB | NetEvents::CONNECT_FAILED;
        }
        events
    }

    /// Whether the OS poller must watch for readability.
    pub(crate) fn needs_readable(self) -> bool {
        self.intersects(NetEvents::READ | NetEvents::ACCEPT | NetEvents::CLOSE)
    }

    /// Whether the OS poller must watch for writability.
    pub(crate) fn needs_writable(self) -> bool {
        self.intersects(NetEvents::WRITE | NetEvents::CONNECT)
    }
}
