//! Readiness polling
//!
//! The reactor talks to the operating system through the [`Selector`] trait:
//! a set of `(handle, interest)` registrations, a blocking `poll`, and an
//! out-of-band wakeup that other threads use to interrupt that poll.

#[cfg(test)]
pub(crate) mod mock;
mod poll;

pub use poll::PollSelector;

use std::fmt;
use std::io;
use std::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign};
use std::os::fd::RawFd;
use std::sync::Arc;
use std::time::Duration;

/// Readiness bit-set, used both as an interest mask and as observed events
#[derive(Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct Events(u8);

impl Events {
    /// No readiness
    pub const EMPTY: Events = Events(0);
    /// Handle can be read without blocking
    pub const READABLE: Events = Events(0b01);
    /// Handle can be written without blocking
    pub const WRITABLE: Events = Events(0b10);

    /// Build a mask from raw bits. Unknown bits are kept so callers can
    /// detect malformed masks.
    pub const fn from_bits(bits: u8) -> Self {
        Events(bits)
    }

    /// Raw bits of the mask
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Whether the readable bit is set
    pub const fn is_readable(self) -> bool {
        self.0 & Self::READABLE.0 != 0
    }

    /// Whether the writable bit is set
    pub const fn is_writable(self) -> bool {
        self.0 & Self::WRITABLE.0 != 0
    }

    /// Whether no bit is set
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Whether the mask asks for read or write readiness
    pub const fn is_valid_interest(self) -> bool {
        self.is_readable() || self.is_writable()
    }
}

impl BitOr for Events {
    type Output = Events;

    fn bitor(self, rhs: Events) -> Events {
        Events(self.0 | rhs.0)
    }
}

impl BitOrAssign for Events {
    fn bitor_assign(&mut self, rhs: Events) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for Events {
    type Output = Events;

    fn bitand(self, rhs: Events) -> Events {
        Events(self.0 & rhs.0)
    }
}

impl BitAndAssign for Events {
    fn bitand_assign(&mut self, rhs: Events) {
        self.0 &= rhs.0;
    }
}

impl fmt::Debug for Events {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.is_readable(), self.is_writable()) {
            (true, true) => write!(f, "Events(rw)"),
            (true, false) => write!(f, "Events(r)"),
            (false, true) => write!(f, "Events(w)"),
            (false, false) => write!(f, "Events({:#04b})", self.0),
        }
    }
}

/// Thread-safe handle that interrupts a blocked [`Selector::poll`]
pub trait SelectorWaker: Send + Sync {
    /// Make the current or next `poll` return promptly
    fn wakeup(&self) -> io::Result<()>;
}

/// OS readiness polling over raw file descriptors.
///
/// Registrations are keyed by descriptor identity; a descriptor is
/// registered at most once at a time.
pub trait Selector {
    /// Start watching `handle` for `interest`
    fn register(&mut self, handle: RawFd, interest: Events) -> io::Result<()>;

    /// Stop watching `handle`
    fn deregister(&mut self, handle: RawFd) -> io::Result<()>;

    /// Number of live registrations (the internal waker is not counted)
    fn registrations(&self) -> usize;

    /// Whether nothing is registered
    fn is_empty(&self) -> bool {
        self.registrations() == 0
    }

    /// Block for up to `timeout` (`None` = indefinitely) and append every
    /// `(handle, observed)` pair that became ready to `ready`
    fn poll(
        &mut self,
        timeout: Option<Duration>,
        ready: &mut Vec<(RawFd, Events)>,
    ) -> io::Result<()>;

    /// Handle other threads use to interrupt `poll`
    fn waker(&self) -> Arc<dyn SelectorWaker>;

    /// Drop every registration and release OS resources
    fn close(&mut self);
}
