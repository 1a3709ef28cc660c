//! Time source for deadline arithmetic

use std::time::Instant;

/// Strictly non-decreasing time source
pub trait Clock {
    /// Current instant
    fn now(&self) -> Instant;
}

/// [`Clock`] backed by `Instant::now`
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }
}
