//! Scheduler configuration

use super::reactor::Scheduler;
use crate::clock::{Clock, MonotonicClock};
use crate::error::Result;
use crate::selector::{PollSelector, Selector};
use std::rc::Rc;

/// Sizing knobs for a scheduler
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// Events collected per selector poll
    pub events_capacity: usize,

    /// Initial capacity of the task table and wait registry
    pub task_capacity: usize,

    /// Initial capacity of the timer heap
    pub timer_capacity: usize,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            events_capacity: 1024,
            task_capacity: 64,
            timer_capacity: 64,
        }
    }
}

/// Builder for [`Scheduler`]
///
/// ```ignore
/// let scheduler = Scheduler::builder()
///     .events_capacity(256)
///     .build()?;
/// ```
#[derive(Default)]
pub struct SchedulerBuilder {
    options: SchedulerOptions,
    selector: Option<Box<dyn Selector>>,
    clock: Option<Rc<dyn Clock>>,
}

impl SchedulerBuilder {
    /// Start from default options, a [`PollSelector`] and a [`MonotonicClock`]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace all options at once
    pub fn options(mut self, options: SchedulerOptions) -> Self {
        self.options = options;
        self
    }

    /// Events collected per selector poll
    pub fn events_capacity(mut self, capacity: usize) -> Self {
        self.options.events_capacity = capacity;
        self
    }

    /// Initial capacity of the task table and wait registry
    pub fn task_capacity(mut self, capacity: usize) -> Self {
        self.options.task_capacity = capacity;
        self
    }

    /// Initial capacity of the timer heap
    pub fn timer_capacity(mut self, capacity: usize) -> Self {
        self.options.timer_capacity = capacity;
        self
    }

    /// Use a custom selector instead of the mio-backed default
    pub fn selector(mut self, selector: Box<dyn Selector>) -> Self {
        self.selector = Some(selector);
        self
    }

    /// Use a custom time source
    pub fn clock(mut self, clock: Rc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Create the scheduler. Fails only if the default selector cannot be
    /// created.
    pub fn build(self) -> Result<Scheduler> {
        let selector = match self.selector {
            Some(selector) => selector,
            None => Box::new(PollSelector::new(self.options.events_capacity)?),
        };
        let clock = self.clock.unwrap_or_else(|| Rc::new(MonotonicClock));
        Ok(Scheduler::from_parts(self.options, selector, clock))
    }
}
