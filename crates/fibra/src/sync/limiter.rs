//! Bounded-concurrency admission gate

use super::Notification;
use crate::error::Result;
use crate::scheduler::{SchedulerHandle, TaskHandle};
use crate::util::ScopeGuard;
use std::cell::Cell;
use std::fmt;
use std::future::Future;
use std::rc::Rc;

struct LimiterState {
    in_flight: Cell<usize>,
    limit: usize,
    /// Wakes the admitting task when a slot frees up
    notification: Notification,
}

impl LimiterState {
    fn release(&self) {
        self.in_flight.set(self.in_flight.get().saturating_sub(1));
        self.notification.notify();
    }
}

/// Runs at most `limit` task bodies at a time.
///
/// The limiter is bound to the task that created it: only that task may
/// call [`schedule`](Self::schedule), which parks it while the gate is full.
#[derive(Clone)]
pub struct TaskLimiter {
    scheduler: SchedulerHandle,
    state: Rc<LimiterState>,
}

impl TaskLimiter {
    /// Create a limiter owned by the current task. A `limit` of zero is
    /// treated as one.
    pub fn new(scheduler: &SchedulerHandle, limit: usize) -> Result<Self> {
        let notification = Notification::new(scheduler)?;
        Ok(Self {
            scheduler: scheduler.clone(),
            state: Rc::new(LimiterState {
                in_flight: Cell::new(0),
                limit: limit.max(1),
                notification,
            }),
        })
    }

    /// Maximum number of bodies running at once
    pub fn limit(&self) -> usize {
        self.state.limit
    }

    /// Bodies admitted and not yet finished
    pub fn in_flight(&self) -> usize {
        self.state.in_flight.get()
    }

    /// Wait for a free slot, then spawn `body`.
    ///
    /// The slot is released when the body finishes, panics, or is dropped
    /// unfinished at shutdown.
    pub async fn schedule<F>(&self, body: F) -> Result<TaskHandle>
    where
        F: Future<Output = ()> + 'static,
    {
        while self.state.in_flight.get() >= self.state.limit {
            self.state.notification.wait().await?;
        }

        self.state.in_flight.set(self.state.in_flight.get() + 1);
        let state = Rc::clone(&self.state);
        let release = ScopeGuard::new(move || state.release());

        Ok(self.scheduler.spawn(async move {
            let _release = release;
            body.await;
        }))
    }
}

impl fmt::Debug for TaskLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskLimiter")
            .field("limit", &self.state.limit)
            .field("in_flight", &self.state.in_flight.get())
            .finish()
    }
}
