//! Single-waiter wake primitive

use crate::error::{Result, SchedulerError};
use crate::scheduler::{SchedulerHandle, TaskId};
use std::cell::Cell;
use std::fmt;

/// Wakes one owning task.
///
/// A `Notification` is bound to the task that created it. Only that task may
/// [`wait`](Self::wait); any task may [`notify`](Self::notify). It holds a
/// single pending flag, so it is neither a counting semaphore nor a
/// condition variable: a `notify` with nobody waiting is lost.
pub struct Notification {
    scheduler: SchedulerHandle,
    owner: TaskId,
    pending: Cell<bool>,
}

impl Notification {
    /// Bind a notification to the current task
    pub fn new(scheduler: &SchedulerHandle) -> Result<Self> {
        let owner = scheduler.current_task().ok_or(SchedulerError::NoCurrentTask)?;
        Ok(Self {
            scheduler: scheduler.clone(),
            owner,
            pending: Cell::new(false),
        })
    }

    /// Task this notification wakes
    pub fn owner(&self) -> TaskId {
        self.owner
    }

    /// Whether the owner is parked in `wait`
    pub fn is_pending(&self) -> bool {
        self.pending.get()
    }

    /// Park the owner until the next `notify`.
    ///
    /// Fails with [`SchedulerError::NotOwner`] when called from any other
    /// task.
    pub async fn wait(&self) -> Result<()> {
        let current = self.scheduler.current_task().ok_or(SchedulerError::NoCurrentTask)?;
        if current != self.owner {
            return Err(SchedulerError::NotOwner {
                owner: self.owner,
                current,
            });
        }

        self.pending.set(true);
        let result = self.scheduler.suspend().await;
        // A stray resume must not leave the flag armed
        self.pending.set(false);
        result
    }

    /// Requeue the owner if it is waiting; otherwise do nothing
    pub fn notify(&self) {
        if self.pending.replace(false) {
            tracing::trace!(task = %self.owner, "notified");
            self.scheduler.schedule(self.owner);
        }
    }
}

impl fmt::Debug for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notification")
            .field("owner", &self.owner)
            .field("pending", &self.pending.get())
            .finish()
    }
}
