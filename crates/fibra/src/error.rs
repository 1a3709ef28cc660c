//! Scheduler errors

use crate::scheduler::{TaskId, WaitKey};

/// Errors surfaced by scheduler operations
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// Interest mask requests neither read nor write readiness
    #[error("Wrong events mask: {0:#04b} requests neither read nor write")]
    InvalidInterest(u8),

    /// A wait is already registered under this key
    #[error("{0:?} already has a pending wait")]
    AlreadyWaiting(WaitKey),

    /// A suspension primitive was used outside of a running task
    #[error("No task is currently running on this scheduler")]
    NoCurrentTask,

    /// A notification was awaited by a task other than the one it is bound to
    #[error("Notification is owned by task {owner}, not task {current}")]
    NotOwner {
        /// Task the notification was created in
        owner: TaskId,
        /// Task that tried to wait on it
        current: TaskId,
    },

    /// `run` was entered while already running
    #[error("Scheduler is already running")]
    AlreadyRunning,

    /// The loop has exited and released its selector
    #[error("Scheduler has been shut down")]
    Closed,

    /// Selector registration or polling failed
    #[error("Selector error: {0}")]
    Selector(#[from] std::io::Error),
}

/// Result alias for scheduler operations
pub type Result<T> = std::result::Result<T, SchedulerError>;
