//! Task identity and execution state

use super::wait::Resume;
use std::cell::Cell;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for a Task
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

impl TaskId {
    /// Generate a new unique TaskId
    pub fn new() -> Self {
        TaskId(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the numeric ID value
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// State of a Task
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TaskState {
    /// Currently executing on the scheduler thread
    Running,
    /// Parked on I/O, a timer, an external wake, or a notification
    Suspended,
    /// Queued to run on the next loop pass
    Ready,
    /// Body ran to completion
    Completed,
    /// Body panicked
    Failed,
    /// Dropped unfinished when the loop shut down
    Abandoned,
}

impl TaskState {
    /// Whether the task can still run
    pub fn is_alive(self) -> bool {
        matches!(self, TaskState::Running | TaskState::Suspended | TaskState::Ready)
    }
}

/// Handle returned by `spawn`
///
/// Holds no reference to the task body, only its id and a view of its state.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    id: TaskId,
    state: Rc<Cell<TaskState>>,
}

impl TaskHandle {
    pub(crate) fn new(id: TaskId, state: Rc<Cell<TaskState>>) -> Self {
        Self { id, state }
    }

    /// Task identifier, used with `schedule` and `unblock`
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Current state
    pub fn state(&self) -> TaskState {
        self.state.get()
    }

    /// Whether the task has not finished yet
    pub fn is_alive(&self) -> bool {
        self.state.get().is_alive()
    }
}

pub(crate) type BoxedTask = Pin<Box<dyn Future<Output = ()>>>;

/// Scheduler-side record of a live task
pub(crate) struct TaskSlot {
    /// `None` while the task is being polled
    pub(crate) future: Option<BoxedTask>,
    /// One-shot value for the suspension point the task is parked on
    pub(crate) resume: Option<Resume>,
    pub(crate) state: Rc<Cell<TaskState>>,
}

impl TaskSlot {
    pub(crate) fn new(state: Rc<Cell<TaskState>>) -> Self {
        Self {
            future: None,
            resume: None,
            state,
        }
    }
}
