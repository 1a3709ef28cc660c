//! Cross-thread wake requests
//!
//! `unblock` is the only scheduler entry point that may be called from other
//! threads. Requests land in a mutex-guarded inbox that the loop drains once
//! per pass, and the selector is woken so a blocking poll returns promptly.

use super::TaskId;
use crate::error::{Result, SchedulerError};
use crate::selector::SelectorWaker;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Value handed from an unblocking thread to the blocked task
pub type Payload = Box<dyn Any + Send>;

/// How a `block` call ended
pub enum Wake {
    /// Woken by `unblock`/`unblock_with` (or a direct `schedule`)
    Unblocked(Option<Payload>),
    /// The timeout elapsed first
    TimedOut,
}

impl Wake {
    /// Whether the wait ended because its timer fired
    pub fn is_timed_out(&self) -> bool {
        matches!(self, Wake::TimedOut)
    }

    /// Payload supplied by the unblocker, if any
    pub fn into_payload(self) -> Option<Payload> {
        match self {
            Wake::Unblocked(payload) => payload,
            Wake::TimedOut => None,
        }
    }
}

impl fmt::Debug for Wake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Wake::Unblocked(Some(_)) => write!(f, "Unblocked(<payload>)"),
            Wake::Unblocked(None) => write!(f, "Unblocked"),
            Wake::TimedOut => write!(f, "TimedOut"),
        }
    }
}

pub(crate) struct UnblockRequest {
    pub(crate) task: TaskId,
    pub(crate) payload: Option<Payload>,
}

/// State shared between the scheduler thread and unblocking threads
pub(crate) struct Shared {
    unblocked: Mutex<VecDeque<UnblockRequest>>,
    waker: Arc<dyn SelectorWaker>,
    closed: AtomicBool,
}

impl Shared {
    pub(crate) fn new(waker: Arc<dyn SelectorWaker>) -> Self {
        Self {
            unblocked: Mutex::new(VecDeque::new()),
            waker,
            closed: AtomicBool::new(false),
        }
    }

    pub(crate) fn push(&self, reason: &str, task: TaskId, payload: Option<Payload>) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SchedulerError::Closed);
        }

        // Wake while holding the lock so the request and the wakeup are
        // observed together by the poll step.
        let mut queue = self.unblocked.lock();
        queue.push_back(UnblockRequest { task, payload });
        self.waker.wakeup()?;
        tracing::trace!(task = %task, reason, "unblock requested");
        Ok(())
    }

    /// Snapshot-and-clear the inbox
    pub(crate) fn take(&self) -> VecDeque<UnblockRequest> {
        std::mem::take(&mut *self.unblocked.lock())
    }

    pub(crate) fn pending(&self) -> usize {
        self.unblocked.lock().len()
    }

    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

/// `Send + Sync` handle for waking blocked tasks from other threads
#[derive(Clone)]
pub struct Unblocker {
    shared: Arc<Shared>,
}

impl Unblocker {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Wake `task` if it is parked in `block`
    pub fn unblock(&self, reason: &str, task: TaskId) -> Result<()> {
        self.shared.push(reason, task, None)
    }

    /// Wake `task` and hand it `payload`
    pub fn unblock_with(&self, reason: &str, task: TaskId, payload: Option<Payload>) -> Result<()> {
        self.shared.push(reason, task, payload)
    }
}

impl fmt::Debug for Unblocker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unblocker")
            .field("pending", &self.shared.pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector::mock::MockWaker;
    use std::thread;

    #[test]
    fn test_unblocker_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Unblocker>();
    }

    #[test]
    fn test_push_wakes_selector() {
        let waker = Arc::new(MockWaker::default());
        let shared = Arc::new(Shared::new(waker.clone()));
        let unblocker = Unblocker::new(Arc::clone(&shared));
        let task = TaskId::new();

        let handle =
            thread::spawn(move || unblocker.unblock_with("test", task, Some(Box::new(7u32))));
        handle.join().unwrap().unwrap();

        assert_eq!(waker.wakeups.load(Ordering::SeqCst), 1);
        let mut drained = shared.take();
        assert_eq!(drained.len(), 1);
        let request = drained.pop_front().unwrap();
        assert_eq!(request.task, task);
        assert_eq!(request.payload.unwrap().downcast_ref::<u32>(), Some(&7));
        assert_eq!(shared.pending(), 0);
    }

    #[test]
    fn test_push_after_close_fails() {
        let shared = Shared::new(Arc::new(MockWaker::default()));
        shared.close();
        assert!(matches!(
            shared.push("late", TaskId::new(), None),
            Err(SchedulerError::Closed)
        ));
    }

    #[test]
    fn test_wake_helpers() {
        assert!(Wake::TimedOut.is_timed_out());
        assert!(Wake::TimedOut.into_payload().is_none());
        let wake = Wake::Unblocked(Some(Box::new("hi")));
        assert_eq!(format!("{:?}", wake), "Unblocked(<payload>)");
        assert_eq!(wake.into_payload().unwrap().downcast_ref::<&str>(), Some(&"hi"));
    }
}
