//! Wait registry entries and the suspension point tasks park on

use super::reactor::SchedulerHandle;
use super::timer::Timer;
use super::unblock::Payload;
use super::TaskId;
use crate::selector::Events;
use std::future::Future;
use std::os::fd::RawFd;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

/// Key a pending wait is registered under.
///
/// I/O waits are keyed by descriptor, unconditional waits by the waiting
/// task itself. Keys compare by identity of the underlying resource.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum WaitKey {
    /// Waiting for readiness on a file descriptor
    Io(RawFd),
    /// Waiting for an unblock or a timeout
    Task(TaskId),
}

/// A parked task and the resources its wait holds
pub(crate) struct WaitEntry {
    pub(crate) task: TaskId,
    /// Set for I/O waits
    pub(crate) interest: Option<Events>,
    pub(crate) timer: Option<Rc<Timer>>,
}

/// What fired a wait
pub(crate) enum Trigger {
    Ready(Events),
    Timer,
    Unblock(Option<Payload>),
}

/// Value a suspended task is resumed with
pub(crate) enum Resume {
    /// Run from the ready queue
    Scheduled,
    /// I/O wait resolved; observed events already masked by the interest
    Io(Events),
    TimedOut,
    Unblocked(Option<Payload>),
}

/// Suspension point. Pending until the scheduler drops a [`Resume`] into
/// the task's slot and polls it again.
pub(crate) struct Suspend<'a> {
    pub(crate) scheduler: &'a SchedulerHandle,
    pub(crate) task: TaskId,
}

impl Future for Suspend<'_> {
    type Output = Resume;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Resume> {
        match self.scheduler.take_resume(self.task) {
            Some(value) => Poll::Ready(value),
            None => Poll::Pending,
        }
    }
}

/// Releases a wait's registration and timer if the wait did not resolve
/// through the resume protocol (stray `schedule`, or the task was dropped).
pub(crate) struct WaitGuard<'a> {
    pub(crate) scheduler: &'a SchedulerHandle,
    pub(crate) key: WaitKey,
}

impl Drop for WaitGuard<'_> {
    fn drop(&mut self) {
        self.scheduler.cancel_wait(self.key);
    }
}
