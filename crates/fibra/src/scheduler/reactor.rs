//! Reactor: single-threaded scheduling and event loop
//!
//! One thread owns the ready queue, the wait registry, the timer heap and the
//! selector, and runs every task body between its suspension points. Each
//! loop pass:
//!
//! 1. runs a snapshot of the ready queue (tasks queued meanwhile wait for the
//!    next pass),
//! 2. resumes tasks unblocked from other threads,
//! 3. polls the selector until the earliest timer deadline,
//! 4. resumes tasks whose descriptors became ready,
//! 5. resumes tasks whose timers expired, earliest first.
//!
//! All three wake sources go through the same resume protocol, which removes
//! the wait entry, drops the selector registration and deletes any pending
//! timer before handing the task its value.

use super::builder::{SchedulerBuilder, SchedulerOptions};
use super::task::{BoxedTask, TaskHandle, TaskId, TaskSlot, TaskState};
use super::timer::{Timer, TimerHeap};
use super::unblock::{Payload, Shared, Unblocker, Wake};
use super::wait::{Resume, Suspend, Trigger, WaitEntry, WaitGuard, WaitKey};
use crate::clock::Clock;
use crate::error::{Result, SchedulerError};
use crate::selector::{Events, Selector};
use rustc_hash::FxHashMap;
use std::any::Any;
use std::cell::{Cell, RefCell, RefMut};
use std::fmt;
use std::future::Future;
use std::ops::Deref;
use std::os::fd::AsRawFd;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::time::Duration;

/// Scheduler statistics
#[derive(Debug, Clone, Default)]
pub struct SchedulerStats {
    /// Total tasks spawned
    pub tasks_spawned: u64,

    /// Tasks whose body ran to completion
    pub tasks_completed: u64,

    /// Tasks whose body panicked
    pub tasks_failed: u64,

    /// Tasks spawned and not yet finished
    pub live_tasks: usize,

    /// Tasks queued for the next pass
    pub ready: usize,

    /// Entries in the wait registry
    pub waiting: usize,

    /// Armed timers
    pub timers: usize,

    /// Descriptors registered with the selector
    pub registrations: usize,

    /// Cross-thread wakes not yet drained
    pub unblocked: usize,

    /// Loop passes started
    pub passes: u64,
}

struct Core {
    tasks: FxHashMap<TaskId, TaskSlot>,
    ready: Vec<TaskId>,
    waits: FxHashMap<WaitKey, WaitEntry>,
    timers: TimerHeap,
    selector: Box<dyn Selector>,
    /// Task being polled right now
    current: Option<TaskId>,
    spawned: u64,
    completed: u64,
    failed: u64,
    passes: u64,
    /// Arming order of timers; breaks deadline ties
    timer_seq: u64,
}

struct Inner {
    core: RefCell<Core>,
    shared: Arc<Shared>,
    clock: Rc<dyn Clock>,
    options: SchedulerOptions,
    running: Cell<bool>,
    closed: Cell<bool>,
}

/// Cooperative single-threaded task scheduler.
///
/// `Scheduler` owns the reactor. Task bodies reach the suspension primitives
/// through a [`SchedulerHandle`] from [`handle`](Self::handle); all handle
/// operations are also available on the owner. Dropping the owner shuts the
/// scheduler down if `run` has not: parked tasks are dropped, their guards
/// run and the selector is released.
///
/// Neither type is `Send`; only [`Unblocker`] crosses threads.
pub struct Scheduler {
    handle: SchedulerHandle,
}

/// Cloneable handle to a [`Scheduler`], meant to be moved into task bodies
#[derive(Clone)]
pub struct SchedulerHandle {
    inner: Rc<Inner>,
}

impl Scheduler {
    /// Create a scheduler with default options over a
    /// [`PollSelector`](crate::selector::PollSelector)
    pub fn new() -> Result<Self> {
        SchedulerBuilder::new().build()
    }

    /// Start configuring a scheduler
    pub fn builder() -> SchedulerBuilder {
        SchedulerBuilder::new()
    }

    pub(crate) fn from_parts(
        options: SchedulerOptions,
        selector: Box<dyn Selector>,
        clock: Rc<dyn Clock>,
    ) -> Self {
        let shared = Arc::new(Shared::new(selector.waker()));
        let core = Core {
            tasks: FxHashMap::with_capacity_and_hasher(options.task_capacity, Default::default()),
            ready: Vec::with_capacity(options.task_capacity),
            waits: FxHashMap::with_capacity_and_hasher(options.task_capacity, Default::default()),
            timers: TimerHeap::with_capacity(options.timer_capacity),
            selector,
            current: None,
            spawned: 0,
            completed: 0,
            failed: 0,
            passes: 0,
            timer_seq: 0,
        };

        let inner = Rc::new(Inner {
            core: RefCell::new(core),
            shared,
            clock,
            options,
            running: Cell::new(false),
            closed: Cell::new(false),
        });
        Self {
            handle: SchedulerHandle { inner },
        }
    }

    /// New handle for use inside task bodies
    pub fn handle(&self) -> SchedulerHandle {
        self.handle.clone()
    }
}

impl Deref for Scheduler {
    type Target = SchedulerHandle;

    fn deref(&self) -> &SchedulerHandle {
        &self.handle
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        // Parked tasks hold handles; dropping them breaks the cycle back to
        // the reactor.
        if !self.handle.inner.closed.get() {
            tracing::debug!("scheduler dropped without completing run");
            self.handle.shutdown();
        }
    }
}

impl SchedulerHandle {
    #[inline]
    fn core(&self) -> RefMut<'_, Core> {
        self.inner.core.borrow_mut()
    }

    /// Options this scheduler was built with
    pub fn options(&self) -> &SchedulerOptions {
        &self.inner.options
    }

    /// Thread-safe handle for waking blocked tasks from other threads
    pub fn unblocker(&self) -> Unblocker {
        Unblocker::new(Arc::clone(&self.inner.shared))
    }

    /// Task currently being polled, if any
    pub fn current_task(&self) -> Option<TaskId> {
        self.core().current
    }

    /// Whether `run` has exited and released the selector
    pub fn is_closed(&self) -> bool {
        self.inner.closed.get()
    }

    /// Snapshot of scheduler counters
    pub fn stats(&self) -> SchedulerStats {
        let core = self.core();
        SchedulerStats {
            tasks_spawned: core.spawned,
            tasks_completed: core.completed,
            tasks_failed: core.failed,
            live_tasks: core.tasks.len(),
            ready: core.ready.len(),
            waiting: core.waits.len(),
            timers: core.timers.len(),
            registrations: core.selector.registrations(),
            unblocked: self.inner.shared.pending(),
            passes: core.passes,
        }
    }

    // ========================================================================
    // Task lifecycle
    // ========================================================================

    /// Spawn a task and run it up to its first suspension point before
    /// returning.
    pub fn spawn<F>(&self, future: F) -> TaskHandle
    where
        F: Future<Output = ()> + 'static,
    {
        let id = TaskId::new();
        let state = Rc::new(Cell::new(TaskState::Running));
        {
            let mut core = self.core();
            core.tasks.insert(id, TaskSlot::new(Rc::clone(&state)));
            core.spawned += 1;
        }

        tracing::debug!(task = %id, "spawned");
        self.poll_task(id, Box::pin(future));
        TaskHandle::new(id, state)
    }

    /// Queue an already-suspended task for the next loop pass.
    ///
    /// Scheduler thread only; other threads use [`Unblocker`].
    pub fn schedule(&self, task: TaskId) {
        let mut guard = self.core();
        let core = &mut *guard;
        if let Some(slot) = core.tasks.get(&task) {
            if matches!(slot.state.get(), TaskState::Suspended | TaskState::Running) {
                slot.state.set(TaskState::Ready);
            }
        }
        core.ready.push(task);
    }

    /// Resume `task` with `value` and poll it until it suspends again or
    /// finishes. Finished tasks are skipped.
    fn resume(&self, id: TaskId, value: Resume) {
        let future = {
            let mut core = self.core();
            let Some(slot) = core.tasks.get_mut(&id) else {
                tracing::trace!(task = %id, "resume of finished task ignored");
                return;
            };
            let Some(future) = slot.future.take() else {
                tracing::trace!(task = %id, "resume of running task ignored");
                return;
            };
            slot.resume = Some(value);
            slot.state.set(TaskState::Running);
            future
        };

        self.poll_task(id, future);
    }

    fn poll_task(&self, id: TaskId, mut future: BoxedTask) {
        let previous = self.core().current.replace(id);

        let mut cx = Context::from_waker(Waker::noop());
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| future.as_mut().poll(&mut cx)));

        let mut core = self.core();
        core.current = previous;

        // Finished futures are dropped after the borrow is released: their
        // destructors may call back into the scheduler.
        let finished = match outcome {
            Ok(Poll::Pending) => {
                if let Some(slot) = core.tasks.get_mut(&id) {
                    slot.resume = None;
                    if slot.state.get() == TaskState::Running {
                        slot.state.set(TaskState::Suspended);
                    }
                    slot.future = Some(future);
                    return;
                }
                future
            }
            Ok(Poll::Ready(())) => {
                core.completed += 1;
                if let Some(slot) = core.tasks.remove(&id) {
                    slot.state.set(TaskState::Completed);
                }
                tracing::debug!(task = %id, "completed");
                future
            }
            Err(panic) => {
                core.failed += 1;
                if let Some(slot) = core.tasks.remove(&id) {
                    slot.state.set(TaskState::Failed);
                }
                tracing::error!(task = %id, "task panicked: {}", panic_message(panic.as_ref()));
                future
            }
        };

        drop(core);
        drop(finished);
    }

    pub(crate) fn take_resume(&self, id: TaskId) -> Option<Resume> {
        self.core().tasks.get_mut(&id).and_then(|slot| slot.resume.take())
    }

    fn require_current(&self) -> Result<TaskId> {
        self.current_task().ok_or(SchedulerError::NoCurrentTask)
    }

    fn require_open(&self) -> Result<()> {
        if self.inner.closed.get() {
            return Err(SchedulerError::Closed);
        }
        Ok(())
    }

    // ========================================================================
    // Suspension primitives
    // ========================================================================

    /// Park the current task until `handle` is ready for `interest`, or until
    /// `timeout` elapses.
    ///
    /// Returns the observed readiness masked by `interest`; empty on timeout.
    pub async fn wait_for_io<H>(
        &self,
        handle: &H,
        interest: Events,
        timeout: Option<Duration>,
    ) -> Result<Events>
    where
        H: AsRawFd + ?Sized,
    {
        if !interest.is_valid_interest() {
            return Err(SchedulerError::InvalidInterest(interest.bits()));
        }
        let task = self.require_current()?;
        let key = WaitKey::Io(handle.as_raw_fd());

        self.register_wait(key, task, Some(interest), timeout)?;
        let _guard = WaitGuard { scheduler: self, key };

        match (Suspend { scheduler: self, task }).await {
            Resume::Io(events) => Ok(events),
            // Woken by something other than the selector or the timer
            _ => Ok(Events::EMPTY),
        }
    }

    /// Wait until `handle` is readable. `false` means the timeout elapsed.
    pub async fn readable<H>(&self, handle: &H, timeout: Option<Duration>) -> Result<bool>
    where
        H: AsRawFd + ?Sized,
    {
        let events = self.wait_for_io(handle, Events::READABLE, timeout).await?;
        Ok(events.is_readable())
    }

    /// Wait until `handle` is writable. `false` means the timeout elapsed.
    pub async fn writable<H>(&self, handle: &H, timeout: Option<Duration>) -> Result<bool>
    where
        H: AsRawFd + ?Sized,
    {
        let events = self.wait_for_io(handle, Events::WRITABLE, timeout).await?;
        Ok(events.is_writable())
    }

    /// Park the current task until another thread (or task) calls
    /// [`unblock`](Self::unblock) for it, or until `timeout` elapses.
    pub async fn block(&self, reason: &str, timeout: Option<Duration>) -> Result<Wake> {
        let task = self.require_current()?;
        let key = WaitKey::Task(task);

        self.register_wait(key, task, None, timeout)?;
        let _guard = WaitGuard { scheduler: self, key };
        tracing::trace!(task = %task, reason, ?timeout, "blocked");

        Ok(match (Suspend { scheduler: self, task }).await {
            Resume::TimedOut => Wake::TimedOut,
            Resume::Unblocked(payload) => Wake::Unblocked(payload),
            Resume::Scheduled | Resume::Io(_) => Wake::Unblocked(None),
        })
    }

    /// Park the current task for `duration`
    pub async fn sleep(&self, duration: Duration) -> Result<()> {
        self.block("sleep", Some(duration)).await.map(|_| ())
    }

    /// Park the current task without registering a wait. Only
    /// [`schedule`](Self::schedule) resumes it, and the loop does not stay
    /// alive on its behalf.
    pub async fn suspend(&self) -> Result<()> {
        self.require_open()?;
        let task = self.require_current()?;
        Suspend { scheduler: self, task }.await;
        Ok(())
    }

    /// Requeue the current task behind everything already ready. It resumes
    /// on the next loop pass at the earliest.
    pub async fn yield_now(&self) -> Result<()> {
        self.require_open()?;
        let task = self.require_current()?;
        self.schedule(task);
        Suspend { scheduler: self, task }.await;
        Ok(())
    }

    /// Wake `task` if it is parked in `block`. Safe to call from any task;
    /// other threads use [`unblocker`](Self::unblocker).
    pub fn unblock(&self, reason: &str, task: TaskId) -> Result<()> {
        self.inner.shared.push(reason, task, None)
    }

    /// Wake `task` and hand it `payload`
    pub fn unblock_with(&self, reason: &str, task: TaskId, payload: Option<Payload>) -> Result<()> {
        self.inner.shared.push(reason, task, payload)
    }

    fn register_wait(
        &self,
        key: WaitKey,
        task: TaskId,
        interest: Option<Events>,
        timeout: Option<Duration>,
    ) -> Result<()> {
        self.require_open()?;

        let mut guard = self.core();
        let core = &mut *guard;
        if core.waits.contains_key(&key) {
            return Err(SchedulerError::AlreadyWaiting(key));
        }
        if let (WaitKey::Io(fd), Some(interest)) = (key, interest) {
            core.selector.register(fd, interest)?;
        }

        // A deadline past the representable range never fires
        let timer = timeout
            .and_then(|timeout| self.inner.clock.now().checked_add(timeout))
            .map(|deadline| {
                let timer = Timer::new(deadline, core.timer_seq, key);
                core.timer_seq += 1;
                core.timers.push(Rc::clone(&timer));
                timer
            });

        core.waits.insert(key, WaitEntry { task, interest, timer });
        Ok(())
    }

    /// Release a wait that is still registered without resuming its task
    pub(crate) fn cancel_wait(&self, key: WaitKey) {
        let Ok(mut guard) = self.inner.core.try_borrow_mut() else {
            tracing::warn!(?key, "wait released while scheduler is busy; leaving registration");
            return;
        };
        let core = &mut *guard;
        let Some(entry) = core.waits.remove(&key) else {
            return;
        };

        if let (WaitKey::Io(fd), Some(_)) = (key, entry.interest) {
            if let Err(e) = core.selector.deregister(fd) {
                tracing::warn!(fd, error = %e, "failed to deregister descriptor");
            }
        }
        if let Some(timer) = entry.timer {
            core.timers.delete(&timer);
        }
        tracing::trace!(?key, "wait released without resume");
    }

    /// Resume protocol shared by I/O readiness, timer expiry and unblock.
    ///
    /// Returns `false` when nothing was waiting under `key`.
    fn resume_waiter(&self, key: WaitKey, trigger: Trigger) -> bool {
        let (task, value) = {
            let mut guard = self.core();
            let core = &mut *guard;
            let Some(entry) = core.waits.remove(&key) else {
                tracing::trace!(?key, "no waiter registered");
                return false;
            };

            let value = match entry.interest {
                Some(interest) => {
                    let observed = match trigger {
                        Trigger::Ready(events) => events,
                        Trigger::Timer | Trigger::Unblock(_) => Events::EMPTY,
                    };
                    if let WaitKey::Io(fd) = key {
                        if let Err(e) = core.selector.deregister(fd) {
                            tracing::warn!(fd, error = %e, "failed to deregister descriptor");
                        }
                    }
                    Resume::Io(observed & interest)
                }
                None => match trigger {
                    Trigger::Timer => Resume::TimedOut,
                    Trigger::Unblock(payload) => Resume::Unblocked(payload),
                    Trigger::Ready(_) => Resume::Scheduled,
                },
            };

            if let Some(timer) = entry.timer {
                core.timers.delete(&timer);
            }
            (entry.task, value)
        };

        tracing::trace!(?key, task = %task, "resuming waiter");
        self.resume(task, value);
        true
    }

    // ========================================================================
    // Reactor loop
    // ========================================================================

    /// Drive tasks until nothing is ready and no wait is pending.
    ///
    /// Releases the selector on exit; tasks still parked without a
    /// registration are dropped and marked [`TaskState::Abandoned`]. A
    /// selector poll failure ends the loop with an error.
    pub fn run(&self) -> Result<()> {
        if self.inner.closed.get() {
            return Err(SchedulerError::Closed);
        }
        if self.inner.running.get() || self.current_task().is_some() {
            return Err(SchedulerError::AlreadyRunning);
        }

        self.inner.running.set(true);
        tracing::debug!("reactor loop started");
        let result = self.run_loop();
        self.inner.running.set(false);
        self.shutdown();

        match &result {
            Ok(()) => tracing::debug!("reactor loop finished"),
            Err(e) => tracing::error!(error = %e, "reactor loop failed"),
        }
        result
    }

    fn run_loop(&self) -> Result<()> {
        let mut ready_events = Vec::with_capacity(self.inner.options.events_capacity);

        loop {
            // === STEP 1: Run ready tasks ===
            let running = {
                let mut core = self.core();
                core.passes += 1;
                std::mem::take(&mut core.ready)
            };
            for task in running {
                self.resume(task, Resume::Scheduled);
            }

            // === STEP 2: Drain cross-thread wakes ===
            for request in self.inner.shared.take() {
                self.resume_waiter(WaitKey::Task(request.task), Trigger::Unblock(request.payload));
            }

            // === STEP 3: Poll the selector ===
            {
                let mut guard = self.core();
                let core = &mut *guard;
                if core.ready.is_empty() && core.waits.is_empty() {
                    break;
                }

                let timeout = if !core.ready.is_empty() {
                    Some(Duration::ZERO)
                } else {
                    let now = self.inner.clock.now();
                    core.timers
                        .peek_min()
                        .map(|timer| timer.deadline.saturating_duration_since(now))
                };

                // Nothing registered and nothing to wait for
                let skip = core.selector.is_empty() && timeout == Some(Duration::ZERO);
                if !skip {
                    core.selector.poll(timeout, &mut ready_events)?;
                }
            }

            // === STEP 4: Resume I/O waiters ===
            for (fd, observed) in ready_events.drain(..) {
                self.resume_waiter(WaitKey::Io(fd), Trigger::Ready(observed));
            }

            // === STEP 5: Fire expired timers ===
            self.fire_timers();
        }

        Ok(())
    }

    fn fire_timers(&self) {
        let now = self.inner.clock.now();
        // Timers armed by the tasks resumed here fire on a later pass
        let armed = self.core().timer_seq;
        loop {
            let key = {
                let core = self.core();
                match core.timers.peek_min() {
                    Some(timer) if timer.deadline <= now && timer.seq < armed => timer.key,
                    _ => break,
                }
            };

            tracing::trace!(?key, "timer fired");
            if !self.resume_waiter(key, Trigger::Timer) {
                // Orphaned timer; drop it so the loop cannot spin on it
                self.core().timers.pop_min();
            }
        }
    }

    fn shutdown(&self) {
        let leftovers = {
            let mut core = self.core();
            core.ready.clear();
            std::mem::take(&mut core.tasks)
        };

        if !leftovers.is_empty() {
            tracing::debug!(tasks = leftovers.len(), "abandoning parked tasks");
        }
        for slot in leftovers.values() {
            slot.state.set(TaskState::Abandoned);
        }
        // Task destructors release their own waits
        drop(leftovers);

        let mut guard = self.core();
        let core = &mut *guard;
        core.ready.clear();
        for (key, entry) in core.waits.drain() {
            if let (WaitKey::Io(fd), Some(_)) = (key, entry.interest) {
                let _ = core.selector.deregister(fd);
            }
        }
        core.timers.clear();
        core.selector.close();

        self.inner.closed.set(true);
        self.inner.shared.close();
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.handle.fmt(f)
    }
}

impl fmt::Debug for SchedulerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.core.try_borrow() {
            Ok(core) => f
                .debug_struct("Scheduler")
                .field("live_tasks", &core.tasks.len())
                .field("ready", &core.ready.len())
                .field("waiting", &core.waits.len())
                .field("timers", &core.timers.len())
                .field("closed", &self.inner.closed.get())
                .finish(),
            Err(_) => f.debug_struct("Scheduler").finish_non_exhaustive(),
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "<non-string panic payload>"
    }
}
