//! Scriptable selector for reactor unit tests

use super::{Events, Selector, SelectorWaker};
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::io;
use std::os::fd::RawFd;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Debug, Default)]
pub(crate) struct MockWaker {
    pub(crate) wakeups: AtomicUsize,
}

impl SelectorWaker for MockWaker {
    fn wakeup(&self) -> io::Result<()> {
        self.wakeups.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// What the test can see and steer
#[derive(Debug, Default)]
pub(crate) struct MockState {
    pub(crate) registered: FxHashMap<RawFd, Events>,
    /// Readiness reported the next time a registered handle is polled
    pub(crate) scripted: FxHashMap<RawFd, Events>,
    pub(crate) deregistered: Vec<RawFd>,
    pub(crate) polls: usize,
    pub(crate) fail_poll: bool,
    pub(crate) closed: bool,
    /// Set once the selector itself is dropped
    pub(crate) dropped: bool,
}

pub(crate) struct MockSelector {
    state: Rc<RefCell<MockState>>,
    waker: Arc<MockWaker>,
}

impl MockSelector {
    pub(crate) fn new() -> (Self, Rc<RefCell<MockState>>, Arc<MockWaker>) {
        let state = Rc::new(RefCell::new(MockState::default()));
        let waker = Arc::new(MockWaker::default());
        let selector = Self {
            state: Rc::clone(&state),
            waker: Arc::clone(&waker),
        };
        (selector, state, waker)
    }
}

impl Drop for MockSelector {
    fn drop(&mut self) {
        self.state.borrow_mut().dropped = true;
    }
}

impl Selector for MockSelector {
    fn register(&mut self, handle: RawFd, interest: Events) -> io::Result<()> {
        let mut state = self.state.borrow_mut();
        if state.registered.insert(handle, interest).is_some() {
            return Err(io::Error::new(io::ErrorKind::AlreadyExists, "already registered"));
        }
        Ok(())
    }

    fn deregister(&mut self, handle: RawFd) -> io::Result<()> {
        let mut state = self.state.borrow_mut();
        if state.registered.remove(&handle).is_some() {
            state.deregistered.push(handle);
        }
        Ok(())
    }

    fn registrations(&self) -> usize {
        self.state.borrow().registered.len()
    }

    fn poll(
        &mut self,
        timeout: Option<Duration>,
        ready: &mut Vec<(RawFd, Events)>,
    ) -> io::Result<()> {
        let mut state = self.state.borrow_mut();
        state.polls += 1;
        if state.fail_poll {
            return Err(io::Error::other("scripted poll failure"));
        }

        let due: Vec<RawFd> = state
            .scripted
            .keys()
            .copied()
            .filter(|fd| state.registered.contains_key(fd))
            .collect();
        for fd in due {
            if let Some(events) = state.scripted.remove(&fd) {
                ready.push((fd, events));
            }
        }
        if !ready.is_empty() {
            return Ok(());
        }

        match timeout {
            Some(timeout) => {
                drop(state);
                thread::sleep(timeout);
                Ok(())
            }
            None => Err(io::Error::other("mock selector would block forever")),
        }
    }

    fn waker(&self) -> Arc<dyn SelectorWaker> {
        self.waker.clone()
    }

    fn close(&mut self) {
        let mut state = self.state.borrow_mut();
        state.registered.clear();
        state.closed = true;
    }
}
