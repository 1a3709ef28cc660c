//! Default selector backed by `mio::Poll`

use super::{Events, Selector, SelectorWaker};
use mio::unix::SourceFd;
use mio::{Interest, Poll, Token, Waker};
use rustc_hash::FxHashMap;
use std::io;
use std::os::fd::RawFd;
use std::sync::Arc;
use std::time::Duration;

/// Token reserved for the cross-thread waker. Descriptors are non-negative
/// `i32`s, so they can never collide with it.
const WAKE_TOKEN: Token = Token(usize::MAX);

#[derive(Debug)]
struct PollWaker(Waker);

impl SelectorWaker for PollWaker {
    fn wakeup(&self) -> io::Result<()> {
        self.0.wake()
    }
}

/// [`Selector`] over epoll/kqueue through mio
#[derive(Debug)]
pub struct PollSelector {
    poll: Poll,
    events: mio::Events,
    waker: Arc<PollWaker>,
    registered: FxHashMap<RawFd, Events>,
    closed: bool,
}

impl PollSelector {
    /// Create a selector whose event buffer holds `capacity` events per poll
    pub fn new(capacity: usize) -> io::Result<Self> {
        let poll = Poll::new()?;
        let waker = Waker::new(poll.registry(), WAKE_TOKEN)?;

        Ok(Self {
            poll,
            events: mio::Events::with_capacity(capacity.max(1)),
            waker: Arc::new(PollWaker(waker)),
            registered: FxHashMap::default(),
            closed: false,
        })
    }

    fn ensure_open(&self) -> io::Result<()> {
        if self.closed {
            return Err(io::Error::other("selector is closed"));
        }
        Ok(())
    }
}

fn to_mio(interest: Events) -> io::Result<Interest> {
    match (interest.is_readable(), interest.is_writable()) {
        (true, true) => Ok(Interest::READABLE | Interest::WRITABLE),
        (true, false) => Ok(Interest::READABLE),
        (false, true) => Ok(Interest::WRITABLE),
        (false, false) => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("interest {:?} requests neither read nor write", interest),
        )),
    }
}

fn from_mio(event: &mio::event::Event) -> Events {
    let mut observed = Events::EMPTY;
    // Hang-ups and errors surface as readable so the waiter gets to see the
    // failure on its next read.
    if event.is_readable() || event.is_read_closed() || event.is_error() {
        observed |= Events::READABLE;
    }
    if event.is_writable() || event.is_write_closed() {
        observed |= Events::WRITABLE;
    }
    observed
}

impl Selector for PollSelector {
    fn register(&mut self, handle: RawFd, interest: Events) -> io::Result<()> {
        self.ensure_open()?;
        if handle < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid descriptor {}", handle),
            ));
        }
        if self.registered.contains_key(&handle) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("descriptor {} is already registered", handle),
            ));
        }

        let mio_interest = to_mio(interest)?;
        self.poll
            .registry()
            .register(&mut SourceFd(&handle), Token(handle as usize), mio_interest)?;
        self.registered.insert(handle, interest);
        Ok(())
    }

    fn deregister(&mut self, handle: RawFd) -> io::Result<()> {
        if self.registered.remove(&handle).is_none() {
            return Ok(());
        }
        self.poll.registry().deregister(&mut SourceFd(&handle))
    }

    fn registrations(&self) -> usize {
        self.registered.len()
    }

    fn poll(
        &mut self,
        timeout: Option<Duration>,
        ready: &mut Vec<(RawFd, Events)>,
    ) -> io::Result<()> {
        self.ensure_open()?;

        match self.poll.poll(&mut self.events, timeout) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(()),
            Err(e) => return Err(e),
        }

        for event in self.events.iter() {
            if event.token() == WAKE_TOKEN {
                continue;
            }
            let handle = event.token().0 as RawFd;
            if self.registered.contains_key(&handle) {
                ready.push((handle, from_mio(event)));
            }
        }
        Ok(())
    }

    fn waker(&self) -> Arc<dyn SelectorWaker> {
        self.waker.clone()
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }

        for handle in std::mem::take(&mut self.registered).into_keys() {
            if let Err(e) = self.poll.registry().deregister(&mut SourceFd(&handle)) {
                tracing::trace!(fd = handle, error = %e, "deregister on close failed");
            }
        }
        self.closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::fd::AsRawFd;
    use std::os::unix::net::UnixStream;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_register_and_poll_readable() {
        let mut selector = PollSelector::new(16).unwrap();
        let (mut a, b) = UnixStream::pair().unwrap();
        b.set_nonblocking(true).unwrap();

        selector.register(b.as_raw_fd(), Events::READABLE).unwrap();
        assert_eq!(selector.registrations(), 1);

        a.write_all(b"ping").unwrap();

        let mut ready = Vec::new();
        selector.poll(Some(Duration::from_secs(1)), &mut ready).unwrap();
        assert_eq!(ready, vec![(b.as_raw_fd(), Events::READABLE)]);

        selector.deregister(b.as_raw_fd()).unwrap();
        assert!(selector.is_empty());
    }

    #[test]
    fn test_double_register_rejected() {
        let mut selector = PollSelector::new(16).unwrap();
        let (_a, b) = UnixStream::pair().unwrap();

        selector.register(b.as_raw_fd(), Events::READABLE).unwrap();
        let err = selector.register(b.as_raw_fd(), Events::WRITABLE).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
    }

    #[test]
    fn test_empty_interest_rejected() {
        let mut selector = PollSelector::new(16).unwrap();
        let (_a, b) = UnixStream::pair().unwrap();

        let err = selector.register(b.as_raw_fd(), Events::EMPTY).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert!(selector.is_empty());
    }

    #[test]
    fn test_wakeup_interrupts_poll() {
        let mut selector = PollSelector::new(16).unwrap();
        let waker = selector.waker();

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            waker.wakeup().unwrap();
        });

        let start = Instant::now();
        let mut ready = Vec::new();
        selector.poll(Some(Duration::from_secs(5)), &mut ready).unwrap();
        assert!(start.elapsed() < Duration::from_secs(4));
        assert!(ready.is_empty());

        handle.join().unwrap();
    }

    #[test]
    fn test_close_releases_registrations() {
        let mut selector = PollSelector::new(16).unwrap();
        let (_a, b) = UnixStream::pair().unwrap();

        selector.register(b.as_raw_fd(), Events::READABLE | Events::WRITABLE).unwrap();
        selector.close();
        assert!(selector.is_empty());
        assert!(selector.register(b.as_raw_fd(), Events::READABLE).is_err());

        let mut ready = Vec::new();
        assert!(selector.poll(Some(Duration::ZERO), &mut ready).is_err());
    }
}
