use mio::event::Source;
use mio::{ Events, Interest, Poll, Token, Waker };
use std::io;
use std::sync::Arc;
use std::time::Duration;

/// Token reserved for cross-thread wakeups.
pub const WAKER_TOKEN: Token = Token(usize::MAX);

/// Readiness registrations for the reactor thread.
///
/// mio registrations are edge-triggered; `modify` swaps a socket's interest
/// between reading and writing, and re-reports readiness that is already
/// pending at the time of the swap.
pub struct Poller {
    poll: Poll,
    waker: Arc<Waker>,
}

impl Poller {
    pub fn new() -> io::Result<Self> {
        let poll = Poll::new()?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKER_TOKEN)?);
        Ok(Self { poll, waker })
    }

    /// Handle that worker threads use to interrupt `wait`.
    pub fn waker(&self) -> Arc<Waker> {
        Arc::clone(&self.waker)
    }

    pub fn add<S>(&self, source: &mut S, token: Token, interest: Interest) -> io::Result<()>
        where S: Source + ?Sized
    {
        self.poll.registry().register(source, token, interest)
    }

    pub fn modify<S>(&self, source: &mut S, token: Token, interest: Interest) -> io::Result<()>
        where S: Source + ?Sized
    {
        self.poll.registry().reregister(source, token, interest)
    }

    pub fn delete<S>(&self, source: &mut S) -> io::Result<()> where S: Source + ?Sized {
        self.poll.registry().deregister(source)
    }

    /// Blocks until at least one event or a wakeup. Signal interruptions
    /// are retried.
    pub fn wait(&mut self, events: &mut Events, timeout: Option<Duration>) -> io::Result<()> {
        loop {
            match self.poll.poll(events, timeout) {
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                other => return other,
            }
        }
    }
}
