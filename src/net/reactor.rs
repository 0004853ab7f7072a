//! Readiness-notification wrapper around `mio`.
//!
//! # Responsibilities
//! - Own the OS poller and its event storage
//! - Register sources with read interest, toggle read and write interest
//! - Hand readiness back as plain values so callers can borrow freely
//!
//! # Design Decisions
//! - `mio` reports edges, not levels. Consumers drain reads and writes
//!   until they would block, which gives the same observable behavior as a
//!   level-triggered loop without spinning
//! - Write interest is a per-source flag the caller flips on only while its
//!   queue has unsent bytes

use std::io;
use std::sync::Arc;
use std::time::Duration;

use mio::event::Source;
use mio::{Events, Interest, Poll, Registry, Token, Waker};

/// Token reserved for the cross-thread waker.
pub const WAKER: Token = Token(usize::MAX);

/// One readiness notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Readiness {
    pub token: Token,
    pub readable: bool,
    pub writable: bool,
    /// Peer hung up or the socket reported an error.
    pub closed: bool,
}

/// Single-threaded readiness loop driver.
pub struct Reactor {
    poll: Poll,
    events: Events,
    waker: Arc<Waker>,
}

impl Reactor {
    /// Create a reactor with room for `capacity` events per iteration.
    pub fn new(capacity: usize) -> io::Result<Self> {
        let poll = Poll::new()?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKER)?);
        Ok(Self {
            poll,
            events: Events::with_capacity(capacity),
            waker,
        })
    }

    /// Registry handle used to (re)register sources.
    pub fn registry(&self) -> &Registry {
        self.poll.registry()
    }

    /// Waker that interrupts a blocked [`Reactor::poll`] from another thread.
    pub fn waker(&self) -> Arc<Waker> {
        Arc::clone(&self.waker)
    }

    /// Wait for readiness and return this iteration's notifications.
    pub fn poll(&mut self, timeout: Option<Duration>) -> io::Result<Vec<Readiness>> {
        match self.poll.poll(&mut self.events, timeout) {
            Ok(()) => {}
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => return Ok(Vec::new()),
            Err(e) => return Err(e),
        }

        Ok(self
            .events
            .iter()
            .map(|event| Readiness {
                token: event.token(),
                readable: event.is_readable(),
                writable: event.is_writable(),
                closed: event.is_error() || (event.is_read_closed() && event.is_write_closed()),
            })
            .collect())
    }
}

/// Start read interest for a freshly created source.
pub fn register<S: Source + ?Sized>(registry: &Registry, source: &mut S, token: Token) -> io::Result<()> {
    registry.register(source, token, Interest::READABLE)
}

/// Register with both read and write interest (used for outbound dials).
pub fn register_duplex<S: Source + ?Sized>(
    registry: &Registry,
    source: &mut S,
    token: Token,
) -> io::Result<()> {
    registry.register(source, token, Interest::READABLE | Interest::WRITABLE)
}

/// Replace the interest set of a registered source.
///
/// At least one of `readable` and `writable` must hold; asking for neither
/// keeps read interest.
pub fn set_interest<S: Source + ?Sized>(
    registry: &Registry,
    source: &mut S,
    token: Token,
    readable: bool,
    writable: bool,
) -> io::Result<()> {
    let interest = match (readable, writable) {
        (_, false) => Interest::READABLE,
        (false, true) => Interest::WRITABLE,
        (true, true) => Interest::READABLE | Interest::WRITABLE,
    };
    registry.reregister(source, token, interest)
}

/// Remove every interest for `source`.
pub fn deregister<S: Source + ?Sized>(registry: &Registry, source: &mut S) -> io::Result<()> {
    registry.deregister(source)
}
