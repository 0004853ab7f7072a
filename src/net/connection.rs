//! Connection transport and lifecycle.
//!
//! # Responsibilities
//! - Pair a socket with its receive buffer and write queue
//! - Compose the transport with exactly one protocol role, chosen at
//!   construction
//! - Keep write interest armed only while bytes are queued
//! - Stop reading from a peer whose unsent backlog passed its write limit,
//!   and resume once the backlog drains
//! - Report, never act on, the need to close: the gateway owns destruction
//!
//! # Design Decisions
//! - Roles are `Box<dyn Protocol>`; the transport never inspects which one
//!   it carries beyond [`Protocol::role`]
//! - Everything a role needs is handed to it through [`ProtocolContext`],
//!   so parser callbacks always know which connection they serve

use std::fmt;
use std::io::{self, Write};

use bytes::Bytes;
use mio::net::TcpStream;
use mio::{Registry, Token};

use crate::error::ProtocolError;
use crate::http::{Request, Response};
use crate::net::buffer::{ByteBuffer, FillStatus};
use crate::net::reactor;
use crate::net::write_queue::{WriteQueue, WriteStatus};

/// Bytes pulled from the socket before the role consumes them.
const READ_BUDGET: usize = 64 * 1024;

/// Unique identifier for a connection.
///
/// Doubles as the stream identifier carried in requests and replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// Reactor token for this connection's socket.
    pub fn token(&self) -> Token {
        Token(self.0 as usize)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Which side of the gateway a connection faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// An HTTP/1.1 client.
    ClientHttp,
    /// The framed link to the message broker.
    BrokerLink,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::ClientHttp => f.write_str("client"),
            Role::BrokerLink => f.write_str("broker"),
        }
    }
}

/// Connection state for lifecycle tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Registered and processing events.
    Open,
    /// Removed from the registry, waiting for the cleanup pass.
    Closing,
}

/// A decoded message a role hands to the gateway.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// A complete request parsed from a client.
    Request(Request),
    /// A reply decoded from the broker link.
    Response(Response),
}

/// Why a connection asked to be closed.
#[derive(Debug)]
pub enum CloseReason {
    /// Orderly end-of-stream from the peer.
    PeerClosed,
    /// Read, write, or registration failure.
    Io(io::Error),
    /// The role rejected the byte stream.
    Protocol(ProtocolError),
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::PeerClosed => f.write_str("peer closed"),
            CloseReason::Io(e) => write!(f, "io error: {}", e),
            CloseReason::Protocol(e) => write!(f, "{}", e),
        }
    }
}

/// Result of driving a connection through one readiness event.
#[derive(Debug)]
#[must_use]
pub enum Outcome {
    Open,
    Close(CloseReason),
}

impl Outcome {
    pub fn is_open(&self) -> bool {
        matches!(self, Outcome::Open)
    }
}

/// Outbound side of a connection as seen by its role.
pub struct Output<'a> {
    writes: &'a mut WriteQueue,
    socket: &'a mut dyn Write,
    error: Option<io::Error>,
}

impl<'a> Output<'a> {
    pub fn new(writes: &'a mut WriteQueue, socket: &'a mut dyn Write) -> Self {
        Self {
            writes,
            socket,
            error: None,
        }
    }

    /// Queue `bytes` behind anything already pending.
    pub fn enqueue(&mut self, bytes: impl Into<Bytes>) {
        self.writes.enqueue(bytes);
    }

    /// Queue `bytes` and push the queue to the socket right away.
    ///
    /// A would-block leaves the bytes queued in order; the transport arms
    /// write interest once the role returns.
    pub fn send_now(&mut self, bytes: impl Into<Bytes>) {
        self.writes.enqueue(bytes);
        if let WriteStatus::Failed(e) = self.writes.flush(&mut *self.socket) {
            self.error.get_or_insert(e);
        }
    }

    /// First write failure seen by [`Output::send_now`].
    pub fn take_error(&mut self) -> Option<io::Error> {
        self.error.take()
    }
}

/// State a role may touch while consuming buffered bytes.
pub struct ProtocolContext<'a> {
    pub id: ConnectionId,
    pub buffer: &'a mut ByteBuffer,
    pub output: Output<'a>,
    pub inbound: &'a mut Vec<Inbound>,
}

impl<'a> ProtocolContext<'a> {
    pub fn new(
        id: ConnectionId,
        buffer: &'a mut ByteBuffer,
        writes: &'a mut WriteQueue,
        socket: &'a mut dyn Write,
        inbound: &'a mut Vec<Inbound>,
    ) -> Self {
        Self {
            id,
            buffer,
            output: Output::new(writes, socket),
            inbound,
        }
    }
}

/// Capability interface implemented by each protocol role.
pub trait Protocol: Send {
    /// Which role this is.
    fn role(&self) -> Role;

    /// Consume as many complete units as `ctx.buffer` holds.
    ///
    /// Partial input stays in the buffer for the next wakeup.
    fn on_data(&mut self, ctx: &mut ProtocolContext<'_>) -> Result<(), ProtocolError>;
}

/// A socket, its buffers, and the role speaking over it.
pub struct Connection {
    id: ConnectionId,
    stream: TcpStream,
    buffer: ByteBuffer,
    writes: WriteQueue,
    protocol: Box<dyn Protocol>,
    lifecycle: Lifecycle,
    write_armed: bool,
    read_paused: bool,
    write_limit: Option<usize>,
    established: bool,
}

impl Connection {
    /// Wrap an accepted, already connected socket.
    pub fn accepted(id: ConnectionId, stream: TcpStream, protocol: Box<dyn Protocol>) -> Self {
        Self::build(id, stream, protocol, true)
    }

    /// Wrap a socket whose non-blocking connect is still in flight.
    pub fn dialing(id: ConnectionId, stream: TcpStream, protocol: Box<dyn Protocol>) -> Self {
        Self::build(id, stream, protocol, false)
    }

    fn build(id: ConnectionId, stream: TcpStream, protocol: Box<dyn Protocol>, established: bool) -> Self {
        Self {
            id,
            stream,
            buffer: ByteBuffer::default(),
            writes: WriteQueue::new(),
            protocol,
            lifecycle: Lifecycle::Open,
            write_armed: false,
            read_paused: false,
            write_limit: None,
            established,
        }
    }

    /// Pause reading while more than `limit` bytes wait to be sent.
    pub fn with_write_limit(mut self, limit: usize) -> Self {
        self.write_limit = Some(limit);
        self
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn role(&self) -> Role {
        self.protocol.role()
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn is_established(&self) -> bool {
        self.established
    }

    /// Bytes queued but not yet accepted by the socket.
    pub fn pending_bytes(&self) -> usize {
        self.writes.pending_bytes()
    }

    /// Whether read interest is off because the write backlog is too large.
    pub fn is_read_paused(&self) -> bool {
        self.read_paused
    }

    /// Start read interest, plus write interest while a dial is pending.
    pub fn start(&mut self, registry: &Registry) -> io::Result<()> {
        if self.established {
            reactor::register(registry, &mut self.stream, self.id.token())
        } else {
            reactor::register_duplex(registry, &mut self.stream, self.id.token())?;
            self.write_armed = true;
            Ok(())
        }
    }

    /// Handle read readiness: fill, let the role consume, flush replies.
    ///
    /// Reads in bounded passes until the socket would block or reading is
    /// paused.
    pub fn on_readable(&mut self, registry: &Registry, inbound: &mut Vec<Inbound>) -> Outcome {
        loop {
            let more = match self.buffer.fill_up_to(&mut self.stream, READ_BUDGET) {
                FillStatus::Data(n) => {
                    tracing::trace!(connection_id = %self.id, bytes = n, "Read from socket");
                    n >= READ_BUDGET
                }
                FillStatus::WouldBlock => return Outcome::Open,
                FillStatus::Closed => return Outcome::Close(CloseReason::PeerClosed),
                FillStatus::Failed(e) => return Outcome::Close(CloseReason::Io(e)),
            };

            let mut ctx = ProtocolContext::new(
                self.id,
                &mut self.buffer,
                &mut self.writes,
                &mut self.stream,
                inbound,
            );
            let result = self.protocol.on_data(&mut ctx);
            let write_error = ctx.output.take_error();

            if let Err(e) = result {
                return Outcome::Close(CloseReason::Protocol(e));
            }
            if let Some(e) = write_error {
                return Outcome::Close(CloseReason::Io(e));
            }
            self.buffer.compact();

            if let Outcome::Close(reason) = self.flush(registry) {
                return Outcome::Close(reason);
            }

            if self.buffer.at_eof() {
                return Outcome::Close(CloseReason::PeerClosed);
            }
            if !more || self.read_paused {
                return Outcome::Open;
            }
        }
    }

    /// Handle write readiness: finish a pending dial, then drain the queue.
    pub fn on_writable(&mut self, registry: &Registry) -> Outcome {
        if !self.established {
            match self.stream.take_error() {
                Ok(Some(e)) | Err(e) => return Outcome::Close(CloseReason::Io(e)),
                Ok(None) => {}
            }
            match self.stream.peer_addr() {
                Ok(addr) => {
                    self.established = true;
                    tracing::debug!(connection_id = %self.id, peer_addr = %addr, "Outbound connection established");
                }
                Err(ref e) if e.kind() == io::ErrorKind::NotConnected => return Outcome::Open,
                Err(e) => return Outcome::Close(CloseReason::Io(e)),
            }
        }

        self.flush(registry)
    }

    /// Queue raw bytes and try to send them.
    pub fn send(&mut self, registry: &Registry, bytes: impl Into<Bytes>) -> Outcome {
        self.writes.enqueue(bytes);
        self.flush(registry)
    }

    /// Queue a length-prefixed frame and try to send it.
    ///
    /// A payload too long for the length prefix is refused before anything
    /// is queued, leaving the connection untouched.
    pub fn send_framed(&mut self, registry: &Registry, payload: impl Into<Bytes>) -> Result<Outcome, ProtocolError> {
        self.writes.enqueue_framed(payload)?;
        Ok(self.flush(registry))
    }

    /// Flush the write queue, arming write interest only while bytes remain.
    pub fn flush(&mut self, registry: &Registry) -> Outcome {
        if !self.established {
            // Bytes wait in order until the dial completes.
            return Outcome::Open;
        }

        let armed = match self.writes.flush(&mut self.stream) {
            WriteStatus::Drained => false,
            WriteStatus::WouldBlock => true,
            WriteStatus::Failed(e) => return Outcome::Close(CloseReason::Io(e)),
        };
        let pending = self.writes.pending_bytes();
        let paused = armed && self.write_limit.is_some_and(|limit| pending > limit);

        if armed != self.write_armed || paused != self.read_paused {
            let token = self.id.token();
            if let Err(e) = reactor::set_interest(registry, &mut self.stream, token, !paused, armed) {
                return Outcome::Close(CloseReason::Io(e));
            }
            if paused != self.read_paused {
                tracing::debug!(connection_id = %self.id, pending_bytes = pending, paused, "Read interest changed");
            }
            self.write_armed = armed;
            self.read_paused = paused;
            tracing::trace!(connection_id = %self.id, armed, "Write interest changed");
        }
        Outcome::Open
    }

    /// Drop every reactor interest; the socket itself stays open.
    pub fn detach(&mut self, registry: &Registry) {
        self.lifecycle = Lifecycle::Closing;
        self.write_armed = false;
        self.read_paused = false;
        if let Err(e) = reactor::deregister(registry, &mut self.stream) {
            tracing::trace!(connection_id = %self.id, error = %e, "Deregister failed");
        }
    }

    /// Last non-blocking flush before destruction. Whatever is left is lost.
    pub fn finish(&mut self) {
        if self.established && !self.writes.is_empty() {
            if let WriteStatus::Failed(e) = self.writes.flush(&mut self.stream) {
                tracing::trace!(connection_id = %self.id, error = %e, "Final flush failed");
            }
        }

        let discarded = self.writes.pending_bytes();
        if discarded > 0 {
            tracing::debug!(connection_id = %self.id, bytes = discarded, "Discarding unflushed bytes");
            self.writes.clear();
        }
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("role", &self.role())
            .field("lifecycle", &self.lifecycle)
            .field("pending_bytes", &self.writes.pending_bytes())
            .finish()
    }
}
