//! Gateway orchestration and the event loop.
//!
//! # Responsibilities
//! - Accept client connections and give each an HTTP role
//! - Keep exactly one broker link, handshake first, reconnect on loss
//! - Forward every parsed request to the broker
//! - Route every broker reply back to the connection its id names
//! - Destroy removed connections only after the iteration's events
//!
//! # Data Flow
//! ```text
//! poll
//!     → listener readiness → accept until would-block
//!     → connection readiness → on_writable / on_readable
//!         → Inbound::Request  → deliver   → link write queue
//!         → Inbound::Response → send_reply → client write queue
//!     → reconnect timer
//!     → drain_closing (deferred destruction)
//! ```
//!
//! # Design Decisions
//! - The client listener is registered only once the first link has
//!   flushed its handshake, so no request can precede it
//! - Later links queue requests behind their own handshake in the same
//!   write queue, which keeps the handshake first on the wire
//! - With no link at all, requests are answered with 503 directly
//! - A request whose envelope would exceed the broker frame limit is
//!   answered with 413 and never reaches the link

use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Instant;

use bytes::Bytes;
use mio::Token;

use crate::broker::action::bootstrap;
use crate::broker::link::BrokerProtocol;
use crate::broker::wire::{Envelope, WireRequest};
use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::gateway::registry::ConnectionRegistry;
use crate::http::client::ClientProtocol;
use crate::http::{Request, Response};
use crate::lifecycle::Shutdown;
use crate::net::connection::{CloseReason, Connection, ConnectionId, Inbound, Outcome, Role};
use crate::net::listener::{self, Listener, LISTENER};
use crate::net::reactor::{Reactor, Readiness, WAKER};
use crate::observability::metrics;
use crate::resilience::Backoff;

const EVENT_CAPACITY: usize = 1024;

/// The protocol gateway: one reactor, one listener, one broker link.
pub struct Gateway {
    config: GatewayConfig,
    reactor: Reactor,
    listener: Listener,
    listening: bool,
    connections: ConnectionRegistry,
    link: Option<ConnectionId>,
    link_ready: bool,
    reconnect_at: Option<Instant>,
    backoff: Backoff,
    shutdown: Shutdown,
    inbound: Vec<Inbound>,
}

impl Gateway {
    /// Create the reactor and bind the client listener.
    ///
    /// Nothing is accepted until [`Gateway::run`] has brought up the broker
    /// link.
    pub fn bind(config: GatewayConfig) -> Result<Self, GatewayError> {
        let reactor = Reactor::new(EVENT_CAPACITY)?;
        let listener = Listener::bind(&config.listener)?;
        let shutdown = Shutdown::new(reactor.waker());
        let backoff = Backoff::new(
            config.broker.reconnect_base_delay_ms,
            config.broker.reconnect_max_delay_ms,
        );

        Ok(Self {
            config,
            reactor,
            listener,
            listening: false,
            connections: ConnectionRegistry::new(),
            link: None,
            link_ready: false,
            reconnect_at: None,
            backoff,
            shutdown,
            inbound: Vec::new(),
        })
    }

    /// Address the client listener is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Handle that stops [`Gateway::run`] from any thread.
    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Whether a broker link has completed its handshake.
    pub fn is_link_ready(&self) -> bool {
        self.link_ready
    }

    /// Dial the broker and run the event loop until shutdown.
    ///
    /// An unresolvable broker address is fatal; a refused dial is retried
    /// with backoff like any later link loss.
    pub fn run(&mut self) -> Result<(), GatewayError> {
        resolve(&self.config.broker.address)?;
        if let Err(e) = self.connect_broker() {
            tracing::warn!(error = %e, "Broker dial failed");
            self.schedule_reconnect();
        }

        while !self.shutdown.is_triggered() {
            let timeout = self
                .reconnect_at
                .map(|at| at.saturating_duration_since(Instant::now()));

            for ready in self.reactor.poll(timeout)? {
                self.dispatch(ready)?;
            }

            self.reconnect_if_due();
            self.connections.drain_closing();
        }

        self.stop();
        Ok(())
    }

    fn dispatch(&mut self, ready: Readiness) -> Result<(), GatewayError> {
        match ready.token {
            WAKER => Ok(()),
            LISTENER => {
                self.accept_clients();
                Ok(())
            }
            Token(raw) => self.on_connection_event(ConnectionId::from_raw(raw as u64), ready),
        }
    }

    fn accept_clients(&mut self) {
        let max = self.listener.max_connections();

        loop {
            let (stream, peer) = match self.listener.accept() {
                Ok(Some(accepted)) => accepted,
                Ok(None) => break,
                Err(e) if listener::is_per_connection_error(&e) => {
                    tracing::debug!(error = %e, "Pending connection dropped before accept");
                    continue;
                }
                Err(e) => {
                    // The backlog is not drained, so no new edge will come.
                    tracing::warn!(error = %e, "Accept failed, re-arming listener");
                    if let Err(e) = self.listener.rearm(self.reactor.registry()) {
                        tracing::warn!(error = %e, "Failed to re-arm listener");
                    }
                    break;
                }
            };
            metrics::record_accepted();

            let clients = self.connections.active_len() - usize::from(self.link.is_some());
            if clients >= max {
                tracing::warn!(peer_addr = %peer, max_connections = max, "Connection limit reached, refusing");
                metrics::record_refused();
                drop(stream);
                continue;
            }

            let id = self.connections.allocate_id();
            let role = ClientProtocol::new(self.config.http.limits());
            let mut conn = Connection::accepted(id, stream, Box::new(role))
                .with_write_limit(self.config.http.max_queued_response_bytes);
            if let Err(e) = conn.start(self.reactor.registry()) {
                tracing::warn!(connection_id = %id, error = %e, "Failed to register client");
                continue;
            }

            tracing::debug!(connection_id = %id, peer_addr = %peer, "Client connected");
            self.connections.insert(conn);
        }
    }

    fn on_connection_event(&mut self, id: ConnectionId, ready: Readiness) -> Result<(), GatewayError> {
        let registry = self.reactor.registry();
        let Some(conn) = self.connections.get_mut(id) else {
            tracing::trace!(connection_id = %id, "Event for a removed connection");
            return Ok(());
        };

        let mut inbound = std::mem::take(&mut self.inbound);
        let mut outcome = Outcome::Open;
        if ready.writable {
            outcome = conn.on_writable(registry);
        }
        if outcome.is_open() && (ready.readable || ready.closed) {
            outcome = conn.on_readable(registry, &mut inbound);
        }

        for item in inbound.drain(..) {
            match item {
                Inbound::Request(req) => self.deliver(req),
                Inbound::Response(rsp) => self.send_reply(rsp),
            }
        }
        self.inbound = inbound;

        match outcome {
            Outcome::Close(reason) => self.remove_connection(id, reason),
            Outcome::Open if Some(id) == self.link => self.check_link_ready()?,
            Outcome::Open => {}
        }
        Ok(())
    }

    /// Forward a parsed request to the broker.
    pub fn deliver(&mut self, req: Request) {
        let Some(link) = self.link else {
            tracing::warn!(
                stream_id = req.stream_id,
                method = %req.method,
                url = %req.url,
                "No broker link, answering 503"
            );
            let rsp = Response::new(req.stream_id, 503)
                .with_header("Content-Type", "text/plain")
                .with_body("broker unavailable\n");
            self.send_reply(rsp);
            return;
        };

        let frame = Envelope::seal(
            self.config.broker.inbound_destination.as_str(),
            &WireRequest::from(&req),
        )
        .to_bytes();

        let limit = self.config.broker.max_frame_bytes;
        if frame.len() > limit {
            tracing::warn!(
                stream_id = req.stream_id,
                url = %req.url,
                bytes = frame.len(),
                max_frame_bytes = limit,
                "Request too large for a broker frame, answering 413"
            );
            let rsp = Response::new(req.stream_id, 413)
                .with_header("Content-Type", "text/plain")
                .with_body("request too large\n");
            self.send_reply(rsp);
            return;
        }

        tracing::debug!(
            stream_id = req.stream_id,
            method = %req.method,
            url = %req.url,
            "Forwarding request"
        );
        if self.send_frame(link, frame) {
            metrics::record_forwarded();
        }
    }

    /// Write a broker reply to the client connection it names.
    ///
    /// Replies for connections that are gone, closing, or not clients are
    /// dropped.
    pub fn send_reply(&mut self, rsp: Response) {
        let id = ConnectionId::from_raw(rsp.stream_id);
        let registry = self.reactor.registry();

        let conn = match self.connections.get_mut(id) {
            Some(conn) if conn.role() == Role::ClientHttp => conn,
            _ => {
                tracing::debug!(stream_id = rsp.stream_id, status = rsp.status, "Reply target gone, dropping");
                metrics::record_dropped_reply();
                return;
            }
        };

        metrics::record_reply(rsp.status);
        tracing::debug!(connection_id = %id, status = rsp.status, bytes = rsp.body.len(), "Sending reply");
        if let Outcome::Close(reason) = conn.send(registry, rsp.to_http_bytes()) {
            self.remove_connection(id, reason);
        }
    }

    /// Queue one framed payload on a connection; false if it had to close.
    fn send_frame(&mut self, id: ConnectionId, frame: Bytes) -> bool {
        let registry = self.reactor.registry();
        let Some(conn) = self.connections.get_mut(id) else {
            return false;
        };
        match conn.send_framed(registry, frame) {
            Ok(Outcome::Open) => true,
            Ok(Outcome::Close(reason)) => {
                self.remove_connection(id, reason);
                false
            }
            Err(e) => {
                tracing::warn!(connection_id = %id, error = %e, "Frame refused");
                false
            }
        }
    }

    /// Schedule `id` for destruction at the end of this iteration.
    pub fn remove_connection(&mut self, id: ConnectionId, reason: CloseReason) {
        if !self.connections.remove(self.reactor.registry(), id) {
            return;
        }

        match &reason {
            CloseReason::PeerClosed => tracing::debug!(connection_id = %id, "Connection closed by peer"),
            CloseReason::Io(e) => tracing::debug!(connection_id = %id, error = %e, "Connection failed"),
            CloseReason::Protocol(e) => tracing::warn!(connection_id = %id, error = %e, "Protocol error, closing"),
        }

        if Some(id) == self.link {
            self.link = None;
            self.link_ready = false;
            tracing::warn!(connection_id = %id, reason = %reason, "Broker link lost");
            self.schedule_reconnect();
        }
    }

    fn connect_broker(&mut self) -> Result<(), GatewayError> {
        let broker = &self.config.broker;
        let addr = resolve(&broker.address)?;
        let stream = mio::net::TcpStream::connect(addr).map_err(|source| GatewayError::Connect {
            address: broker.address.clone(),
            source,
        })?;

        let id = self.connections.allocate_id();
        let mut conn = Connection::dialing(id, stream, Box::new(BrokerProtocol::new(broker.max_frame_bytes)));
        conn.start(self.reactor.registry())?;

        // Queued now, flushed as soon as the dial completes, ahead of any request.
        for action in bootstrap(&broker.inbound_destination, &broker.reply_destination) {
            tracing::debug!(connection_id = %id, action = %action, "Queueing handshake action");
            let frame = action.to_envelope(&broker.control_destination).to_bytes();
            let failure = match conn.send_framed(self.reactor.registry(), frame) {
                Ok(Outcome::Open) => continue,
                Ok(Outcome::Close(reason)) => reason.to_string(),
                Err(e) => e.to_string(),
            };
            return Err(GatewayError::Connect {
                address: broker.address.clone(),
                source: io::Error::new(io::ErrorKind::Other, failure),
            });
        }

        tracing::info!(connection_id = %id, address = %addr, "Dialing broker");
        self.connections.insert(conn);
        self.link = Some(id);
        self.link_ready = false;
        Ok(())
    }

    /// Mark the link ready once it is connected and the handshake is out.
    fn check_link_ready(&mut self) -> Result<(), GatewayError> {
        if self.link_ready {
            return Ok(());
        }
        let Some(conn) = self.link.and_then(|id| self.connections.get(id)) else {
            return Ok(());
        };
        if !conn.is_established() || conn.pending_bytes() > 0 {
            return Ok(());
        }

        self.link_ready = true;
        self.backoff.reset();
        tracing::info!(connection_id = %conn.id(), "Broker link ready");

        if !self.listening {
            self.listener.register(self.reactor.registry())?;
            self.listening = true;
        }
        Ok(())
    }

    fn schedule_reconnect(&mut self) {
        if self.shutdown.is_triggered() {
            return;
        }
        let delay = self.backoff.next_delay();
        tracing::info!(attempt = self.backoff.attempt(), delay_ms = delay.as_millis() as u64, "Broker reconnect scheduled");
        self.reconnect_at = Some(Instant::now() + delay);
    }

    fn reconnect_if_due(&mut self) {
        match self.reconnect_at {
            Some(at) if Instant::now() >= at => {}
            _ => return,
        }
        self.reconnect_at = None;
        metrics::record_reconnect();

        if let Err(e) = self.connect_broker() {
            tracing::warn!(error = %e, "Broker reconnect failed");
            self.schedule_reconnect();
        }
    }

    /// Close everything and run the cleanup pass one final time.
    fn stop(&mut self) {
        if self.listening {
            if let Err(e) = self.listener.deregister(self.reactor.registry()) {
                tracing::debug!(error = %e, "Listener deregister failed");
            }
            self.listening = false;
        }

        self.connections.remove_all(self.reactor.registry());
        self.link = None;
        self.link_ready = false;
        let closed = self.connections.drain_closing();
        tracing::info!(connections = closed, "Gateway stopped");
    }
}

fn resolve(address: &str) -> Result<SocketAddr, GatewayError> {
    let connect_error = |source| GatewayError::Connect {
        address: address.to_string(),
        source,
    };
    address
        .to_socket_addrs()
        .map_err(connect_error)?
        .next()
        .ok_or_else(|| connect_error(io::Error::new(io::ErrorKind::NotFound, "address resolved to nothing")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::connection::Protocol;
    use std::io::Read;

    fn config() -> GatewayConfig {
        let mut config = GatewayConfig::default();
        config.listener.bind_address = "127.0.0.1:0".into();
        config
    }

    #[test]
    fn resolve_rejects_garbage() {
        assert!(matches!(resolve("no port here"), Err(GatewayError::Connect { .. })));
        assert_eq!(resolve("127.0.0.1:7621").unwrap().port(), 7621);
    }

    /// Register a connected socket pair's server side under `protocol`;
    /// returns its id and the peer end.
    fn attach(gateway: &mut Gateway, protocol: Box<dyn Protocol>) -> (ConnectionId, std::net::TcpStream) {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let peer = std::net::TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (accepted, _) = listener.accept().unwrap();
        accepted.set_nonblocking(true).unwrap();

        let id = gateway.connections.allocate_id();
        let mut conn = Connection::accepted(id, mio::net::TcpStream::from_std(accepted), protocol);
        conn.start(gateway.reactor.registry()).unwrap();
        gateway.connections.insert(conn);
        (id, peer)
    }

    fn attach_client(gateway: &mut Gateway) -> (ConnectionId, std::net::TcpStream) {
        attach(gateway, Box::new(ClientProtocol::new(Default::default())))
    }

    /// An already-established broker link talking to `peer`.
    fn attach_link(gateway: &mut Gateway) -> (ConnectionId, std::net::TcpStream) {
        let (id, peer) = attach(gateway, Box::new(BrokerProtocol::new(1 << 20)));
        gateway.link = Some(id);
        gateway.link_ready = true;
        (id, peer)
    }

    fn post(stream_id: u64, body: Option<Bytes>) -> Request {
        Request {
            stream_id,
            method: crate::http::Method::from_token("POST"),
            url: "/".into(),
            version: crate::http::Version::HTTP_11,
            headers: Vec::new(),
            body,
        }
    }

    fn read_reply(peer: &mut std::net::TcpStream) -> String {
        peer.set_read_timeout(Some(std::time::Duration::from_secs(2))).unwrap();
        let mut buf = [0u8; 512];
        let n = peer.read(&mut buf).unwrap();
        String::from_utf8_lossy(&buf[..n]).into_owned()
    }

    fn assert_silent(peer: &mut std::net::TcpStream) {
        std::thread::sleep(std::time::Duration::from_millis(50));
        peer.set_nonblocking(true).unwrap();
        let mut buf = [0u8; 64];
        match peer.read(&mut buf) {
            Err(e) => assert_eq!(e.kind(), io::ErrorKind::WouldBlock),
            Ok(n) => panic!("peer received {} bytes", n),
        }
    }

    #[test]
    fn deliver_without_link_answers_503() {
        let mut gateway = Gateway::bind(config()).unwrap();
        let (id, mut peer) = attach_client(&mut gateway);

        gateway.deliver(post(id.as_u64(), None));

        let text = read_reply(&mut peer);
        assert!(text.starts_with("HTTP/1.1 503 Service Unavailable\r\n"), "{text}");
        assert!(text.ends_with("broker unavailable\n"));
    }

    #[test]
    fn replies_to_unknown_or_broker_ids_are_dropped() {
        let mut gateway = Gateway::bind(config()).unwrap();
        let (client, mut client_peer) = attach_client(&mut gateway);
        let (link, mut link_peer) = attach_link(&mut gateway);

        gateway.send_reply(Response::new(999, 200));
        gateway.send_reply(Response::new(link.as_u64(), 200));

        assert_silent(&mut client_peer);
        assert_silent(&mut link_peer);
        assert_eq!(gateway.connections.get(link).unwrap().pending_bytes(), 0);
        assert_eq!(gateway.connections.get(client).unwrap().pending_bytes(), 0);
        assert!(gateway.connections.contains(client));
        assert!(gateway.connections.contains(link));
        assert_eq!(gateway.connections.closing_len(), 0);
    }

    #[test]
    fn peer_close_removes_now_and_destroys_at_cleanup() {
        let mut gateway = Gateway::bind(config()).unwrap();
        let (id, peer) = attach_client(&mut gateway);
        drop(peer);
        std::thread::sleep(std::time::Duration::from_millis(50));

        let ready = Readiness {
            token: id.token(),
            readable: true,
            writable: false,
            closed: false,
        };
        gateway.on_connection_event(id, ready).unwrap();

        assert!(!gateway.connections.contains(id));
        assert_eq!(gateway.connections.closing_len(), 1);

        // A late reply finds nothing to write to.
        gateway.send_reply(Response::new(id.as_u64(), 200).with_body("late"));
        assert_eq!(gateway.connections.closing_len(), 1);
        assert_eq!(gateway.connections.closing()[0].pending_bytes(), 0);

        assert_eq!(gateway.connections.drain_closing(), 1);
        assert_eq!(gateway.connections.closing_len(), 0);
    }

    #[test]
    fn oversized_request_is_answered_413_without_touching_the_link() {
        let mut config = config();
        config.broker.max_frame_bytes = 64;
        let mut gateway = Gateway::bind(config).unwrap();
        let (client, mut client_peer) = attach_client(&mut gateway);
        let (link, mut link_peer) = attach_link(&mut gateway);

        gateway.deliver(post(client.as_u64(), Some(Bytes::from(vec![b'x'; 256]))));

        let text = read_reply(&mut client_peer);
        assert!(text.starts_with("HTTP/1.1 413 "), "{text}");
        assert_silent(&mut link_peer);
        assert_eq!(gateway.connections.get(link).unwrap().pending_bytes(), 0);
        assert_eq!(gateway.link, Some(link));
    }

    #[test]
    fn small_request_reaches_the_link_framed() {
        let mut gateway = Gateway::bind(config()).unwrap();
        let (client, _client_peer) = attach_client(&mut gateway);
        let (_, mut link_peer) = attach_link(&mut gateway);

        gateway.deliver(post(client.as_u64(), Some(Bytes::from_static(b"hi"))));

        link_peer.set_read_timeout(Some(std::time::Duration::from_secs(2))).unwrap();
        let mut prefix = [0u8; 4];
        link_peer.read_exact(&mut prefix).unwrap();
        let mut payload = vec![0u8; u32::from_be_bytes(prefix) as usize];
        link_peer.read_exact(&mut payload).unwrap();

        use prost::Message;
        let envelope = Envelope::decode(&payload[..]).unwrap();
        assert_eq!(envelope.destination, gateway.config.broker.inbound_destination);
        let req = Request::try_from(envelope.open::<WireRequest>().unwrap()).unwrap();
        assert_eq!(req.stream_id, client.as_u64());
        assert_eq!(req.body.as_deref(), Some(&b"hi"[..]));
    }

    #[test]
    fn shutdown_before_link_stops_loop() {
        // Nothing listens on the broker port, so the dial fails asynchronously
        // and the loop keeps retrying until shutdown.
        let unused = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let mut config = config();
        config.broker.address = unused.local_addr().unwrap().to_string();
        drop(unused);

        let mut gateway = Gateway::bind(config).unwrap();
        let shutdown = gateway.shutdown_handle();
        let handle = std::thread::spawn(move || {
            let result = gateway.run();
            (result.is_ok(), gateway.is_link_ready(), gateway.connections.active_len())
        });

        std::thread::sleep(std::time::Duration::from_millis(200));
        shutdown.trigger();
        let (ok, ready, active) = handle.join().unwrap();
        assert!(ok);
        assert!(!ready);
        assert_eq!(active, 0);
    }
}
