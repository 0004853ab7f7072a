//! Connection registry with deferred destruction.
//!
//! # Responsibilities
//! - Assign connection ids that are never reused within a process
//! - Own every live connection, keyed by id
//! - Park removed connections until the end of the reactor iteration
//!
//! # Design Decisions
//! - Removal only detaches from the reactor and moves the connection to the
//!   closing list. Destruction happens in [`ConnectionRegistry::drain_closing`],
//!   which the event loop calls once per iteration after every event has
//!   been handled, so no event in flight can observe a freed connection
//! - Removing an id twice, or an id that never existed, is a no-op

use std::collections::HashMap;

use mio::Registry;

use crate::net::connection::{Connection, ConnectionId, Lifecycle, Role};
use crate::observability::metrics;

/// Monotonic id source. Id 0 is reserved for the listener token.
#[derive(Debug)]
pub struct IdAllocator {
    next: u64,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    pub fn next_id(&mut self) -> ConnectionId {
        let id = ConnectionId::from_raw(self.next);
        self.next += 1;
        id
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Live and closing connections.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    active: HashMap<ConnectionId, Connection>,
    closing: Vec<Connection>,
    ids: IdAllocator,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate_id(&mut self) -> ConnectionId {
        self.ids.next_id()
    }

    /// Take ownership of a started connection.
    pub fn insert(&mut self, conn: Connection) {
        metrics::record_opened(conn.role());
        self.active.insert(conn.id(), conn);
    }

    pub fn get(&self, id: ConnectionId) -> Option<&Connection> {
        self.active.get(&id)
    }

    pub fn get_mut(&mut self, id: ConnectionId) -> Option<&mut Connection> {
        self.active.get_mut(&id)
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.active.contains_key(&id)
    }

    /// Detach `id` from the reactor and schedule it for destruction.
    ///
    /// Returns whether the connection was live.
    pub fn remove(&mut self, registry: &Registry, id: ConnectionId) -> bool {
        let Some(mut conn) = self.active.remove(&id) else {
            return false;
        };
        conn.detach(registry);
        debug_assert_eq!(conn.lifecycle(), Lifecycle::Closing);
        self.closing.push(conn);
        true
    }

    /// Schedule every live connection for destruction.
    pub fn remove_all(&mut self, registry: &Registry) {
        let ids: Vec<ConnectionId> = self.active.keys().copied().collect();
        for id in ids {
            self.remove(registry, id);
        }
    }

    /// Destroy everything parked since the last call.
    ///
    /// Each connection gets one last non-blocking flush; unsent bytes are
    /// discarded. Returns how many connections were destroyed.
    pub fn drain_closing(&mut self) -> usize {
        let count = self.closing.len();
        for mut conn in self.closing.drain(..) {
            conn.finish();
            metrics::record_closed(conn.role());
            tracing::debug!(connection_id = %conn.id(), role = %conn.role(), "Connection destroyed");
        }
        count
    }

    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    pub fn closing_len(&self) -> usize {
        self.closing.len()
    }

    /// Connections parked for the next cleanup pass.
    pub fn closing(&self) -> &[Connection] {
        &self.closing
    }

    /// Live connections carrying `role`.
    pub fn count_role(&self, role: Role) -> usize {
        self.active.values().filter(|c| c.role() == role).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProtocolError;
    use crate::net::connection::{Protocol, ProtocolContext};
    use crate::net::reactor::Reactor;

    struct Idle(Role);

    impl Protocol for Idle {
        fn role(&self) -> Role {
            self.0
        }

        fn on_data(&mut self, _ctx: &mut ProtocolContext<'_>) -> Result<(), ProtocolError> {
            Ok(())
        }
    }

    fn connected_pair() -> (mio::net::TcpStream, std::net::TcpStream) {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let peer = std::net::TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (accepted, _) = listener.accept().unwrap();
        accepted.set_nonblocking(true).unwrap();
        (mio::net::TcpStream::from_std(accepted), peer)
    }

    #[test]
    fn ids_are_monotonic_and_skip_zero() {
        let mut ids = IdAllocator::new();
        let a = ids.next_id();
        let b = ids.next_id();
        assert_eq!(a.as_u64(), 1);
        assert!(b > a);
    }

    #[test]
    fn removal_is_deferred_until_drain() {
        let reactor = Reactor::new(8).unwrap();
        let mut registry = ConnectionRegistry::new();
        let (stream, _peer) = connected_pair();

        let id = registry.allocate_id();
        let mut conn = Connection::accepted(id, stream, Box::new(Idle(Role::ClientHttp)));
        conn.start(reactor.registry()).unwrap();
        registry.insert(conn);
        assert_eq!(registry.count_role(Role::ClientHttp), 1);

        assert!(registry.remove(reactor.registry(), id));
        assert!(!registry.contains(id));
        assert_eq!(registry.closing_len(), 1);

        // A second removal in the same iteration changes nothing.
        assert!(!registry.remove(reactor.registry(), id));
        assert_eq!(registry.closing_len(), 1);

        assert_eq!(registry.drain_closing(), 1);
        assert_eq!(registry.closing_len(), 0);
        assert_eq!(registry.drain_closing(), 0);
    }

    #[test]
    fn unknown_ids_are_ignored() {
        let reactor = Reactor::new(8).unwrap();
        let mut registry = ConnectionRegistry::new();
        assert!(!registry.remove(reactor.registry(), ConnectionId::from_raw(77)));
        assert!(registry.get(ConnectionId::from_raw(77)).is_none());
    }

    #[test]
    fn remove_all_parks_everything() {
        let reactor = Reactor::new(8).unwrap();
        let mut registry = ConnectionRegistry::new();
        let mut peers = Vec::new();

        for role in [Role::ClientHttp, Role::ClientHttp, Role::BrokerLink] {
            let (stream, peer) = connected_pair();
            peers.push(peer);
            let id = registry.allocate_id();
            let mut conn = Connection::accepted(id, stream, Box::new(Idle(role)));
            conn.start(reactor.registry()).unwrap();
            registry.insert(conn);
        }
        assert_eq!(registry.count_role(Role::BrokerLink), 1);

        registry.remove_all(reactor.registry());
        assert_eq!(registry.active_len(), 0);
        assert_eq!(registry.drain_closing(), 3);
    }
}
