//! Non-blocking TCP listener for client connections.
//!
//! # Responsibilities
//! - Bind to the configured address
//! - Accept until the kernel queue is empty on each readiness event
//! - Set `TCP_NODELAY` on every accepted socket
//! - Report the configured connection ceiling to the accept path

use std::io;
use std::net::SocketAddr;

use mio::net::{TcpListener, TcpStream};
use mio::{Interest, Registry, Token};

use crate::config::ListenerConfig;
use crate::error::GatewayError;

/// Token reserved for the listening socket.
pub const LISTENER: Token = Token(0);

/// A listener that never blocks on accept.
#[derive(Debug)]
pub struct Listener {
    inner: TcpListener,
    max_connections: usize,
}

impl Listener {
    /// Bind to the configured address.
    ///
    /// The socket is not registered with the reactor yet; see
    /// [`Listener::register`].
    pub fn bind(config: &ListenerConfig) -> Result<Self, GatewayError> {
        let addr: SocketAddr = config.bind_address.parse().map_err(|e| GatewayError::Bind {
            address: config.bind_address.clone(),
            source: io::Error::new(io::ErrorKind::InvalidInput, e),
        })?;

        let inner = TcpListener::bind(addr).map_err(|source| GatewayError::Bind {
            address: config.bind_address.clone(),
            source,
        })?;

        Ok(Self {
            inner,
            max_connections: config.max_connections,
        })
    }

    /// Start receiving accept readiness.
    pub fn register(&mut self, registry: &Registry) -> io::Result<()> {
        registry.register(&mut self.inner, LISTENER, Interest::READABLE)?;

        tracing::info!(
            address = %self.local_addr()?,
            max_connections = self.max_connections,
            "Listener accepting"
        );
        Ok(())
    }

    pub fn deregister(&mut self, registry: &Registry) -> io::Result<()> {
        registry.deregister(&mut self.inner)
    }

    /// Ask the reactor to report readiness again if the backlog is not
    /// empty. Needed after an accept loop stopped before would-block.
    pub fn rearm(&mut self, registry: &Registry) -> io::Result<()> {
        registry.reregister(&mut self.inner, LISTENER, Interest::READABLE)
    }

    /// Accept one pending connection.
    ///
    /// Returns `Ok(None)` once the backlog is drained.
    pub fn accept(&self) -> io::Result<Option<(TcpStream, SocketAddr)>> {
        loop {
            match self.inner.accept() {
                Ok((stream, peer)) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        tracing::debug!(peer_addr = %peer, error = %e, "Failed to set TCP_NODELAY");
                    }
                    return Ok(Some((stream, peer)));
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(None),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    /// Configured ceiling on concurrent client connections.
    pub fn max_connections(&self) -> usize {
        self.max_connections
    }
}

/// Whether an accept failure concerned only the one pending connection,
/// so the next one in the backlog can still be taken.
pub fn is_per_connection_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted | io::ErrorKind::ConnectionReset
    )
}
