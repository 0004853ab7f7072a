//! Error taxonomy for the gateway.
//!
//! Would-block conditions are never errors here: the I/O layer reports them
//! through [`FillStatus`](crate::net::buffer::FillStatus) and
//! [`WriteStatus`](crate::net::write_queue::WriteStatus). The types below
//! cover conditions that end a connection or stop the process.

use std::io;

use crate::broker::wire::WireError;
use crate::config::loader::ConfigError;
use crate::http::parser::ParseError;

/// Fatal errors raised while starting or running the gateway.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Failed to bind the client listener.
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    /// Failed to resolve or dial the broker.
    #[error("failed to connect to broker at {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: io::Error,
    },

    /// The reactor itself failed (poll, register, waker).
    #[error("reactor error: {0}")]
    Reactor(#[from] io::Error),

    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Errors that are fatal to a single connection only.
///
/// The owning connection is scheduled for deferred close; every other
/// connection keeps running.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The client sent bytes the HTTP parser could not accept.
    #[error("malformed http request: {0}")]
    Http(#[from] ParseError),

    /// A broker frame did not decode as an envelope or reply.
    #[error("malformed broker payload: {0}")]
    Payload(#[from] prost::DecodeError),

    /// A reply decoded but carried values the gateway cannot represent.
    #[error("invalid broker reply: {0}")]
    Wire(#[from] WireError),

    /// A broker frame announced a length over the configured limit.
    #[error("broker frame of {len} bytes exceeds limit of {limit}")]
    FrameTooLarge { len: usize, limit: usize },
}
