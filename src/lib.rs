//! HTTP/1.1 to message-broker gateway library.
//!
//! Client requests are parsed incrementally, wrapped in length-prefixed
//! envelopes, and written to a single broker link; broker replies are
//! routed back to the originating connection by its id.

pub mod broker;
pub mod cli;
pub mod config;
pub mod error;
pub mod gateway;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod resilience;

pub use config::GatewayConfig;
pub use error::{GatewayError, ProtocolError};
pub use gateway::Gateway;
pub use lifecycle::Shutdown;
