//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Reactor readiness
//!     → listener.rs (accept until would-block, TCP_NODELAY)
//!     → connection.rs (socket + buffer + write queue + protocol role)
//!         → buffer.rs (fill until would-block)
//!         → [role consumes complete units]
//!         → write_queue.rs (flush, resume partial writes)
//!
//! Connection states:
//!     Open → Closing → dropped by the cleanup pass
//! ```
//!
//! # Design Decisions
//! - mio is edge-triggered; every read and write drains until would-block
//! - Write interest is armed only while a write queue holds bytes

pub mod buffer;
pub mod connection;
pub mod listener;
pub mod reactor;
pub mod write_queue;

pub use buffer::{ByteBuffer, FillStatus};
pub use connection::{Connection, ConnectionId, Inbound, Lifecycle, Protocol, Role};
pub use listener::Listener;
pub use reactor::Reactor;
pub use write_queue::{WriteQueue, WriteStatus};
