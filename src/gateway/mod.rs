//! Gateway subsystem: ownership of connections and routing between roles.
//!
//! # Data Flow
//! ```text
//! client Connection ──Request──▶ Gateway::deliver ──frame──▶ broker link
//! broker link ──Response──▶ Gateway::send_reply ──HTTP──▶ client Connection
//!                                 │
//!                                 └─ lookup by stream id in registry.rs
//! ```

pub mod registry;
pub mod server;

pub use registry::{ConnectionRegistry, IdAllocator};
pub use server::Gateway;
