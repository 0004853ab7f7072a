//! Broker side of the gateway.
//!
//! # Data Flow
//! ```text
//! Request
//!     → wire.rs (WireRequest inside an Envelope for the inbound destination)
//!     → [4-byte length + payload queued on the link]
//!     …
//! link bytes
//!     → codec.rs (frame boundaries)
//!     → link.rs (Envelope → WireResponse → Response)
//!     → [gateway routes by stream id]
//! ```
//!
//! `action.rs` holds the handshake sent on every new link before any
//! request.

pub mod action;
pub mod codec;
pub mod link;
pub mod wire;

pub use action::{bootstrap, Action};
pub use codec::FrameDecoder;
pub use link::BrokerProtocol;
pub use wire::{Envelope, WireError, WireRequest, WireResponse};
