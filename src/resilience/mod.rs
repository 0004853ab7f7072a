//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Broker link lost:
//!     → backoff.rs (delay before the next dial, grows per failure)
//!     → gateway dials again and repeats the handshake
//!     → success resets the sequence
//! ```

pub mod backoff;

pub use backoff::{calculate_backoff, Backoff};
