//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     flag set → reactor woken → loop exits
//!     → every connection moved to closing → final cleanup pass
//! ```
//!
//! # Design Decisions
//! - Ordered shutdown: stop accept, close connections, exit
//! - The reactor thread is the only one that touches connections

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::spawn_signal_handler;
