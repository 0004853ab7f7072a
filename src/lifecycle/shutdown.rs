//! Shutdown coordination for the gateway.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use mio::Waker;

/// Cross-thread trigger for graceful shutdown.
///
/// The reactor thread blocks in `poll`, so triggering also wakes it; the
/// event loop then sees [`Shutdown::is_triggered`] and exits.
#[derive(Debug, Clone)]
pub struct Shutdown {
    flag: Arc<AtomicBool>,
    waker: Arc<Waker>,
}

impl Shutdown {
    /// Create a coordinator that wakes the reactor owning `waker`.
    pub fn new(waker: Arc<Waker>) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            waker,
        }
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        if !self.flag.swap(true, Ordering::SeqCst) {
            tracing::info!("Shutdown requested");
        }
        if let Err(e) = self.wake() {
            tracing::error!(error = %e, "Failed to wake reactor for shutdown");
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    fn wake(&self) -> io::Result<()> {
        self.waker.wake()
    }
}
