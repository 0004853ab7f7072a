//! OS signal handling.
//!
//! # Responsibilities
//! - Listen for SIGINT and SIGTERM
//! - Translate either one into a [`Shutdown`] trigger
//!
//! # Design Decisions
//! - Uses Tokio's signal handling on a dedicated thread, since the gateway
//!   itself runs a blocking mio loop

use std::io;
use std::thread::{self, JoinHandle};

use crate::lifecycle::shutdown::Shutdown;

/// Spawn the thread that turns termination signals into a shutdown.
pub fn spawn_signal_handler(shutdown: Shutdown) -> io::Result<JoinHandle<()>> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    thread::Builder::new()
        .name("harq-signals".into())
        .spawn(move || {
            match runtime.block_on(wait_for_signal()) {
                Some(signal) => {
                    tracing::info!(signal, "Signal received, shutting down");
                    shutdown.trigger();
                }
                None => tracing::warn!("Signal handling unavailable"),
            }
        })
}

#[cfg(unix)]
async fn wait_for_signal() -> Option<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = match signal(SignalKind::terminate()) {
        Ok(term) => term,
        Err(e) => {
            tracing::warn!(error = %e, "SIGTERM handler unavailable");
            return tokio::signal::ctrl_c().await.ok().map(|()| "SIGINT");
        }
    };

    tokio::select! {
        res = tokio::signal::ctrl_c() => res.ok().map(|()| "SIGINT"),
        _ = term.recv() => Some("SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> Option<&'static str> {
    tokio::signal::ctrl_c().await.ok().map(|()| "SIGINT")
}
