//! harq: HTTP/1.1 to message-broker gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌──────────────────────────────────────────────┐
//!                        │                  GATEWAY                     │
//!                        │                                              │
//!   Client Request       │  ┌──────────┐   ┌──────────┐   ┌──────────┐  │
//!   ─────────────────────┼─▶│   net    │──▶│   http   │──▶│  broker  │──┼──▶ Broker
//!                        │  │ listener │   │  parser  │   │  frames  │  │    (link)
//!                        │  └──────────┘   └──────────┘   └──────────┘  │
//!                        │                                      │       │
//!   Client Response      │  ┌──────────┐   ┌──────────┐         │       │
//!   ◀────────────────────┼──│ response │◀──│ registry │◀────────┘       │
//!                        │  │ writer   │   │ (by id)  │                 │
//!                        │  └──────────┘   └──────────┘                 │
//!                        │                                              │
//!                        │  config · lifecycle · observability · retry  │
//!                        └──────────────────────────────────────────────┘
//! ```

use clap::Parser;

use harq_gateway::cli::Cli;
use harq_gateway::config::{load_config, GatewayConfig};
use harq_gateway::config::validation::validate_config;
use harq_gateway::lifecycle::spawn_signal_handler;
use harq_gateway::observability::{init_logging, init_metrics};
use harq_gateway::Gateway;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };
    cli.apply(&mut config);
    if let Err(errors) = validate_config(&config) {
        for error in &errors {
            eprintln!("invalid configuration: {}", error);
        }
        return Err("configuration rejected".into());
    }

    init_logging(&config.observability)?;
    tracing::info!("harq v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        broker_address = %config.broker.address,
        max_connections = config.listener.max_connections,
        data_dir = %config.data_dir,
        "Configuration loaded"
    );
    if config.daemonize {
        tracing::warn!("Daemon mode requested; leaving detachment to the process supervisor");
    }

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let mut gateway = Gateway::bind(config)?;
    tracing::info!(address = %gateway.local_addr()?, "Listener bound, waiting for broker link");

    spawn_signal_handler(gateway.shutdown_handle())?;
    gateway.run()?;

    tracing::info!("Shutdown complete");
    Ok(())
}
