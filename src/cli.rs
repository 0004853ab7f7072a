//! Command-line surface.
//!
//! Flags override the matching configuration file values; anything not
//! given on the command line keeps the file (or default) value.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use clap::Parser;

use crate::config::GatewayConfig;

#[derive(Debug, Parser)]
#[command(name = "harq")]
#[command(about = "HTTP/1.1 to message-broker gateway", long_about = None)]
pub struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Listen host address.
    #[arg(short, long)]
    pub bind: Option<IpAddr>,

    /// Listen port [default: 7622].
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Broker address as host:port [default: 127.0.0.1:7621].
    #[arg(short = 'm', long)]
    pub broker: Option<String>,

    /// Data directory [default: harq.db].
    #[arg(short, long)]
    pub data_dir: Option<String>,

    /// Detach from the terminal.
    #[arg(short = 'D', long)]
    pub daemon: bool,
}

impl Cli {
    /// Fold command-line values into `config`.
    pub fn apply(&self, config: &mut GatewayConfig) {
        if self.bind.is_some() || self.port.is_some() {
            let current: Option<SocketAddr> = config.listener.bind_address.parse().ok();
            let ip = self
                .bind
                .or(current.map(|a| a.ip()))
                .unwrap_or(IpAddr::from([0, 0, 0, 0]));
            let port = self.port.or(current.map(|a| a.port())).unwrap_or(7622);
            config.listener.bind_address = SocketAddr::new(ip, port).to_string();
        }
        if let Some(broker) = &self.broker {
            config.broker.address = broker.clone();
        }
        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
        if self.daemon {
            config.daemonize = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("harq").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn no_flags_keep_config() {
        let mut config = GatewayConfig::default();
        parse(&[]).apply(&mut config);
        assert_eq!(config.listener.bind_address, "0.0.0.0:7622");
        assert_eq!(config.broker.address, "127.0.0.1:7621");
        assert_eq!(config.data_dir, "harq.db");
        assert!(!config.daemonize);
    }

    #[test]
    fn short_flags_override() {
        let mut config = GatewayConfig::default();
        parse(&["-b", "127.0.0.1", "-p", "8000", "-m", "10.0.0.5:7000", "-d", "/tmp/h", "-D"]).apply(&mut config);
        assert_eq!(config.listener.bind_address, "127.0.0.1:8000");
        assert_eq!(config.broker.address, "10.0.0.5:7000");
        assert_eq!(config.data_dir, "/tmp/h");
        assert!(config.daemonize);
    }

    #[test]
    fn port_alone_keeps_host() {
        let mut config = GatewayConfig::default();
        config.listener.bind_address = "127.0.0.2:1".into();
        parse(&["--port", "9"]).apply(&mut config);
        assert_eq!(config.listener.bind_address, "127.0.0.2:9");
    }

    #[test]
    fn bad_port_is_rejected() {
        assert!(Cli::try_parse_from(["harq", "-p", "nope"]).is_err());
    }
}
