//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::http::parser::ParserLimits;

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Client-facing listener.
    pub listener: ListenerConfig,

    /// Broker link settings.
    pub broker: BrokerConfig,

    /// HTTP parsing limits.
    pub http: HttpConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Data directory. Carried for the process supervisor; the gateway
    /// core never touches it.
    pub data_dir: String,

    /// Whether the process was asked to detach. Detaching is left to the
    /// supervisor; the flag is only reported.
    pub daemonize: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listener: ListenerConfig::default(),
            broker: BrokerConfig::default(),
            http: HttpConfig::default(),
            observability: ObservabilityConfig::default(),
            data_dir: "harq.db".to_string(),
            daemonize: false,
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:7622").
    pub bind_address: String,

    /// Maximum concurrent client connections.
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:7622".to_string(),
            max_connections: 10_000,
        }
    }
}

/// Broker link configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Broker address (e.g., "127.0.0.1:7621").
    pub address: String,

    /// Destination every forwarded request is addressed to.
    pub inbound_destination: String,

    /// Queue the broker publishes replies on.
    pub reply_destination: String,

    /// Destination handshake actions are addressed to.
    pub control_destination: String,

    /// Largest accepted reply frame.
    pub max_frame_bytes: usize,

    /// First reconnect delay in milliseconds.
    pub reconnect_base_delay_ms: u64,

    /// Ceiling on the reconnect delay in milliseconds.
    pub reconnect_max_delay_ms: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:7621".to_string(),
            inbound_destination: "/harq-http".to_string(),
            reply_destination: "/harq-http-reply".to_string(),
            control_destination: "/harq-control".to_string(),
            max_frame_bytes: 16 * 1024 * 1024,
            reconnect_base_delay_ms: 100,
            reconnect_max_delay_ms: 10_000,
        }
    }
}

/// HTTP parsing limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Largest request line plus headers.
    pub max_head_bytes: usize,

    /// Most header lines per request.
    pub max_headers: usize,

    /// Largest request body.
    pub max_body_bytes: u64,

    /// Unsent reply bytes a client may accumulate before reading from it
    /// pauses.
    pub max_queued_response_bytes: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        let limits = ParserLimits::default();
        Self {
            max_head_bytes: limits.max_head_bytes,
            max_headers: limits.max_headers,
            max_body_bytes: limits.max_body_bytes,
            max_queued_response_bytes: 1024 * 1024,
        }
    }
}

impl HttpConfig {
    pub fn limits(&self) -> ParserLimits {
        ParserLimits {
            max_head_bytes: self.max_head_bytes,
            max_headers: self.max_headers,
            max_body_bytes: self.max_body_bytes,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format: "pretty" or "json".
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
