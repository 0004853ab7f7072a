//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses, destinations, and value ranges
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::GatewayConfig;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

const LOG_FORMATS: &[&str] = &["pretty", "json"];

/// Check every semantic rule and collect all violations.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::new("listener.max_connections", "must be greater than 0"));
    }

    let broker = &config.broker;
    if broker.address.is_empty() {
        errors.push(ValidationError::new("broker.address", "must not be empty"));
    }
    for (field, value) in [
        ("broker.inbound_destination", &broker.inbound_destination),
        ("broker.reply_destination", &broker.reply_destination),
        ("broker.control_destination", &broker.control_destination),
    ] {
        if value.is_empty() {
            errors.push(ValidationError::new(field, "must not be empty"));
        }
    }
    if broker.inbound_destination == broker.reply_destination {
        errors.push(ValidationError::new(
            "broker.reply_destination",
            "must differ from broker.inbound_destination",
        ));
    }
    if broker.max_frame_bytes == 0 || broker.max_frame_bytes > u32::MAX as usize {
        errors.push(ValidationError::new(
            "broker.max_frame_bytes",
            "must be between 1 and 4294967295",
        ));
    }
    if broker.reconnect_base_delay_ms == 0 {
        errors.push(ValidationError::new("broker.reconnect_base_delay_ms", "must be greater than 0"));
    }
    if broker.reconnect_max_delay_ms < broker.reconnect_base_delay_ms {
        errors.push(ValidationError::new(
            "broker.reconnect_max_delay_ms",
            "must be at least broker.reconnect_base_delay_ms",
        ));
    }

    if config.http.max_head_bytes == 0 {
        errors.push(ValidationError::new("http.max_head_bytes", "must be greater than 0"));
    }
    if config.http.max_headers == 0 {
        errors.push(ValidationError::new("http.max_headers", "must be greater than 0"));
    }
    if config.http.max_body_bytes >= broker.max_frame_bytes as u64 {
        errors.push(ValidationError::new(
            "http.max_body_bytes",
            "must be less than broker.max_frame_bytes",
        ));
    }
    if config.http.max_queued_response_bytes == 0 {
        errors.push(ValidationError::new("http.max_queued_response_bytes", "must be greater than 0"));
    }

    let obs = &config.observability;
    if !LOG_FORMATS.contains(&obs.log_format.as_str()) {
        errors.push(ValidationError::new(
            "observability.log_format",
            format!("'{}' is not one of {:?}", obs.log_format, LOG_FORMATS),
        ));
    }
    if obs.metrics_enabled && obs.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", obs.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
