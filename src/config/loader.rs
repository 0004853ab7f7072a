//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use crate::config::schema::GatewayConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<GatewayConfig, ConfigError> {
    let config: GatewayConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let config = parse_config(
            r#"
            data_dir = "/var/lib/harq"

            [listener]
            bind_address = "127.0.0.1:9000"

            [broker]
            address = "broker.internal:7621"
            "#,
        )
        .unwrap();

        assert_eq!(config.listener.bind_address, "127.0.0.1:9000");
        assert_eq!(config.listener.max_connections, 10_000);
        assert_eq!(config.broker.address, "broker.internal:7621");
        assert_eq!(config.broker.inbound_destination, "/harq-http");
        assert_eq!(config.broker.reply_destination, "/harq-http-reply");
        assert_eq!(config.data_dir, "/var/lib/harq");
    }

    #[test]
    fn syntax_errors_are_parse_errors() {
        assert!(matches!(parse_config("[listener"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn semantic_errors_are_listed() {
        let err = parse_config("[listener]\nmax_connections = 0\n").unwrap_err();
        match &err {
            ConfigError::Validation(errors) => assert_eq!(errors.len(), 1),
            other => panic!("unexpected: {other}"),
        }
        assert_eq!(
            err.to_string(),
            "Validation failed: listener.max_connections: must be greater than 0"
        );
    }

    #[test]
    fn missing_file_is_io_error() {
        let path = std::env::temp_dir().join("harq-gateway-no-such-config.toml");
        assert!(matches!(load_config(&path), Err(ConfigError::Io(_))));
    }
}
