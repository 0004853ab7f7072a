//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → cli overrides (bind, port, broker, data dir, daemon)
//!     → GatewayConfig (validated, immutable)
//!     → handed to the gateway at construction
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{BrokerConfig, GatewayConfig, HttpConfig, ListenerConfig, ObservabilityConfig};
