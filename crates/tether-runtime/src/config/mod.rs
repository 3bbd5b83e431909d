//! Configuration for Tether connections.
//!
//! Layered loading with figment (defaults, files, `TETHER_*` environment
//! variables), a serde schema and a validation pass.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    ConnectionConfig, LogFormat, LogLevel, LogOutput, LoggingConfig, SpanEventConfig,
    TetherConfig,
};
pub use validation::{validate_config, validate_connection_config};
