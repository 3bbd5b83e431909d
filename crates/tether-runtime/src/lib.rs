//! Tether Runtime - configuration, logging and connection assembly.
//!
//! This crate provides:
//! - Layered configuration loading ([`ConfigLoader`], `TETHER_*` environment variables)
//! - Logging setup ([`logging::init_from_config`])
//! - Connection assembly ([`ConnectionBuilder`]) wiring negotiation and the
//!   transports enabled by cargo features
//!
//! ```ignore
//! use tether_runtime::{config::load_config, connect, logging};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config()?;
//!     logging::init_from_config(&config.logging);
//!
//!     let connection = connect(&config).await?;
//!     let mut channel = connection.channel().expect("connected");
//!     channel.send("hello")?;
//!
//!     connection.dispose().await?;
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod config;
pub mod error;
pub mod logging;

pub use builder::{ConnectionBuilder, connect};
pub use config::{
    ConfigError, ConfigLoader, ConfigResult, ConnectionConfig, LoggingConfig, TetherConfig,
};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{init_from_config, try_init_from_config};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;
