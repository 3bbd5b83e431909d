//! Runtime error types.

use thiserror::Error;

use tether_core::{ConnectionError, TransportError};

use crate::config::ConfigError;

/// Errors that can occur while assembling or running a connection.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Configuration could not be loaded or is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Transport setup failed, e.g. invalid headers.
    #[error("Transport setup failed: {0}")]
    Transport(#[from] TransportError),

    /// The connection failed.
    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
