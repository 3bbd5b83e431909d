//! Unified error types for the Tether core.
//!
//! Errors are `Clone` because the outcome of one in-flight start or dispose is
//! handed to every caller waiting on it.

use std::fmt;

use thiserror::Error;

use crate::state::ConnectionState;
use crate::transport::{TransferFormat, TransportKind};

/// Literal message of [`ConnectionError::AllTransportsFailed`].
pub const ALL_TRANSPORTS_FAILED: &str =
    "Unable to connect to the server with any of the available transports.";

// =============================================================================
// Transport Errors
// =============================================================================

/// Errors raised by a transport, either while starting or after its channel is live.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Connection failed.
    #[error("connection failed: {url} - {reason}")]
    ConnectionFailed {
        /// The URL that failed to connect.
        url: String,
        /// Reason for failure.
        reason: String,
    },

    /// Connection closed by the remote side with an error.
    #[error("connection closed: {reason}")]
    ConnectionClosed {
        /// Reason for closure.
        reason: String,
    },

    /// Sending data failed.
    #[error("failed to send data: {0}")]
    SendFailed(String),

    /// Receiving data failed.
    #[error("failed to receive data: {0}")]
    ReceiveFailed(String),

    /// The server answered the initial request of a gated transport with a failure.
    #[error("{transport} transport failed to become ready: {reason}")]
    ReadinessFailed {
        /// The gated transport.
        transport: TransportKind,
        /// Reason for failure.
        reason: String,
    },

    /// The transport cannot carry the requested transfer format.
    #[error("{transport} transport does not support the '{format}' transfer format")]
    UnsupportedFormat {
        /// The transport that rejected the format.
        transport: TransportKind,
        /// The requested format.
        format: TransferFormat,
    },

    /// Transport not available in this build.
    #[error("transport '{transport}' not available")]
    NotAvailable {
        /// The transport kind that's not available.
        transport: TransportKind,
    },

    /// The other end of a channel direction has gone away.
    #[error("channel is closed")]
    ChannelClosed,

    /// The server replied with a non-success HTTP status.
    #[error("HTTP {status}: {reason}")]
    Http {
        /// Response status code.
        status: u16,
        /// Response body or status text.
        reason: String,
    },

    /// Invalid configuration.
    #[error("invalid transport configuration: {0}")]
    InvalidConfig(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

// =============================================================================
// Connection Errors
// =============================================================================

/// One candidate that failed during negotiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportFailure {
    /// The candidate that failed.
    pub kind: TransportKind,
    /// What went wrong.
    pub error: TransportError,
}

impl fmt::Display for TransportFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.error)
    }
}

/// Errors surfaced by [`HttpConnection`](crate::HttpConnection) operations.
#[derive(Debug, Clone, Error)]
pub enum ConnectionError {
    /// The connection has been disposed; it cannot be started again.
    #[error("Cannot access a disposed object.\nObject name: '{object_name}'.")]
    Disposed {
        /// Type name of the disposed object.
        object_name: &'static str,
    },

    /// Every candidate transport failed to start.
    #[error("{}", render_all_failed(failures, *include_details))]
    AllTransportsFailed {
        /// Per-candidate failures, in attempt order.
        failures: Vec<TransportFailure>,
        /// Whether the message lists the individual failures.
        include_details: bool,
    },

    /// The candidate list could not be obtained.
    #[error("negotiation failed: {0}")]
    Negotiation(#[source] TransportError),

    /// The active transport failed to stop cleanly.
    #[error("failed to stop transport: {0}")]
    TransportStop(#[source] TransportError),

    /// A transition outside the lifecycle table was requested.
    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition {
        /// State before the transition.
        from: ConnectionState,
        /// Requested state.
        to: ConnectionState,
    },

    /// The task running a pending operation did not finish.
    #[error("connection task failed: {0}")]
    TaskFailed(String),
}

impl ConnectionError {
    /// Per-candidate failures behind an aggregate error; empty for other kinds.
    pub fn failures(&self) -> &[TransportFailure] {
        match self {
            Self::AllTransportsFailed { failures, .. } => failures,
            _ => &[],
        }
    }

    /// Returns whether this error reports a disposed connection.
    pub fn is_disposed(&self) -> bool {
        matches!(self, Self::Disposed { .. })
    }
}

fn render_all_failed(failures: &[TransportFailure], include_details: bool) -> String {
    if !include_details || failures.is_empty() {
        return ALL_TRANSPORTS_FAILED.to_string();
    }
    let mut message = ALL_TRANSPORTS_FAILED.to_string();
    for failure in failures {
        message.push('\n');
        message.push_str(&failure.to_string());
    }
    message
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Result type for connection operations.
pub type ConnectionResult<T> = Result<T, ConnectionError>;
