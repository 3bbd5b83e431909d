//! Transport capability contract.
//!
//! A transport turns a server endpoint into a live [`DuplexChannel`]. The core
//! never constructs wire traffic itself; it asks a [`TransportFactory`] for a
//! fresh transport per attempt and drives it through `start`, `ready` and
//! `stop`.

pub mod config;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::channel::DuplexChannel;
use crate::error::{TransportError, TransportResult};

pub use config::{FallbackPolicy, HttpConnectionOptions, TransportSelection};

// =============================================================================
// Transport Kinds
// =============================================================================

/// The wire mechanisms a connection can run over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportKind {
    /// Persistent full-duplex socket.
    WebSockets,
    /// Server-push event stream with separate send requests.
    ServerSentEvents,
    /// Repeated long-held poll requests with separate send requests.
    LongPolling,
}

impl TransportKind {
    /// Preference order used when nothing narrows the candidate list.
    pub const DEFAULT_ORDER: [TransportKind; 3] = [
        TransportKind::WebSockets,
        TransportKind::ServerSentEvents,
        TransportKind::LongPolling,
    ];

    /// Returns the transport name as used in negotiation responses.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::WebSockets => "WebSockets",
            Self::ServerSentEvents => "ServerSentEvents",
            Self::LongPolling => "LongPolling",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportKind {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "WebSockets" => Ok(Self::WebSockets),
            "ServerSentEvents" => Ok(Self::ServerSentEvents),
            "LongPolling" => Ok(Self::LongPolling),
            other => Err(TransportError::InvalidConfig(format!(
                "unknown transport '{other}'"
            ))),
        }
    }
}

/// Encoding of the bytes carried by a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TransferFormat {
    /// UTF-8 text payloads.
    #[default]
    Text,
    /// Arbitrary binary payloads.
    Binary,
}

impl TransferFormat {
    /// Returns the format name as used in negotiation responses.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "Text",
            Self::Binary => "Binary",
        }
    }
}

impl fmt::Display for TransferFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Capability Traits
// =============================================================================

/// A transport instance driven by the negotiator and the connection.
///
/// Each instance is used for a single attempt: started at most once and, if
/// it became active, stopped at most once.
#[async_trait]
pub trait Transport: Send + Sync {
    /// The kind of this transport.
    fn kind(&self) -> TransportKind;

    /// Starts the transport and returns the application side of its channel.
    async fn start(&self, format: TransferFormat) -> TransportResult<DuplexChannel>;

    /// Waits until the transport counts as started.
    ///
    /// Transports that only know they are usable after the server's first
    /// response override this; the default is ready as soon as `start` returns.
    async fn ready(&self) -> TransportResult<()> {
        Ok(())
    }

    /// Stops the transport and releases its resources.
    async fn stop(&self) -> TransportResult<()>;
}

/// Boxed transport.
pub type BoxedTransport = Box<dyn Transport>;

/// Creates transport instances for the candidates chosen by negotiation.
pub trait TransportFactory: Send + Sync {
    /// Creates a transport of `kind` talking to `url`.
    fn create(&self, kind: TransportKind, url: &str) -> TransportResult<BoxedTransport>;
}

impl<F> TransportFactory for F
where
    F: Fn(TransportKind, &str) -> TransportResult<BoxedTransport> + Send + Sync,
{
    fn create(&self, kind: TransportKind, url: &str) -> TransportResult<BoxedTransport> {
        self(kind, url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_order() {
        assert_eq!(TransportKind::DEFAULT_ORDER.len(), 3);
        assert_eq!(TransportKind::DEFAULT_ORDER[0], TransportKind::WebSockets);
        assert_eq!(TransportKind::DEFAULT_ORDER[2], TransportKind::LongPolling);
    }

    #[test]
    fn test_kind_round_trips_through_name() {
        for kind in TransportKind::DEFAULT_ORDER {
            assert_eq!(kind.as_str().parse::<TransportKind>().unwrap(), kind);
        }
        assert!("Carrier".parse::<TransportKind>().is_err());
    }

    #[test]
    fn test_kind_serde_names() {
        let json = serde_json::to_string(&TransportKind::ServerSentEvents).unwrap();
        assert_eq!(json, "\"ServerSentEvents\"");
    }
}
