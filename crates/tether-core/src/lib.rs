//! # Tether Core
//!
//! Transport-agnostic client connection engine.
//!
//! This crate owns everything that does not depend on a particular wire:
//! the connection lifecycle, transport negotiation with ordered fallback,
//! the duplex byte channel a transport exposes, and the readiness gate a
//! transport uses to hold `start` until the server has really answered.
//!
//! ## Layers
//!
//! - **Lifecycle**: [`HttpConnection`] and its [`ConnectionState`] machine.
//!   Concurrent `start`/`dispose` calls join the operation already in flight
//!   ([`PendingOperation`]).
//! - **Negotiation**: [`TransportNegotiator`] walks the candidates a
//!   [`CandidateSource`] returns and keeps the first transport that starts
//!   and reports ready.
//! - **Channel**: [`DuplexChannel`] built from two independent [`pipe`]s,
//!   plus [`drain_outbound`] for transport send loops.
//! - **Transport seam**: the [`Transport`] and [`TransportFactory`] traits
//!   implemented by `tether-transport`.
//!
//! ```text
//! ┌────────────────┐  start/dispose  ┌────────────────────┐  create/start  ┌───────────┐
//! │ HttpConnection │───────────────▶│ TransportNegotiator │──────────────▶│ Transport │
//! └────────────────┘                 └────────────────────┘                └───────────┘
//!         ▲                                                                      │
//!         └──────────────────────── DuplexChannel ──────────────────────────────┘
//! ```

pub mod channel;
pub mod connection;
pub mod error;
pub mod negotiate;
pub mod pending;
pub mod pipe;
pub mod readiness;
pub mod state;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use channel::{DuplexChannel, drain_outbound, pair};
pub use connection::HttpConnection;
pub use error::{
    ALL_TRANSPORTS_FAILED, ConnectionError, ConnectionResult, TransportError, TransportFailure,
    TransportResult,
};
pub use negotiate::{
    ActiveTransport, CandidateSource, Negotiation, StaticCandidates, TransportCandidate,
    TransportNegotiator,
};
pub use pending::PendingOperation;
pub use pipe::{PipeReader, PipeWriter, pipe};
pub use readiness::{ReadySignal, ReadyWaiter, gate};
pub use state::ConnectionState;
pub use transport::{
    BoxedTransport, FallbackPolicy, HttpConnectionOptions, TransferFormat, Transport,
    TransportFactory, TransportKind, TransportSelection,
};

/// Prelude for common imports.
pub mod prelude {
    pub use super::{
        ConnectionError, ConnectionResult, ConnectionState, DuplexChannel, HttpConnection,
        HttpConnectionOptions, TransferFormat, Transport, TransportError, TransportFactory,
        TransportKind, TransportResult, TransportSelection,
    };
}
