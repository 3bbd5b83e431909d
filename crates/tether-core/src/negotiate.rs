//! Transport negotiation and fallback.
//!
//! The negotiator asks a [`CandidateSource`] for the ordered candidate list,
//! then tries each candidate in turn until one produces a live channel. A
//! failed candidate is stopped and dropped before the next one is tried, so it
//! never leaves resources behind.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::channel::DuplexChannel;
use crate::error::{
    ConnectionError, ConnectionResult, TransportError, TransportFailure, TransportResult,
};
use crate::transport::{
    BoxedTransport, FallbackPolicy, TransferFormat, TransportFactory, TransportKind,
    TransportSelection,
};

// =============================================================================
// Candidates
// =============================================================================

/// A transport offered for use, with the formats it can carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportCandidate {
    /// The transport kind.
    pub kind: TransportKind,
    /// Formats the transport supports.
    pub transfer_formats: Vec<TransferFormat>,
}

impl TransportCandidate {
    /// Creates a candidate supporting every format.
    pub fn new(kind: TransportKind) -> Self {
        Self {
            kind,
            transfer_formats: vec![TransferFormat::Text, TransferFormat::Binary],
        }
    }

    /// Creates a candidate supporting only the given formats.
    pub fn with_formats(kind: TransportKind, formats: impl Into<Vec<TransferFormat>>) -> Self {
        Self {
            kind,
            transfer_formats: formats.into(),
        }
    }

    /// Returns whether the candidate can carry `format`.
    pub fn supports(&self, format: TransferFormat) -> bool {
        self.transfer_formats.contains(&format)
    }
}

/// Outcome of asking the server (or the configuration) which transports to use.
#[derive(Debug, Clone)]
pub struct Negotiation {
    /// Endpoint the transports connect to.
    pub url: String,
    /// Server-assigned connection id, if any.
    pub connection_id: Option<String>,
    /// Candidates in preference order.
    pub candidates: Vec<TransportCandidate>,
}

/// Supplies the ordered candidate list for one start attempt.
#[async_trait]
pub trait CandidateSource: Send + Sync {
    /// Produces the candidates to try.
    async fn negotiate(&self) -> TransportResult<Negotiation>;
}

/// A fixed candidate list, used when negotiation with the server is skipped.
#[derive(Debug, Clone)]
pub struct StaticCandidates {
    url: String,
    candidates: Vec<TransportCandidate>,
}

impl StaticCandidates {
    /// Candidates for `selection`: all three kinds in preference order, or the forced one.
    pub fn new(url: impl Into<String>, selection: TransportSelection) -> Self {
        Self {
            url: url.into(),
            candidates: selection
                .kinds()
                .into_iter()
                .map(TransportCandidate::new)
                .collect(),
        }
    }

    /// An explicit candidate list.
    pub fn from_candidates(url: impl Into<String>, candidates: Vec<TransportCandidate>) -> Self {
        Self {
            url: url.into(),
            candidates,
        }
    }
}

#[async_trait]
impl CandidateSource for StaticCandidates {
    async fn negotiate(&self) -> TransportResult<Negotiation> {
        Ok(Negotiation {
            url: self.url.clone(),
            connection_id: None,
            candidates: self.candidates.clone(),
        })
    }
}

// =============================================================================
// Active Transport
// =============================================================================

/// The transport that won negotiation, with the application side of its channel.
pub struct ActiveTransport {
    /// The running transport.
    pub transport: BoxedTransport,
    /// Application side of the transport's channel.
    pub channel: DuplexChannel,
    /// Server-assigned connection id, if any.
    pub connection_id: Option<String>,
}

impl ActiveTransport {
    /// The kind of the active transport.
    pub fn kind(&self) -> TransportKind {
        self.transport.kind()
    }
}

impl fmt::Debug for ActiveTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveTransport")
            .field("kind", &self.kind())
            .field("connection_id", &self.connection_id)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Negotiator
// =============================================================================

/// Turns a candidate list into one live transport or a single aggregate failure.
pub struct TransportNegotiator {
    source: Arc<dyn CandidateSource>,
    factory: Arc<dyn TransportFactory>,
    selection: TransportSelection,
    policy: FallbackPolicy,
}

impl TransportNegotiator {
    /// Creates a negotiator.
    pub fn new(source: Arc<dyn CandidateSource>, factory: Arc<dyn TransportFactory>) -> Self {
        Self {
            source,
            factory,
            selection: TransportSelection::Default,
            policy: FallbackPolicy::default(),
        }
    }

    /// Restricts which negotiated candidates are tried.
    pub fn with_selection(mut self, selection: TransportSelection) -> Self {
        self.selection = selection;
        self
    }

    /// Sets the fallback policy.
    pub fn with_policy(mut self, policy: FallbackPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Tries candidates in order until one starts.
    pub async fn connect(&self, format: TransferFormat) -> ConnectionResult<ActiveTransport> {
        let negotiation = self
            .source
            .negotiate()
            .await
            .map_err(ConnectionError::Negotiation)?;

        let candidates = self.narrow(negotiation.candidates);
        let mut failures = Vec::new();

        if candidates.is_empty() {
            if let TransportSelection::Only(kind) = self.selection {
                failures.push(TransportFailure {
                    kind,
                    error: TransportError::NotAvailable { transport: kind },
                });
            }
        }

        for candidate in candidates {
            if !candidate.supports(format) {
                debug!(
                    transport = %candidate.kind,
                    format = %format,
                    "Skipping transport that does not support the requested format"
                );
                failures.push(TransportFailure {
                    kind: candidate.kind,
                    error: TransportError::UnsupportedFormat {
                        transport: candidate.kind,
                        format,
                    },
                });
                continue;
            }

            for attempt in 1..=self.policy.attempts_per_candidate.max(1) {
                debug!(transport = %candidate.kind, attempt, "Starting transport");
                match self.attempt(candidate.kind, &negotiation.url, format).await {
                    Ok((transport, channel)) => {
                        info!(transport = %candidate.kind, url = %negotiation.url, "Transport started");
                        return Ok(ActiveTransport {
                            transport,
                            channel,
                            connection_id: negotiation.connection_id,
                        });
                    }
                    Err(error) => {
                        warn!(transport = %candidate.kind, attempt, error = %error, "Transport failed to start");
                        failures.push(TransportFailure {
                            kind: candidate.kind,
                            error,
                        });
                    }
                }
            }
        }

        Err(ConnectionError::AllTransportsFailed {
            failures,
            include_details: self.policy.include_failure_details,
        })
    }

    fn narrow(&self, candidates: Vec<TransportCandidate>) -> Vec<TransportCandidate> {
        match self.selection {
            TransportSelection::Default => candidates,
            TransportSelection::Only(kind) => candidates
                .into_iter()
                .filter(|c| c.kind == kind)
                .take(1)
                .collect(),
        }
    }

    /// Starts one transport and waits for it to become ready.
    async fn attempt(
        &self,
        kind: TransportKind,
        url: &str,
        format: TransferFormat,
    ) -> TransportResult<(BoxedTransport, DuplexChannel)> {
        let transport = self.factory.create(kind, url)?;
        let channel = transport.start(format).await?;

        if let Err(err) = transport.ready().await {
            if let Err(stop_err) = transport.stop().await {
                debug!(transport = %kind, error = %stop_err, "Failed to stop transport that never became ready");
            }
            return Err(err);
        }

        Ok((transport, channel))
    }
}

impl fmt::Debug for TransportNegotiator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportNegotiator")
            .field("selection", &self.selection)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ALL_TRANSPORTS_FAILED;
    use crate::test_support::{MockFactory, MockTransport};
    use std::time::Duration;

    fn negotiator(factory: &Arc<MockFactory>, selection: TransportSelection) -> TransportNegotiator {
        let source = Arc::new(StaticCandidates::new("http://localhost/hub", selection));
        TransportNegotiator::new(source, Arc::clone(factory) as Arc<dyn TransportFactory>)
            .with_selection(selection)
    }

    #[tokio::test]
    async fn test_falls_back_to_second_candidate() {
        let factory = MockFactory::new(|kind| match kind {
            TransportKind::WebSockets => MockTransport::failing(kind),
            _ => MockTransport::new(kind),
        });

        let active = negotiator(&factory, TransportSelection::Default)
            .connect(TransferFormat::Text)
            .await
            .unwrap();

        assert_eq!(active.kind(), TransportKind::ServerSentEvents);
        assert_eq!(factory.start_calls(), 2);
    }

    #[tokio::test]
    async fn test_all_candidates_fail() {
        let factory = MockFactory::new(MockTransport::failing);

        let err = negotiator(&factory, TransportSelection::Default)
            .connect(TransferFormat::Text)
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), ALL_TRANSPORTS_FAILED);
        assert_eq!(err.failures().len(), 3);
        assert_eq!(factory.start_calls(), 3);
    }

    #[tokio::test]
    async fn test_forced_transport_has_no_fallback() {
        let factory = MockFactory::new(MockTransport::failing);

        let err = negotiator(&factory, TransportSelection::Only(TransportKind::LongPolling))
            .connect(TransferFormat::Text)
            .await
            .unwrap_err();

        assert_eq!(factory.start_calls(), 1);
        assert_eq!(err.failures()[0].kind, TransportKind::LongPolling);
    }

    #[tokio::test]
    async fn test_attempts_per_candidate() {
        let factory = MockFactory::new(MockTransport::failing);

        let err = negotiator(&factory, TransportSelection::Default)
            .with_policy(FallbackPolicy::default().with_attempts_per_candidate(2))
            .connect(TransferFormat::Text)
            .await
            .unwrap_err();

        assert_eq!(factory.start_calls(), 6);
        assert_eq!(err.failures().len(), 6);
    }

    #[tokio::test]
    async fn test_zero_attempts_still_tries_each_candidate() {
        let factory = MockFactory::new(MockTransport::failing);
        let policy = FallbackPolicy {
            attempts_per_candidate: 0,
            ..Default::default()
        };

        let err = negotiator(&factory, TransportSelection::Default)
            .with_policy(policy)
            .connect(TransferFormat::Text)
            .await
            .unwrap_err();

        assert_eq!(factory.start_calls(), 3);
        assert_eq!(err.failures().len(), 3);
    }

    #[tokio::test]
    async fn test_skips_candidates_without_format() {
        let factory = MockFactory::new(MockTransport::new);
        let source = Arc::new(StaticCandidates::from_candidates(
            "http://localhost/hub",
            vec![
                TransportCandidate::with_formats(
                    TransportKind::ServerSentEvents,
                    [TransferFormat::Text],
                ),
                TransportCandidate::new(TransportKind::LongPolling),
            ],
        ));

        let active = TransportNegotiator::new(source, Arc::clone(&factory) as Arc<dyn TransportFactory>)
            .connect(TransferFormat::Binary)
            .await
            .unwrap();

        assert_eq!(active.kind(), TransportKind::LongPolling);
        assert_eq!(factory.start_calls(), 1);
    }

    #[tokio::test]
    async fn test_failure_details_opt_in() {
        let factory = MockFactory::new(MockTransport::failing);

        let err = negotiator(&factory, TransportSelection::Default)
            .with_policy(FallbackPolicy::default().with_failure_details(true))
            .connect(TransferFormat::Text)
            .await
            .unwrap_err();

        let message = err.to_string();
        assert!(message.starts_with(ALL_TRANSPORTS_FAILED));
        assert!(message.contains("WebSockets: "));
    }

    #[tokio::test]
    async fn test_gated_transport_waits_for_first_response() {
        let factory = MockFactory::new(MockTransport::gated);
        let negotiator = negotiator(&factory, TransportSelection::Only(TransportKind::ServerSentEvents));

        let connect = tokio::spawn(async move { negotiator.connect(TransferFormat::Text).await });

        let transport = factory.wait_for_transport(0).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!connect.is_finished());

        transport.open_gate(Ok(()));
        let active = connect.await.unwrap().unwrap();
        assert_eq!(active.kind(), TransportKind::ServerSentEvents);
    }

    #[tokio::test]
    async fn test_gated_transport_failure_is_terminal_when_forced() {
        let factory = MockFactory::new(MockTransport::gated);
        let negotiator = negotiator(&factory, TransportSelection::Only(TransportKind::ServerSentEvents));

        let connect = tokio::spawn(async move { negotiator.connect(TransferFormat::Text).await });

        let transport = factory.wait_for_transport(0).await;
        transport.open_gate(Err(TransportError::ReadinessFailed {
            transport: TransportKind::ServerSentEvents,
            reason: "HTTP 500".into(),
        }));

        let err = connect.await.unwrap().unwrap_err();
        assert!(matches!(
            err.failures()[0].error,
            TransportError::ReadinessFailed { .. }
        ));
        assert_eq!(factory.start_calls(), 1);
        assert_eq!(transport.stop_calls(), 1);
    }
}
