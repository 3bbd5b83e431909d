//! Configuration types for connections and transport selection.

use serde::{Deserialize, Serialize};

use super::TransportKind;

// =============================================================================
// Transport Selection
// =============================================================================

/// Which transports a connection may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportSelection {
    /// Every transport the server offers, in preference order.
    #[default]
    Default,
    /// Only this transport; a failure is terminal.
    Only(TransportKind),
}

impl TransportSelection {
    /// Returns whether `kind` is allowed by this selection.
    pub fn allows(self, kind: TransportKind) -> bool {
        match self {
            Self::Default => true,
            Self::Only(only) => only == kind,
        }
    }

    /// The candidate kinds used when no server negotiation takes place.
    pub fn kinds(self) -> Vec<TransportKind> {
        match self {
            Self::Default => TransportKind::DEFAULT_ORDER.to_vec(),
            Self::Only(kind) => vec![kind],
        }
    }
}

// =============================================================================
// Fallback Policy
// =============================================================================

/// How the negotiator walks the candidate list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackPolicy {
    /// Start attempts made on each candidate before moving to the next.
    pub attempts_per_candidate: u32,
    /// Whether the aggregate failure message lists each candidate's error.
    pub include_failure_details: bool,
}

impl Default for FallbackPolicy {
    fn default() -> Self {
        Self {
            attempts_per_candidate: 1,
            include_failure_details: false,
        }
    }
}

impl FallbackPolicy {
    /// Sets the attempts made on each candidate (at least one).
    pub fn with_attempts_per_candidate(mut self, attempts: u32) -> Self {
        self.attempts_per_candidate = attempts.max(1);
        self
    }

    /// Lists per-candidate errors in the aggregate failure message.
    pub fn with_failure_details(mut self, enabled: bool) -> Self {
        self.include_failure_details = enabled;
        self
    }
}

// =============================================================================
// Connection Options
// =============================================================================

/// Configuration for an [`HttpConnection`](crate::HttpConnection).
#[derive(Debug, Clone)]
pub struct HttpConnectionOptions {
    /// Server endpoint URL.
    pub url: String,
    /// Transports the connection may use.
    pub selection: TransportSelection,
    /// Connect directly with the selected transport instead of asking the server.
    pub skip_negotiation: bool,
    /// Fallback behaviour across candidates.
    pub fallback: FallbackPolicy,
}

impl Default for HttpConnectionOptions {
    fn default() -> Self {
        Self {
            url: String::new(),
            selection: TransportSelection::Default,
            skip_negotiation: false,
            fallback: FallbackPolicy::default(),
        }
    }
}

impl HttpConnectionOptions {
    /// Creates options for the given server URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Restricts the connection to a single transport.
    pub fn with_transport(mut self, kind: TransportKind) -> Self {
        self.selection = TransportSelection::Only(kind);
        self
    }

    /// Skips the negotiate round trip.
    pub fn skip_negotiation(mut self) -> Self {
        self.skip_negotiation = true;
        self
    }

    /// Sets the fallback policy.
    pub fn with_fallback(mut self, fallback: FallbackPolicy) -> Self {
        self.fallback = fallback;
        self
    }
}
