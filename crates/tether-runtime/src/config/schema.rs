//! Configuration schema definitions.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use tether_core::{
    FallbackPolicy, HttpConnectionOptions, TransferFormat, TransportKind, TransportSelection,
};
use tether_transport::HttpOptions;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TetherConfig {
    /// Connection settings.
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

// =============================================================================
// Connection
// =============================================================================

/// Connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Server endpoint URL.
    #[serde(default)]
    pub url: String,

    /// Use only this transport instead of every transport the server offers.
    #[serde(default)]
    pub transport: Option<TransportKind>,

    /// Connect directly without asking the server's negotiate endpoint.
    #[serde(default)]
    pub skip_negotiation: bool,

    /// Transfer format requested when starting.
    #[serde(default)]
    pub transfer_format: TransferFormat,

    /// Start attempts made on each candidate before falling back.
    #[serde(default = "default_attempts_per_candidate")]
    pub attempts_per_candidate: u32,

    /// List each candidate's error in the aggregate failure message.
    #[serde(default)]
    pub include_failure_details: bool,

    /// Bearer token sent with every request.
    #[serde(default)]
    pub access_token: Option<String>,

    /// Extra headers sent with every request.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Timeout for request/response exchanges in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            transport: None,
            skip_negotiation: false,
            transfer_format: TransferFormat::default(),
            attempts_per_candidate: default_attempts_per_candidate(),
            include_failure_details: false,
            access_token: None,
            headers: BTreeMap::new(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_attempts_per_candidate() -> u32 {
    1
}

fn default_request_timeout_secs() -> u64 {
    100
}

impl ConnectionConfig {
    /// Transports the connection may use.
    pub fn selection(&self) -> TransportSelection {
        match self.transport {
            Some(kind) => TransportSelection::Only(kind),
            None => TransportSelection::Default,
        }
    }

    /// Converts to core connection options.
    pub fn to_options(&self) -> HttpConnectionOptions {
        HttpConnectionOptions {
            url: self.url.clone(),
            selection: self.selection(),
            skip_negotiation: self.skip_negotiation,
            fallback: FallbackPolicy::default()
                .with_attempts_per_candidate(self.attempts_per_candidate)
                .with_failure_details(self.include_failure_details),
        }
    }

    /// Converts to transport request settings.
    pub fn to_http_options(&self) -> HttpOptions {
        HttpOptions {
            access_token: self.access_token.clone(),
            headers: self.headers.clone(),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }
}

// =============================================================================
// Logging
// =============================================================================

/// Log verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Returns the level name as used in filter directives.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// Converts to a `tracing` level.
    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log line layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    /// Requires the `json-log` feature.
    Json,
}

/// Where log lines go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    /// Requires `file_path`.
    File,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SpanEventConfig {
    #[serde(default)]
    pub new: bool,
    #[serde(default)]
    pub enter: bool,
    #[serde(default)]
    pub exit: bool,
    #[serde(default)]
    pub close: bool,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Level for the Tether crates.
    #[serde(default)]
    pub level: LogLevel,

    /// Level for every other crate.
    #[serde(default = "default_dependency_level")]
    pub dependency_level: LogLevel,

    /// Line layout.
    #[serde(default)]
    pub format: LogFormat,

    /// Destination.
    #[serde(default)]
    pub output: LogOutput,

    /// Span lifecycle events.
    #[serde(default)]
    pub span_events: SpanEventConfig,

    /// Include thread ids.
    #[serde(default)]
    pub thread_ids: bool,

    /// Include file and line.
    #[serde(default)]
    pub file_location: bool,

    /// Log file for `output = "file"`.
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    /// Per-module levels, e.g. `tether_transport = "debug"`.
    #[serde(default)]
    pub filters: BTreeMap<String, LogLevel>,
}

fn default_dependency_level() -> LogLevel {
    LogLevel::Warn
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::default(),
            dependency_level: default_dependency_level(),
            format: LogFormat::default(),
            output: LogOutput::default(),
            span_events: SpanEventConfig::default(),
            thread_ids: false,
            file_location: false,
            file_path: None,
            filters: BTreeMap::new(),
        }
    }
}
