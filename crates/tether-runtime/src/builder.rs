//! Assembles an [`HttpConnection`] from configuration.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use tether_core::{
    CandidateSource, FallbackPolicy, HttpConnection, HttpConnectionOptions, StaticCandidates,
    TransferFormat, TransportFactory, TransportKind,
};
use tether_transport::{DefaultTransportFactory, HttpNegotiator, HttpOptions};

use crate::config::{ConnectionConfig, TetherConfig, validate_connection_config};
use crate::error::RuntimeResult;

/// Builds a connection wired to the transports compiled into this build.
///
/// # Example
///
/// ```rust,ignore
/// let connection = ConnectionBuilder::new("http://localhost:5000/chat")
///     .with_access_token("secret")
///     .with_transport(TransportKind::WebSockets)
///     .build()?;
/// connection.start(TransferFormat::Text).await?;
/// ```
pub struct ConnectionBuilder {
    options: HttpConnectionOptions,
    http: HttpOptions,
    format: TransferFormat,
    source: Option<Arc<dyn CandidateSource>>,
    factory: Option<Arc<dyn TransportFactory>>,
}

impl ConnectionBuilder {
    /// Creates a builder for the given endpoint.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            options: HttpConnectionOptions::new(url),
            http: HttpOptions::default(),
            format: TransferFormat::default(),
            source: None,
            factory: None,
        }
    }

    /// Creates a builder from validated connection settings.
    pub fn from_config(config: &ConnectionConfig) -> RuntimeResult<Self> {
        validate_connection_config(config)?;
        Ok(Self {
            options: config.to_options(),
            http: config.to_http_options(),
            format: config.transfer_format,
            source: None,
            factory: None,
        })
    }

    /// Restricts the connection to one transport.
    pub fn with_transport(mut self, kind: TransportKind) -> Self {
        self.options = self.options.with_transport(kind);
        self
    }

    /// Connects without the negotiate round trip.
    pub fn skip_negotiation(mut self) -> Self {
        self.options = self.options.skip_negotiation();
        self
    }

    /// Sets the fallback policy.
    pub fn with_fallback(mut self, fallback: FallbackPolicy) -> Self {
        self.options = self.options.with_fallback(fallback);
        self
    }

    /// Sets the bearer token.
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.http = self.http.with_access_token(token);
        self
    }

    /// Adds a header sent with every request.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.http = self.http.with_header(name, value);
        self
    }

    /// Sets the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.http = self.http.with_request_timeout(timeout);
        self
    }

    /// Sets the format [`ConnectionBuilder::connect`] starts with.
    pub fn with_transfer_format(mut self, format: TransferFormat) -> Self {
        self.format = format;
        self
    }

    /// Replaces the server negotiation with a custom candidate source.
    pub fn with_candidate_source(mut self, source: Arc<dyn CandidateSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Replaces the default transport factory.
    pub fn with_factory(mut self, factory: Arc<dyn TransportFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Builds the connection without starting it.
    pub fn build(self) -> RuntimeResult<HttpConnection> {
        let client = self.http.build_client()?;

        let factory = match self.factory {
            Some(factory) => factory,
            None => Arc::new(DefaultTransportFactory::with_client(
                client.clone(),
                self.http.clone(),
            )),
        };

        let source: Arc<dyn CandidateSource> = match self.source {
            Some(source) => source,
            None if self.options.skip_negotiation => Arc::new(StaticCandidates::new(
                self.options.url.clone(),
                self.options.selection,
            )),
            None => Arc::new(HttpNegotiator::with_client(
                self.options.url.clone(),
                client,
                self.http,
            )),
        };

        debug!(
            url = %self.options.url,
            selection = ?self.options.selection,
            skip_negotiation = self.options.skip_negotiation,
            "Building connection"
        );

        // The source already accounts for skip_negotiation.
        let options = HttpConnectionOptions {
            skip_negotiation: false,
            ..self.options
        };
        Ok(HttpConnection::new(&options, source, factory))
    }

    /// Builds and starts the connection.
    pub async fn connect(self) -> RuntimeResult<HttpConnection> {
        let format = self.format;
        let connection = self.build()?;
        connection.start(format).await?;
        Ok(connection)
    }
}

/// Builds and starts a connection from a loaded configuration.
pub async fn connect(config: &TetherConfig) -> RuntimeResult<HttpConnection> {
    ConnectionBuilder::from_config(&config.connection)?
        .connect()
        .await
}
