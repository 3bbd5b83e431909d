//! HTTP plumbing shared by the negotiator and every transport.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, ClientBuilder, RequestBuilder, Response, Url};

use tether_core::{TransportError, TransportResult};

/// Default timeout for individual HTTP requests.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(100);

/// Request settings applied to every HTTP call a connection makes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpOptions {
    /// Bearer token sent with each request.
    pub access_token: Option<String>,
    /// Extra headers sent with each request.
    pub headers: BTreeMap<String, String>,
    /// Timeout for request/response exchanges. Long-lived streams are not bound by it.
    pub request_timeout: Duration,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            access_token: None,
            headers: BTreeMap::new(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl HttpOptions {
    /// Sets the bearer token.
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// Adds a header sent with every request.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Sets the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Converts the configured headers, rejecting invalid names or values.
    pub fn header_map(&self) -> TransportResult<HeaderMap> {
        let mut map = HeaderMap::with_capacity(self.headers.len());
        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| TransportError::InvalidConfig(format!("header '{name}': {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| TransportError::InvalidConfig(format!("header '{name}': {e}")))?;
            map.insert(name, value);
        }
        Ok(map)
    }

    /// Builds the client shared by a connection's requests.
    ///
    /// No client-wide timeout is set because event streams and polls outlive
    /// it; [`HttpOptions::request`] applies the timeout per exchange.
    pub fn build_client(&self) -> TransportResult<Client> {
        ClientBuilder::new()
            .default_headers(self.header_map()?)
            .build()
            .map_err(|e| TransportError::InvalidConfig(format!("HTTP client: {e}")))
    }

    /// Adds authentication and the request timeout to a request/response exchange.
    pub fn request(&self, builder: RequestBuilder) -> RequestBuilder {
        self.authorize(builder).timeout(self.request_timeout)
    }

    /// Adds authentication only, for long-lived requests.
    pub fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.access_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

/// Parses an endpoint URL.
pub fn parse_url(url: &str) -> TransportResult<Url> {
    Url::parse(url).map_err(|e| TransportError::InvalidConfig(format!("invalid URL '{url}': {e}")))
}

/// Maps a reqwest failure onto a transport error.
pub(crate) fn request_error(url: &str, err: reqwest::Error) -> TransportError {
    if err.is_connect() || err.is_timeout() {
        TransportError::ConnectionFailed {
            url: url.to_string(),
            reason: err.to_string(),
        }
    } else {
        TransportError::Io(err.to_string())
    }
}

/// Fails with [`TransportError::Http`] on a non-success status.
pub(crate) async fn ensure_success(response: Response) -> TransportResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let reason = if text.is_empty() {
        status.canonical_reason().unwrap_or("unknown status").to_string()
    } else {
        text
    };
    Err(TransportError::Http {
        status: status.as_u16(),
        reason,
    })
}
