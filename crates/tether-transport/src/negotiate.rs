//! Server negotiation over HTTP.
//!
//! Before picking a transport the client asks the server which transports it
//! offers:
//!
//! ```text
//! POST {url}/negotiate?negotiateVersion=1
//!
//! {
//!   "connectionId": "abc",
//!   "connectionToken": "def",
//!   "negotiateVersion": 1,
//!   "availableTransports": [
//!     { "transport": "WebSockets", "transferFormats": ["Text", "Binary"] },
//!     { "transport": "LongPolling", "transferFormats": ["Text", "Binary"] }
//!   ]
//! }
//! ```
//!
//! Transports then connect to `{url}?id={connectionToken}`.

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use tracing::{debug, info};

use tether_core::{
    CandidateSource, Negotiation, TransferFormat, TransportCandidate, TransportError,
    TransportKind, TransportResult,
};

use crate::http::{HttpOptions, ensure_success, parse_url, request_error};

/// Negotiation protocol version sent to the server.
pub const NEGOTIATE_VERSION: u32 = 1;

/// Body of a negotiate response.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NegotiateResponse {
    /// Public connection id.
    #[serde(default)]
    pub connection_id: Option<String>,
    /// Token transports present to join the connection.
    #[serde(default)]
    pub connection_token: Option<String>,
    /// Protocol version the server settled on.
    #[serde(default)]
    pub negotiate_version: u32,
    /// Transports the server offers, in the server's order.
    #[serde(default)]
    pub available_transports: Vec<AvailableTransport>,
    /// Error reported by the server instead of a negotiation.
    #[serde(default)]
    pub error: Option<String>,
}

/// One entry of `availableTransports`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableTransport {
    /// Transport name, e.g. `WebSockets`.
    pub transport: String,
    /// Formats the transport carries on this server.
    #[serde(default)]
    pub transfer_formats: Vec<String>,
}

impl NegotiateResponse {
    /// Converts the offered transports into candidates.
    ///
    /// Names this client does not know are skipped, as are unknown formats.
    pub fn candidates(&self) -> Vec<TransportCandidate> {
        self.available_transports
            .iter()
            .filter_map(|offered| {
                let kind = offered.transport.parse::<TransportKind>().ok()?;
                let formats: Vec<TransferFormat> = offered
                    .transfer_formats
                    .iter()
                    .filter_map(|format| parse_format(format))
                    .collect();
                Some(TransportCandidate::with_formats(kind, formats))
            })
            .collect()
    }
}

fn parse_format(name: &str) -> Option<TransferFormat> {
    match name {
        "Text" => Some(TransferFormat::Text),
        "Binary" => Some(TransferFormat::Binary),
        _ => None,
    }
}

/// Builds `{url}/negotiate?negotiateVersion=1`, keeping any existing query.
pub fn negotiate_url(url: &str) -> TransportResult<Url> {
    let mut parsed = parse_url(url)?;
    let path = format!("{}/negotiate", parsed.path().trim_end_matches('/'));
    parsed.set_path(&path);
    parsed
        .query_pairs_mut()
        .append_pair("negotiateVersion", &NEGOTIATE_VERSION.to_string());
    Ok(parsed)
}

/// Appends the connection token as the `id` query parameter.
pub fn connection_url(url: &str, token: &str) -> TransportResult<String> {
    let mut parsed = parse_url(url)?;
    parsed.query_pairs_mut().append_pair("id", token);
    Ok(parsed.into())
}

/// [`CandidateSource`] that asks the server's negotiate endpoint.
pub struct HttpNegotiator {
    url: String,
    client: Client,
    options: HttpOptions,
}

impl HttpNegotiator {
    /// Creates a negotiator for the given endpoint.
    pub fn new(url: impl Into<String>, options: HttpOptions) -> TransportResult<Self> {
        let client = options.build_client()?;
        Ok(Self::with_client(url, client, options))
    }

    /// Creates a negotiator sharing an existing client.
    pub fn with_client(url: impl Into<String>, client: Client, options: HttpOptions) -> Self {
        Self {
            url: url.into(),
            client,
            options,
        }
    }

    async fn fetch(&self) -> TransportResult<NegotiateResponse> {
        let endpoint = negotiate_url(&self.url)?;
        debug!(url = %endpoint, "Sending negotiate request");

        let response = self
            .options
            .request(self.client.post(endpoint))
            .send()
            .await
            .map_err(|e| request_error(&self.url, e))?;
        let response = ensure_success(response).await?;

        response
            .json::<NegotiateResponse>()
            .await
            .map_err(|e| TransportError::ReceiveFailed(format!("invalid negotiate response: {e}")))
    }
}

#[async_trait]
impl CandidateSource for HttpNegotiator {
    async fn negotiate(&self) -> TransportResult<Negotiation> {
        let response = self.fetch().await?;
        if let Some(error) = response.error {
            return Err(TransportError::ConnectionFailed {
                url: self.url.clone(),
                reason: error,
            });
        }

        let token = response
            .connection_token
            .as_deref()
            .or(response.connection_id.as_deref());
        let url = match token {
            Some(token) => connection_url(&self.url, token)?,
            None => self.url.clone(),
        };

        let candidates = response.candidates();
        info!(
            connection_id = response.connection_id.as_deref().unwrap_or("-"),
            transports = candidates.len(),
            "Negotiated connection"
        );

        Ok(Negotiation {
            url,
            connection_id: response.connection_id,
            candidates,
        })
    }
}
