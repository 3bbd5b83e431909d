//! Transport factory for the transports compiled into this build.

use reqwest::Client;
use tracing::debug;

use tether_core::{BoxedTransport, TransportError, TransportFactory, TransportKind, TransportResult};

use crate::http::HttpOptions;

/// Creates a fresh transport of the requested kind for every attempt.
///
/// Kinds whose cargo feature is disabled fail with
/// [`TransportError::NotAvailable`], which the negotiator records like any
/// other candidate failure.
#[derive(Debug, Clone)]
pub struct DefaultTransportFactory {
    client: Client,
    options: HttpOptions,
}

impl DefaultTransportFactory {
    /// Creates a factory whose transports share one HTTP client.
    pub fn new(options: HttpOptions) -> TransportResult<Self> {
        let client = options.build_client()?;
        Ok(Self::with_client(client, options))
    }

    /// Creates a factory around an existing client.
    pub fn with_client(client: Client, options: HttpOptions) -> Self {
        Self { client, options }
    }

    /// Returns the HTTP client transports are created with.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Returns the request settings transports are created with.
    pub fn options(&self) -> &HttpOptions {
        &self.options
    }

    /// Returns whether `kind` is compiled into this build.
    pub fn is_available(kind: TransportKind) -> bool {
        match kind {
            TransportKind::WebSockets => cfg!(feature = "websockets"),
            TransportKind::ServerSentEvents => cfg!(feature = "server-sent-events"),
            TransportKind::LongPolling => cfg!(feature = "long-polling"),
        }
    }
}

impl TransportFactory for DefaultTransportFactory {
    fn create(&self, kind: TransportKind, url: &str) -> TransportResult<BoxedTransport> {
        debug!(transport = %kind, url = %url, "Creating transport");

        match kind {
            #[cfg(feature = "websockets")]
            TransportKind::WebSockets => Ok(Box::new(crate::websocket::WebSocketTransport::new(
                url,
                self.options.clone(),
            ))),
            #[cfg(feature = "server-sent-events")]
            TransportKind::ServerSentEvents => Ok(Box::new(
                crate::sse::ServerSentEventsTransport::new(
                    url,
                    self.client.clone(),
                    self.options.clone(),
                ),
            )),
            #[cfg(feature = "long-polling")]
            TransportKind::LongPolling => Ok(Box::new(
                crate::long_polling::LongPollingTransport::new(
                    url,
                    self.client.clone(),
                    self.options.clone(),
                ),
            )),
            #[allow(unreachable_patterns)]
            other => Err(TransportError::NotAvailable { transport: other }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_availability_follows_features() {
        let factory = DefaultTransportFactory::new(HttpOptions::default()).unwrap();

        for kind in TransportKind::DEFAULT_ORDER {
            let created = factory.create(kind, "http://localhost/chat");
            if DefaultTransportFactory::is_available(kind) {
                assert_eq!(created.unwrap().kind(), kind);
            } else {
                assert!(matches!(
                    created,
                    Err(TransportError::NotAvailable { transport }) if transport == kind
                ));
            }
        }
    }
}
