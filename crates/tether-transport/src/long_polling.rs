//! Long-polling transport.
//!
//! Each poll is a GET the server holds open until it has data (`200`), wants
//! the client gone (`204`) or the poll times out. Sends are POSTs and `stop`
//! sends a DELETE so the server can drop the connection right away.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use reqwest::{Client, StatusCode};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use tether_core::{
    DuplexChannel, PipeWriter, TransferFormat, Transport, TransportError, TransportKind,
    TransportResult, channel, drain_outbound,
};

use crate::http::{HttpOptions, ensure_success, request_error};

/// How long a single poll may be held by the server before the client retries.
pub const POLL_TIMEOUT: Duration = Duration::from_secs(100);

struct Session {
    shutdown: CancellationToken,
    inbound: PipeWriter,
    poll: JoinHandle<()>,
    send: JoinHandle<()>,
}

/// Transport receiving over repeated long polls and sending over HTTP POST.
pub struct LongPollingTransport {
    url: String,
    client: Client,
    options: HttpOptions,
    session: Mutex<Option<Session>>,
}

impl LongPollingTransport {
    /// Creates a transport for the given endpoint.
    pub fn new(url: impl Into<String>, client: Client, options: HttpOptions) -> Self {
        Self {
            url: url.into(),
            client,
            options,
            session: Mutex::new(None),
        }
    }
}

/// What one poll produced.
#[derive(Debug, PartialEq, Eq)]
enum PollOutcome {
    Data(Bytes),
    Empty,
    Closed,
}

async fn poll_once(
    client: &Client,
    options: &HttpOptions,
    url: &str,
) -> TransportResult<PollOutcome> {
    let response = options
        .authorize(client.get(url))
        .timeout(POLL_TIMEOUT)
        .send()
        .await;

    let response = match response {
        Ok(response) => response,
        Err(e) if e.is_timeout() => return Ok(PollOutcome::Empty),
        Err(e) => return Err(request_error(url, e)),
    };

    if response.status() == StatusCode::NO_CONTENT {
        return Ok(PollOutcome::Closed);
    }

    let response = ensure_success(response).await?;
    let body = response
        .bytes()
        .await
        .map_err(|e| TransportError::ReceiveFailed(e.to_string()))?;
    if body.is_empty() {
        Ok(PollOutcome::Empty)
    } else {
        Ok(PollOutcome::Data(body))
    }
}

#[async_trait]
impl Transport for LongPollingTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::LongPolling
    }

    async fn start(&self, format: TransferFormat) -> TransportResult<DuplexChannel> {
        info!(url = %self.url, format = %format, "Starting long-polling transport");

        // The first poll proves the server accepts this connection.
        let first = poll_once(&self.client, &self.options, &self.url).await?;
        if first == PollOutcome::Closed {
            return Err(TransportError::ConnectionClosed {
                reason: "server closed the connection on the first poll".into(),
            });
        }

        let (application, transport) = channel::pair();
        let (outbound, inbound) = transport.into_parts();
        if let PollOutcome::Data(data) = first {
            inbound.write(data)?;
        }

        let shutdown = CancellationToken::new();
        let poll = tokio::spawn(run_poll_loop(
            self.client.clone(),
            self.options.clone(),
            self.url.clone(),
            inbound.clone(),
            shutdown.clone(),
        ));

        let client = self.client.clone();
        let options = self.options.clone();
        let url = self.url.clone();
        let send = tokio::spawn({
            let inbound = inbound.clone();
            async move {
                let _ = drain_outbound(outbound, inbound, |chunk| {
                    let request = options.request(client.post(&url).body(chunk));
                    async move {
                        let response = request
                            .send()
                            .await
                            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
                        ensure_success(response).await.map(|_| ())
                    }
                })
                .await;
            }
        });

        *self.session.lock() = Some(Session {
            shutdown,
            inbound,
            poll,
            send,
        });
        Ok(application)
    }

    async fn stop(&self) -> TransportResult<()> {
        let Some(session) = self.session.lock().take() else {
            return Ok(());
        };

        session.shutdown.cancel();
        session.send.abort();
        let _ = session.send.await;
        session
            .poll
            .await
            .map_err(|e| TransportError::Io(format!("poll task failed: {e}")))?;

        let delete = self
            .options
            .request(self.client.delete(&self.url))
            .send()
            .await;
        if let Err(e) = delete {
            debug!(error = %e, "DELETE on stop failed");
        }

        session.inbound.complete(None);
        info!(url = %self.url, "Long-polling transport stopped");
        Ok(())
    }
}

async fn run_poll_loop(
    client: Client,
    options: HttpOptions,
    url: String,
    inbound: PipeWriter,
    shutdown: CancellationToken,
) {
    loop {
        let outcome = tokio::select! {
            () = shutdown.cancelled() => return,
            outcome = poll_once(&client, &options, &url) => outcome,
        };

        match outcome {
            Ok(PollOutcome::Data(data)) => {
                trace!(len = data.len(), "Received poll data");
                if inbound.write(data).is_err() {
                    return;
                }
            }
            Ok(PollOutcome::Empty) => {}
            Ok(PollOutcome::Closed) => {
                info!(url = %url, "Server closed long-polling connection");
                inbound.complete(None);
                return;
            }
            Err(err) => {
                warn!(error = %err, "Poll failed");
                inbound.complete(Some(err));
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_start_fails_when_first_poll_fails() {
        let transport = LongPollingTransport::new(
            "http://127.0.0.1:1/chat",
            Client::new(),
            HttpOptions::default(),
        );
        let err = transport.start(TransferFormat::Text).await.unwrap_err();
        assert!(matches!(err, TransportError::ConnectionFailed { .. }));
    }

    #[tokio::test]
    async fn test_stop_without_start_is_noop() {
        let transport = LongPollingTransport::new(
            "http://127.0.0.1:1/chat",
            Client::new(),
            HttpOptions::default(),
        );
        transport.stop().await.unwrap();
    }
}
