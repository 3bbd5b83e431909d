//! Server-Sent Events transport.
//!
//! Receives over a long-lived `text/event-stream` response and sends each
//! outbound chunk as its own POST. The transport only counts as started once
//! the event stream request has been answered, so a rejected stream fails the
//! start instead of surfacing later as a dead channel.

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use parking_lot::Mutex;
use reqwest::Client;
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use tether_core::{
    DuplexChannel, PipeWriter, ReadySignal, ReadyWaiter, TransferFormat, Transport,
    TransportError, TransportKind, TransportResult, channel, drain_outbound, readiness,
};

use crate::http::{HttpOptions, ensure_success, request_error};

// =============================================================================
// Event Stream Parser
// =============================================================================

/// Incremental `text/event-stream` parser yielding the `data` of each event.
///
/// Multi-line data is joined with `\n`. Comments and fields other than `data`
/// are ignored.
#[derive(Debug, Default)]
pub struct EventStreamParser {
    line: Vec<u8>,
    data: Vec<u8>,
    has_data: bool,
}

impl EventStreamParser {
    /// Creates an empty parser.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk of the response body and returns every event it completed.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Bytes> {
        let mut events = Vec::new();
        for &byte in chunk {
            if byte == b'\n' {
                let mut line = std::mem::take(&mut self.line);
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                if let Some(event) = self.process_line(&line) {
                    events.push(event);
                }
            } else {
                self.line.push(byte);
            }
        }
        events
    }

    fn process_line(&mut self, line: &[u8]) -> Option<Bytes> {
        if line.is_empty() {
            if !self.has_data {
                return None;
            }
            self.has_data = false;
            return Some(Bytes::from(std::mem::take(&mut self.data)));
        }

        if line.starts_with(b":") {
            return None;
        }

        let (field, value) = match line.iter().position(|&b| b == b':') {
            Some(colon) => {
                let value = &line[colon + 1..];
                (&line[..colon], value.strip_prefix(b" ").unwrap_or(value))
            }
            None => (line, &[][..]),
        };

        if field == b"data" {
            if self.has_data {
                self.data.push(b'\n');
            }
            self.data.extend_from_slice(value);
            self.has_data = true;
        }
        None
    }
}

// =============================================================================
// Transport
// =============================================================================

struct Session {
    shutdown: CancellationToken,
    inbound: PipeWriter,
    receive: JoinHandle<()>,
    send: JoinHandle<()>,
}

/// Transport receiving over Server-Sent Events and sending over HTTP POST.
pub struct ServerSentEventsTransport {
    url: String,
    client: Client,
    options: HttpOptions,
    ready: Mutex<Option<ReadyWaiter>>,
    session: Mutex<Option<Session>>,
}

impl ServerSentEventsTransport {
    /// Creates a transport for the given endpoint.
    pub fn new(url: impl Into<String>, client: Client, options: HttpOptions) -> Self {
        Self {
            url: url.into(),
            client,
            options,
            ready: Mutex::new(None),
            session: Mutex::new(None),
        }
    }
}

#[async_trait]
impl Transport for ServerSentEventsTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::ServerSentEvents
    }

    async fn start(&self, format: TransferFormat) -> TransportResult<DuplexChannel> {
        if format == TransferFormat::Binary {
            return Err(TransportError::UnsupportedFormat {
                transport: TransportKind::ServerSentEvents,
                format,
            });
        }

        info!(url = %self.url, "Starting Server-Sent Events transport");

        let (application, transport) = channel::pair();
        let (outbound, inbound) = transport.into_parts();
        let (signal, waiter) = readiness::gate();
        let shutdown = CancellationToken::new();

        let receive = tokio::spawn(run_event_stream(
            self.client.clone(),
            self.options.clone(),
            self.url.clone(),
            inbound.clone(),
            signal,
            shutdown.clone(),
        ));

        let client = self.client.clone();
        let options = self.options.clone();
        let url = self.url.clone();
        let send = tokio::spawn({
            let inbound = inbound.clone();
            async move {
                let _ = drain_outbound(outbound, inbound, |chunk| {
                    post_chunk(&client, &options, &url, chunk)
                })
                .await;
            }
        });

        *self.ready.lock() = Some(waiter);
        *self.session.lock() = Some(Session {
            shutdown,
            inbound,
            receive,
            send,
        });
        Ok(application)
    }

    async fn ready(&self) -> TransportResult<()> {
        let waiter = self.ready.lock().clone();
        match waiter {
            Some(waiter) => waiter.wait().await,
            None => Err(TransportError::ChannelClosed),
        }
    }

    async fn stop(&self) -> TransportResult<()> {
        let Some(session) = self.session.lock().take() else {
            return Ok(());
        };

        session.shutdown.cancel();
        session.send.abort();
        let _ = session.send.await;
        session
            .receive
            .await
            .map_err(|e| TransportError::Io(format!("event stream task failed: {e}")))?;
        session.inbound.complete(None);

        info!(url = %self.url, "Server-Sent Events transport stopped");
        Ok(())
    }
}

async fn post_chunk(
    client: &Client,
    options: &HttpOptions,
    url: &str,
    chunk: Bytes,
) -> TransportResult<()> {
    trace!(len = chunk.len(), "Posting chunk");
    let response = options
        .request(client.post(url).body(chunk))
        .send()
        .await
        .map_err(|e| TransportError::SendFailed(e.to_string()))?;
    ensure_success(response).await.map(|_| ())
}

/// Reads the event stream into `inbound`, resolving `ready` on the first response.
async fn run_event_stream(
    client: Client,
    options: HttpOptions,
    url: String,
    inbound: PipeWriter,
    ready: ReadySignal,
    shutdown: CancellationToken,
) {
    let request = options
        .authorize(client.get(&url))
        .header(ACCEPT, "text/event-stream")
        .header(CACHE_CONTROL, "no-cache");

    let response = tokio::select! {
        () = shutdown.cancelled() => {
            ready.resolve(Err(TransportError::ConnectionClosed {
                reason: "transport stopped before the server responded".into(),
            }));
            return;
        }
        response = request.send() => response,
    };

    let response = match response {
        Ok(response) => response,
        Err(e) => {
            let err = request_error(&url, e);
            fail(&ready, &inbound, err);
            return;
        }
    };

    let response = match ensure_success(response).await {
        Ok(response) => response,
        Err(err) => {
            fail(&ready, &inbound, err);
            return;
        }
    };

    ready.resolve(Ok(()));
    debug!(url = %url, "Event stream open");

    let mut body = response.bytes_stream();
    let mut parser = EventStreamParser::new();
    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            chunk = body.next() => match chunk {
                Some(Ok(chunk)) => {
                    for event in parser.feed(&chunk) {
                        trace!(len = event.len(), "Received event");
                        if inbound.write(event).is_err() {
                            return;
                        }
                    }
                }
                Some(Err(e)) => {
                    warn!(error = %e, "Event stream failed");
                    inbound.complete(Some(TransportError::ReceiveFailed(e.to_string())));
                    return;
                }
                None => {
                    info!(url = %url, "Event stream ended by server");
                    inbound.complete(None);
                    return;
                }
            }
        }
    }
}

fn fail(ready: &ReadySignal, inbound: &PipeWriter, err: TransportError) {
    warn!(error = %err, "Event stream request failed");
    ready.resolve(Err(TransportError::ReadinessFailed {
        transport: TransportKind::ServerSentEvents,
        reason: err.to_string(),
    }));
    inbound.complete(Some(err));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parser_single_event() {
        let mut parser = EventStreamParser::new();
        let events = parser.feed(b"data: hello\n\n");
        assert_eq!(events, vec![Bytes::from_static(b"hello")]);
    }

    #[test]
    fn test_parser_joins_multiline_data() {
        let mut parser = EventStreamParser::new();
        let events = parser.feed(b"data: a\ndata: b\r\n\r\n");
        assert_eq!(events, vec![Bytes::from_static(b"a\nb")]);
    }

    #[test]
    fn test_parser_handles_split_chunks() {
        let mut parser = EventStreamParser::new();
        assert!(parser.feed(b"da").is_empty());
        assert!(parser.feed(b"ta: par").is_empty());
        assert!(parser.feed(b"tial\n").is_empty());
        assert_eq!(parser.feed(b"\n"), vec![Bytes::from_static(b"partial")]);
    }

    #[test]
    fn test_parser_ignores_comments_and_other_fields() {
        let mut parser = EventStreamParser::new();
        let events = parser.feed(b":keepalive\n\nevent: message\nid: 7\ndata:x\n\n");
        assert_eq!(events, vec![Bytes::from_static(b"x")]);
    }

    #[tokio::test]
    async fn test_binary_format_rejected() {
        let transport = ServerSentEventsTransport::new(
            "http://127.0.0.1:1/chat",
            Client::new(),
            HttpOptions::default(),
        );
        let err = transport.start(TransferFormat::Binary).await.unwrap_err();
        assert!(matches!(err, TransportError::UnsupportedFormat { .. }));
    }

    #[tokio::test]
    async fn test_unreachable_server_fails_readiness() {
        let transport = ServerSentEventsTransport::new(
            "http://127.0.0.1:1/chat",
            Client::new(),
            HttpOptions::default(),
        );
        let mut channel = transport.start(TransferFormat::Text).await.unwrap();

        let err = transport.ready().await.unwrap_err();
        assert!(matches!(err, TransportError::ReadinessFailed { .. }));
        assert!(channel.receive().await.is_err());
        transport.stop().await.unwrap();
    }
}
