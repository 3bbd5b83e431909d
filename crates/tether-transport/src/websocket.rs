//! WebSocket transport.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use tether_core::{
    DuplexChannel, PipeReader, PipeWriter, TransferFormat, Transport, TransportError,
    TransportKind, TransportResult, channel,
};

use crate::http::{HttpOptions, parse_url};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Rewrites an `http(s)` endpoint to `ws(s)` and adds the access token as a
/// query parameter.
pub fn websocket_url(url: &str, access_token: Option<&str>) -> TransportResult<String> {
    let mut parsed = parse_url(url)?;
    let scheme = match parsed.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(TransportError::InvalidConfig(format!(
                "unsupported scheme '{other}' for WebSockets"
            )));
        }
    };
    parsed
        .set_scheme(scheme)
        .map_err(|()| TransportError::InvalidConfig(format!("cannot use '{scheme}' for {url}")))?;

    if let Some(token) = access_token {
        parsed.query_pairs_mut().append_pair("access_token", token);
    }
    Ok(parsed.into())
}

struct Session {
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

/// Transport over a single full-duplex WebSocket.
pub struct WebSocketTransport {
    url: String,
    options: HttpOptions,
    session: Mutex<Option<Session>>,
}

impl WebSocketTransport {
    /// Creates a transport for the given endpoint.
    pub fn new(url: impl Into<String>, options: HttpOptions) -> Self {
        Self {
            url: url.into(),
            options,
            session: Mutex::new(None),
        }
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::WebSockets
    }

    async fn start(&self, format: TransferFormat) -> TransportResult<DuplexChannel> {
        let url = websocket_url(&self.url, self.options.access_token.as_deref())?;
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::InvalidConfig(e.to_string()))?;
        for (name, value) in &self.options.headers {
            let header = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| TransportError::InvalidConfig(format!("header '{name}': {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| TransportError::InvalidConfig(format!("header '{name}': {e}")))?;
            request.headers_mut().insert(header, value);
        }

        info!(url = %self.url, format = %format, "Connecting WebSocket transport");

        let (stream, _response) =
            connect_async(request)
                .await
                .map_err(|e| TransportError::ConnectionFailed {
                    url: self.url.clone(),
                    reason: format!("WebSocket connection failed: {e}"),
                })?;
        let (sink, source) = stream.split();

        let (application, transport) = channel::pair();
        let (outbound, inbound) = transport.into_parts();
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(run_socket(
            sink,
            source,
            outbound,
            inbound,
            format,
            shutdown.clone(),
        ));

        *self.session.lock() = Some(Session { shutdown, task });
        debug!(url = %self.url, "WebSocket transport connected");
        Ok(application)
    }

    async fn stop(&self) -> TransportResult<()> {
        let Some(session) = self.session.lock().take() else {
            return Ok(());
        };

        session.shutdown.cancel();
        session
            .task
            .await
            .map_err(|e| TransportError::Io(format!("WebSocket task failed: {e}")))?;
        info!(url = %self.url, "WebSocket transport stopped");
        Ok(())
    }
}

/// Wraps an outbound chunk; text frames must carry valid UTF-8.
fn frame(format: TransferFormat, data: Bytes) -> TransportResult<Message> {
    match format {
        TransferFormat::Text => String::from_utf8(data.to_vec())
            .map(|text| Message::Text(text.into()))
            .map_err(|e| TransportError::SendFailed(format!("text frame is not UTF-8: {e}"))),
        TransferFormat::Binary => Ok(Message::Binary(data)),
    }
}

/// Pumps frames both ways until the socket closes or the transport is stopped.
async fn run_socket(
    mut sink: WsSink,
    mut source: WsSource,
    mut outbound: PipeReader,
    inbound: PipeWriter,
    format: TransferFormat,
    shutdown: CancellationToken,
) {
    let mut sending = true;

    loop {
        tokio::select! {
            () = shutdown.cancelled() => {
                debug!("WebSocket transport shutting down");
                let _ = sink.close().await;
                inbound.complete(None);
                break;
            }

            chunk = outbound.read(), if sending => {
                match chunk {
                    Ok(Some(data)) => {
                        let len = data.len();
                        let sent = match frame(format, data) {
                            Ok(message) => sink
                                .send(message)
                                .await
                                .map_err(|e| TransportError::SendFailed(e.to_string())),
                            Err(err) => Err(err),
                        };
                        if let Err(err) = sent {
                            warn!(error = %err, len, "Failed to send WebSocket frame");
                            inbound.complete(Some(err));
                            break;
                        }
                        trace!(len, "Sent frame");
                    }
                    Ok(None) | Err(_) => {
                        debug!("Outbound stream completed, closing socket");
                        sending = false;
                        let _ = sink.close().await;
                    }
                }
            }

            msg = source.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        trace!(len = text.len(), "Received text");
                        if inbound.write(Bytes::copy_from_slice(text.as_bytes())).is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Binary(data))) => {
                        trace!(len = data.len(), "Received binary");
                        if inbound.write(data).is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
                    Some(Ok(Message::Close(close))) => {
                        info!(reason = ?close, "Server closed WebSocket");
                        inbound.complete(None);
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket error");
                        inbound.complete(Some(TransportError::ConnectionClosed {
                            reason: e.to_string(),
                        }));
                        break;
                    }
                    None => {
                        info!("WebSocket stream ended");
                        inbound.complete(None);
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_websocket_url_rewrites_scheme() {
        assert_eq!(
            websocket_url("http://localhost:5000/chat?id=abc", None).unwrap(),
            "ws://localhost:5000/chat?id=abc"
        );
        assert_eq!(
            websocket_url("https://example.com/chat", None).unwrap(),
            "wss://example.com/chat"
        );
    }

    #[test]
    fn test_websocket_url_appends_access_token() {
        assert_eq!(
            websocket_url("http://localhost/chat?id=abc", Some("secret")).unwrap(),
            "ws://localhost/chat?id=abc&access_token=secret"
        );
    }

    #[test]
    fn test_websocket_url_rejects_other_schemes() {
        assert!(matches!(
            websocket_url("ftp://localhost/chat", None),
            Err(TransportError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_text_frame_rejects_invalid_utf8() {
        let err = frame(TransferFormat::Text, Bytes::from_static(&[0x66, 0xff, 0x6f])).unwrap_err();
        assert!(matches!(err, TransportError::SendFailed(_)));

        assert_eq!(
            frame(TransferFormat::Text, Bytes::from_static(b"hi")).unwrap(),
            Message::Text("hi".into())
        );
        assert_eq!(
            frame(TransferFormat::Binary, Bytes::from_static(&[0xff])).unwrap(),
            Message::Binary(Bytes::from_static(&[0xff]))
        );
    }

    #[tokio::test]
    async fn test_start_against_closed_port_fails() {
        let transport = WebSocketTransport::new("http://127.0.0.1:1/chat", HttpOptions::default());
        let err = transport.start(TransferFormat::Text).await.unwrap_err();
        assert!(matches!(err, TransportError::ConnectionFailed { .. }));
        transport.stop().await.unwrap();
    }
}
