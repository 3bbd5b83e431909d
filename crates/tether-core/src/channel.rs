//! Duplex byte channel shared between a transport and its consumer.
//!
//! A channel is two independent pipes. The application writes to the outbound
//! pipe and reads the inbound pipe; the transport does the opposite. Each
//! direction completes on its own, and a fault on the transport's send path is
//! surfaced by completing the inbound pipe with that fault.

use std::future::Future;

use bytes::Bytes;
use tracing::{debug, warn};

use crate::error::{TransportError, TransportResult};
use crate::pipe::{PipeReader, PipeWriter, pipe};

/// One side of a duplex channel: what this side reads and what it writes.
#[derive(Debug)]
pub struct DuplexChannel {
    /// Data arriving at this side.
    pub input: PipeReader,
    /// Data leaving this side.
    pub output: PipeWriter,
}

impl DuplexChannel {
    /// Sends a chunk to the other side.
    pub fn send(&self, data: impl Into<Bytes>) -> TransportResult<()> {
        self.output.write(data)
    }

    /// Receives the next chunk from the other side.
    ///
    /// `Ok(None)` means the other side finished cleanly; an error means it
    /// finished with that error.
    pub async fn receive(&mut self) -> TransportResult<Option<Bytes>> {
        self.input.read().await
    }

    /// Completes this side's outgoing direction.
    pub fn complete(&self, error: Option<TransportError>) -> bool {
        self.output.complete(error)
    }

    /// Splits the channel into its reading and writing halves.
    pub fn into_parts(self) -> (PipeReader, PipeWriter) {
        (self.input, self.output)
    }
}

/// Creates a channel and returns its `(application, transport)` sides.
pub fn pair() -> (DuplexChannel, DuplexChannel) {
    let (outbound_writer, outbound_reader) = pipe();
    let (inbound_writer, inbound_reader) = pipe();

    let application = DuplexChannel {
        input: inbound_reader,
        output: outbound_writer,
    };
    let transport = DuplexChannel {
        input: outbound_reader,
        output: inbound_writer,
    };
    (application, transport)
}

/// Runs a transport send loop.
///
/// Each outbound chunk is handed to `send`. When `send` fails, the inbound pipe
/// is completed with the error so the application sees the fault as the end of
/// its channel, and the loop stops. A completed outbound pipe ends the loop
/// without touching the inbound pipe.
pub async fn drain_outbound<F, Fut>(
    mut outbound: PipeReader,
    inbound: PipeWriter,
    mut send: F,
) -> TransportResult<()>
where
    F: FnMut(Bytes) -> Fut,
    Fut: Future<Output = TransportResult<()>>,
{
    loop {
        match outbound.read().await {
            Ok(Some(chunk)) => {
                let len = chunk.len();
                if let Err(err) = send(chunk).await {
                    warn!(error = %err, len, "Send failed, closing channel");
                    inbound.complete(Some(err.clone()));
                    return Err(err);
                }
            }
            Ok(None) => {
                debug!("Outbound stream completed");
                return Ok(());
            }
            Err(err) => {
                debug!(error = %err, "Outbound stream completed with error");
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_pair_connects_both_directions() {
        let (mut app, mut transport) = pair();

        app.send("ping").unwrap();
        assert_eq!(transport.receive().await.unwrap().unwrap(), "ping");

        transport.send("pong").unwrap();
        assert_eq!(app.receive().await.unwrap().unwrap(), "pong");
    }

    #[tokio::test]
    async fn test_directions_complete_independently() {
        let (mut app, mut transport) = pair();

        app.complete(None);
        assert_eq!(transport.receive().await.unwrap(), None);

        transport.send("still open").unwrap();
        assert_eq!(app.receive().await.unwrap().unwrap(), "still open");
    }

    #[tokio::test]
    async fn test_send_fault_completes_inbound_with_error() {
        let (mut app, transport) = pair();
        let (outbound, inbound) = transport.into_parts();

        let loop_task = tokio::spawn(drain_outbound(outbound, inbound, |_chunk| async {
            Err(TransportError::Http {
                status: 500,
                reason: "Internal Server Error".into(),
            })
        }));

        app.send("rejected").unwrap();

        let err = app.receive().await.unwrap_err();
        assert!(matches!(err, TransportError::Http { status: 500, .. }));
        assert!(loop_task.await.unwrap().is_err());
    }

    #[tokio::test]
    async fn test_drain_outbound_delivers_in_order() {
        let (app, transport) = pair();
        let (outbound, inbound) = transport.into_parts();
        let sent = Arc::new(AtomicUsize::new(0));

        app.send("a").unwrap();
        app.send("b").unwrap();
        app.complete(None);

        let counter = Arc::clone(&sent);
        drain_outbound(outbound, inbound, move |chunk| {
            let counter = Arc::clone(&counter);
            async move {
                let index = counter.fetch_add(1, Ordering::SeqCst);
                assert_eq!(chunk, if index == 0 { "a" } else { "b" });
                Ok(())
            }
        })
        .await
        .unwrap();

        assert_eq!(sent.load(Ordering::SeqCst), 2);
    }
}
