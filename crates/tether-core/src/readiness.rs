//! Readiness gating for transports that must hear from the server before they
//! count as started.

use tokio::sync::watch;

use crate::error::{TransportError, TransportResult};

/// Creates a readiness gate and returns its `(signal, waiter)` halves.
pub fn gate() -> (ReadySignal, ReadyWaiter) {
    let (tx, rx) = watch::channel(None);
    (ReadySignal { tx }, ReadyWaiter { rx })
}

/// Resolving half, owned by the code that sees the server's first response.
#[derive(Debug)]
pub struct ReadySignal {
    tx: watch::Sender<Option<TransportResult<()>>>,
}

impl ReadySignal {
    /// Resolves the gate. Only the first resolution counts.
    pub fn resolve(&self, outcome: TransportResult<()>) -> bool {
        let mut outcome = Some(outcome);
        self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = outcome.take();
            true
        })
    }

    /// Returns whether the gate has been resolved.
    pub fn is_resolved(&self) -> bool {
        self.tx.borrow().is_some()
    }
}

/// Waiting half, awaited by the transport's `ready` hook.
#[derive(Debug, Clone)]
pub struct ReadyWaiter {
    rx: watch::Receiver<Option<TransportResult<()>>>,
}

impl ReadyWaiter {
    /// Waits for the gate to resolve.
    ///
    /// A signal dropped without resolving counts as a closed connection.
    pub async fn wait(&self) -> TransportResult<()> {
        let mut rx = self.rx.clone();
        match rx.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone().unwrap_or(Ok(())),
            Err(_) => Err(TransportError::ConnectionClosed {
                reason: "transport ended before the server responded".into(),
            }),
        }
    }
}
