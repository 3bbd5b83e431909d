//! Shared outcome of an in-flight start or dispose.

use std::fmt;
use std::future::Future;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};

use crate::error::{ConnectionError, ConnectionResult};

/// An operation every concurrent caller can await for the same single outcome.
///
/// The work runs on its own tokio task, so it keeps going when every waiter
/// stops polling.
#[derive(Clone)]
pub struct PendingOperation {
    name: &'static str,
    outcome: Shared<BoxFuture<'static, ConnectionResult<()>>>,
}

impl PendingOperation {
    /// Spawns `operation` and returns the shared handle to its outcome.
    pub fn spawn<F>(name: &'static str, operation: F) -> Self
    where
        F: Future<Output = ConnectionResult<()>> + Send + 'static,
    {
        let handle = tokio::spawn(operation);
        let outcome = async move {
            match handle.await {
                Ok(result) => result,
                Err(err) => Err(ConnectionError::TaskFailed(err.to_string())),
            }
        }
        .boxed()
        .shared();

        Self { name, outcome }
    }

    /// Returns an operation that has already settled with `result`.
    pub fn settled(name: &'static str, result: ConnectionResult<()>) -> Self {
        Self {
            name,
            outcome: futures::future::ready(result).boxed().shared(),
        }
    }

    /// Name of the operation, for logging.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Waits for the operation to settle.
    pub async fn wait(&self) -> ConnectionResult<()> {
        self.outcome.clone().await
    }
}

impl fmt::Debug for PendingOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingOperation")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
