//! The connection lifecycle state machine.
//!
//! [`HttpConnection`] is the single authority over which transport is active.
//! Every start and dispose goes through one lock that is never held across an
//! await. Work that has to wait (negotiation, stopping a transport) runs as a
//! [`PendingOperation`] stored in the phase it belongs to, so a second caller
//! joins the operation already in flight instead of starting another.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::channel::DuplexChannel;
use crate::error::{ConnectionError, ConnectionResult};
use crate::negotiate::{ActiveTransport, CandidateSource, StaticCandidates, TransportNegotiator};
use crate::pending::PendingOperation;
use crate::state::ConnectionState;
use crate::transport::{BoxedTransport, HttpConnectionOptions, TransferFormat, TransportFactory, TransportKind};

/// Lifecycle phase, carrying the pending operation of transitional states.
#[derive(Debug)]
enum Phase {
    Disconnected,
    Starting(PendingOperation),
    Connected,
    Disposing(PendingOperation),
    Disposed,
}

impl Phase {
    fn state(&self) -> ConnectionState {
        match self {
            Self::Disconnected => ConnectionState::Disconnected,
            Self::Starting(_) => ConnectionState::Starting,
            Self::Connected => ConnectionState::Connected,
            Self::Disposing(_) => ConnectionState::Disposing,
            Self::Disposed => ConnectionState::Disposed,
        }
    }

    fn pending(&self) -> Option<PendingOperation> {
        match self {
            Self::Starting(op) | Self::Disposing(op) => Some(op.clone()),
            _ => None,
        }
    }
}

/// The transport a connected connection owns.
struct Active {
    transport: BoxedTransport,
    kind: TransportKind,
    channel: Option<DuplexChannel>,
    connection_id: Option<String>,
}

impl From<ActiveTransport> for Active {
    fn from(active: ActiveTransport) -> Self {
        Self {
            kind: active.kind(),
            transport: active.transport,
            channel: Some(active.channel),
            connection_id: active.connection_id,
        }
    }
}

struct Inner {
    phase: Phase,
    active: Option<Active>,
}

impl Inner {
    /// Replaces the phase, rejecting moves the lifecycle table does not allow.
    fn transition(&mut self, next: Phase) -> ConnectionResult<()> {
        let from = self.phase.state();
        let to = next.state();
        if !from.can_transition_to(to) {
            return Err(ConnectionError::InvalidTransition { from, to });
        }
        self.phase = next;
        debug!(from = %from, to = %to, "Connection state changed");
        Ok(())
    }
}

struct Shared {
    negotiator: TransportNegotiator,
    inner: Mutex<Inner>,
}

/// What a dispose call has to wait for before it can continue.
enum Wait {
    Start(PendingOperation),
    Dispose(PendingOperation),
}

/// A client connection that runs over whichever transport negotiation picks.
///
/// Clones share the same connection.
///
/// # Example
///
/// ```rust,ignore
/// let connection = HttpConnection::new(&options, negotiator, factory);
/// connection.start(TransferFormat::Text).await?;
///
/// let mut channel = connection.channel().expect("connected");
/// channel.send("hello")?;
/// while let Some(chunk) = channel.receive().await? {
///     println!("{chunk:?}");
/// }
///
/// connection.dispose().await?;
/// ```
#[derive(Clone)]
pub struct HttpConnection {
    shared: Arc<Shared>,
}

impl HttpConnection {
    /// Name the connection reports in disposed-object errors.
    pub const TYPE_NAME: &'static str = "HttpConnection";

    /// Creates a connection from options.
    ///
    /// `negotiate` supplies candidates from the server; it is bypassed when
    /// the options skip negotiation.
    pub fn new(
        options: &HttpConnectionOptions,
        negotiate: Arc<dyn CandidateSource>,
        factory: Arc<dyn TransportFactory>,
    ) -> Self {
        let source: Arc<dyn CandidateSource> = if options.skip_negotiation {
            Arc::new(StaticCandidates::new(options.url.clone(), options.selection))
        } else {
            negotiate
        };

        let negotiator = TransportNegotiator::new(source, factory)
            .with_selection(options.selection)
            .with_policy(options.fallback);

        Self::with_negotiator(negotiator)
    }

    /// Creates a connection around a configured negotiator.
    pub fn with_negotiator(negotiator: TransportNegotiator) -> Self {
        Self {
            shared: Arc::new(Shared {
                negotiator,
                inner: Mutex::new(Inner {
                    phase: Phase::Disconnected,
                    active: None,
                }),
            }),
        }
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.shared.inner.lock().phase.state()
    }

    /// Returns the kind of the active transport, if connected.
    pub fn transport_kind(&self) -> Option<TransportKind> {
        self.shared.inner.lock().active.as_ref().map(|a| a.kind)
    }

    /// Returns the server-assigned connection id, if connected through negotiation.
    pub fn connection_id(&self) -> Option<String> {
        self.shared
            .inner
            .lock()
            .active
            .as_ref()
            .and_then(|a| a.connection_id.clone())
    }

    /// Takes the application side of the active channel.
    ///
    /// Returns `None` when not connected or when the channel was already taken.
    pub fn channel(&self) -> Option<DuplexChannel> {
        self.shared
            .inner
            .lock()
            .active
            .as_mut()
            .and_then(|a| a.channel.take())
    }

    /// Starts the connection.
    ///
    /// Succeeds immediately when already connected; joins the start in flight
    /// when one is running; fails once the connection is being or has been
    /// disposed.
    pub async fn start(&self, format: TransferFormat) -> ConnectionResult<()> {
        let pending = {
            let mut inner = self.shared.inner.lock();
            match inner.phase.state() {
                ConnectionState::Disposing | ConnectionState::Disposed => {
                    return Err(ConnectionError::Disposed {
                        object_name: Self::TYPE_NAME,
                    });
                }
                ConnectionState::Connected => {
                    debug!("Connection already started");
                    return Ok(());
                }
                ConnectionState::Starting => match inner.phase.pending() {
                    Some(op) => op,
                    None => return Err(ConnectionError::TaskFailed(
                        "Starting without a pending operation".into(),
                    )),
                },
                ConnectionState::Disconnected => {
                    let op = PendingOperation::spawn(
                        "start",
                        run_start(Arc::clone(&self.shared), format),
                    );
                    inner.transition(Phase::Starting(op.clone()))?;
                    info!(format = %format, "Starting connection");
                    op
                }
            }
        };

        pending.wait().await
    }

    /// Disposes the connection, stopping the active transport.
    ///
    /// Safe to call any number of times. A start in flight is allowed to
    /// settle first; concurrent calls share one stop.
    pub async fn dispose(&self) -> ConnectionResult<()> {
        loop {
            let wait = {
                let mut inner = self.shared.inner.lock();
                match (inner.phase.state(), inner.phase.pending()) {
                    (ConnectionState::Disposed, _) => return Ok(()),
                    (ConnectionState::Disposing, Some(op)) => Wait::Dispose(op),
                    (ConnectionState::Starting, Some(op)) => Wait::Start(op),
                    (ConnectionState::Disconnected, _) => {
                        inner.transition(Phase::Disposing(PendingOperation::settled(
                            "dispose",
                            Ok(()),
                        )))?;
                        inner.transition(Phase::Disposed)?;
                        info!("Connection disposed before it was started");
                        return Ok(());
                    }
                    (ConnectionState::Connected, _) => {
                        let active = inner.active.take();
                        let op = PendingOperation::spawn(
                            "dispose",
                            run_dispose(Arc::clone(&self.shared), active),
                        );
                        inner.transition(Phase::Disposing(op.clone()))?;
                        Wait::Dispose(op)
                    }
                    (state, None) => {
                        return Err(ConnectionError::TaskFailed(format!(
                            "{state} without a pending operation"
                        )));
                    }
                }
            };

            match wait {
                Wait::Start(op) => {
                    debug!("Waiting for start to settle before disposing");
                    let _ = op.wait().await;
                    // Let the start's own callers observe the outcome before stopping.
                    tokio::task::yield_now().await;
                }
                Wait::Dispose(op) => return op.wait().await,
            }
        }
    }
}

impl fmt::Debug for HttpConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(Self::TYPE_NAME)
            .field("state", &self.state())
            .field("transport", &self.transport_kind())
            .finish()
    }
}

/// Puts a start that ends without settling (a panic or an aborted task) back
/// to `Disconnected`, so later starts and disposes are not stuck behind it.
struct StartGuard<'a> {
    shared: &'a Shared,
    armed: bool,
}

impl Drop for StartGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut inner = self.shared.inner.lock();
        if inner.phase.state() == ConnectionState::Starting
            && inner.transition(Phase::Disconnected).is_ok()
        {
            warn!("Start ended without settling, connection reset");
        }
    }
}

async fn run_start(shared: Arc<Shared>, format: TransferFormat) -> ConnectionResult<()> {
    let mut guard = StartGuard {
        shared: &shared,
        armed: true,
    };
    let outcome = shared.negotiator.connect(format).await;
    guard.armed = false;
    drop(guard);

    let mut inner = shared.inner.lock();
    match outcome {
        Ok(active) => {
            let active = Active::from(active);
            let kind = active.kind;
            inner.transition(Phase::Connected)?;
            inner.active = Some(active);
            info!(transport = %kind, "Connection started");
            Ok(())
        }
        Err(err) => {
            inner.transition(Phase::Disconnected)?;
            warn!(error = %err, "Connection failed to start");
            Err(err)
        }
    }
}

async fn run_dispose(shared: Arc<Shared>, active: Option<Active>) -> ConnectionResult<()> {
    let result = match active {
        Some(active) => {
            debug!(transport = %active.kind, "Stopping transport");
            let stopped = active.transport.stop().await;
            drop(active);
            stopped.map_err(|err| {
                warn!(error = %err, "Transport failed to stop cleanly");
                ConnectionError::TransportStop(err)
            })
        }
        None => Ok(()),
    };

    shared.inner.lock().transition(Phase::Disposed)?;
    info!("Connection disposed");
    result
}
