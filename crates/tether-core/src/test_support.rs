//! Mock transports shared by the unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{Semaphore, watch};

use crate::channel::{self, DuplexChannel};
use crate::error::{TransportError, TransportResult};
use crate::readiness::{self, ReadySignal, ReadyWaiter};
use crate::transport::{BoxedTransport, TransferFormat, Transport, TransportFactory, TransportKind};

/// How a mock transport behaves.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct MockBehavior {
    /// `start` fails.
    pub fail_start: bool,
    /// `start` waits for [`MockState::release_start`].
    pub hold_start: bool,
    /// `stop` waits for [`MockState::release_stop`].
    pub hold_stop: bool,
    /// `ready` waits for [`MockState::open_gate`].
    pub gated: bool,
    /// `start` panics.
    pub panic_start: bool,
}

/// Observable state of one mock transport instance.
pub(crate) struct MockState {
    kind: TransportKind,
    behavior: MockBehavior,
    starts: watch::Sender<usize>,
    stops: watch::Sender<usize>,
    start_release: Semaphore,
    stop_release: Semaphore,
    signal: ReadySignal,
    waiter: ReadyWaiter,
    remote: Mutex<Option<DuplexChannel>>,
    clock: Mutex<Option<Arc<AtomicUsize>>>,
    stop_tick: Mutex<Option<usize>>,
}

impl MockState {
    pub(crate) fn start_calls(&self) -> usize {
        *self.starts.borrow()
    }

    pub(crate) fn stop_calls(&self) -> usize {
        *self.stops.borrow()
    }

    pub(crate) fn release_start(&self) {
        self.start_release.add_permits(1);
    }

    pub(crate) fn release_stop(&self) {
        self.stop_release.add_permits(1);
    }

    pub(crate) fn open_gate(&self, outcome: TransportResult<()>) {
        self.signal.resolve(outcome);
    }

    /// Takes the transport side of the channel handed out by `start`.
    pub(crate) fn take_remote(&self) -> Option<DuplexChannel> {
        self.remote.lock().take()
    }

    /// Stamps the next `stop` entry with a tick from `clock`.
    pub(crate) fn stamp_stops_with(&self, clock: Arc<AtomicUsize>) {
        *self.clock.lock() = Some(clock);
    }

    /// Tick taken when `stop` was entered.
    pub(crate) fn stop_tick(&self) -> Option<usize> {
        *self.stop_tick.lock()
    }

    pub(crate) async fn wait_for_start(&self) {
        let mut rx = self.starts.subscribe();
        let _ = rx.wait_for(|n| *n > 0).await;
    }

    pub(crate) async fn wait_for_stop(&self) {
        let mut rx = self.stops.subscribe();
        let _ = rx.wait_for(|n| *n > 0).await;
    }
}

/// A scripted [`Transport`].
pub(crate) struct MockTransport {
    state: Arc<MockState>,
}

impl MockTransport {
    pub(crate) fn with(kind: TransportKind, behavior: MockBehavior) -> Self {
        let (signal, waiter) = readiness::gate();
        Self {
            state: Arc::new(MockState {
                kind,
                behavior,
                starts: watch::Sender::new(0),
                stops: watch::Sender::new(0),
                start_release: Semaphore::new(0),
                stop_release: Semaphore::new(0),
                signal,
                waiter,
                remote: Mutex::new(None),
                clock: Mutex::new(None),
                stop_tick: Mutex::new(None),
            }),
        }
    }

    pub(crate) fn new(kind: TransportKind) -> Self {
        Self::with(kind, MockBehavior::default())
    }

    pub(crate) fn failing(kind: TransportKind) -> Self {
        Self::with(
            kind,
            MockBehavior {
                fail_start: true,
                ..Default::default()
            },
        )
    }

    pub(crate) fn gated(kind: TransportKind) -> Self {
        Self::with(
            kind,
            MockBehavior {
                gated: true,
                ..Default::default()
            },
        )
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn kind(&self) -> TransportKind {
        self.state.kind
    }

    async fn start(&self, _format: TransferFormat) -> TransportResult<DuplexChannel> {
        self.state.starts.send_modify(|n| *n += 1);

        if self.state.behavior.panic_start {
            panic!("{} start panicked", self.state.kind);
        }

        if self.state.behavior.hold_start {
            let permit = self
                .state
                .start_release
                .acquire()
                .await
                .map_err(|e| TransportError::Io(e.to_string()))?;
            permit.forget();
        }

        if self.state.behavior.fail_start {
            return Err(TransportError::ConnectionFailed {
                url: "http://localhost/hub".into(),
                reason: format!("{} refused", self.state.kind),
            });
        }

        let (application, transport) = channel::pair();
        *self.state.remote.lock() = Some(transport);
        Ok(application)
    }

    async fn ready(&self) -> TransportResult<()> {
        if self.state.behavior.gated {
            self.state.waiter.wait().await
        } else {
            Ok(())
        }
    }

    async fn stop(&self) -> TransportResult<()> {
        if let Some(clock) = self.state.clock.lock().as_ref() {
            *self.state.stop_tick.lock() = Some(clock.fetch_add(1, Ordering::SeqCst));
        }
        self.state.stops.send_modify(|n| *n += 1);

        if self.state.behavior.hold_stop {
            let permit = self
                .state
                .stop_release
                .acquire()
                .await
                .map_err(|e| TransportError::Io(e.to_string()))?;
            permit.forget();
        }

        if let Some(remote) = self.state.remote.lock().take() {
            remote.complete(None);
        }
        Ok(())
    }
}

type Builder = Box<dyn Fn(TransportKind) -> MockTransport + Send + Sync>;

/// Factory that records every mock transport it creates.
pub(crate) struct MockFactory {
    build: Builder,
    created: Mutex<Vec<Arc<MockState>>>,
    count: watch::Sender<usize>,
}

impl MockFactory {
    pub(crate) fn new<F>(build: F) -> Arc<Self>
    where
        F: Fn(TransportKind) -> MockTransport + Send + Sync + 'static,
    {
        Arc::new(Self {
            build: Box::new(build),
            created: Mutex::new(Vec::new()),
            count: watch::Sender::new(0),
        })
    }

    /// Start calls across every created transport.
    pub(crate) fn start_calls(&self) -> usize {
        self.created.lock().iter().map(|s| s.start_calls()).sum()
    }

    /// Stop calls across every created transport.
    pub(crate) fn stop_calls(&self) -> usize {
        self.created.lock().iter().map(|s| s.stop_calls()).sum()
    }

    /// Waits until the `index`-th transport has been created and returns its state.
    pub(crate) async fn wait_for_transport(&self, index: usize) -> Arc<MockState> {
        let mut rx = self.count.subscribe();
        let _ = rx.wait_for(|n| *n > index).await;
        Arc::clone(&self.created.lock()[index])
    }
}

impl TransportFactory for MockFactory {
    fn create(&self, kind: TransportKind, _url: &str) -> TransportResult<BoxedTransport> {
        let transport = (self.build)(kind);
        self.created.lock().push(Arc::clone(&transport.state));
        self.count.send_modify(|n| *n += 1);
        Ok(Box::new(transport))
    }
}
