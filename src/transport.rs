//! Connection seam between the protocol client and whatever carries its bytes.
//!
//! [`Transport`] is the contract the client is written against. [`ReplayTransport`]
//! is the offline implementation used during replay: it never touches the
//! network, acknowledges every write, and turns injected capture payloads into
//! inbound data events.

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::TransportError;

/// Events a transport raises towards its subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Connected,
    Data(Vec<u8>),
}

/// Connection lifecycle. There is no way back from `Connected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Unconnected,
    Connecting,
    Connected,
}

pub type EventHandler = Arc<dyn Fn(&TransportEvent) + Send + Sync>;
pub type WriteCallback = Box<dyn FnOnce(Result<(), TransportError>) + Send>;

/// What a protocol client needs from a connection.
pub trait Transport: Send + Sync {
    /// Start connecting. Completion is signalled with [`TransportEvent::Connected`].
    fn connect(&self);

    /// Send bytes. `on_complete` runs once the write is settled; the return value
    /// is `false` when the caller should wait before writing more.
    fn write(&self, data: &[u8], on_complete: Option<WriteCallback>) -> bool;

    /// Register a handler. Handlers run synchronously, in registration order.
    fn subscribe(&self, handler: EventHandler);
}

/// Receiving end for payloads that should appear to come off the wire.
pub trait Inject: Send + Sync {
    fn inject(&self, data: Vec<u8>);
}

struct Inner {
    state: Mutex<TransportState>,
    handlers: Mutex<Vec<EventHandler>>,
    connect_delay: Duration,
    connecting: Mutex<Option<JoinHandle<()>>>,
    dropped_writes: AtomicU64,
    dropped_bytes: AtomicU64,
    injected: AtomicU64,
}

impl Inner {
    fn emit(&self, event: &TransportEvent) {
        // Snapshot so handlers may subscribe or write without holding the lock.
        let handlers: Vec<EventHandler> = self.handlers.lock().clone();
        for handler in &handlers {
            handler(event);
        }
    }
}

/// Offline stand-in for a TCP connection to the console.
#[derive(Clone)]
pub struct ReplayTransport {
    inner: Arc<Inner>,
}

impl ReplayTransport {
    pub fn new(connect_delay: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(TransportState::Unconnected),
                handlers: Mutex::new(Vec::new()),
                connect_delay,
                connecting: Mutex::new(None),
                dropped_writes: AtomicU64::new(0),
                dropped_bytes: AtomicU64::new(0),
                injected: AtomicU64::new(0),
            }),
        }
    }

    pub fn state(&self) -> TransportState {
        *self.inner.state.lock()
    }

    /// Wait for the simulated handshake started by `connect` to finish.
    ///
    /// A subscriber that panicked while handling `Connected` panics here
    /// again. Resolves at once if `connect` was never called or was
    /// already waited on.
    pub async fn wait_connected(&self) {
        let handle = self.inner.connecting.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                if e.is_panic() {
                    std::panic::resume_unwind(e.into_panic());
                }
            }
        }
    }

    /// (writes dropped, bytes dropped, payloads injected)
    pub fn get_stats(&self) -> (u64, u64, u64) {
        (
            self.inner.dropped_writes.load(Ordering::Relaxed),
            self.inner.dropped_bytes.load(Ordering::Relaxed),
            self.inner.injected.load(Ordering::Relaxed),
        )
    }
}

impl Transport for ReplayTransport {
    /// Must be called from within a tokio runtime.
    fn connect(&self) {
        {
            let mut state = self.inner.state.lock();
            if *state != TransportState::Unconnected {
                warn!("Ignoring connect while {:?}", *state);
                return;
            }
            *state = TransportState::Connecting;
        }

        info!("Simulating connection, ready in {:?}", self.inner.connect_delay);

        let inner = self.inner.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(inner.connect_delay).await;
            *inner.state.lock() = TransportState::Connected;
            debug!("Simulated connection established");
            inner.emit(&TransportEvent::Connected);
        });
        *self.inner.connecting.lock() = Some(handle);
    }

    fn write(&self, data: &[u8], on_complete: Option<WriteCallback>) -> bool {
        debug!("Dropping write action ({} bytes)", data.len());
        self.inner.dropped_writes.fetch_add(1, Ordering::Relaxed);
        self.inner
            .dropped_bytes
            .fetch_add(data.len() as u64, Ordering::Relaxed);

        if let Some(callback) = on_complete {
            callback(Ok(()));
        }
        true
    }

    fn subscribe(&self, handler: EventHandler) {
        self.inner.handlers.lock().push(handler);
    }
}

impl Inject for ReplayTransport {
    fn inject(&self, data: Vec<u8>) {
        self.inner.injected.fetch_add(1, Ordering::Relaxed);
        self.inner.emit(&TransportEvent::Data(data));
    }
}
