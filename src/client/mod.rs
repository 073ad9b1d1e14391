//! Minimal StudioLive control client.
//!
//! Just enough of the console protocol to make replayed traffic observable:
//! connect handshake, keep-alive tracking, packet reassembly and a handful of
//! decoded message types. Subscribers register per message code with [`StudioLiveClient::on`]
//! and are called synchronously, in registration order.

pub mod codec;
pub mod keepalive;

use parking_lot::Mutex;
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::transport::{Transport, TransportEvent};
use codec::{CLIENT_ROUTING, ClientEvent, FrameBuffer, MessageCode, RawPacket};
pub use keepalive::KeepAlive;

pub const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(1);
pub const KEEP_ALIVE_TIMEOUT: Duration = Duration::from_secs(5);
const CLIENT_NAME: &str = "studiolive-pcap-replay";

pub type MessageHandler = Arc<dyn Fn(&ClientEvent) + Send + Sync>;

struct Shared {
    transport: Arc<dyn Transport>,
    keep_alive: Arc<KeepAlive>,
    handlers: Mutex<Vec<(MessageCode, MessageHandler)>>,
    frames: Mutex<FrameBuffer>,
    subscribed: AtomicBool,
    connected: AtomicBool,
    keep_alive_task: Mutex<Option<JoinHandle<()>>>,
    packets: AtomicU64,
    keep_alive_interval: Duration,
    keep_alive_timeout: Duration,
}

pub struct StudioLiveClient {
    shared: Arc<Shared>,
}

impl StudioLiveClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_keep_alive(transport, KEEP_ALIVE_INTERVAL, KEEP_ALIVE_TIMEOUT)
    }

    pub fn with_keep_alive(
        transport: Arc<dyn Transport>,
        interval: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                transport,
                keep_alive: Arc::new(KeepAlive::new()),
                handlers: Mutex::new(Vec::new()),
                frames: Mutex::new(FrameBuffer::new()),
                subscribed: AtomicBool::new(false),
                connected: AtomicBool::new(false),
                keep_alive_task: Mutex::new(None),
                packets: AtomicU64::new(0),
                keep_alive_interval: interval,
                keep_alive_timeout: timeout,
            }),
        }
    }

    /// Hook into the transport and start connecting. Only the first call has
    /// any effect.
    pub fn connect(&self) {
        if self.shared.subscribed.swap(true, Ordering::SeqCst) {
            warn!("Client already connecting, ignoring connect");
            return;
        }

        let weak: Weak<Shared> = Arc::downgrade(&self.shared);
        self.shared.transport.subscribe(Arc::new(move |event: &TransportEvent| {
            if let Some(shared) = weak.upgrade() {
                shared.handle_event(event);
            }
        }));

        info!("Connecting to console");
        self.shared.transport.connect();
    }

    pub fn on<F>(&self, code: MessageCode, handler: F)
    where
        F: Fn(&ClientEvent) + Send + Sync + 'static,
    {
        self.shared.handlers.lock().push((code, Arc::new(handler)));
    }

    pub fn keep_alive(&self) -> Arc<KeepAlive> {
        self.shared.keep_alive.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    /// Wait until the keep-alive loop stops, either because the console went
    /// quiet or because the loop panicked, in which case the panic is raised
    /// here. Resolves at once if the connection was never established.
    pub async fn closed(&self) {
        let handle = self.shared.keep_alive_task.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                if e.is_panic() {
                    std::panic::resume_unwind(e.into_panic());
                }
            }
        }
    }

    /// Complete packets decoded so far.
    pub fn packets_received(&self) -> u64 {
        self.shared.packets.load(Ordering::Relaxed)
    }
}

impl Shared {
    fn handle_event(self: &Arc<Self>, event: &TransportEvent) {
        match event {
            TransportEvent::Connected => self.on_connected(),
            TransportEvent::Data(data) => self.on_data(data),
        }
    }

    fn on_connected(self: &Arc<Self>) {
        info!("Connected to console");
        self.connected.store(true, Ordering::SeqCst);
        self.keep_alive.update_time();

        self.send(MessageCode::Hello, &hello_body());
        self.send(MessageCode::Json, &subscribe_body());

        let shared = self.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(shared.keep_alive_interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if !shared.connected.load(Ordering::SeqCst) {
                    break;
                }

                shared.send(MessageCode::KeepAlive, &CLIENT_ROUTING);

                if !shared.keep_alive.is_alive(shared.keep_alive_timeout) {
                    warn!(
                        "No keep-alive from console for {:?}, dropping connection",
                        shared.keep_alive.elapsed()
                    );
                    shared.connected.store(false, Ordering::SeqCst);
                    break;
                }
            }
        });
        *self.keep_alive_task.lock() = Some(handle);
    }

    fn on_data(&self, data: &[u8]) {
        if !self.connected.load(Ordering::SeqCst) {
            debug!("Ignoring {} bytes while disconnected", data.len());
            return;
        }

        // Drain under the lock, dispatch after releasing it.
        let packets: Vec<_> = {
            let mut frames = self.frames.lock();
            frames.push(data);
            std::iter::from_fn(|| frames.next_packet()).collect()
        };

        for packet in packets {
            match packet {
                Ok(raw) => self.dispatch(raw),
                Err(e) => warn!("Skipping malformed packet: {}", e),
            }
        }
    }

    fn dispatch(&self, raw: RawPacket) {
        self.packets.fetch_add(1, Ordering::Relaxed);

        let event = match codec::decode_event(&raw) {
            Ok(event) => event,
            Err(e) => {
                warn!("Failed to decode {} packet: {}", raw.code.name(), e);
                return;
            }
        };

        if event == ClientEvent::KeepAlive {
            self.keep_alive.update_time();
        }

        let handlers: Vec<MessageHandler> = self
            .handlers
            .lock()
            .iter()
            .filter(|(code, _)| *code == raw.code)
            .map(|(_, handler)| handler.clone())
            .collect();

        debug!("Dispatching {} to {} handlers", raw.code.name(), handlers.len());
        for handler in handlers {
            handler(&event);
        }
    }

    fn send(&self, code: MessageCode, body: &[u8]) {
        let packet = codec::encode(code, body);
        self.transport.write(&packet, None);
    }
}

fn hello_body() -> Vec<u8> {
    let mut body = CLIENT_ROUTING.to_vec();
    body.extend_from_slice(&0u16.to_le_bytes());
    body
}

fn subscribe_body() -> Vec<u8> {
    let payload = json!({
        "id": "Subscribe",
        "clientName": CLIENT_NAME,
        "clientInternalName": "replay",
        "clientType": "StudioLive API",
        "clientDescription": "Offline capture replay",
        "clientIdentifier": CLIENT_NAME,
        "clientOptions": "perm users levl redu rtan",
        "clientEncoding": 23106,
    })
    .to_string();

    let mut body = CLIENT_ROUTING.to_vec();
    body.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    body.extend_from_slice(payload.as_bytes());
    body
}
