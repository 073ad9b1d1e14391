use anyhow::{Result, bail};
use std::sync::Arc;
use tracing::{debug, info};

use crate::capture::FrameSource;
use crate::client::StudioLiveClient;
use crate::config::ReplayConfig;
use crate::filter::{Direction, classify};
use crate::heartbeat::HeartbeatInjector;
use crate::packet::decode_frame;
use crate::scheduler::DeliveryScheduler;
use crate::transport::ReplayTransport;

/// Frames between cooperative yields during traversal.
const YIELD_EVERY: u64 = 10_000;

/// What a traversal saw, frame by frame.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReplayStats {
    pub frames: u64,
    pub undecodable: u64,
    pub empty: u64,
    pub from_target: u64,
    pub to_target: u64,
    pub unrelated: u64,
}

impl ReplayStats {
    fn log_summary(&self) {
        info!("======= TRAVERSAL SUMMARY =======");
        info!("Frames read: {}", self.frames);
        info!("Not Ethernet/IPv4/TCP: {}", self.undecodable);
        info!("Empty TCP payload: {}", self.empty);
        info!("From console (queued): {}", self.from_target);
        info!("To console (skipped): {}", self.to_target);
        info!("Unrelated (skipped): {}", self.unrelated);
        info!("=================================");
    }
}

/// Everything one replay run owns: transport, client and delivery pipeline.
pub struct ReplaySession {
    config: ReplayConfig,
    transport: ReplayTransport,
    client: StudioLiveClient,
    scheduler: Option<DeliveryScheduler>,
    heartbeat: Option<HeartbeatInjector>,
    started: bool,
}

impl ReplaySession {
    pub fn new(config: ReplayConfig) -> Self {
        let transport = ReplayTransport::new(config.connect_delay);
        let client = StudioLiveClient::new(Arc::new(transport.clone()));

        Self {
            config,
            transport,
            client,
            scheduler: None,
            heartbeat: None,
            started: false,
        }
    }

    pub fn client(&self) -> &StudioLiveClient {
        &self.client
    }

    pub fn transport(&self) -> &ReplayTransport {
        &self.transport
    }

    /// Connect the client, let it settle, then push every console payload from
    /// `source` into the delivery queue.
    ///
    /// Returns once the source is exhausted. Deliveries and heartbeats carry on
    /// in the background; see [`ReplaySession::drain`]. A session runs once;
    /// later calls fail without touching the client.
    pub async fn run(&mut self, source: &mut dyn FrameSource) -> Result<ReplayStats> {
        if self.started {
            bail!("replay session already ran");
        }
        self.started = true;

        info!("Replaying traffic from console {}", self.config.target);

        self.client.connect();

        tokio::time::sleep(self.config.settle_delay).await;
        // Traversal starts no earlier than the connect completes.
        self.transport.wait_connected().await;

        self.heartbeat = Some(HeartbeatInjector::spawn(
            self.client.keep_alive(),
            self.config.heartbeat_interval,
        ));
        let scheduler =
            DeliveryScheduler::spawn(Arc::new(self.transport.clone()), self.config.pacing);

        let mut stats = ReplayStats::default();

        while let Some(frame) = source.next_frame()? {
            stats.frames += 1;

            let packet = match decode_frame(&frame) {
                Some(packet) => packet,
                None => {
                    stats.undecodable += 1;
                    continue;
                }
            };

            if !packet.has_payload() {
                stats.empty += 1;
                continue;
            }

            match classify(packet.source, packet.destination, self.config.target) {
                Direction::FromTarget => {
                    stats.from_target += 1;
                    debug!(
                        "Queueing {} bytes from console (frame {}, t={:.6})",
                        packet.payload.len(),
                        stats.frames,
                        packet.timestamp
                    );
                    if let Err(e) = scheduler.enqueue(packet.payload) {
                        // Re-raises the sink's panic if that is what stopped the worker.
                        scheduler.finish().await;
                        return Err(e.into());
                    }
                }
                Direction::ToTarget => stats.to_target += 1,
                Direction::Unrelated => stats.unrelated += 1,
            }

            if stats.frames % YIELD_EVERY == 0 {
                debug!("Traversed {} frames", stats.frames);
                tokio::task::yield_now().await;
            }
        }

        self.scheduler = Some(scheduler);
        stats.log_summary();
        Ok(stats)
    }

    /// Wait for every queued payload to reach the client. Returns how many were delivered.
    pub async fn drain(&mut self) -> u64 {
        let delivered = match self.scheduler.take() {
            Some(scheduler) => scheduler.finish().await,
            None => 0,
        };

        let (writes, bytes, injected) = self.transport.get_stats();
        info!(
            "Delivered {} payloads ({} injected); dropped {} client writes ({} bytes)",
            delivered, injected, writes, bytes
        );
        delivered
    }

    pub fn heartbeat_running(&self) -> bool {
        self.heartbeat.as_ref().is_some_and(|h| h.is_running())
    }
}
