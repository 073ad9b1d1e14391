use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::DeliveryError;
use crate::transport::Inject;

#[derive(Default)]
struct Stats {
    enqueued: AtomicU64,
    delivered: AtomicU64,
}

/// Paces capture payloads into a transport, one at a time, in arrival order.
///
/// Payloads travel through a single FIFO channel drained by a single worker
/// task, so ordering and the one-delivery-in-flight rule hold by construction.
/// The worker waits `pacing` *before* every delivery, including the first.
pub struct DeliveryScheduler {
    sender: mpsc::UnboundedSender<Vec<u8>>,
    worker: JoinHandle<u64>,
    stats: Arc<Stats>,
}

impl DeliveryScheduler {
    /// Start the worker. Must be called from within a tokio runtime.
    pub fn spawn(sink: Arc<dyn Inject>, pacing: Duration) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Vec<u8>>();
        let stats = Arc::new(Stats::default());

        let worker_stats = stats.clone();
        let worker = tokio::spawn(async move {
            while let Some(payload) = receiver.recv().await {
                tokio::time::sleep(pacing).await;

                let len = payload.len();
                sink.inject(payload);
                let delivered = worker_stats.delivered.fetch_add(1, Ordering::Relaxed) + 1;
                debug!("Delivered payload #{} ({} bytes)", delivered, len);
            }
            worker_stats.delivered.load(Ordering::Relaxed)
        });

        Self { sender, worker, stats }
    }

    /// Queue a payload behind everything already accepted.
    ///
    /// Fails once the worker has stopped, which only happens when the sink
    /// panicked; [`DeliveryScheduler::finish`] re-raises that panic.
    pub fn enqueue(&self, payload: Vec<u8>) -> Result<(), DeliveryError> {
        self.sender
            .send(payload)
            .map_err(|_| DeliveryError::WorkerStopped {
                delivered: self.delivered(),
            })?;
        self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Payloads accepted but not yet handed to the sink.
    pub fn pending(&self) -> u64 {
        self.enqueued().saturating_sub(self.delivered())
    }

    pub fn enqueued(&self) -> u64 {
        self.stats.enqueued.load(Ordering::Relaxed)
    }

    pub fn delivered(&self) -> u64 {
        self.stats.delivered.load(Ordering::Relaxed)
    }

    /// Stop accepting payloads and wait until everything queued has been delivered.
    pub async fn finish(self) -> u64 {
        let Self { sender, worker, stats } = self;
        drop(sender);

        let pending = stats
            .enqueued
            .load(Ordering::Relaxed)
            .saturating_sub(stats.delivered.load(Ordering::Relaxed));
        info!("Waiting for {} queued payloads to be delivered...", pending);

        match worker.await {
            Ok(delivered) => delivered,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(_) => stats.delivered.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicBool;
    use tokio::time::Instant;

    #[derive(Default)]
    struct RecordingSink {
        calls: Mutex<Vec<(Instant, Vec<u8>)>>,
        busy: AtomicBool,
        overlapped: AtomicBool,
    }

    impl Inject for RecordingSink {
        fn inject(&self, data: Vec<u8>) {
            if self.busy.swap(true, Ordering::SeqCst) {
                self.overlapped.store(true, Ordering::SeqCst);
            }
            self.calls.lock().push((Instant::now(), data));
            self.busy.store(false, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_delivers_in_order_with_pacing() {
        let sink = Arc::new(RecordingSink::default());
        let start = Instant::now();
        let scheduler = DeliveryScheduler::spawn(sink.clone(), Duration::from_millis(20));

        for payload in [b"A", b"B", b"C"] {
            scheduler.enqueue(payload.to_vec()).unwrap();
        }
        assert_eq!(scheduler.enqueued(), 3);

        let delivered = scheduler.finish().await;
        assert_eq!(delivered, 3);

        let calls = sink.calls.lock();
        let payloads: Vec<&[u8]> = calls.iter().map(|(_, p)| p.as_slice()).collect();
        assert_eq!(payloads, vec![b"A".as_slice(), b"B".as_slice(), b"C".as_slice()]);

        // Pacing applies before the first delivery too.
        assert!(calls[0].0 - start >= Duration::from_millis(20));
        for pair in calls.windows(2) {
            assert!(pair[1].0 - pair[0].0 >= Duration::from_millis(20));
        }
        assert!(!sink.overlapped.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_delivery_at_a_time() {
        let sink = Arc::new(RecordingSink::default());
        let scheduler = DeliveryScheduler::spawn(sink.clone(), Duration::from_millis(20));

        for i in 0..5u8 {
            scheduler.enqueue(vec![i]).unwrap();
        }

        tokio::time::sleep(Duration::from_millis(45)).await;
        assert_eq!(scheduler.delivered(), 2);
        assert_eq!(scheduler.pending(), 3);

        scheduler.finish().await;
        let order: Vec<u8> = sink.calls.lock().iter().map(|(_, p)| p[0]).collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_enqueue_while_delivering_keeps_order() {
        let sink = Arc::new(RecordingSink::default());
        let scheduler = DeliveryScheduler::spawn(sink.clone(), Duration::from_millis(20));

        scheduler.enqueue(b"first".to_vec()).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        scheduler.enqueue(b"second".to_vec()).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        scheduler.enqueue(b"third".to_vec()).unwrap();

        assert_eq!(scheduler.finish().await, 3);
        let payloads: Vec<Vec<u8>> =
            sink.calls.lock().iter().map(|(_, p)| p.clone()).collect();
        assert_eq!(
            payloads,
            vec![b"first".to_vec(), b"second".to_vec(), b"third".to_vec()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_finish_with_nothing_queued() {
        let sink = Arc::new(RecordingSink::default());
        let scheduler = DeliveryScheduler::spawn(sink.clone(), Duration::from_millis(20));
        assert_eq!(scheduler.finish().await, 0);
        assert!(sink.calls.lock().is_empty());
    }

    /// Panics on the `fail_on`-th delivery.
    struct FailingSink {
        calls: AtomicU64,
        fail_on: u64,
    }

    impl Inject for FailingSink {
        fn inject(&self, _data: Vec<u8>) {
            if self.calls.fetch_add(1, Ordering::SeqCst) + 1 == self.fail_on {
                panic!("sink failed");
            }
        }
    }

    #[tokio::test(start_paused = true)]
    #[should_panic(expected = "sink failed")]
    async fn test_sink_panic_resurfaces_in_finish() {
        let sink = Arc::new(FailingSink { calls: AtomicU64::new(0), fail_on: 2 });
        let scheduler = DeliveryScheduler::spawn(sink.clone(), Duration::from_millis(20));

        for payload in [b"A", b"B", b"C"] {
            scheduler.enqueue(payload.to_vec()).unwrap();
        }
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(scheduler.enqueue(b"D".to_vec()).is_err());
        scheduler.finish().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_enqueue_after_worker_died_reports_error() {
        let sink = Arc::new(FailingSink { calls: AtomicU64::new(0), fail_on: 1 });
        let scheduler = DeliveryScheduler::spawn(sink.clone(), Duration::from_millis(20));

        scheduler.enqueue(b"A".to_vec()).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let err = scheduler.enqueue(b"B".to_vec()).unwrap_err();
        assert_eq!(err, DeliveryError::WorkerStopped { delivered: 0 });
        assert_eq!(scheduler.enqueued(), 1);
        assert_eq!(scheduler.pending(), 1);
    }
}
