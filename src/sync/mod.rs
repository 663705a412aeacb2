//! Synchronizer
//!
//! Polls the backend for the event log and statistics on a fixed cadence
//! and hands complete datasets to the console. A tick either delivers both
//! payloads or nothing; the next scheduled tick is the only retry.
//!
//! Every update is stamped with the generation that was current when its
//! tick started. Cancelling bumps the generation, so a tick that completes
//! after teardown produces an update the consumer will discard.

mod backend;

pub use backend::{Backend, HttpBackend, API_BASE_PATH};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::models::Dataset;
use crate::utils::LogRateLimiter;

/// Target name for synchronizer operational logs
const TARGET_SYNC: &str = "sync";

/// Rate limiter key for failed ticks
const FAILURE_KEY: &str = "tick_failed";

/// A complete dataset produced by one successful tick
#[derive(Debug, Clone)]
pub struct SyncUpdate {
    pub generation: u64,
    pub dataset: Dataset,
    pub fetched_at: DateTime<Utc>,
}

/// Result of a single tick
#[derive(Debug)]
pub enum TickOutcome {
    Fetched(Dataset),
    /// Another tick was still in flight
    Skipped,
}

/// Consumer-side control of a running polling loop
#[derive(Clone)]
pub struct SyncHandle {
    generation: Arc<AtomicU64>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl SyncHandle {
    pub fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Whether `update` was produced in the current generation
    pub fn is_current(&self, update: &SyncUpdate) -> bool {
        !self.is_cancelled() && update.generation == self.current_generation()
    }

    /// Stop issuing ticks and invalidate anything still in flight.
    pub fn cancel(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let _ = self.shutdown.send(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.shutdown.borrow()
    }
}

/// Clears the in-flight flag when a tick finishes or is dropped mid-await
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Periodic backend poller
pub struct Synchronizer<B> {
    backend: Arc<B>,
    interval: Duration,
    failure_log_window: Duration,
    generation: Arc<AtomicU64>,
    in_flight: AtomicBool,
}

impl<B: Backend> Synchronizer<B> {
    pub fn new(backend: Arc<B>, cfg: &SyncConfig) -> Self {
        Self::with_interval(backend, cfg.interval(), cfg.failure_log_window())
    }

    pub fn with_interval(backend: Arc<B>, interval: Duration, failure_log_window: Duration) -> Self {
        Self {
            backend,
            interval,
            failure_log_window,
            generation: Arc::new(AtomicU64::new(0)),
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Fetch logs and statistics concurrently and build a dataset.
    ///
    /// Fails if either request fails or the statistics are malformed.
    pub async fn fetch_dataset(&self) -> Result<Dataset> {
        let (logs, stats) =
            tokio::try_join!(self.backend.fetch_logs(), self.backend.fetch_stats())?;
        Dataset::from_payloads(logs, stats).context("Malformed statistics payload")
    }

    /// Run one tick unless another is still in flight.
    pub async fn tick(&self) -> Result<TickOutcome> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(TickOutcome::Skipped);
        }
        let _guard = InFlightGuard(&self.in_flight);

        self.fetch_dataset().await.map(TickOutcome::Fetched)
    }

    /// Start the polling loop on the runtime.
    ///
    /// The first tick fires immediately. Updates are delivered on the
    /// returned receiver; the loop ends when the handle is cancelled or the
    /// receiver is dropped.
    pub fn spawn(
        self,
        capacity: usize,
    ) -> (SyncHandle, mpsc::Receiver<SyncUpdate>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = SyncHandle {
            generation: Arc::clone(&self.generation),
            shutdown: Arc::new(shutdown_tx),
        };

        let task = tokio::spawn(async move {
            self.run(tx, shutdown_rx).await;
        });

        (handle, rx, task)
    }

    async fn run(self, tx: mpsc::Sender<SyncUpdate>, mut shutdown: watch::Receiver<bool>) {
        info!(
            target: TARGET_SYNC,
            interval_secs = self.interval.as_secs_f64(),
            "Synchronizer started"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut limiter = LogRateLimiter::new(self.failure_log_window);
        let mut failing = false;

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {}
            }

            let generation = self.generation.load(Ordering::SeqCst);
            let outcome = tokio::select! {
                _ = shutdown.changed() => {
                    debug!(target: TARGET_SYNC, "In-flight tick abandoned on shutdown");
                    break;
                }
                outcome = self.tick() => outcome,
            };

            match outcome {
                Ok(TickOutcome::Fetched(dataset)) => {
                    if failing {
                        info!(target: TARGET_SYNC, "Backend reachable again");
                        limiter.reset(FAILURE_KEY);
                        failing = false;
                    }
                    debug!(
                        target: TARGET_SYNC,
                        generation,
                        events = dataset.events.len(),
                        "Tick completed"
                    );
                    let update = SyncUpdate {
                        generation,
                        dataset,
                        fetched_at: Utc::now(),
                    };
                    if tx.send(update).await.is_err() {
                        debug!(target: TARGET_SYNC, "Update receiver dropped");
                        break;
                    }
                }
                Ok(TickOutcome::Skipped) => {
                    debug!(target: TARGET_SYNC, "Tick skipped: previous tick still in flight");
                }
                Err(err) => {
                    failing = true;
                    let decision = limiter.should_emit(FAILURE_KEY);
                    if decision.should_emit {
                        warn!(
                            target: TARGET_SYNC,
                            error = %format!("{:#}", err),
                            suppressed = decision.suppressed_since_last_emit,
                            "Synchronization failed; keeping previous data"
                        );
                    }
                }
            }
        }

        info!(target: TARGET_SYNC, "Synchronizer stopped");
    }
}


#[cfg(test)]
mod tests {
    use super::testing::MockBackend;
    use super::*;
    use serde_json::{json, Value};

    fn synchronizer(backend: MockBackend, interval_ms: u64) -> Synchronizer<MockBackend> {
        Synchronizer::with_interval(
            Arc::new(backend),
            Duration::from_millis(interval_ms),
            Duration::from_secs(60),
        )
    }

    #[tokio::test]
    async fn test_tick_builds_dataset() {
        let backend = MockBackend::new(
            vec![Ok(json!([{"ip": "1.2.3.4", "protocol": "ssh"}]))],
            json!({"totalAttacks": 1, "protocolCounts": {"ssh": 1}}),
        );
        let sync = synchronizer(backend, 1000);

        match sync.tick().await.unwrap() {
            TickOutcome::Fetched(ds) => {
                assert_eq!(ds.events.len(), 1);
                assert_eq!(ds.stats.total_attacks, 1);
            }
            TickOutcome::Skipped => panic!("tick should not be skipped"),
        }
    }

    #[tokio::test]
    async fn test_tick_tolerates_payload_shapes() {
        let backend = MockBackend::new(vec![Ok(json!({"error": "nope"}))], Value::Null);
        let sync = synchronizer(backend, 1000);
        match sync.tick().await.unwrap() {
            TickOutcome::Fetched(ds) => assert_eq!(ds, Dataset::default()),
            TickOutcome::Skipped => panic!("tick should not be skipped"),
        }
    }

    #[tokio::test]
    async fn test_tick_fails_when_either_request_fails() {
        let backend = MockBackend::new(vec![Err("connection refused".into())], json!({}));
        let sync = synchronizer(backend, 1000);
        assert!(sync.tick().await.is_err());

        let backend = MockBackend::new(vec![Ok(json!([]))], json!({"uniqueIPs": "lots"}));
        let sync = synchronizer(backend, 1000);
        assert!(sync.tick().await.is_err());
    }

    #[tokio::test]
    async fn test_overlapping_tick_is_skipped() {
        let backend =
            MockBackend::new(vec![Ok(json!([]))], json!({})).with_delay(Duration::from_millis(50));
        let sync = synchronizer(backend, 1000);

        let (first, second) = tokio::join!(sync.tick(), sync.tick());
        assert!(matches!(first.unwrap(), TickOutcome::Fetched(_)));
        assert!(matches!(second.unwrap(), TickOutcome::Skipped));
        assert_eq!(sync.backend().log_calls.load(Ordering::SeqCst), 1);

        // Flag is released afterwards
        assert!(matches!(sync.tick().await.unwrap(), TickOutcome::Fetched(_)));
    }

    #[tokio::test]
    async fn test_loop_skips_failed_ticks() {
        let backend = MockBackend::new(
            vec![
                Ok(json!([{"ip": "a"}])),
                Err("boom".into()),
                Err("boom".into()),
                Ok(json!([{"ip": "b"}, {"ip": "c"}])),
            ],
            json!({}),
        );
        let sync = synchronizer(backend, 10);
        let (handle, mut rx, task) = sync.spawn(4);

        let first = rx.recv().await.unwrap();
        assert_eq!(first.dataset.events.len(), 1);
        assert!(handle.is_current(&first));

        // The two failed ticks deliver nothing; the next update is the new data.
        let second = rx.recv().await.unwrap();
        assert_eq!(second.dataset.events.len(), 2);

        handle.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_cancel_invalidates_in_flight_updates() {
        let backend =
            MockBackend::new(vec![Ok(json!([]))], json!({})).with_delay(Duration::from_millis(200));
        let sync = synchronizer(backend, 10);
        let (handle, mut rx, task) = sync.spawn(4);

        let generation = handle.current_generation();
        handle.cancel();
        assert!(handle.is_cancelled());
        assert_ne!(handle.current_generation(), generation);

        // Loop stops without delivering the abandoned tick.
        task.await.unwrap();
        assert!(rx.recv().await.is_none());

        let stale = SyncUpdate {
            generation,
            dataset: Dataset::default(),
            fetched_at: Utc::now(),
        };
        assert!(!handle.is_current(&stale));
    }

    #[tokio::test]
    async fn test_loop_stops_when_receiver_dropped() {
        let backend = MockBackend::new(vec![Ok(json!([]))], json!({}));
        let sync = synchronizer(backend, 5);
        let (_handle, rx, task) = sync.spawn(1);
        drop(rx);
        task.await.unwrap();
    }
}
