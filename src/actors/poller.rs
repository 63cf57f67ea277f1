//! OutageMetricPoller - drives liveness from the shared-memory metric store
//!
//! Child actor owning a timer at the polling interval. Each tick it
//! snapshots every metric in the shared store, updates the liveness window
//! of the originating assets, reports them alive to the server, and
//! publishes the per-asset summary "outage" metric so downstream consumers
//! can read fleet health without subscribing to every upstream metric.
//!
//! ## Message Flow
//!
//! ```text
//! Timer tick → read shared metrics → touch store → PollerEvent::Alive → server
//!                                  → write "outage" summary metric
//!     ↑
//!     └─── Commands (PollNow, UpdateInterval, Shutdown)
//! ```

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{mpsc, oneshot};
use tokio::time::interval;
use tracing::{debug, error, instrument, trace, warn};

use crate::actors::messages::{PollerCommand, PollerEvent};
use crate::shm::MetricShm;
use crate::store::{SharedAssetStore, Touch};
use crate::util::now_sec;
use crate::{Metric, OutageStatus, AUX_COMPUTED};

/// Quantity of the summary metric, published as `outage@<asset>`.
const OUTAGE_QUANTITY: &str = "outage";

/// Actor that polls the shared metric store
pub struct OutageMetricPollerActor {
    /// Shared-memory metric store
    shm: Arc<dyn MetricShm>,

    /// Asset store shared with the server
    store: SharedAssetStore,

    /// Liveness events towards the server
    event_tx: mpsc::Sender<PollerEvent>,

    /// Command receiver for control messages
    command_rx: mpsc::Receiver<PollerCommand>,

    /// Current polling interval
    interval_duration: Duration,
}

impl OutageMetricPollerActor {
    pub fn new(
        shm: Arc<dyn MetricShm>,
        store: SharedAssetStore,
        event_tx: mpsc::Sender<PollerEvent>,
        command_rx: mpsc::Receiver<PollerCommand>,
        interval_duration: Duration,
    ) -> Self {
        Self {
            shm,
            store,
            event_tx,
            command_rx,
            interval_duration,
        }
    }

    /// Run the actor's main loop
    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting outage metric poller");

        let mut ticker = interval(self.interval_duration);

        loop {
            tokio::select! {
                // Timer tick - snapshot the shared store
                _ = ticker.tick() => {
                    if let Err(e) = self.poll().await {
                        error!("poll failed: {e:#}");
                    }
                }

                // Handle commands
                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        PollerCommand::PollNow { respond_to } => {
                            debug!("received PollNow command");
                            let result = self.poll().await;
                            let _ = respond_to.send(result);
                        }

                        PollerCommand::UpdateInterval { interval_secs } => {
                            debug!("updating interval to {interval_secs}s");
                            self.interval_duration = Duration::from_secs(interval_secs.max(1));
                            ticker = interval(self.interval_duration);
                        }

                        PollerCommand::Shutdown => {
                            debug!("received shutdown command");
                            break;
                        }
                    }
                }

                // Command channel closed - exit
                else => {
                    warn!("command channel closed, shutting down");
                    break;
                }
            }
        }

        debug!("outage metric poller stopped");
    }

    /// One polling pass: liveness from the snapshot, then the summary
    /// metric for every known device.
    async fn poll(&self) -> Result<()> {
        let metrics = self
            .shm
            .read_metrics(".*", ".*")
            .await
            .context("cannot read shared metrics")?;
        debug!("read {} metrics", metrics.len());

        let now = now_sec();
        let mut seen = HashSet::new();

        for metric in &metrics {
            if metric.is_computed() {
                // synthesised downstream, says nothing about the device
                continue;
            }

            let Some(source) = Self::origin_asset(metric) else {
                continue;
            };

            // the server owns the alert table; it resolves on this event
            if self
                .event_tx
                .send(PollerEvent::Alive {
                    asset: source.clone(),
                })
                .await
                .is_err()
            {
                warn!("server is gone, dropping liveness event");
            }

            let outcome =
                self.lock_store()
                    .touch(&source, metric.time_sec, metric.ttl_sec.into(), now);
            if outcome == Touch::FromFuture {
                warn!("{}: metric is from the future, ignored", metric.topic());
            }

            seen.insert(source);
        }

        self.publish_summary(&seen, now).await;

        Ok(())
    }

    /// Asset a metric testifies liveness for: the sensor's symbolic name
    /// when a sensor port annotation is present, the asset field otherwise.
    fn origin_asset(metric: &Metric) -> Option<String> {
        if let Some(port) = metric.sensor_port() {
            match metric.sensor_name() {
                Some(sname) => {
                    trace!("sensor '{sname}' on '{}'/'{port}' is alive", metric.asset);
                    Some(sname.to_string())
                }
                None => {
                    error!(
                        "sensor metric malformed: found port='{port}' but sname is missing ({})",
                        metric.topic()
                    );
                    None
                }
            }
        } else {
            Some(metric.asset.clone())
        }
    }

    /// Write `outage@<asset>` for every known device: ACTIVE when no metric
    /// was seen this pass, INACTIVE otherwise.
    async fn publish_summary(&self, seen: &HashSet<String>, now_sec: u64) {
        let all = self.lock_store().all_devices();
        let ttl_sec = (self.interval_duration.as_secs() * 2).saturating_sub(1) as u32;

        for asset in all {
            let status = if seen.contains(&asset) {
                OutageStatus::Inactive
            } else {
                OutageStatus::Active
            };

            // tagged computed so the next pass ignores our own output
            let metric = Metric::new(OUTAGE_QUANTITY, &asset, status.to_string(), now_sec, ttl_sec)
                .with_aux(AUX_COMPUTED, "0");

            trace!("{}@{asset}/{status} (ttl={ttl_sec}s)", OUTAGE_QUANTITY);
            if let Err(e) = self.shm.write_metric(metric).await {
                error!("cannot write outage metric for '{asset}': {e}");
            }
        }
    }

    fn lock_store(&self) -> std::sync::MutexGuard<'_, crate::store::AssetStore> {
        self.store.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Handle for controlling the OutageMetricPoller actor
#[derive(Clone)]
pub struct OutageMetricPollerHandle {
    sender: mpsc::Sender<PollerCommand>,
}

impl OutageMetricPollerHandle {
    /// Spawn the poller actor.
    pub fn spawn(
        shm: Arc<dyn MetricShm>,
        store: SharedAssetStore,
        event_tx: mpsc::Sender<PollerEvent>,
        interval_duration: Duration,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);

        let actor = OutageMetricPollerActor::new(shm, store, event_tx, cmd_rx, interval_duration);
        tokio::spawn(actor.run());

        Self { sender: cmd_tx }
    }

    /// Trigger an immediate polling pass.
    pub async fn poll_now(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(PollerCommand::PollNow { respond_to: tx })
            .await?;
        rx.await??;
        Ok(())
    }

    /// Update the polling interval.
    pub async fn update_interval(&self, interval_secs: u64) -> Result<()> {
        self.sender
            .send(PollerCommand::UpdateInterval { interval_secs })
            .await?;
        Ok(())
    }

    /// Shut down the poller.
    pub async fn shutdown(&self) {
        let _ = self.sender.send(PollerCommand::Shutdown).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shm::MemoryShm;
    use crate::store::AssetStore;
    use crate::AssetEvent;
    use std::sync::Mutex;

    struct Rig {
        handle: OutageMetricPollerHandle,
        shm: Arc<MemoryShm>,
        store: SharedAssetStore,
        event_rx: mpsc::Receiver<PollerEvent>,
    }

    fn spawn_rig() -> Rig {
        let shm = Arc::new(MemoryShm::new());
        let store: SharedAssetStore = Arc::new(Mutex::new(AssetStore::new()));
        let (event_tx, event_rx) = mpsc::channel(64);

        let handle = OutageMetricPollerHandle::spawn(
            shm.clone(),
            store.clone(),
            event_tx,
            Duration::from_secs(30),
        );

        Rig {
            handle,
            shm,
            store,
            event_rx,
        }
    }

    async fn summary_for(shm: &MemoryShm, asset: &str) -> Metric {
        let mut metrics = shm.read_metrics("outage", asset).await.unwrap();
        assert_eq!(metrics.len(), 1, "expected one outage metric for {asset}");
        metrics.pop().unwrap()
    }

    #[tokio::test]
    async fn summary_reflects_seen_and_unseen_assets() {
        let mut rig = spawn_rig();

        {
            let mut store = rig.store.lock().unwrap();
            store.apply_asset_event(&AssetEvent::device("UPS1", "ups"), now_sec());
            store.apply_asset_event(&AssetEvent::device("UPS2", "ups"), now_sec());
        }

        rig.shm
            .write_metric(Metric::new("load", "UPS1", "42", now_sec(), 19))
            .await
            .unwrap();

        rig.handle.poll_now().await.unwrap();

        let seen = summary_for(&rig.shm, "UPS1").await;
        assert_eq!(seen.value, "INACTIVE");
        assert_eq!(seen.ttl_sec, 59);
        assert_eq!(seen.aux.get(AUX_COMPUTED).map(String::as_str), Some("0"));

        let unseen = summary_for(&rig.shm, "UPS2").await;
        assert_eq!(unseen.value, "ACTIVE");

        let event = rig.event_rx.recv().await.unwrap();
        let PollerEvent::Alive { asset } = event;
        assert_eq!(asset, "UPS1");

        rig.handle.shutdown().await;
    }

    #[tokio::test]
    async fn poll_narrows_the_liveness_window() {
        let rig = spawn_rig();

        rig.store
            .lock()
            .unwrap()
            .apply_asset_event(&AssetEvent::device("UPS1", "ups"), now_sec());

        rig.shm
            .write_metric(Metric::new("load", "UPS1", "42", now_sec(), 5))
            .await
            .unwrap();

        rig.handle.poll_now().await.unwrap();

        // default window was 2·450 s; the advertised ttl narrowed it to 2·5 s
        let dead = rig.store.lock().unwrap().dead_devices(now_sec() + 11);
        assert_eq!(dead, vec!["UPS1".to_string()]);

        rig.handle.shutdown().await;
    }

    #[tokio::test]
    async fn own_summary_output_is_ignored_on_the_next_pass() {
        let mut rig = spawn_rig();

        rig.store
            .lock()
            .unwrap()
            .apply_asset_event(&AssetEvent::device("UPS1", "ups"), now_sec());

        rig.handle.poll_now().await.unwrap();
        // second pass reads the summary written by the first
        rig.handle.poll_now().await.unwrap();

        assert!(rig.event_rx.try_recv().is_err());

        let summary = summary_for(&rig.shm, "UPS1").await;
        assert_eq!(summary.value, "ACTIVE");

        rig.handle.shutdown().await;
    }

    #[tokio::test]
    async fn sensor_metrics_account_to_the_sensor_name() {
        let mut rig = spawn_rig();

        {
            let mut store = rig.store.lock().unwrap();
            store.apply_asset_event(&AssetEvent::device("SENSOR-7", "sensor"), now_sec());
        }

        rig.shm
            .write_metric(
                Metric::new("temperature", "UPS1", "23", now_sec(), 19)
                    .with_aux("port", "2")
                    .with_aux("sname", "SENSOR-7"),
            )
            .await
            .unwrap();

        rig.handle.poll_now().await.unwrap();

        let event = rig.event_rx.recv().await.unwrap();
        let PollerEvent::Alive { asset } = event;
        assert_eq!(asset, "SENSOR-7");

        let summary = summary_for(&rig.shm, "SENSOR-7").await;
        assert_eq!(summary.value, "INACTIVE");

        rig.handle.shutdown().await;
    }

    #[tokio::test]
    async fn update_interval_rescales_the_ticker() {
        let mut rig = spawn_rig();

        rig.store
            .lock()
            .unwrap()
            .apply_asset_event(&AssetEvent::device("UPS1", "ups"), now_sec());
        rig.shm
            .write_metric(Metric::new("load", "UPS1", "42", now_sec(), 19))
            .await
            .unwrap();

        // the spawn interval is 30 s; after the update the timer alone
        // must drive the next pass
        rig.handle.update_interval(1).await.unwrap();

        let event = tokio::time::timeout(Duration::from_secs(3), rig.event_rx.recv())
            .await
            .expect("ticker never fired")
            .unwrap();
        let PollerEvent::Alive { asset } = event;
        assert_eq!(asset, "UPS1");

        rig.handle.shutdown().await;
    }

    #[tokio::test]
    async fn malformed_sensor_metric_is_skipped() {
        let mut rig = spawn_rig();

        rig.shm
            .write_metric(
                Metric::new("temperature", "UPS1", "23", now_sec(), 19).with_aux("port", "2"),
            )
            .await
            .unwrap();

        rig.handle.poll_now().await.unwrap();

        assert!(rig.event_rx.try_recv().is_err());

        rig.handle.shutdown().await;
    }
}
