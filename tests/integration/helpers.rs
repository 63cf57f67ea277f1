//! Helper functions for integration tests

use std::sync::{Arc, Mutex};
use std::time::Duration;

use outage_agent::actors::poller::OutageMetricPollerHandle;
use outage_agent::actors::server::OutageServerHandle;
use outage_agent::bus::{BusClient, BusMessage, ChannelBus, MailboxRequest};
use outage_agent::shm::{MemoryShm, MetricShm};
use outage_agent::store::{AssetStore, SharedAssetStore};
use outage_agent::{Alert, AssetEvent};
use tokio::sync::mpsc;

/// A fully wired agent: both actors, loopback bus, in-memory metric store.
pub struct AgentRig {
    pub server: OutageServerHandle,
    pub poller: OutageMetricPollerHandle,
    pub bus_tx: mpsc::Sender<BusMessage>,
    pub alert_rx: mpsc::UnboundedReceiver<(String, Alert)>,
    pub request_rx: mpsc::UnboundedReceiver<MailboxRequest>,
    pub shm: Arc<MemoryShm>,
    pub store: SharedAssetStore,
}

/// Spawn the full system and complete the bootstrap sequence (connect,
/// producer registration, REPUBLISH drained).
pub async fn spawn_agent() -> AgentRig {
    let (bus, alert_rx, mut request_rx) = ChannelBus::new();
    let bus: Arc<dyn BusClient> = Arc::new(bus);
    let shm = Arc::new(MemoryShm::new());
    let store: SharedAssetStore = Arc::new(Mutex::new(AssetStore::new()));

    let (bus_tx, bus_rx) = mpsc::channel(256);
    let (event_tx, event_rx) = mpsc::channel(256);

    // long base interval; tests drive scans and polls explicitly
    let interval = Duration::from_secs(30);

    let server = OutageServerHandle::spawn(bus.clone(), store.clone(), bus_rx, event_rx, interval);
    let poller = OutageMetricPollerHandle::spawn(
        shm.clone() as Arc<dyn MetricShm>,
        store.clone(),
        event_tx,
        interval,
    );

    server.connect("inproc://test", "outage-agent").await;
    server.producer("ALERTS").await;
    server.consumer("ASSETS", ".*").await;
    server.consumer("METRICS_UNAVAILABLE", ".*").await;

    // the first connect asks the asset service to replay
    let republish = request_rx.recv().await.expect("REPUBLISH request");
    assert_eq!(republish.subject, "REPUBLISH");

    AgentRig {
        server,
        poller,
        bus_tx,
        alert_rx,
        request_rx,
        shm,
        store,
    }
}

impl AgentRig {
    /// Declare a device asset on the asset stream and wait for it to land.
    pub async fn declare_device(&self, name: &str, subtype: &str) {
        self.bus_tx
            .send(BusMessage::Asset(AssetEvent::device(name, subtype)))
            .await
            .unwrap();
        settle().await;
    }

    /// Next published alert, bounded so a missing alert fails fast.
    pub async fn next_alert(&mut self) -> (String, Alert) {
        tokio::time::timeout(Duration::from_secs(2), self.alert_rx.recv())
            .await
            .expect("timed out waiting for an alert")
            .expect("alert channel closed")
    }

    /// Assert nothing was published.
    pub fn expect_no_alert(&mut self) {
        if let Ok((subject, alert)) = self.alert_rx.try_recv() {
            panic!("unexpected alert {subject}: {:?}", alert.state);
        }
    }

    /// Next mailbox reply (or request) captured by the loopback bus.
    pub async fn next_request(&mut self) -> MailboxRequest {
        tokio::time::timeout(Duration::from_secs(2), self.request_rx.recv())
            .await
            .expect("timed out waiting for a mailbox send")
            .expect("request channel closed")
    }

    pub async fn shutdown(&self) {
        self.poller.shutdown().await;
        self.server.shutdown().await;
    }
}

/// Give in-flight channel traffic a moment to drain.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}
