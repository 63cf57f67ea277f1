//! End-to-end outage alert cycle: metric silence raises ACTIVE, metric
//! resumption resolves.

use outage_agent::shm::MetricShm;
use outage_agent::util::now_sec;
use outage_agent::{AlertState, Metric, OutageStatus};

use crate::helpers::*;

#[tokio::test]
async fn silence_raises_and_metrics_resolve() {
    let mut rig = spawn_agent().await;

    // an asset whose liveness window is already over
    rig.server.asset_expiry_sec(0).await;
    rig.declare_device("UPS33", "ups").await;

    rig.server.scan_now().await.unwrap();
    let (subject, alert) = rig.next_alert().await;
    assert_eq!(subject, "outage/CRITICAL/UPS33");
    assert_eq!(alert.state, AlertState::Active);
    assert_eq!(alert.rule, "outage@UPS33");

    // the device reports again through the shared store
    rig.shm
        .write_metric(Metric::new("load", "UPS33", "42", now_sec(), 19))
        .await
        .unwrap();
    rig.poller.poll_now().await.unwrap();
    settle().await;

    let (_, alert) = rig.next_alert().await;
    assert_eq!(alert.state, AlertState::Resolved);

    rig.shutdown().await;
}

#[tokio::test]
async fn continually_touched_devices_never_alert() {
    let mut rig = spawn_agent().await;

    // 1 s default ttl: the derived window is 2 s
    rig.server.asset_expiry_sec(1).await;
    rig.declare_device("UPS-1", "ups").await;

    // report at twice the required rate, scanning in between
    for _ in 0..4 {
        rig.shm
            .write_metric(Metric::new("load", "UPS-1", "42", now_sec(), 1))
            .await
            .unwrap();
        rig.poller.poll_now().await.unwrap();
        rig.server.scan_now().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
    }

    rig.expect_no_alert();
    rig.shutdown().await;
}

#[tokio::test]
async fn summary_metric_covers_every_known_device() {
    let rig = spawn_agent().await;

    rig.declare_device("UPS-1", "ups").await;
    rig.declare_device("EPDU-1", "epdu").await;

    // only UPS-1 reports
    rig.shm
        .write_metric(Metric::new("load", "UPS-1", "42", now_sec(), 19))
        .await
        .unwrap();
    rig.poller.poll_now().await.unwrap();

    let seen = rig.shm.read_metrics("outage", "UPS-1").await.unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].value, OutageStatus::Inactive.to_string());

    let unseen = rig.shm.read_metrics("outage", "EPDU-1").await.unwrap();
    assert_eq!(unseen.len(), 1);
    assert_eq!(unseen[0].value, OutageStatus::Active.to_string());

    rig.shutdown().await;
}

#[tokio::test]
async fn deactivation_resolves_the_alert() {
    let mut rig = spawn_agent().await;

    rig.server.asset_expiry_sec(0).await;
    rig.declare_device("UPS-42", "ups").await;
    rig.server.scan_now().await.unwrap();
    let (_, alert) = rig.next_alert().await;
    assert_eq!(alert.state, AlertState::Active);

    rig.bus_tx
        .send(outage_agent::bus::BusMessage::Asset(
            outage_agent::AssetEvent::device("UPS-42", "ups").with_status("nonactive"),
        ))
        .await
        .unwrap();
    settle().await;

    let (_, alert) = rig.next_alert().await;
    assert_eq!(alert.state, AlertState::Resolved);
    assert!(!rig.store.lock().unwrap().is_tracked("UPS-42"));

    // deleted devices stay out of later scans
    rig.server.scan_now().await.unwrap();
    settle().await;
    rig.expect_no_alert();

    rig.shutdown().await;
}

#[tokio::test]
async fn tombstone_resolves_and_stops_tracking() {
    let mut rig = spawn_agent().await;

    rig.server.asset_expiry_sec(0).await;
    rig.declare_device("SENSOR-5", "sensor").await;
    rig.server.scan_now().await.unwrap();
    let _ = rig.next_alert().await;

    rig.bus_tx
        .send(outage_agent::bus::BusMessage::MetricUnavailable {
            topic: "temperature@SENSOR-5".to_string(),
        })
        .await
        .unwrap();
    settle().await;

    let (_, alert) = rig.next_alert().await;
    assert_eq!(alert.state, AlertState::Resolved);
    assert!(!rig.store.lock().unwrap().is_tracked("SENSOR-5"));

    rig.shutdown().await;
}

#[tokio::test]
async fn alert_description_uses_the_friendly_name() {
    let mut rig = spawn_agent().await;

    rig.server.asset_expiry_sec(0).await;
    rig.bus_tx
        .send(outage_agent::bus::BusMessage::Asset(
            outage_agent::AssetEvent::device("UPS-9", "ups").with_ename("Server Room UPS"),
        ))
        .await
        .unwrap();
    settle().await;

    rig.server.scan_now().await.unwrap();
    let (_, alert) = rig.next_alert().await;
    assert!(alert.description.contains("Server Room UPS"));

    rig.shutdown().await;
}
