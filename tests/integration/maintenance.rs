//! Maintenance mode over the mailbox: suppression, auto-expiry, replies.

use outage_agent::bus::BusMessage;
use outage_agent::AlertState;

use crate::helpers::*;

async fn maintenance_request(rig: &AgentRig, uuid: &str, frames: &[&str]) {
    let mut all = vec!["REQUEST".to_string(), uuid.to_string()];
    all.extend(frames.iter().map(|s| s.to_string()));

    rig.bus_tx
        .send(BusMessage::Mailbox {
            sender: "operator-cli".to_string(),
            subject: "MAINTENANCE_MODE".to_string(),
            frames: all,
        })
        .await
        .unwrap();
    settle().await;
}

#[tokio::test]
async fn enable_resolves_then_expiry_reraises() {
    let mut rig = spawn_agent().await;

    rig.server.asset_expiry_sec(0).await;
    rig.declare_device("UPS-42", "ups").await;
    rig.server.scan_now().await.unwrap();
    let (_, alert) = rig.next_alert().await;
    assert_eq!(alert.state, AlertState::Active);

    // one second of maintenance
    maintenance_request(&rig, "req-1", &["MAINTENANCE_MODE", "enable", "UPS-42", "1"]).await;

    let reply = rig.next_request().await;
    assert_eq!(reply.address, "operator-cli");
    assert_eq!(
        reply.frames,
        vec!["req-1".to_string(), "REPLY".to_string(), "OK".to_string()]
    );

    let (_, alert) = rig.next_alert().await;
    assert_eq!(alert.state, AlertState::Resolved);

    // within the maintenance window the scan stays quiet
    rig.server.scan_now().await.unwrap();
    settle().await;
    rig.expect_no_alert();

    // deadline passes without metrics: the outage is real again
    tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
    rig.server.scan_now().await.unwrap();
    let (_, alert) = rig.next_alert().await;
    assert_eq!(alert.state, AlertState::Active);

    rig.shutdown().await;
}

#[tokio::test]
async fn enable_for_an_undeclared_asset_starts_tracking() {
    let mut rig = spawn_agent().await;

    maintenance_request(
        &rig,
        "req-2",
        &["MAINTENANCE_MODE", "enable", "UPS-77", "3600"],
    )
    .await;

    let reply = rig.next_request().await;
    assert_eq!(reply.frames[2], "OK");
    assert!(rig.store.lock().unwrap().is_tracked("UPS-77"));

    rig.shutdown().await;
}

#[tokio::test]
async fn disable_restores_the_default_window() {
    let mut rig = spawn_agent().await;

    rig.server.asset_expiry_sec(3600).await;
    rig.declare_device("UPS-42", "ups").await;

    maintenance_request(&rig, "req-3", &["MAINTENANCE_MODE", "enable", "UPS-42", "1"]).await;
    let _ = rig.next_request().await;

    maintenance_request(&rig, "req-4", &["MAINTENANCE_MODE", "disable", "UPS-42"]).await;
    let reply = rig.next_request().await;
    assert_eq!(reply.frames[2], "OK");

    // back on the default window: nothing is dead
    rig.server.scan_now().await.unwrap();
    settle().await;
    rig.expect_no_alert();

    rig.shutdown().await;
}

#[tokio::test]
async fn several_assets_in_one_request() {
    let mut rig = spawn_agent().await;

    rig.server.asset_expiry_sec(0).await;
    rig.declare_device("UPS-1", "ups").await;
    rig.declare_device("UPS-2", "ups").await;

    maintenance_request(
        &rig,
        "req-5",
        &["MAINTENANCE_MODE", "enable", "UPS-1", "UPS-2", "3600"],
    )
    .await;

    let reply = rig.next_request().await;
    assert_eq!(reply.frames[2], "OK");

    rig.server.scan_now().await.unwrap();
    settle().await;
    rig.expect_no_alert();

    rig.shutdown().await;
}

#[tokio::test]
async fn malformed_requests_get_error_replies() {
    let mut rig = spawn_agent().await;

    maintenance_request(&rig, "req-6", &["MAINTENANCE_MODE", "pause", "UPS-1"]).await;
    let reply = rig.next_request().await;
    assert_eq!(reply.frames[2], "ERROR");
    assert_eq!(reply.frames[3], "Unsupported maintenance mode");

    maintenance_request(&rig, "req-7", &["MAINTENANCE_MODE"]).await;
    let reply = rig.next_request().await;
    assert_eq!(reply.frames[3], "Missing maintenance mode");

    rig.shutdown().await;
}
