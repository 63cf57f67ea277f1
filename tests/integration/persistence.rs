//! Alert-table persistence: a restart must not resolve-and-reraise
//! alerts that were active when the process went down.

use outage_agent::alert_table::AlertTable;
use outage_agent::shm::MetricShm;
use outage_agent::AlertState;

use crate::helpers::*;

#[tokio::test]
async fn active_alerts_survive_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.zpl");

    // first run: three devices die, state is saved
    {
        let mut rig = spawn_agent().await;
        rig.server.state_file(&path).await;
        rig.server.asset_expiry_sec(0).await;

        rig.declare_device("DEVICE-1", "ups").await;
        rig.declare_device("DEVICE-2", "epdu").await;
        rig.declare_device("DEVICE-3", "sensor").await;

        rig.server.scan_now().await.unwrap();
        for _ in 0..3 {
            let (_, alert) = rig.next_alert().await;
            assert_eq!(alert.state, AlertState::Active);
        }

        rig.server.save_now().await.unwrap();
        rig.shutdown().await;
    }

    let table = AlertTable::load(&path).unwrap();
    assert_eq!(table.len(), 3);
    assert!(table.is_active("DEVICE-1"));
    assert!(table.is_active("DEVICE-2"));
    assert!(table.is_active("DEVICE-3"));
    assert!(!table.is_active("DEVICE-4"));

    // second run: the table loads, so recovery resolves without a fresh ACTIVE
    {
        let mut rig = spawn_agent().await;
        rig.server.state_file(&path).await;
        settle().await;

        rig.shm
            .write_metric(outage_agent::Metric::new(
                "load",
                "DEVICE-1",
                "42",
                outage_agent::util::now_sec(),
                19,
            ))
            .await
            .unwrap();
        rig.poller.poll_now().await.unwrap();
        settle().await;

        let (subject, alert) = rig.next_alert().await;
        assert_eq!(subject, "outage/CRITICAL/DEVICE-1");
        assert_eq!(alert.state, AlertState::Resolved);

        rig.shutdown().await;
    }
}

#[tokio::test]
async fn shutdown_saves_without_an_explicit_request() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.zpl");

    let mut rig = spawn_agent().await;
    rig.server.state_file(&path).await;
    rig.server.asset_expiry_sec(0).await;

    rig.declare_device("DEVICE WITH SPACE", "ups").await;
    rig.server.scan_now().await.unwrap();
    let _ = rig.next_alert().await;

    rig.shutdown().await;
    settle().await;

    let table = AlertTable::load(&path).unwrap();
    assert_eq!(table.len(), 1);
    assert!(table.is_active("DEVICE WITH SPACE"));
}
