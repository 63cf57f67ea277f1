use chrono::Utc;

const POLLING_INTERVAL: &str = "OUTAGE_POLLING_SEC";

const DEFAULT_POLLING_INTERVAL_SEC: u64 = 30;

/// Current wall-clock time in unix seconds.
pub fn now_sec() -> u64 {
    let ts = Utc::now().timestamp();
    u64::try_from(ts).unwrap_or(0)
}

/// Polling cadence shared by the dead-device scan and the metric poller.
/// Overridable through the environment for test rigs and dense fleets.
pub fn get_polling_interval() -> u64 {
    let interval_from_env = std::env::var(POLLING_INTERVAL);
    interval_from_env.map_or(DEFAULT_POLLING_INTERVAL_SEC, |res| {
        res.parse().unwrap_or(DEFAULT_POLLING_INTERVAL_SEC)
    })
}
