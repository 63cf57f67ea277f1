use anyhow::Context;
use tracing::trace;

/// Maintenance TTL applied when a mailbox request carries none.
pub const DEFAULT_MAINTENANCE_EXPIRATION_SEC: u64 = 3600;

/// Where the alert table survives restarts.
pub const DEFAULT_STATE_FILE: &str = "/var/lib/outage-agent/state.zpl";

/// Bus endpoint the agent connects to.
pub const DEFAULT_ENDPOINT: &str = "ipc://@/telemetry";

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerSection,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ServerSection {
    /// Default maintenance-mode TTL, in seconds.
    #[serde(default = "default_maintenance_expiration")]
    pub maintenance_expiration: u64,

    /// Polling cadence override, in seconds. Falls back to the
    /// environment-tunable default when absent.
    pub polling_interval: Option<u64>,

    #[serde(default = "default_state_file")]
    pub state_file: String,

    #[serde(default = "default_endpoint")]
    pub endpoint: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            maintenance_expiration: default_maintenance_expiration(),
            polling_interval: None,
            state_file: default_state_file(),
            endpoint: default_endpoint(),
        }
    }
}

fn default_maintenance_expiration() -> u64 {
    DEFAULT_MAINTENANCE_EXPIRATION_SEC
}

fn default_state_file() -> String {
    DEFAULT_STATE_FILE.to_string()
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content =
        std::fs::read_to_string(path).with_context(|| format!("cannot read config file {path}"))?;
    serde_json::from_str(&file_content)
        .with_context(|| format!("invalid outage-agent config {path}"))
        .inspect(|config| trace!("loaded config: {config:?}"))
}
