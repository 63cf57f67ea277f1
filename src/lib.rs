use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub mod actors;
pub mod alert_table;
pub mod bus;
pub mod config;
pub mod expiration;
pub mod shm;
pub mod store;
pub mod util;

/// Well-known agent name on the bus.
pub const AGENT_NAME: &str = "outage-agent";

/// Well-known name of the asset service (REPUBLISH target).
pub const ASSET_AGENT: &str = "asset-agent";

/// Stream the agent produces alerts on.
pub const STREAM_ALERTS: &str = "ALERTS";

/// Stream carrying asset-lifecycle events.
pub const STREAM_ASSETS: &str = "ASSETS";

/// Stream carrying metric tombstones.
pub const STREAM_METRICS_UNAVAILABLE: &str = "METRICS_UNAVAILABLE";

/// Aux tag marking a metric as computed (not produced by the device itself).
pub const AUX_COMPUTED: &str = "x-cm-count";

/// Aux tag carrying the port of a sensor-originated metric.
pub const AUX_SENSOR_PORT: &str = "port";

/// Aux tag carrying the symbolic name of a sensor-originated metric.
pub const AUX_SENSOR_NAME: &str = "sname";

/// A decoded metric envelope as read from the shared-memory store or a
/// legacy metric stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metric {
    /// Measured quantity ("temperature", "load", "outage", ...).
    pub quantity: String,

    /// Asset the metric is attributed to.
    pub asset: String,

    pub value: String,
    pub unit: String,

    /// Unix timestamp (seconds) the metric was produced at.
    pub time_sec: u64,

    /// Interval within which the producer promises to report again.
    pub ttl_sec: u32,

    /// Auxiliary key-value pairs.
    #[serde(default)]
    pub aux: HashMap<String, String>,
}

impl Metric {
    pub fn new(
        quantity: impl Into<String>,
        asset: impl Into<String>,
        value: impl Into<String>,
        time_sec: u64,
        ttl_sec: u32,
    ) -> Self {
        Self {
            quantity: quantity.into(),
            asset: asset.into(),
            value: value.into(),
            unit: String::new(),
            time_sec,
            ttl_sec,
            aux: HashMap::new(),
        }
    }

    pub fn with_aux(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.aux.insert(key.into(), value.into());
        self
    }

    /// Computed metrics are synthesised downstream and say nothing about
    /// device liveness.
    pub fn is_computed(&self) -> bool {
        self.aux.contains_key(AUX_COMPUTED)
    }

    pub fn sensor_port(&self) -> Option<&str> {
        self.aux.get(AUX_SENSOR_PORT).map(String::as_str)
    }

    pub fn sensor_name(&self) -> Option<&str> {
        self.aux.get(AUX_SENSOR_NAME).map(String::as_str)
    }

    /// Topic in `quantity@asset` form.
    pub fn topic(&self) -> String {
        format!("{}@{}", self.quantity, self.asset)
    }
}

/// Asset-lifecycle operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetOp {
    Create,
    Update,
    Delete,
    Inventory,
}

impl fmt::Display for AssetOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetOp::Create => write!(f, "create"),
            AssetOp::Update => write!(f, "update"),
            AssetOp::Delete => write!(f, "delete"),
            AssetOp::Inventory => write!(f, "inventory"),
        }
    }
}

impl FromStr for AssetOp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(AssetOp::Create),
            "update" => Ok(AssetOp::Update),
            "delete" => Ok(AssetOp::Delete),
            "inventory" => Ok(AssetOp::Inventory),
            _ => Err(format!("unknown asset operation: {s}")),
        }
    }
}

fn default_status() -> String {
    "active".to_string()
}

fn default_kind() -> String {
    "device".to_string()
}

/// A decoded asset-lifecycle event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetEvent {
    /// Unique asset identifier.
    pub name: String,

    pub operation: AssetOp,

    /// Lifecycle status ("active", "nonactive", "retired").
    #[serde(default = "default_status")]
    pub status: String,

    /// Asset type ("device", "datacenter", ...).
    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,

    /// Device subtype ("ups", "epdu", "sts", "sensor", "sensorgpio", ...).
    #[serde(default)]
    pub subtype: String,

    /// Friendly display name (ext.name).
    #[serde(default)]
    pub ename: Option<String>,

    /// Device type extension (ext.device_type); STS devices without one
    /// carry no measurements.
    #[serde(default)]
    pub device_type: String,
}

impl AssetEvent {
    /// A `create` event for a device of the given subtype.
    pub fn device(name: impl Into<String>, subtype: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            operation: AssetOp::Create,
            status: default_status(),
            kind: default_kind(),
            subtype: subtype.into(),
            ename: None,
            device_type: String::new(),
        }
    }

    pub fn with_ename(mut self, ename: impl Into<String>) -> Self {
        self.ename = Some(ename.into());
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = status.into();
        self
    }

    pub fn with_operation(mut self, operation: AssetOp) -> Self {
        self.operation = operation;
        self
    }
}

/// Alert lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertState {
    Active,
    Resolved,
}

impl fmt::Display for AlertState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertState::Active => write!(f, "ACTIVE"),
            AlertState::Resolved => write!(f, "RESOLVED"),
        }
    }
}

/// Alert severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "INFO"),
            Severity::Warning => write!(f, "WARNING"),
            Severity::Critical => write!(f, "CRITICAL"),
        }
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INFO" => Ok(Severity::Info),
            "WARNING" => Ok(Severity::Warning),
            "CRITICAL" => Ok(Severity::Critical),
            _ => Err(format!("unknown severity: {s}")),
        }
    }
}

/// Notification channel tag carried by an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NotifyChannel {
    Email,
    Sms,
}

impl fmt::Display for NotifyChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotifyChannel::Email => write!(f, "EMAIL"),
            NotifyChannel::Sms => write!(f, "SMS"),
        }
    }
}

/// An outage alert envelope published downstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    /// Rule identifier, `outage@<asset>`.
    pub rule: String,

    /// Asset the alert is raised for.
    pub asset: String,

    pub state: AlertState,
    pub severity: Severity,

    /// Unix timestamp (seconds) the alert was emitted at.
    pub time_sec: u64,

    /// Seconds the alert stays valid for downstream evaluators.
    pub ttl_sec: u32,

    /// Human-readable description (uses the asset friendly name).
    pub description: String,

    /// Channels the alert should be forwarded on.
    pub actions: Vec<NotifyChannel>,
}

impl Alert {
    /// Publication subject, `outage/<severity>/<asset>`.
    pub fn subject(&self) -> String {
        format!("outage/{}/{}", self.severity, self.asset)
    }
}

/// Value of the summary per-asset outage metric.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OutageStatus {
    /// Device presumed down (no metric seen in the last polling pass).
    Active,

    /// Device reporting normally.
    Inactive,

    #[default]
    Unknown,
}

impl fmt::Display for OutageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutageStatus::Active => write!(f, "ACTIVE"),
            OutageStatus::Inactive => write!(f, "INACTIVE"),
            OutageStatus::Unknown => write!(f, "UNKNOWN"),
        }
    }
}
