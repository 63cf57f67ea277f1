//! Message types for actor communication
//!
//! ## Design Principles
//!
//! 1. **Commands**: control messages sent to a specific actor via mpsc
//! 2. **Events**: liveness notifications flowing from the poller to the server
//! 3. **Tokens**: the server command set keeps the wire-era string grammar
//!    through [`ServerCommand::parse`], so operator tooling that speaks the
//!    old frame protocol keeps working

use std::path::PathBuf;

use anyhow::{bail, Result};
use tokio::sync::oneshot;

/// Commands accepted by the OutageServer actor.
#[derive(Debug)]
pub enum ServerCommand {
    /// Connect the bus client under the given address.
    Connect { endpoint: String, address: String },

    /// Subscribe to a stream with a pattern filter.
    Consumer { stream: String, pattern: String },

    /// Register as a producer on a stream.
    Producer { stream: String },

    /// Set the state file and attempt to load the alert table.
    StateFile { path: PathBuf },

    /// Override the store default expiry (seconds).
    AssetExpirySec { expiry_sec: u64 },

    /// Default maintenance TTL when a request omits one (seconds).
    DefaultMaintenanceExpirationSec { expiration_sec: u64 },

    /// Override the polling interval (milliseconds).
    Timeout { timeout_ms: u64 },

    /// Enable verbose message tracing.
    Verbose,

    /// Graceful shutdown: save state and exit.
    Term,

    /// Run one dead-device scan immediately.
    ///
    /// Not part of the token grammar; used by tests and manual triggers.
    ScanNow { respond_to: oneshot::Sender<()> },

    /// Persist the alert table immediately.
    ///
    /// Not part of the token grammar; used by tests and manual triggers.
    SaveNow { respond_to: oneshot::Sender<Result<()>> },
}

impl ServerCommand {
    /// Parse the string-frame command grammar.
    ///
    /// Tokens are case-sensitive; errors are reported to the caller, which
    /// logs a warning and discards the frames.
    pub fn parse(frames: &[String]) -> Result<Self> {
        let mut it = frames.iter();

        let Some(command) = it.next() else {
            bail!("empty command");
        };

        let mut arg = |name: &str| -> Result<String> {
            match it.next() {
                Some(v) => Ok(v.clone()),
                None => bail!("{command}: missing argument '{name}'"),
            }
        };

        match command.as_str() {
            "CONNECT" => Ok(Self::Connect {
                endpoint: arg("endpoint")?,
                address: arg("address")?,
            }),
            "CONSUMER" => Ok(Self::Consumer {
                stream: arg("stream")?,
                pattern: arg("filter")?,
            }),
            "PRODUCER" => Ok(Self::Producer {
                stream: arg("stream")?,
            }),
            "STATE_FILE" => Ok(Self::StateFile {
                path: PathBuf::from(arg("path")?),
            }),
            "ASSET_EXPIRY_SEC" => Ok(Self::AssetExpirySec {
                expiry_sec: arg("seconds")?.parse()?,
            }),
            "DEFAULT_MAINTENANCE_EXPIRATION_SEC" => Ok(Self::DefaultMaintenanceExpirationSec {
                expiration_sec: arg("seconds")?.parse()?,
            }),
            "TIMEOUT" => Ok(Self::Timeout {
                timeout_ms: arg("milliseconds")?.parse()?,
            }),
            "VERBOSE" => Ok(Self::Verbose),
            "$TERM" => Ok(Self::Term),
            other => bail!("unknown actor command: {other}"),
        }
    }
}

/// Liveness notifications sent by the poller to the server.
#[derive(Debug, Clone)]
pub enum PollerEvent {
    /// A non-computed metric was observed for this asset; any active outage
    /// alert should be resolved.
    Alive { asset: String },
}

/// Commands accepted by the OutageMetricPoller actor.
#[derive(Debug)]
pub enum PollerCommand {
    /// Trigger an immediate poll (bypassing the interval timer)
    ///
    /// Used for testing and manual refresh operations.
    PollNow {
        /// Channel to send the result back
        respond_to: oneshot::Sender<Result<()>>,
    },

    /// Update the polling interval
    UpdateInterval {
        /// New interval in seconds
        interval_secs: u64,
    },

    /// Gracefully shut down the poller
    Shutdown,
}
