//! Message-bus client contract
//!
//! The surrounding telemetry bus is an external collaborator; this module
//! defines only the contract the agent consumes. Outbound traffic goes
//! through the [`BusClient`] trait; inbound traffic arrives pre-decoded as
//! [`BusMessage`] values on an mpsc channel owned by the server actor.
//!
//! ## Design
//!
//! - **Trait-based**: transports (message broker, MQTT bridge, in-process
//!   loopback) are swappable behind `BusClient`
//! - **Async**: all operations are async for compatibility with the actors
//! - **Decoded at the edge**: envelope decoding happens in the transport
//!   adapter, so the core never parses wire bytes
//!
//! [`ChannelBus`] is the in-process loopback used by the bundled binary and
//! the test suite.

use std::fmt;

use async_trait::async_trait;

use crate::{Alert, AssetEvent, Metric};

pub mod channel;

pub use channel::{ChannelBus, MailboxRequest};

/// Result type alias for bus operations
pub type BusResult<T> = Result<T, BusError>;

/// Errors that can occur when talking to the bus
#[derive(Debug)]
pub enum BusError {
    /// The client is not connected
    NotConnected,

    /// Connecting to the endpoint failed
    ConnectFailed(String),

    /// Publishing on a stream failed
    PublishFailed(String),

    /// A mailbox send failed or timed out
    RequestFailed(String),
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusError::NotConnected => write!(f, "bus client is not connected"),
            BusError::ConnectFailed(msg) => write!(f, "failed to connect to bus: {}", msg),
            BusError::PublishFailed(msg) => write!(f, "failed to publish on bus: {}", msg),
            BusError::RequestFailed(msg) => write!(f, "mailbox request failed: {}", msg),
        }
    }
}

impl std::error::Error for BusError {}

/// A decoded inbound message delivered to the server actor.
#[derive(Debug, Clone)]
pub enum BusMessage {
    /// Asset-lifecycle event from the asset stream.
    Asset(AssetEvent),

    /// Metric envelope from a legacy metric or sensor-metric stream.
    Metric(Metric),

    /// Tombstone from the metrics-unavailable stream; topic is
    /// `<type>@<asset>`.
    MetricUnavailable { topic: String },

    /// Direct mailbox request.
    Mailbox {
        sender: String,
        subject: String,
        frames: Vec<String>,
    },
}

/// Client side of the telemetry bus.
///
/// Implementations must be `Send + Sync`; the server actor holds the client
/// behind an `Arc` and never blocks on it while holding the store lock.
#[async_trait]
pub trait BusClient: Send + Sync {
    /// Connect under the given address. Callers bound this with a 1 s
    /// deadline.
    async fn connect(&self, endpoint: &str, address: &str) -> BusResult<()>;

    /// Subscribe to a stream with a pattern filter.
    async fn set_consumer(&self, stream: &str, pattern: &str) -> BusResult<()>;

    /// Register as a producer on a stream.
    async fn set_producer(&self, stream: &str) -> BusResult<()>;

    /// Publish an alert envelope under a subject on the producer stream.
    async fn publish(&self, subject: &str, alert: &Alert) -> BusResult<()>;

    /// Send a mailbox request to a named peer. Callers bound this with a
    /// 5 s deadline.
    async fn request(&self, address: &str, subject: &str, frames: Vec<String>) -> BusResult<()>;
}
