//! Shared-memory metric store contract
//!
//! The fleet publishes metrics into a store shared across agents on the
//! host; the poller snapshots it in bulk instead of subscribing to every
//! upstream metric. Like the bus, the concrete store is an external
//! collaborator behind a trait; [`MemoryShm`] is the in-process
//! implementation used by the bundled binary and the test suite.

use std::fmt;

use async_trait::async_trait;

use crate::Metric;

pub mod memory;

pub use memory::MemoryShm;

/// Result type alias for metric-store operations
pub type ShmResult<T> = Result<T, ShmError>;

/// Errors that can occur when reading or writing shared metrics
#[derive(Debug)]
pub enum ShmError {
    /// A read filter is not a valid pattern
    InvalidPattern(regex::Error),

    /// Writing a metric failed
    WriteFailed(String),
}

impl fmt::Display for ShmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShmError::InvalidPattern(err) => write!(f, "invalid metric filter: {}", err),
            ShmError::WriteFailed(msg) => write!(f, "failed to write metric: {}", msg),
        }
    }
}

impl std::error::Error for ShmError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ShmError::InvalidPattern(err) => Some(err),
            _ => None,
        }
    }
}

impl From<regex::Error> for ShmError {
    fn from(err: regex::Error) -> Self {
        ShmError::InvalidPattern(err)
    }
}

/// Bulk read/write access to the shared metric store.
#[async_trait]
pub trait MetricShm: Send + Sync {
    /// Snapshot every metric whose quantity and asset match the given
    /// anchored regular expressions (`".*"` for all).
    async fn read_metrics(&self, type_pattern: &str, asset_pattern: &str)
        -> ShmResult<Vec<Metric>>;

    /// Publish a metric envelope, replacing any previous value for the same
    /// `(quantity, asset)` pair.
    async fn write_metric(&self, metric: Metric) -> ShmResult<()>;
}
