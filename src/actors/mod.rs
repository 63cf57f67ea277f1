//! Actor-based outage detection
//!
//! Two cooperating actors run as independent async tasks communicating via
//! Tokio channels:
//!
//! ```text
//! operator / transport adapter
//!         |                \
//!   ServerCommand        BusMessage (decoded asset events, tombstones,
//!         |                          mailbox requests, legacy metrics)
//!         v                v
//!   +--------------- OutageServer ---------------+     alerts
//!   | dead-device scan, alert table, state file, |--> (BusClient)
//!   | maintenance mode, REPUBLISH                |
//!   +---------------------------------------------+
//!         ^ PollerEvent (liveness)      |
//!         |                             | Arc<Mutex<AssetStore>>
//!   +--------------- OutageMetricPoller ----------+
//!   | snapshot shared metrics, touch store,      |--> summary "outage"
//!   | publish summary metric                     |    metric (MetricShm)
//!   +---------------------------------------------+
//! ```
//!
//! ## Communication Patterns
//!
//! 1. **Commands**: each actor has an mpsc command channel for control
//!    messages, driven through its handle
//! 2. **Liveness events**: the poller reports seen assets to the server,
//!    which alone mutates the alert table
//! 3. **Request/Response**: oneshot channels for synchronous queries
//!
//! The `AssetStore` is the only state shared between the actors; every
//! access takes the mutex for a single store operation and never suspends
//! while holding it.

pub mod messages;
pub mod poller;
pub mod server;
