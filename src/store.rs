//! AssetStore - the set of tracked assets
//!
//! Maps asset identifiers to their [`Expiration`] accounting and friendly
//! display names. Asset-lifecycle events decide what enters and leaves the
//! store; metric flow only narrows liveness windows of assets already in it.
//!
//! The store is shared between the server and the metric poller behind a
//! mutex; every method here is a single critical-section unit and must not
//! block.

use std::collections::HashMap;

use tracing::{debug, trace};

use crate::expiration::Expiration;
use crate::{AssetEvent, AssetOp};

/// Store shared between the server and the poller; one method call per
/// lock acquisition.
pub type SharedAssetStore = std::sync::Arc<std::sync::Mutex<AssetStore>>;

/// Default TTL for a newly tracked asset, before any metric has narrowed it.
/// Half of the intended 15-minute default expiry (the derived window is 2·TTL).
pub const DEFAULT_ASSET_EXPIRY_SEC: u64 = 15 * 60 / 2;

/// Device subtypes whose liveness is tracked.
const TRACKED_SUBTYPES: [&str; 4] = ["ups", "epdu", "sensor", "sensorgpio"];

/// Outcome of a liveness touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum Touch {
    Ok,
    /// The metric is dated after `now`; the caller logs and drops it.
    FromFuture,
}

/// Mapping from asset identifier to liveness accounting and display name.
#[derive(Debug, Default)]
pub struct AssetStore {
    /// Tracked assets and their expiration state.
    asset_expir: HashMap<String, Expiration>,

    /// Friendly names; keys are a subset of `asset_expir`.
    asset_enames: HashMap<String, String>,

    /// TTL assigned to newly tracked assets.
    default_expiry_sec: u64,
}

impl AssetStore {
    pub fn new() -> Self {
        Self {
            asset_expir: HashMap::new(),
            asset_enames: HashMap::new(),
            default_expiry_sec: DEFAULT_ASSET_EXPIRY_SEC,
        }
    }

    pub fn default_expiry(&self) -> u64 {
        self.default_expiry_sec
    }

    pub fn set_default_expiry(&mut self, expiry_sec: u64) {
        self.default_expiry_sec = expiry_sec;
    }

    /// Friendly display name, or the empty string if unknown.
    pub fn friendly_name(&self, name: &str) -> &str {
        self.asset_enames.get(name).map_or("", String::as_str)
    }

    pub fn is_tracked(&self, name: &str) -> bool {
        self.asset_expir.contains_key(name)
    }

    /// Apply a decoded asset-lifecycle event.
    ///
    /// Deletion, deactivation and retirement remove the asset; supported
    /// device subtypes are inserted or updated; everything else is ignored.
    /// STS devices without a device type carry no measurements and are
    /// filtered out.
    pub fn apply_asset_event(&mut self, event: &AssetEvent, now_sec: u64) {
        trace!(
            "put {}, operation={}, status={}",
            event.name, event.operation, event.status
        );

        if event.operation == AssetOp::Delete
            || event.status == "nonactive"
            || event.status == "retired"
        {
            debug!("delete {}", event.name);
            self.delete(&event.name);
        } else if event.kind == "device"
            && (TRACKED_SUBTYPES.contains(&event.subtype.as_str())
                || (event.subtype == "sts" && !event.device_type.is_empty()))
        {
            debug!("update {}", event.name);

            if let Some(ename) = &event.ename {
                self.asset_enames
                    .insert(event.name.clone(), ename.clone());
            }

            if !self.asset_expir.contains_key(&event.name) {
                let mut e = Expiration::new(self.default_expiry_sec);
                e.update_last_seen(now_sec);

                debug!(
                    "add {}, last_seen: {} s, ttl: {} s, expires_at: {} s",
                    event.name,
                    e.last_seen(),
                    e.ttl(),
                    e.expiration_time()
                );
                self.asset_expir.insert(event.name.clone(), e);
            }
        }
        // any other combination is not a tracked device
    }

    /// Record a metric observation for `name`.
    ///
    /// Unknown assets are ignored: only declared assets are tracked. The TTL
    /// is narrowed even for future-dated metrics; the last-seen update is
    /// refused for them.
    pub fn touch(&mut self, name: &str, timestamp_sec: u64, ttl_sec: u64, now_sec: u64) -> Touch {
        let Some(e) = self.asset_expir.get_mut(name) else {
            return Touch::Ok;
        };

        e.update_ttl(ttl_sec);

        if timestamp_sec > now_sec {
            return Touch::FromFuture;
        }

        e.update_last_seen(timestamp_sec);

        trace!(
            "touch {name}, last_seen={} s, ttl={} s, expires_at={} s",
            e.last_seen(),
            e.ttl(),
            e.expiration_time()
        );

        Touch::Ok
    }

    /// Set (`until_sec > 0`) or clear (`until_sec == 0`) the maintenance
    /// deadline. Clearing also restores the default TTL the maintenance
    /// window may have outlived. Returns false when the asset is unknown.
    pub fn set_maintenance(&mut self, name: &str, until_sec: u64) -> bool {
        let Some(e) = self.asset_expir.get_mut(name) else {
            return false;
        };

        e.set_maintenance(until_sec);
        if until_sec == 0 {
            e.reset_ttl(self.default_expiry_sec);
        }

        true
    }

    /// Start tracking an asset outside the asset stream (maintenance request
    /// for an asset not yet declared).
    pub fn insert(&mut self, name: &str, ttl_sec: u64, now_sec: u64) {
        let mut e = Expiration::new(ttl_sec);
        e.update_last_seen(now_sec);

        debug!(
            "add {name}, last_seen: {} s, ttl: {} s, expires_at: {} s",
            e.last_seen(),
            e.ttl(),
            e.expiration_time()
        );
        self.asset_expir.insert(name.to_string(), e);
    }

    /// Stop tracking `name`.
    pub fn delete(&mut self, name: &str) {
        self.asset_expir.remove(name);
        self.asset_enames.remove(name);
    }

    /// Every tracked asset whose expiration time has passed.
    pub fn dead_devices(&mut self, now_sec: u64) -> Vec<String> {
        debug!("check dead devices (now: {now_sec} s)");

        let mut dead = Vec::new();
        for (name, e) in &mut self.asset_expir {
            let expires_at = e.expiration_time();
            if expires_at <= now_sec {
                debug!("{name} is down (no metric available)");
                dead.push(name.clone());
            } else {
                trace!("{name} is alive (remaining: {} s)", expires_at - now_sec);
            }
        }

        dead
    }

    /// Every tracked asset, for summary-metric publication.
    pub fn all_devices(&self) -> Vec<String> {
        self.asset_expir.keys().cloned().collect()
    }
}
