//! Per-asset liveness accounting
//!
//! An [`Expiration`] tracks when an asset was last heard from and how long it
//! promised to stay silent at most. The derived expiration instant is the
//! point past which the asset is considered dead:
//!
//! ```text
//! expiration_time = last_seen + 2·ttl        (normal operation)
//! expiration_time = maintenance_until        (while a maintenance deadline
//!                                             is later than the above)
//! ```
//!
//! Two rules keep the window honest: `last_seen` can only move forward, so an
//! aggregate metric dated in the past cannot shrink the window into a false
//! outage; `ttl` can only shrink, so a device that ever advertised a short
//! reporting interval is held to it.

use tracing::trace;

/// Liveness window of a single tracked asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expiration {
    /// Unix seconds a non-computed metric was last observed at.
    last_seen_sec: u64,

    /// Smallest TTL ever advertised for this asset.
    ttl_sec: u64,

    /// Maintenance deadline, 0 when not in maintenance.
    maintenance_until_sec: u64,
}

impl Expiration {
    pub fn new(default_ttl_sec: u64) -> Self {
        Self {
            last_seen_sec: 0,
            ttl_sec: default_ttl_sec,
            maintenance_until_sec: 0,
        }
    }

    pub fn last_seen(&self) -> u64 {
        self.last_seen_sec
    }

    pub fn ttl(&self) -> u64 {
        self.ttl_sec
    }

    pub fn maintenance(&self) -> u64 {
        self.maintenance_until_sec
    }

    /// Record an observation. Only ever prolongs the window.
    pub fn update_last_seen(&mut self, last_seen_sec: u64) {
        if last_seen_sec > self.last_seen_sec {
            trace!("set last_seen to {last_seen_sec} s");
            self.last_seen_sec = last_seen_sec;
        }
    }

    /// Narrow the advertised TTL. Only ever reduces it.
    pub fn update_ttl(&mut self, ttl_sec: u64) {
        if ttl_sec < self.ttl_sec {
            trace!("set ttl to {ttl_sec} s");
            self.ttl_sec = ttl_sec;
        }
    }

    /// Set or clear (0) the maintenance deadline. Unconditional: maintenance
    /// is operator-driven, never a side effect of metric flow.
    pub fn set_maintenance(&mut self, until_sec: u64) {
        self.maintenance_until_sec = until_sec;
    }

    /// Restore the TTL to a store-wide default when maintenance ends.
    /// `update_ttl` alone can never raise it again.
    pub fn reset_ttl(&mut self, ttl_sec: u64) {
        self.ttl_sec = ttl_sec;
    }

    /// Unix second past which the asset counts as dead.
    ///
    /// An elapsed maintenance deadline is cleared here as a side effect, so
    /// the next computation falls back to the metric-derived window.
    pub fn expiration_time(&mut self) -> u64 {
        let mut time_sec = self.last_seen_sec + self.ttl_sec * 2;

        if self.maintenance_until_sec != 0 {
            if self.maintenance_until_sec > time_sec {
                time_sec = self.maintenance_until_sec;
            } else {
                // outdated, auto reset
                trace!("maintenance mode auto reset");
                self.maintenance_until_sec = 0;
            }
        }

        time_sec
    }
}
