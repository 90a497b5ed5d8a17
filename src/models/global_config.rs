use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Centrally versioned ceiling policy.
///
/// Every lease and template mutation validates against the snapshot that is
/// current at mutation time; snapshots are fetched per operation and never
/// pinned across a saga.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Monotonically increasing version of the stored document.
    pub version: u32,
    /// Ceiling on any single lease's `max_spend`.
    pub max_budget: Option<Decimal>,
    /// When set, leases and templates must declare a `max_spend`.
    pub require_max_budget: bool,
    /// Ceiling on any single lease's duration.
    pub max_duration_hours: Option<u32>,
    /// When set, leases and templates must declare a duration.
    pub require_max_duration: bool,
    /// Active (pending or monitored) leases a single user may hold.
    pub max_leases_per_user: u32,
    /// How long terminated and denied lease records are retained before the
    /// reaper deletes them. `None` retains forever.
    pub lease_ttl_days: Option<u32>,
}

impl GlobalConfig {
    /// Epoch-seconds retention deadline for a lease record that reached a
    /// reaper-eligible state at `from`.
    pub fn retention_deadline(&self, from: DateTime<Utc>) -> Option<i64> {
        self.lease_ttl_days
            .map(|days| (from + Duration::days(i64::from(days))).timestamp())
    }
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            version: 1,
            max_budget: None,
            require_max_budget: false,
            max_duration_hours: None,
            require_max_duration: false,
            max_leases_per_user: 3,
            lease_ttl_days: Some(30),
        }
    }
}
