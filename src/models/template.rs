use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::store::Entity;

// ── Thresholds ───────────────────────────────────────────────

/// What happens when a monitored lease crosses a threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdAction {
    /// Notify only; the lease keeps running.
    Alert,
    /// Freeze the lease and its account.
    Freeze,
}

/// Budget checkpoint: fires once accrued spend reaches `dollars_spent`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetThreshold {
    pub dollars_spent: Decimal,
    pub action: ThresholdAction,
}

/// Duration checkpoint: fires once `hours_remaining` or less are left
/// before the lease's expiration date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DurationThreshold {
    pub hours_remaining: u32,
    pub action: ThresholdAction,
}

// ── Lease Template ───────────────────────────────────────────

/// Admin-defined policy preset that leases are requested against.
///
/// The template's policy fields are copied onto the lease at request time;
/// editing a template never retroactively changes existing leases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaseTemplate {
    pub uuid: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Whether a reviewer must approve each lease request, or requests
    /// auto-activate when an account is available.
    pub requires_approval: bool,
    /// Spend ceiling for a single lease. `None` means unbounded, which the
    /// global config may forbid.
    #[serde(default)]
    pub max_spend: Option<Decimal>,
    #[serde(default)]
    pub budget_thresholds: Vec<BudgetThreshold>,
    /// Lease lifetime in hours. `None` means open-ended, which the global
    /// config may forbid.
    #[serde(default)]
    pub lease_duration_in_hours: Option<u32>,
    #[serde(default)]
    pub duration_thresholds: Vec<DurationThreshold>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

impl Entity for LeaseTemplate {
    type Key = Uuid;
    const ENTITY: &'static str = "lease template";

    fn key(&self) -> Uuid {
        self.uuid
    }
}
