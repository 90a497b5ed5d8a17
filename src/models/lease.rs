use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::errors::Error;
use crate::models::template::{BudgetThreshold, DurationThreshold, LeaseTemplate};
use crate::store::Entity;

/// Discriminant of the [`Lease`] union.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LeaseStatus {
    PendingApproval,
    ApprovalDenied,
    Active,
    Frozen,
    Expired,
    BudgetExceeded,
    ManuallyTerminated,
    AccountQuarantined,
    Ejected,
}

impl LeaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeaseStatus::PendingApproval => "PendingApproval",
            LeaseStatus::ApprovalDenied => "ApprovalDenied",
            LeaseStatus::Active => "Active",
            LeaseStatus::Frozen => "Frozen",
            LeaseStatus::Expired => "Expired",
            LeaseStatus::BudgetExceeded => "BudgetExceeded",
            LeaseStatus::ManuallyTerminated => "ManuallyTerminated",
            LeaseStatus::AccountQuarantined => "AccountQuarantined",
            LeaseStatus::Ejected => "Ejected",
        }
    }

    /// Monitored statuses carry an assigned account and are swept by the
    /// threshold monitor.
    pub fn is_monitored(self) -> bool {
        matches!(self, LeaseStatus::Active | LeaseStatus::Frozen)
    }

    /// Terminal statuses are absorbing: no operation transitions out of
    /// them, and only terminal (or denied) records are reaper-eligible.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            LeaseStatus::Expired
                | LeaseStatus::BudgetExceeded
                | LeaseStatus::ManuallyTerminated
                | LeaseStatus::AccountQuarantined
                | LeaseStatus::Ejected
        )
    }
}

impl fmt::Display for LeaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a monitored lease ended. Maps one-to-one onto the terminal statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    Expired,
    BudgetExceeded,
    ManuallyTerminated,
    AccountQuarantined,
    Ejected,
}

impl TerminationReason {
    pub fn status(self) -> LeaseStatus {
        match self {
            TerminationReason::Expired => LeaseStatus::Expired,
            TerminationReason::BudgetExceeded => LeaseStatus::BudgetExceeded,
            TerminationReason::ManuallyTerminated => LeaseStatus::ManuallyTerminated,
            TerminationReason::AccountQuarantined => LeaseStatus::AccountQuarantined,
            TerminationReason::Ejected => LeaseStatus::Ejected,
        }
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.status().as_str())
    }
}

/// Why a lease was frozen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FreezeReason {
    BudgetThreshold,
    DurationThreshold,
    Manual,
}

/// Composite lease identity: (owner email, uuid).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LeaseKey {
    pub user_email: String,
    pub uuid: Uuid,
}

impl LeaseKey {
    pub fn new(user_email: impl Into<String>, uuid: Uuid) -> Self {
        Self {
            user_email: user_email.into(),
            uuid,
        }
    }
}

impl fmt::Display for LeaseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.user_email, self.uuid)
    }
}

// ── Variant payloads ─────────────────────────────────────────

/// A lease request awaiting (or denied) review. Never carries an account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingLease {
    pub user_email: String,
    pub uuid: Uuid,
    pub original_lease_template_uuid: Uuid,
    pub original_lease_template_name: String,
    #[serde(default)]
    pub comments: Option<String>,
    /// Policy snapshot copied from the template at request time. Later
    /// template edits do not reach back into this lease.
    #[serde(default)]
    pub max_spend: Option<Decimal>,
    #[serde(default)]
    pub budget_thresholds: Vec<BudgetThreshold>,
    #[serde(default)]
    pub lease_duration_in_hours: Option<u32>,
    #[serde(default)]
    pub duration_thresholds: Vec<DurationThreshold>,
    pub created_at: DateTime<Utc>,
}

impl PendingLease {
    /// Snapshot a template into a new pending request.
    pub fn from_template(
        template: &LeaseTemplate,
        user_email: impl Into<String>,
        comments: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            user_email: user_email.into(),
            uuid: Uuid::new_v4(),
            original_lease_template_uuid: template.uuid,
            original_lease_template_name: template.name.clone(),
            comments,
            max_spend: template.max_spend,
            budget_thresholds: template.budget_thresholds.clone(),
            lease_duration_in_hours: template.lease_duration_in_hours,
            duration_thresholds: template.duration_thresholds.clone(),
            created_at: now,
        }
    }
}

/// A denied request, retained until its TTL lapses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeniedLease {
    #[serde(flatten)]
    pub request: PendingLease,
    /// The reviewer who made the decision.
    pub approved_by: String,
    pub decided_at: DateTime<Utc>,
    /// Epoch-seconds retention deadline for the reaper.
    #[serde(default)]
    pub ttl: Option<i64>,
}

/// An activated lease under budget/duration monitoring. The only lease
/// shape that carries an account id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoredLease {
    pub user_email: String,
    pub uuid: Uuid,
    pub original_lease_template_uuid: Uuid,
    pub original_lease_template_name: String,
    #[serde(default)]
    pub comments: Option<String>,
    /// `None` when the template auto-approved the request.
    #[serde(default)]
    pub approved_by: Option<String>,
    pub aws_account_id: String,
    pub start_date: DateTime<Utc>,
    /// Calendar bound of the lease. Once set, `expiration_date − start_date`
    /// is the authoritative duration, not the template's hour count.
    #[serde(default)]
    pub expiration_date: Option<DateTime<Utc>>,
    pub total_cost_accrued: Decimal,
    #[serde(default)]
    pub max_spend: Option<Decimal>,
    #[serde(default)]
    pub budget_thresholds: Vec<BudgetThreshold>,
    #[serde(default)]
    pub duration_thresholds: Vec<DurationThreshold>,
    pub created_at: DateTime<Utc>,
}

/// A lease in one of the five terminal statuses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerminatedLease {
    pub user_email: String,
    pub uuid: Uuid,
    pub original_lease_template_uuid: Uuid,
    pub original_lease_template_name: String,
    #[serde(default)]
    pub comments: Option<String>,
    #[serde(default)]
    pub approved_by: Option<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    /// Final accrued cost at termination time.
    pub total_cost_accrued: Decimal,
    /// Epoch-seconds retention deadline for the reaper.
    #[serde(default)]
    pub ttl: Option<i64>,
    pub created_at: DateTime<Utc>,
}

// ── The union ────────────────────────────────────────────────

/// A time/budget-bounded grant of a sandbox account, keyed by `status`.
///
/// All transitions go through the fallible methods below; terminal statuses
/// are absorbing. Matching is exhaustive by construction: adding a status
/// forces every consumer to handle it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum Lease {
    PendingApproval(PendingLease),
    ApprovalDenied(DeniedLease),
    Active(MonitoredLease),
    Frozen(MonitoredLease),
    Expired(TerminatedLease),
    BudgetExceeded(TerminatedLease),
    ManuallyTerminated(TerminatedLease),
    AccountQuarantined(TerminatedLease),
    Ejected(TerminatedLease),
}

impl Lease {
    pub fn status(&self) -> LeaseStatus {
        match self {
            Lease::PendingApproval(_) => LeaseStatus::PendingApproval,
            Lease::ApprovalDenied(_) => LeaseStatus::ApprovalDenied,
            Lease::Active(_) => LeaseStatus::Active,
            Lease::Frozen(_) => LeaseStatus::Frozen,
            Lease::Expired(_) => LeaseStatus::Expired,
            Lease::BudgetExceeded(_) => LeaseStatus::BudgetExceeded,
            Lease::ManuallyTerminated(_) => LeaseStatus::ManuallyTerminated,
            Lease::AccountQuarantined(_) => LeaseStatus::AccountQuarantined,
            Lease::Ejected(_) => LeaseStatus::Ejected,
        }
    }

    pub fn user_email(&self) -> &str {
        match self {
            Lease::PendingApproval(l) => &l.user_email,
            Lease::ApprovalDenied(l) => &l.request.user_email,
            Lease::Active(l) | Lease::Frozen(l) => &l.user_email,
            Lease::Expired(l)
            | Lease::BudgetExceeded(l)
            | Lease::ManuallyTerminated(l)
            | Lease::AccountQuarantined(l)
            | Lease::Ejected(l) => &l.user_email,
        }
    }

    pub fn uuid(&self) -> Uuid {
        match self {
            Lease::PendingApproval(l) => l.uuid,
            Lease::ApprovalDenied(l) => l.request.uuid,
            Lease::Active(l) | Lease::Frozen(l) => l.uuid,
            Lease::Expired(l)
            | Lease::BudgetExceeded(l)
            | Lease::ManuallyTerminated(l)
            | Lease::AccountQuarantined(l)
            | Lease::Ejected(l) => l.uuid,
        }
    }

    /// Assigned account, present only for monitored statuses.
    pub fn aws_account_id(&self) -> Option<&str> {
        match self {
            Lease::Active(l) | Lease::Frozen(l) => Some(l.aws_account_id.as_str()),
            _ => None,
        }
    }

    pub fn as_monitored(&self) -> Option<&MonitoredLease> {
        match self {
            Lease::Active(l) | Lease::Frozen(l) => Some(l),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }

    /// Retention deadline for reaper-eligible records (denied or terminal).
    pub fn retention_deadline(&self) -> Option<i64> {
        match self {
            Lease::ApprovalDenied(l) => l.ttl,
            Lease::Expired(l)
            | Lease::BudgetExceeded(l)
            | Lease::ManuallyTerminated(l)
            | Lease::AccountQuarantined(l)
            | Lease::Ejected(l) => l.ttl,
            _ => None,
        }
    }

    fn invalid(&self, action: &'static str) -> Error {
        Error::InvalidStateTransition {
            entity: Self::ENTITY,
            key: self.key().to_string(),
            action,
            status: self.status().to_string(),
        }
    }

    // ── Transitions ──────────────────────────────────────────

    /// `PendingApproval → Active`, binding the lease to `aws_account_id`.
    ///
    /// `approved_by` is `None` on the auto-approval path. The expiration
    /// date is fixed here from the snapshot's duration; afterwards the
    /// calendar bounds are authoritative.
    pub fn approve(
        self,
        approved_by: Option<String>,
        aws_account_id: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<Lease, Error> {
        match self {
            Lease::PendingApproval(p) => Ok(Lease::Active(MonitoredLease {
                user_email: p.user_email,
                uuid: p.uuid,
                original_lease_template_uuid: p.original_lease_template_uuid,
                original_lease_template_name: p.original_lease_template_name,
                comments: p.comments,
                approved_by,
                aws_account_id: aws_account_id.into(),
                start_date: now,
                expiration_date: p
                    .lease_duration_in_hours
                    .map(|h| now + Duration::hours(i64::from(h))),
                total_cost_accrued: Decimal::ZERO,
                max_spend: p.max_spend,
                budget_thresholds: p.budget_thresholds,
                duration_thresholds: p.duration_thresholds,
                created_at: p.created_at,
            })),
            other => Err(other.invalid("approve")),
        }
    }

    /// `PendingApproval → ApprovalDenied`.
    pub fn deny(
        self,
        denied_by: impl Into<String>,
        now: DateTime<Utc>,
        ttl: Option<i64>,
    ) -> Result<Lease, Error> {
        match self {
            Lease::PendingApproval(p) => Ok(Lease::ApprovalDenied(DeniedLease {
                request: p,
                approved_by: denied_by.into(),
                decided_at: now,
                ttl,
            })),
            other => Err(other.invalid("deny")),
        }
    }

    /// `Active → Frozen`. Freezing is one-directional: a frozen lease never
    /// reactivates, it can only terminate.
    pub fn freeze(self) -> Result<Lease, Error> {
        match self {
            Lease::Active(m) => Ok(Lease::Frozen(m)),
            other => Err(other.invalid("freeze")),
        }
    }

    /// `Active|Frozen → <terminal status for reason>`.
    pub fn terminate(
        self,
        reason: TerminationReason,
        now: DateTime<Utc>,
        ttl: Option<i64>,
    ) -> Result<Lease, Error> {
        let m = match self {
            Lease::Active(m) | Lease::Frozen(m) => m,
            other => return Err(other.invalid("terminate")),
        };
        let terminated = TerminatedLease {
            user_email: m.user_email,
            uuid: m.uuid,
            original_lease_template_uuid: m.original_lease_template_uuid,
            original_lease_template_name: m.original_lease_template_name,
            comments: m.comments,
            approved_by: m.approved_by,
            start_date: m.start_date,
            end_date: now,
            total_cost_accrued: m.total_cost_accrued,
            ttl,
            created_at: m.created_at,
        };
        Ok(match reason {
            TerminationReason::Expired => Lease::Expired(terminated),
            TerminationReason::BudgetExceeded => Lease::BudgetExceeded(terminated),
            TerminationReason::ManuallyTerminated => Lease::ManuallyTerminated(terminated),
            TerminationReason::AccountQuarantined => Lease::AccountQuarantined(terminated),
            TerminationReason::Ejected => Lease::Ejected(terminated),
        })
    }
}

impl Entity for Lease {
    type Key = LeaseKey;
    const ENTITY: &'static str = "lease";

    fn key(&self) -> LeaseKey {
        LeaseKey::new(self.user_email(), self.uuid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::template::ThresholdAction;

    fn template() -> LeaseTemplate {
        LeaseTemplate {
            uuid: Uuid::new_v4(),
            name: "sandbox-7d".into(),
            description: None,
            requires_approval: true,
            max_spend: Some(Decimal::from(100)),
            budget_thresholds: vec![BudgetThreshold {
                dollars_spent: Decimal::from(80),
                action: ThresholdAction::Freeze,
            }],
            lease_duration_in_hours: Some(168),
            duration_thresholds: vec![],
            created_by: "admin@example.com".into(),
            created_at: Utc::now(),
        }
    }

    fn pending() -> Lease {
        Lease::PendingApproval(PendingLease::from_template(
            &template(),
            "dev@example.com",
            Some("trying a thing".into()),
            Utc::now(),
        ))
    }

    #[test]
    fn request_snapshots_template_policy() {
        let t = template();
        let p = PendingLease::from_template(&t, "dev@example.com", None, Utc::now());
        assert_eq!(p.max_spend, t.max_spend);
        assert_eq!(p.lease_duration_in_hours, t.lease_duration_in_hours);
        assert_eq!(p.original_lease_template_uuid, t.uuid);
        assert_eq!(p.budget_thresholds, t.budget_thresholds);
    }

    #[test]
    fn approve_assigns_account_and_expiration() {
        let now = Utc::now();
        let lease = pending()
            .approve(Some("reviewer@example.com".into()), "111122223333", now)
            .unwrap();

        assert_eq!(lease.status(), LeaseStatus::Active);
        assert_eq!(lease.aws_account_id(), Some("111122223333"));
        let m = lease.as_monitored().unwrap();
        assert_eq!(m.start_date, now);
        assert_eq!(m.expiration_date, Some(now + Duration::hours(168)));
        assert_eq!(m.total_cost_accrued, Decimal::ZERO);
    }

    #[test]
    fn deny_keeps_request_and_records_reviewer() {
        let now = Utc::now();
        let lease = pending().deny("reviewer@example.com", now, Some(123)).unwrap();
        assert_eq!(lease.status(), LeaseStatus::ApprovalDenied);
        assert_eq!(lease.aws_account_id(), None);
        assert_eq!(lease.retention_deadline(), Some(123));
    }

    #[test]
    fn freeze_only_from_active() {
        let active = pending().approve(None, "111122223333", Utc::now()).unwrap();
        let frozen = active.freeze().unwrap();
        assert_eq!(frozen.status(), LeaseStatus::Frozen);
        // One-directional: a frozen lease cannot freeze again.
        assert!(frozen.freeze().is_err());
        assert!(pending().freeze().is_err());
    }

    #[test]
    fn terminate_maps_reason_to_terminal_status() {
        for (reason, status) in [
            (TerminationReason::Expired, LeaseStatus::Expired),
            (TerminationReason::BudgetExceeded, LeaseStatus::BudgetExceeded),
            (
                TerminationReason::ManuallyTerminated,
                LeaseStatus::ManuallyTerminated,
            ),
            (
                TerminationReason::AccountQuarantined,
                LeaseStatus::AccountQuarantined,
            ),
            (TerminationReason::Ejected, LeaseStatus::Ejected),
        ] {
            let active = pending().approve(None, "111122223333", Utc::now()).unwrap();
            let ended = active.terminate(reason, Utc::now(), Some(1)).unwrap();
            assert_eq!(ended.status(), status);
            // The account id does not survive termination.
            assert_eq!(ended.aws_account_id(), None);
            assert_eq!(ended.retention_deadline(), Some(1));
        }
    }

    #[test]
    fn terminal_statuses_are_absorbing() {
        let now = Utc::now();
        let ended = pending()
            .approve(None, "111122223333", now)
            .unwrap()
            .terminate(TerminationReason::ManuallyTerminated, now, None)
            .unwrap();

        for attempt in [
            ended.clone().approve(None, "444455556666", now),
            ended.clone().deny("r@example.com", now, None),
            ended.clone().freeze(),
            ended
                .clone()
                .terminate(TerminationReason::Expired, now, None),
        ] {
            let err = attempt.unwrap_err();
            assert!(
                matches!(err, Error::InvalidStateTransition { .. }),
                "terminal lease accepted a transition: {err}"
            );
        }
    }

    #[test]
    fn pending_cannot_terminate_directly() {
        let err = pending()
            .terminate(TerminationReason::ManuallyTerminated, Utc::now(), None)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidStateTransition { .. }));
    }

    #[test]
    fn status_is_the_serde_tag() {
        let lease = pending().approve(None, "111122223333", Utc::now()).unwrap();
        let json = serde_json::to_value(&lease).unwrap();
        assert_eq!(json["status"], "Active");
        assert_eq!(json["aws_account_id"], "111122223333");

        let back: Lease = serde_json::from_value(json).unwrap();
        assert_eq!(back, lease);
    }

    #[test]
    fn lease_key_is_owner_and_uuid() {
        let lease = pending();
        let key = lease.key();
        assert_eq!(key.user_email, "dev@example.com");
        assert_eq!(key.uuid, lease.uuid());
        assert_eq!(key.to_string(), format!("dev@example.com/{}", lease.uuid()));
    }
}
