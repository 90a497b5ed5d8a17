use serde::{Deserialize, Serialize};

use crate::models::lease::{FreezeReason, LeaseKey, TerminationReason};

/// A completed-transition notification for downstream consumers.
///
/// Events are published at-least-once, only after the operation's saga has
/// fully committed. A publish failure after commit is logged, never rolled
/// back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "detail")]
pub enum DomainEvent {
    LeaseRequested {
        lease: LeaseKey,
        requires_approval: bool,
    },
    LeaseApproved {
        lease: LeaseKey,
        aws_account_id: String,
        /// `None` when the template auto-approved the request.
        approved_by: Option<String>,
    },
    LeaseDenied {
        lease: LeaseKey,
        denied_by: String,
    },
    LeaseFrozen {
        lease: LeaseKey,
        aws_account_id: String,
        reason: FreezeReason,
    },
    LeaseTerminated {
        lease: LeaseKey,
        reason: TerminationReason,
    },
    AccountQuarantined {
        aws_account_id: String,
        drift: bool,
    },
    AccountDriftDetected {
        aws_account_id: String,
    },
    AccountEjected {
        aws_account_id: String,
    },
    /// Ask the external cleaner to wipe an account sitting in `CleanUp`.
    CleanAccountRequest {
        aws_account_id: String,
    },
}

impl DomainEvent {
    /// Discriminator string, as it appears on the wire.
    pub fn event_type(&self) -> &'static str {
        match self {
            DomainEvent::LeaseRequested { .. } => "LeaseRequested",
            DomainEvent::LeaseApproved { .. } => "LeaseApproved",
            DomainEvent::LeaseDenied { .. } => "LeaseDenied",
            DomainEvent::LeaseFrozen { .. } => "LeaseFrozen",
            DomainEvent::LeaseTerminated { .. } => "LeaseTerminated",
            DomainEvent::AccountQuarantined { .. } => "AccountQuarantined",
            DomainEvent::AccountDriftDetected { .. } => "AccountDriftDetected",
            DomainEvent::AccountEjected { .. } => "AccountEjected",
            DomainEvent::CleanAccountRequest { .. } => "CleanAccountRequest",
        }
    }
}
