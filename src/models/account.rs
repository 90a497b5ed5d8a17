use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::Error;
use crate::store::Entity;

/// Pool position of a sandbox account.
///
/// The authoritative signal is the account's organizational-unit placement
/// in the directory service; the record store mirrors it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccountStatus {
    /// In the pool, ready to back a new lease.
    Available,
    /// Claimed by exactly one monitored lease.
    Active,
    /// Claimed, but the owning lease is frozen.
    Frozen,
    /// Lease ended; automated cleanup is outstanding. The account must not
    /// be reused until cleanup completes.
    CleanUp,
    /// Pulled from rotation after drift or a manual quarantine.
    Quarantine,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Available => "Available",
            AccountStatus::Active => "Active",
            AccountStatus::Frozen => "Frozen",
            AccountStatus::CleanUp => "CleanUp",
            AccountStatus::Quarantine => "Quarantine",
        }
    }

    /// Transition legality for the account pool state machine.
    ///
    /// `Quarantine` is reachable from every other status and only leaves
    /// toward `CleanUp` (manual retry-cleanup / eject path).
    pub fn can_transition_to(self, next: AccountStatus) -> bool {
        use AccountStatus::*;
        match (self, next) {
            (Available, Active) => true,
            (Active, Frozen) | (Frozen, Active) => true,
            (Active, CleanUp) | (Frozen, CleanUp) => true,
            (CleanUp, Available) => true,
            (Quarantine, CleanUp) => true,
            (from, Quarantine) => from != Quarantine,
            _ => false,
        }
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to the external cleanup run working on an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupExecutionContext {
    pub execution_id: String,
    pub started_at: DateTime<Utc>,
}

/// A pooled sandbox account. Identity is the AWS account id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SandboxAccount {
    pub aws_account_id: String,
    pub status: AccountStatus,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    /// Present only while `status == CleanUp` and a cleanup run is active.
    #[serde(default)]
    pub cleanup_execution_context: Option<CleanupExecutionContext>,
    /// When drift detection pushed the account into quarantine.
    #[serde(default)]
    pub drift_detected_at: Option<DateTime<Utc>>,
}

impl SandboxAccount {
    pub fn new(aws_account_id: impl Into<String>, status: AccountStatus) -> Self {
        Self {
            aws_account_id: aws_account_id.into(),
            status,
            name: None,
            email: None,
            cleanup_execution_context: None,
            drift_detected_at: None,
        }
    }

    /// Return a copy in `next` status, or an invalid-transition error.
    ///
    /// Leaving `CleanUp` clears the cleanup execution context; leaving
    /// `Quarantine` clears the drift marker.
    pub fn with_status(&self, next: AccountStatus) -> Result<SandboxAccount, Error> {
        if !self.status.can_transition_to(next) {
            return Err(Error::InvalidStateTransition {
                entity: Self::ENTITY,
                key: self.aws_account_id.clone(),
                action: match next {
                    AccountStatus::Available => "release",
                    AccountStatus::Active => "claim",
                    AccountStatus::Frozen => "freeze",
                    AccountStatus::CleanUp => "clean up",
                    AccountStatus::Quarantine => "quarantine",
                },
                status: self.status.to_string(),
            });
        }
        let mut account = self.clone();
        if self.status == AccountStatus::CleanUp {
            account.cleanup_execution_context = None;
        }
        if self.status == AccountStatus::Quarantine {
            account.drift_detected_at = None;
        }
        account.status = next;
        Ok(account)
    }
}

impl Entity for SandboxAccount {
    type Key = String;
    const ENTITY: &'static str = "sandbox account";

    fn key(&self) -> String {
        self.aws_account_id.clone()
    }
}
