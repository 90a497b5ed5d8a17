//! Account directory seam: organizational-unit placement.
//!
//! OU placement is the authoritative account-status signal; the record
//! store mirrors it. Besides one pool per account status there is an entry
//! pool for unregistered accounts and an exit pool for ejected ones.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::Result;
use crate::models::account::AccountStatus;

/// Organizational-unit pools an account can sit in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OuPool {
    /// Accounts handed over for registration, not yet in the pool.
    Entry,
    Available,
    Active,
    Frozen,
    CleanUp,
    Quarantine,
    /// Ejected accounts on their way out of the fleet.
    Exit,
}

impl OuPool {
    pub fn as_str(&self) -> &'static str {
        match self {
            OuPool::Entry => "Entry",
            OuPool::Available => "Available",
            OuPool::Active => "Active",
            OuPool::Frozen => "Frozen",
            OuPool::CleanUp => "CleanUp",
            OuPool::Quarantine => "Quarantine",
            OuPool::Exit => "Exit",
        }
    }
}

impl fmt::Display for OuPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<AccountStatus> for OuPool {
    fn from(status: AccountStatus) -> Self {
        match status {
            AccountStatus::Available => OuPool::Available,
            AccountStatus::Active => OuPool::Active,
            AccountStatus::Frozen => OuPool::Frozen,
            AccountStatus::CleanUp => OuPool::CleanUp,
            AccountStatus::Quarantine => OuPool::Quarantine,
        }
    }
}

/// High-level move actions, named after why the account is moving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountMoveAction {
    Cleanup,
    Quarantine,
    Eject,
}

impl AccountMoveAction {
    pub fn target_pool(self) -> OuPool {
        match self {
            AccountMoveAction::Cleanup => OuPool::CleanUp,
            AccountMoveAction::Quarantine => OuPool::Quarantine,
            AccountMoveAction::Eject => OuPool::Exit,
        }
    }
}

/// Directory-side view of an account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryAccount {
    pub aws_account_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    pub pool: OuPool,
}

/// Directory operations the orchestrator drives.
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    /// Look an account up across all pools.
    async fn describe_account(&self, aws_account_id: &str) -> Result<Option<DirectoryAccount>>;

    /// Move an account between pools. Fails if the account is not currently
    /// in `from`, which makes a move its own guard against racing moves.
    async fn move_account(&self, aws_account_id: &str, from: OuPool, to: OuPool) -> Result<()>;

    /// Action-named convenience over [`AccountDirectory::move_account`].
    async fn perform_account_move_action(
        &self,
        aws_account_id: &str,
        from: AccountStatus,
        action: AccountMoveAction,
    ) -> Result<()> {
        self.move_account(aws_account_id, from.into(), action.target_pool())
            .await
    }
}
