//! Lifecycle orchestration facade.
//!
//! One method per lifecycle operation. Each follows the same shape: load
//! the entities, validate against the state machines and the current
//! policy snapshot, build saga steps over the store and the collaborator
//! services, run the saga, and publish domain events only after it has
//! fully committed.

use std::sync::Arc;
use tracing::warn;

use crate::errors::{Error, Result};
use crate::models::account::{AccountStatus, SandboxAccount};
use crate::models::events::DomainEvent;
use crate::models::lease::{Lease, LeaseKey, LeaseStatus};
use crate::services::config_provider::GlobalConfigProvider;
use crate::services::directory::AccountDirectory;
use crate::services::identity::IdentityService;
use crate::services::publisher::EventPublisher;
use crate::store::{AccountStore, LeaseStore, Page, PageRequest, TemplateStore};

mod account_ops;
mod lease_ops;
mod steps;

pub struct Orchestrator {
    leases: Arc<dyn LeaseStore>,
    templates: Arc<dyn TemplateStore>,
    accounts: Arc<dyn AccountStore>,
    identity: Arc<dyn IdentityService>,
    directory: Arc<dyn AccountDirectory>,
    publisher: Arc<dyn EventPublisher>,
    config: Arc<dyn GlobalConfigProvider>,
}

impl Orchestrator {
    pub fn new(
        leases: Arc<dyn LeaseStore>,
        templates: Arc<dyn TemplateStore>,
        accounts: Arc<dyn AccountStore>,
        identity: Arc<dyn IdentityService>,
        directory: Arc<dyn AccountDirectory>,
        publisher: Arc<dyn EventPublisher>,
        config: Arc<dyn GlobalConfigProvider>,
    ) -> Self {
        Self {
            leases,
            templates,
            accounts,
            identity,
            directory,
            publisher,
            config,
        }
    }

    // ── Lookups shared by hosts and jobs ─────────────────────

    pub async fn get_lease(&self, key: &LeaseKey) -> Result<Option<Lease>> {
        self.leases.get(key).await
    }

    pub async fn get_account(&self, aws_account_id: &str) -> Result<Option<SandboxAccount>> {
        self.accounts.get(&aws_account_id.to_string()).await
    }

    pub async fn leases_by_status(
        &self,
        status: LeaseStatus,
        page: PageRequest,
    ) -> Result<Page<Lease>> {
        self.leases.find_by_status(status, page).await
    }

    pub async fn leases_by_owner(
        &self,
        user_email: &str,
        page: PageRequest,
    ) -> Result<Page<Lease>> {
        self.leases.find_by_owner(user_email, page).await
    }

    pub async fn accounts_by_status(
        &self,
        status: AccountStatus,
        page: PageRequest,
    ) -> Result<Page<SandboxAccount>> {
        self.accounts.find_by_status(status, page).await
    }

    // ── Internal helpers ─────────────────────────────────────

    pub(crate) async fn load_lease(&self, key: &LeaseKey) -> Result<Lease> {
        self.leases
            .get(key)
            .await?
            .ok_or_else(|| Error::LeaseNotFound(key.to_string()))
    }

    pub(crate) async fn load_account(&self, aws_account_id: &str) -> Result<SandboxAccount> {
        self.accounts
            .get(&aws_account_id.to_string())
            .await?
            .ok_or_else(|| Error::AccountNotFound(aws_account_id.to_string()))
    }

    /// First `Available` account, if any. The subsequent conditional write
    /// is what makes the claim exclusive; this is just the candidate scan.
    pub(crate) async fn first_available_account(&self) -> Result<Option<SandboxAccount>> {
        Ok(self
            .accounts
            .find_by_status(AccountStatus::Available, PageRequest::sized(1))
            .await?
            .items
            .into_iter()
            .next())
    }

    /// Pending plus monitored leases held by a user, for the quota guard.
    pub(crate) async fn active_lease_count(&self, user_email: &str) -> Result<usize> {
        let mut count = 0;
        let mut page = PageRequest::all();
        loop {
            let batch = self.leases.find_by_owner(user_email, page).await?;
            count += batch
                .items
                .iter()
                .filter(|lease| {
                    !lease.is_terminal() && lease.status() != LeaseStatus::ApprovalDenied
                })
                .count();
            match batch.next_page_identifier {
                Some(token) => page = PageRequest::starting_at(token, 100),
                None => break,
            }
        }
        Ok(count)
    }

    /// Publish events for a committed operation. Failures are logged, never
    /// rolled back: the saga has already committed.
    pub(crate) async fn publish_after_commit(&self, events: &[DomainEvent]) {
        for event in events {
            if let Err(e) = self.publisher.publish(event).await {
                warn!(
                    event_type = event.event_type(),
                    error = %e,
                    "event publish failed after commit"
                );
            }
        }
    }
}
