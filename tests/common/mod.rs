//! Shared test world: in-memory stores plus recording/failure-injecting
//! fakes for the identity, directory, and publisher seams.
#![allow(dead_code)]

use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use leasehold::errors::Result;
use leasehold::models::account::{AccountStatus, SandboxAccount};
use leasehold::models::events::DomainEvent;
use leasehold::models::global_config::GlobalConfig;
use leasehold::models::lease::{Lease, LeaseKey, LeaseStatus};
use leasehold::models::template::LeaseTemplate;
use leasehold::orchestrator::Orchestrator;
use leasehold::services::config_provider::StaticConfigProvider;
use leasehold::services::directory::{AccountDirectory, DirectoryAccount, OuPool};
use leasehold::services::identity::{GroupMember, GroupRole, IdentityService, IdentityUser};
use leasehold::services::publisher::EventPublisher;
use leasehold::store::memory::MemoryStore;
use leasehold::store::{
    AccountStore, LeaseStore, Page, PageRequest, RecordStore, UpdateOutcome,
};

/// Cross-backend call journal, shared by every fake, so tests can assert
/// exact invocation order across stores and services.
pub type Journal = Arc<Mutex<Vec<String>>>;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("leasehold=debug")
        .with_test_writer()
        .try_init();
}

fn push(journal: &Journal, entry: impl Into<String>) {
    journal.lock().unwrap().push(entry.into());
}

// ── Identity fake ─────────────────────────────────────────────

pub struct FakeIdentity {
    journal: Journal,
    fail_ops: Mutex<HashSet<String>>,
}

impl FakeIdentity {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            fail_ops: Mutex::new(HashSet::new()),
        }
    }

    /// Make a later call fail. Keys: `get_user`, `assign:<Role>`,
    /// `revoke:<Role>`, `revoke_all`.
    pub fn fail_on(&self, op: &str) {
        self.fail_ops.lock().unwrap().insert(op.to_string());
    }

    fn check(&self, op: &str) -> Result<()> {
        if self.fail_ops.lock().unwrap().contains(op) {
            return Err(anyhow::anyhow!("injected identity failure: {op}").into());
        }
        Ok(())
    }
}

#[async_trait]
impl IdentityService for FakeIdentity {
    async fn get_user_from_email(&self, email: &str) -> Result<IdentityUser> {
        push(&self.journal, format!("identity.get_user:{email}"));
        self.check("get_user")?;
        Ok(IdentityUser {
            user_id: format!("u-{email}"),
            email: email.to_string(),
            display_name: None,
        })
    }

    async fn assign_group_access(&self, aws_account_id: &str, role: GroupRole) -> Result<()> {
        push(&self.journal, format!("identity.assign:{role}:{aws_account_id}"));
        self.check(&format!("assign:{role}"))
    }

    async fn revoke_group_access(&self, aws_account_id: &str, role: GroupRole) -> Result<()> {
        push(&self.journal, format!("identity.revoke:{role}:{aws_account_id}"));
        self.check(&format!("revoke:{role}"))
    }

    async fn revoke_all_user_access(&self, aws_account_id: &str) -> Result<()> {
        push(&self.journal, format!("identity.revoke_all:{aws_account_id}"));
        self.check("revoke_all")
    }

    async fn list_group_members(
        &self,
        _aws_account_id: &str,
        _role: GroupRole,
        _page: PageRequest,
    ) -> Result<Page<GroupMember>> {
        Ok(Page {
            items: vec![],
            next_page_identifier: None,
        })
    }
}

// ── Directory fake ────────────────────────────────────────────

pub struct FakeDirectory {
    journal: Journal,
    pools: DashMap<String, OuPool>,
    fail_moves_to: Mutex<HashSet<&'static str>>,
}

impl FakeDirectory {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            pools: DashMap::new(),
            fail_moves_to: Mutex::new(HashSet::new()),
        }
    }

    pub fn place(&self, aws_account_id: &str, pool: OuPool) {
        self.pools.insert(aws_account_id.to_string(), pool);
    }

    pub fn pool_of(&self, aws_account_id: &str) -> Option<OuPool> {
        self.pools.get(aws_account_id).map(|p| *p)
    }

    /// Make every move into `pool` fail.
    pub fn fail_moves_to(&self, pool: OuPool) {
        self.fail_moves_to.lock().unwrap().insert(pool.as_str());
    }
}

#[async_trait]
impl AccountDirectory for FakeDirectory {
    async fn describe_account(&self, aws_account_id: &str) -> Result<Option<DirectoryAccount>> {
        Ok(self.pools.get(aws_account_id).map(|pool| DirectoryAccount {
            aws_account_id: aws_account_id.to_string(),
            name: None,
            email: None,
            pool: *pool,
        }))
    }

    async fn move_account(&self, aws_account_id: &str, from: OuPool, to: OuPool) -> Result<()> {
        push(&self.journal, format!("directory.move:{aws_account_id}:{from}->{to}"));
        if self.fail_moves_to.lock().unwrap().contains(to.as_str()) {
            return Err(anyhow::anyhow!("injected directory failure moving to {to}").into());
        }
        let current = self.pools.get(aws_account_id).map(|p| *p);
        if current != Some(from) {
            return Err(anyhow::anyhow!(
                "account {aws_account_id} is in {current:?}, not {from}"
            )
            .into());
        }
        self.pools.insert(aws_account_id.to_string(), to);
        Ok(())
    }
}

// ── Publisher fake ────────────────────────────────────────────

pub struct RecordingPublisher {
    journal: Journal,
    events: Mutex<Vec<DomainEvent>>,
    fail: AtomicBool,
}

impl RecordingPublisher {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            events: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
        }
    }

    pub fn fail_publishes(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<DomainEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn event_types(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().iter().map(|e| e.event_type()).collect()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, event: &DomainEvent) -> anyhow::Result<()> {
        push(&self.journal, format!("publish:{}", event.event_type()));
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("injected publisher failure");
        }
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

// ── Journaled store wrappers ──────────────────────────────────

pub struct JournaledLeaseStore {
    inner: MemoryStore<Lease>,
    journal: Journal,
}

impl JournaledLeaseStore {
    pub fn new(journal: Journal) -> Self {
        Self {
            inner: MemoryStore::new(),
            journal,
        }
    }
}

#[async_trait]
impl RecordStore<Lease> for JournaledLeaseStore {
    async fn create(&self, item: Lease) -> Result<Lease> {
        push(&self.journal, format!("lease.create:{}", item.status()));
        self.inner.create(item).await
    }

    async fn update(&self, item: Lease, expected: Option<&Lease>) -> Result<UpdateOutcome<Lease>> {
        push(&self.journal, format!("lease.update:{}", item.status()));
        self.inner.update(item, expected).await
    }

    async fn delete(&self, key: &LeaseKey) -> Result<()> {
        push(&self.journal, format!("lease.delete:{key}"));
        self.inner.delete(key).await
    }

    async fn get(&self, key: &LeaseKey) -> Result<Option<Lease>> {
        self.inner.get(key).await
    }

    async fn find_all(&self, page: PageRequest) -> Result<Page<Lease>> {
        self.inner.find_all(page).await
    }
}

#[async_trait]
impl LeaseStore for JournaledLeaseStore {
    async fn find_by_owner(&self, user_email: &str, page: PageRequest) -> Result<Page<Lease>> {
        self.inner.find_by_owner(user_email, page).await
    }

    async fn find_by_status(&self, status: LeaseStatus, page: PageRequest) -> Result<Page<Lease>> {
        self.inner.find_by_status(status, page).await
    }

    async fn find_by_account(&self, aws_account_id: &str) -> Result<Vec<Lease>> {
        self.inner.find_by_account(aws_account_id).await
    }
}

pub struct JournaledAccountStore {
    inner: MemoryStore<SandboxAccount>,
    journal: Journal,
    /// When set, the next conditional update on this account id gets beaten
    /// by an interloper write, forcing an optimistic-concurrency loss.
    contend_on: Mutex<Option<String>>,
    /// When set, any update writing this status fails outright.
    fail_update_when_status: Mutex<Option<AccountStatus>>,
}

impl JournaledAccountStore {
    pub fn new(journal: Journal) -> Self {
        Self {
            inner: MemoryStore::new(),
            journal,
            contend_on: Mutex::new(None),
            fail_update_when_status: Mutex::new(None),
        }
    }

    pub fn contend_on(&self, aws_account_id: &str) {
        *self.contend_on.lock().unwrap() = Some(aws_account_id.to_string());
    }

    pub fn fail_update_when_status(&self, status: AccountStatus) {
        *self.fail_update_when_status.lock().unwrap() = Some(status);
    }
}

#[async_trait]
impl RecordStore<SandboxAccount> for JournaledAccountStore {
    async fn create(&self, item: SandboxAccount) -> Result<SandboxAccount> {
        push(&self.journal, format!("account.create:{}", item.status));
        self.inner.create(item).await
    }

    async fn update(
        &self,
        item: SandboxAccount,
        expected: Option<&SandboxAccount>,
    ) -> Result<UpdateOutcome<SandboxAccount>> {
        let contended = {
            let mut pending = self.contend_on.lock().unwrap();
            match pending.as_deref() {
                Some(id) if id == item.aws_account_id => {
                    *pending = None;
                    true
                }
                _ => false,
            }
        };
        if let (true, Some(expected)) = (contended, expected) {
            // Simulate a concurrent winner claiming between the caller's
            // read and this write.
            let winner = expected.with_status(AccountStatus::Active).unwrap();
            self.inner.update(winner, Some(expected)).await.unwrap();
        }
        push(&self.journal, format!("account.update:{}", item.status));
        if *self.fail_update_when_status.lock().unwrap() == Some(item.status) {
            return Err(anyhow::anyhow!(
                "injected store failure writing {} {}",
                item.status,
                item.aws_account_id
            )
            .into());
        }
        self.inner.update(item, expected).await
    }

    async fn delete(&self, key: &String) -> Result<()> {
        push(&self.journal, format!("account.delete:{key}"));
        self.inner.delete(key).await
    }

    async fn get(&self, key: &String) -> Result<Option<SandboxAccount>> {
        self.inner.get(key).await
    }

    async fn find_all(&self, page: PageRequest) -> Result<Page<SandboxAccount>> {
        self.inner.find_all(page).await
    }
}

#[async_trait]
impl AccountStore for JournaledAccountStore {
    async fn find_by_status(
        &self,
        status: AccountStatus,
        page: PageRequest,
    ) -> Result<Page<SandboxAccount>> {
        self.inner.find_by_status(status, page).await
    }
}

// ── World ─────────────────────────────────────────────────────

/// A fully wired orchestrator over in-memory backends.
pub struct World {
    pub journal: Journal,
    pub leases: Arc<JournaledLeaseStore>,
    pub accounts: Arc<JournaledAccountStore>,
    pub templates: Arc<MemoryStore<LeaseTemplate>>,
    pub identity: Arc<FakeIdentity>,
    pub directory: Arc<FakeDirectory>,
    pub publisher: Arc<RecordingPublisher>,
    pub config: Arc<StaticConfigProvider>,
    pub orchestrator: Arc<Orchestrator>,
}

impl World {
    pub fn new() -> Self {
        Self::with_config(GlobalConfig::default())
    }

    pub fn with_config(config: GlobalConfig) -> Self {
        init_tracing();
        let journal: Journal = Default::default();
        let leases = Arc::new(JournaledLeaseStore::new(journal.clone()));
        let accounts = Arc::new(JournaledAccountStore::new(journal.clone()));
        let templates = Arc::new(MemoryStore::<LeaseTemplate>::new());
        let identity = Arc::new(FakeIdentity::new(journal.clone()));
        let directory = Arc::new(FakeDirectory::new(journal.clone()));
        let publisher = Arc::new(RecordingPublisher::new(journal.clone()));
        let config = Arc::new(StaticConfigProvider::new(config));

        let orchestrator = Arc::new(Orchestrator::new(
            leases.clone(),
            templates.clone(),
            accounts.clone(),
            identity.clone(),
            directory.clone(),
            publisher.clone(),
            config.clone(),
        ));

        Self {
            journal,
            leases,
            accounts,
            templates,
            identity,
            directory,
            publisher,
            config,
            orchestrator,
        }
    }

    pub async fn seed_template(&self, requires_approval: bool) -> LeaseTemplate {
        let template = LeaseTemplate {
            uuid: Uuid::new_v4(),
            name: format!("template-{}", if requires_approval { "reviewed" } else { "auto" }),
            description: None,
            requires_approval,
            max_spend: Some(Decimal::from(100)),
            budget_thresholds: vec![],
            lease_duration_in_hours: Some(168),
            duration_thresholds: vec![],
            created_by: "admin@example.com".into(),
            created_at: chrono::Utc::now(),
        };
        self.templates.create(template.clone()).await.unwrap();
        template
    }

    /// Seed an `Available` account into both the record store and the
    /// directory pool.
    pub async fn seed_available_account(&self, aws_account_id: &str) -> SandboxAccount {
        let account = SandboxAccount::new(aws_account_id, AccountStatus::Available);
        self.accounts.create(account.clone()).await.unwrap();
        self.directory.place(aws_account_id, OuPool::Available);
        account
    }

    pub async fn lease(&self, key: &LeaseKey) -> Option<Lease> {
        self.leases.get(key).await.unwrap()
    }

    pub async fn account(&self, aws_account_id: &str) -> Option<SandboxAccount> {
        self.accounts.get(&aws_account_id.to_string()).await.unwrap()
    }

    pub fn journal_entries(&self) -> Vec<String> {
        self.journal.lock().unwrap().clone()
    }

    /// Journal entries recorded after index `from`.
    pub fn journal_since(&self, from: usize) -> Vec<String> {
        self.journal.lock().unwrap()[from..].to_vec()
    }

    pub fn journal_len(&self) -> usize {
        self.journal.lock().unwrap().len()
    }
}
