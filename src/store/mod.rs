//! Record store seams for leases, templates, and sandbox accounts.
//!
//! The orchestrator only sees these traits. The sole concurrency control in
//! the system is the conditional update: callers pass the item as they last
//! read it, and the store rejects the write if the stored item no longer
//! matches. No lock is ever held across a saga.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hash;

use crate::errors::Result;
use crate::models::account::{AccountStatus, SandboxAccount};
use crate::models::lease::{Lease, LeaseStatus};
use crate::models::template::LeaseTemplate;

pub mod memory;

/// A storable record with a displayable key.
pub trait Entity: Clone + Send + Sync + 'static {
    type Key: Clone + Eq + Hash + fmt::Display + Send + Sync + 'static;
    /// Human-readable entity label used in error messages.
    const ENTITY: &'static str;

    fn key(&self) -> Self::Key;
}

/// Cursor-style page request. `page_identifier` is the opaque token from a
/// previous [`Page::next_page_identifier`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageRequest {
    #[serde(default)]
    pub page_identifier: Option<String>,
    #[serde(default)]
    pub page_size: Option<usize>,
}

impl PageRequest {
    /// Everything in one page.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn sized(page_size: usize) -> Self {
        Self {
            page_identifier: None,
            page_size: Some(page_size),
        }
    }

    pub fn starting_at(token: impl Into<String>, page_size: usize) -> Self {
        Self {
            page_identifier: Some(token.into()),
            page_size: Some(page_size),
        }
    }
}

/// One page of results plus the continuation token, if any remain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_page_identifier: Option<String>,
}

/// Result of an update: the replaced item (when one existed) and the item
/// as written.
#[derive(Debug, Clone)]
pub struct UpdateOutcome<T> {
    pub old: Option<T>,
    pub new: T,
}

/// Per-entity CRUD with optimistic-concurrency updates.
#[async_trait]
pub trait RecordStore<T: Entity>: Send + Sync {
    /// Insert a new record; fails if the key already exists.
    async fn create(&self, item: T) -> Result<T>;

    /// Write `item`. When `expected` is given, the write only succeeds if
    /// the stored record still equals `expected`; a mismatch fails with a
    /// concurrent-modification error and changes nothing. Without
    /// `expected` the write is an unconditional upsert.
    async fn update(&self, item: T, expected: Option<&T>) -> Result<UpdateOutcome<T>>;

    async fn delete(&self, key: &T::Key) -> Result<()>;

    async fn get(&self, key: &T::Key) -> Result<Option<T>>;

    async fn find_all(&self, page: PageRequest) -> Result<Page<T>>;
}

/// Lease queries used by the orchestrator and the background jobs.
#[async_trait]
pub trait LeaseStore: RecordStore<Lease> {
    async fn find_by_owner(&self, user_email: &str, page: PageRequest) -> Result<Page<Lease>>;

    async fn find_by_status(&self, status: LeaseStatus, page: PageRequest) -> Result<Page<Lease>>;

    /// Non-terminal leases bound to an account. With intact invariants this
    /// returns at most one lease.
    async fn find_by_account(&self, aws_account_id: &str) -> Result<Vec<Lease>>;
}

/// Account-pool queries.
#[async_trait]
pub trait AccountStore: RecordStore<SandboxAccount> {
    async fn find_by_status(
        &self,
        status: AccountStatus,
        page: PageRequest,
    ) -> Result<Page<SandboxAccount>>;
}

/// Template lookups.
#[async_trait]
pub trait TemplateStore: RecordStore<LeaseTemplate> {
    async fn find_by_name(&self, name: &str) -> Result<Option<LeaseTemplate>>;
}
