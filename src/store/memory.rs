//! DashMap-backed record store.
//!
//! The default backend for tests and single-process deployments. Conditional
//! updates compare the stored record against the caller's expected snapshot
//! by serialized value, per key, under the map's shard lock, which is what
//! makes concurrent claims of the same account resolve to exactly one
//! winner.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;

use super::{
    AccountStore, Entity, LeaseStore, Page, PageRequest, RecordStore, TemplateStore, UpdateOutcome,
};
use crate::errors::{Error, Result};
use crate::models::account::{AccountStatus, SandboxAccount};
use crate::models::lease::{Lease, LeaseStatus};
use crate::models::template::LeaseTemplate;

/// Version stamped onto every record this build writes.
pub const SCHEMA_VERSION: u32 = 1;

/// Bookkeeping stamped onto each stored record.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordMetadata {
    pub schema_version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RecordMetadata {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            created_at: now,
            updated_at: now,
        }
    }
}

struct Versioned<T> {
    item: T,
    meta: RecordMetadata,
}

pub struct MemoryStore<T: Entity> {
    records: DashMap<T::Key, Versioned<T>>,
}

impl<T: Entity + Serialize> MemoryStore<T> {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Stored metadata for a record, if present.
    pub fn metadata(&self, key: &T::Key) -> Option<RecordMetadata> {
        self.records.get(key).map(|r| r.meta.clone())
    }

    fn to_value(item: &T) -> Result<serde_json::Value> {
        serde_json::to_value(item)
            .map_err(|e| Error::Service(anyhow::anyhow!("record not serializable: {e}")))
    }

    /// All records sorted by key string; the substrate for pagination.
    fn snapshot_sorted(&self) -> Vec<(String, T)> {
        let mut items: Vec<(String, T)> = self
            .records
            .iter()
            .map(|entry| (entry.key().to_string(), entry.value().item.clone()))
            .collect();
        items.sort_by(|a, b| a.0.cmp(&b.0));
        items
    }

    /// Cut one page out of a key-sorted item list. The continuation token
    /// is the last returned key (exclusive start of the next page).
    fn page_of(mut items: Vec<(String, T)>, page: &PageRequest) -> Page<T> {
        if let Some(token) = &page.page_identifier {
            items.retain(|(key, _)| key.as_str() > token.as_str());
        }
        let size = page.page_size.unwrap_or(usize::MAX);
        let has_more = items.len() > size;
        items.truncate(size);
        let next_page_identifier = if has_more {
            items.last().map(|(key, _)| key.clone())
        } else {
            None
        };
        Page {
            items: items.into_iter().map(|(_, item)| item).collect(),
            next_page_identifier,
        }
    }
}

impl<T: Entity + Serialize> Default for MemoryStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl<T: Entity + Serialize> RecordStore<T> for MemoryStore<T> {
    async fn create(&self, item: T) -> Result<T> {
        match self.records.entry(item.key()) {
            Entry::Occupied(_) => Err(Error::AlreadyExists {
                entity: T::ENTITY,
                key: item.key().to_string(),
            }),
            Entry::Vacant(vacant) => {
                vacant.insert(Versioned {
                    item: item.clone(),
                    meta: RecordMetadata::new(Utc::now()),
                });
                Ok(item)
            }
        }
    }

    async fn update(&self, item: T, expected: Option<&T>) -> Result<UpdateOutcome<T>> {
        let conflict = || Error::ConcurrentModification {
            entity: T::ENTITY,
            key: item.key().to_string(),
        };

        match self.records.entry(item.key()) {
            Entry::Occupied(mut occupied) => {
                if let Some(expected) = expected {
                    if Self::to_value(&occupied.get().item)? != Self::to_value(expected)? {
                        return Err(conflict());
                    }
                }
                let old = occupied.get().item.clone();
                let slot = occupied.get_mut();
                slot.item = item.clone();
                slot.meta.updated_at = Utc::now();
                Ok(UpdateOutcome {
                    old: Some(old),
                    new: item,
                })
            }
            Entry::Vacant(vacant) => {
                if expected.is_some() {
                    return Err(conflict());
                }
                vacant.insert(Versioned {
                    item: item.clone(),
                    meta: RecordMetadata::new(Utc::now()),
                });
                Ok(UpdateOutcome {
                    old: None,
                    new: item,
                })
            }
        }
    }

    async fn delete(&self, key: &T::Key) -> Result<()> {
        self.records.remove(key);
        Ok(())
    }

    async fn get(&self, key: &T::Key) -> Result<Option<T>> {
        Ok(self.records.get(key).map(|r| r.item.clone()))
    }

    async fn find_all(&self, page: PageRequest) -> Result<Page<T>> {
        Ok(Self::page_of(self.snapshot_sorted(), &page))
    }
}

#[async_trait::async_trait]
impl LeaseStore for MemoryStore<Lease> {
    async fn find_by_owner(&self, user_email: &str, page: PageRequest) -> Result<Page<Lease>> {
        let mut items = self.snapshot_sorted();
        items.retain(|(_, lease)| lease.user_email() == user_email);
        Ok(Self::page_of(items, &page))
    }

    async fn find_by_status(&self, status: LeaseStatus, page: PageRequest) -> Result<Page<Lease>> {
        let mut items = self.snapshot_sorted();
        items.retain(|(_, lease)| lease.status() == status);
        Ok(Self::page_of(items, &page))
    }

    async fn find_by_account(&self, aws_account_id: &str) -> Result<Vec<Lease>> {
        Ok(self
            .snapshot_sorted()
            .into_iter()
            .map(|(_, lease)| lease)
            .filter(|lease| lease.aws_account_id() == Some(aws_account_id))
            .collect())
    }
}

#[async_trait::async_trait]
impl AccountStore for MemoryStore<SandboxAccount> {
    async fn find_by_status(
        &self,
        status: AccountStatus,
        page: PageRequest,
    ) -> Result<Page<SandboxAccount>> {
        let mut items = self.snapshot_sorted();
        items.retain(|(_, account)| account.status == status);
        Ok(Self::page_of(items, &page))
    }
}

#[async_trait::async_trait]
impl TemplateStore for MemoryStore<LeaseTemplate> {
    async fn find_by_name(&self, name: &str) -> Result<Option<LeaseTemplate>> {
        Ok(self
            .records
            .iter()
            .map(|entry| entry.value().item.clone())
            .find(|template| template.name == name))
    }
}
