//! Identity service seam: per-account permission groups and user lookups.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::TtlCache;
use crate::errors::Result;
use crate::store::{Page, PageRequest};

/// Default lifetime for cached group listings.
pub const DEFAULT_LISTING_TTL: Duration = Duration::from_secs(300);

/// Permission tier of a per-account group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupRole {
    /// The lease holder's working access.
    User,
    /// Operational oversight access.
    Manager,
    /// Break-glass administrative access.
    Admin,
}

impl GroupRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupRole::User => "User",
            GroupRole::Manager => "Manager",
            GroupRole::Admin => "Admin",
        }
    }
}

impl fmt::Display for GroupRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityUser {
    pub user_id: String,
    pub email: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupMember {
    pub user_id: String,
    pub email: String,
}

/// Group-membership operations against the identity backend.
///
/// Authorization failures from the backend propagate unchanged; the
/// orchestrator does not translate them.
#[async_trait]
pub trait IdentityService: Send + Sync {
    async fn get_user_from_email(&self, email: &str) -> Result<IdentityUser>;

    /// Grant the role group access to an account.
    async fn assign_group_access(&self, aws_account_id: &str, role: GroupRole) -> Result<()>;

    /// Revoke the role group's access to an account.
    async fn revoke_group_access(&self, aws_account_id: &str, role: GroupRole) -> Result<()>;

    /// Revoke every individual user grant on an account.
    async fn revoke_all_user_access(&self, aws_account_id: &str) -> Result<()>;

    async fn list_group_members(
        &self,
        aws_account_id: &str,
        role: GroupRole,
        page: PageRequest,
    ) -> Result<Page<GroupMember>>;
}

/// Caching decorator over an [`IdentityService`].
///
/// Paginated listings are cached by query signature; any membership
/// mutation invalidates the whole cache, because a revocation on one page
/// can change what every other page should return.
pub struct CachedIdentityService {
    inner: Arc<dyn IdentityService>,
    cache: TtlCache,
}

impl CachedIdentityService {
    pub fn new(inner: Arc<dyn IdentityService>, ttl: Duration) -> Self {
        Self {
            inner,
            cache: TtlCache::new(ttl),
        }
    }

    pub fn with_default_ttl(inner: Arc<dyn IdentityService>) -> Self {
        Self::new(inner, DEFAULT_LISTING_TTL)
    }

    fn listing_key(aws_account_id: &str, role: GroupRole, page: &PageRequest) -> String {
        format!(
            "members:{aws_account_id}:{role}:{}:{}",
            page.page_identifier.as_deref().unwrap_or("-"),
            page.page_size.map_or(-1i64, |n| n as i64),
        )
    }

    /// Cached listing entries currently held (for tests and metrics).
    pub fn cached_listings(&self) -> usize {
        self.cache.len()
    }
}

#[async_trait]
impl IdentityService for CachedIdentityService {
    async fn get_user_from_email(&self, email: &str) -> Result<IdentityUser> {
        self.inner.get_user_from_email(email).await
    }

    async fn assign_group_access(&self, aws_account_id: &str, role: GroupRole) -> Result<()> {
        self.inner.assign_group_access(aws_account_id, role).await?;
        self.cache.invalidate_all();
        Ok(())
    }

    async fn revoke_group_access(&self, aws_account_id: &str, role: GroupRole) -> Result<()> {
        self.inner.revoke_group_access(aws_account_id, role).await?;
        self.cache.invalidate_all();
        Ok(())
    }

    async fn revoke_all_user_access(&self, aws_account_id: &str) -> Result<()> {
        self.inner.revoke_all_user_access(aws_account_id).await?;
        self.cache.invalidate_all();
        Ok(())
    }

    async fn list_group_members(
        &self,
        aws_account_id: &str,
        role: GroupRole,
        page: PageRequest,
    ) -> Result<Page<GroupMember>> {
        let key = Self::listing_key(aws_account_id, role, &page);
        if let Some(cached) = self.cache.get::<Page<GroupMember>>(&key) {
            return Ok(cached);
        }
        let listing = self
            .inner
            .list_group_members(aws_account_id, role, page)
            .await?;
        self.cache.put(&key, &listing);
        Ok(listing)
    }
}

// ── Tests ─────────────────────────────────────────────────────
