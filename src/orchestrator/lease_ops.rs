//! Lease lifecycle operations.

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{steps, Orchestrator};
use crate::errors::{Error, Result};
use crate::models::account::AccountStatus;
use crate::models::events::DomainEvent;
use crate::models::lease::{
    FreezeReason, Lease, LeaseKey, PendingLease, TerminationReason,
};
use crate::models::policy;
use crate::models::template::LeaseTemplate;
use crate::saga::Saga;
use crate::services::directory::OuPool;
use crate::services::identity::GroupRole;
use crate::store::Entity;

impl Orchestrator {
    /// Request a lease against a template.
    ///
    /// Validates the template against the current policy snapshot and the
    /// user's quota, then creates a `PendingApproval` record. When the
    /// template does not require approval and an `Available` account exists,
    /// the request auto-activates in the same call via a saga of
    /// {create lease, claim account, move OU, grant access}.
    pub async fn request_lease(
        &self,
        template_uuid: Uuid,
        user_email: &str,
        comments: Option<String>,
    ) -> Result<Lease> {
        let config = self.config.get().await?;
        let template = self
            .templates
            .get(&template_uuid)
            .await?
            .ok_or_else(|| Error::TemplateNotFound(template_uuid.to_string()))?;
        policy::validate_template(&template, &config)?;

        let held = self.active_lease_count(user_email).await?;
        if held >= config.max_leases_per_user as usize {
            return Err(Error::QuotaExceeded {
                user: user_email.to_string(),
                active: held,
                limit: config.max_leases_per_user,
            });
        }

        // The requester must resolve in the identity backend before any
        // record exists for them.
        self.identity.get_user_from_email(user_email).await?;

        let now = Utc::now();
        let pending = Lease::PendingApproval(PendingLease::from_template(
            &template, user_email, comments, now,
        ));
        let key = pending.key();

        if template.requires_approval {
            self.leases.create(pending.clone()).await?;
            info!(lease = %key, template = %template.name, "lease requested, awaiting review");
            self.publish_after_commit(&[DomainEvent::LeaseRequested {
                lease: key,
                requires_approval: true,
            }])
            .await;
            return Ok(pending);
        }

        let Some(available) = self.first_available_account().await? else {
            // Auto-approval needs an account at request time; without one
            // the request parks in review like any other.
            self.leases.create(pending.clone()).await?;
            warn!(lease = %key, "no account available, auto-approval deferred to review");
            self.publish_after_commit(&[DomainEvent::LeaseRequested {
                lease: key,
                requires_approval: false,
            }])
            .await;
            return Ok(pending);
        };

        let aws_account_id = available.aws_account_id.clone();
        let active = pending.approve(None, aws_account_id.as_str(), now)?;
        let claimed = available.with_status(AccountStatus::Active)?;

        Saga::new("request_lease")
            .step(steps::create_record(
                "create lease record",
                self.leases.clone(),
                active.clone(),
            ))
            .step(steps::update_record(
                "claim account",
                self.accounts.clone(),
                claimed,
                available,
            ))
            .step(steps::move_account(
                self.directory.clone(),
                aws_account_id.clone(),
                OuPool::Available,
                OuPool::Active,
            ))
            .step(steps::grant_group_access(
                self.identity.clone(),
                aws_account_id.clone(),
                GroupRole::User,
            ))
            .run()
            .await?;

        info!(lease = %key, account = %aws_account_id, "lease auto-approved");
        self.publish_after_commit(&[
            DomainEvent::LeaseRequested {
                lease: key.clone(),
                requires_approval: false,
            },
            DomainEvent::LeaseApproved {
                lease: key,
                aws_account_id,
                approved_by: None,
            },
        ])
        .await;
        Ok(active)
    }

    /// Reviewer approval: `PendingApproval → Active` with an atomic claim
    /// of one `Available` account.
    pub async fn approve_lease(&self, key: &LeaseKey, approver: &str) -> Result<Lease> {
        let config = self.config.get().await?;
        let lease = self.load_lease(key).await?;
        let request = match &lease {
            Lease::PendingApproval(p) => p.clone(),
            other => {
                return Err(Error::InvalidStateTransition {
                    entity: "lease",
                    key: key.to_string(),
                    action: "approve",
                    status: other.status().to_string(),
                })
            }
        };
        // The snapshot must still satisfy the policy current at approval
        // time, not the one current at request time.
        policy::validate_request(&request, &config)?;

        let available = self
            .first_available_account()
            .await?
            .ok_or(Error::NoAccountsAvailable)?;
        let aws_account_id = available.aws_account_id.clone();

        let now = Utc::now();
        let active = lease
            .clone()
            .approve(Some(approver.to_string()), aws_account_id.as_str(), now)?;
        let claimed = available.with_status(AccountStatus::Active)?;

        Saga::new("approve_lease")
            .step(steps::update_record(
                "update lease to active",
                self.leases.clone(),
                active.clone(),
                lease,
            ))
            .step(steps::update_record(
                "claim account",
                self.accounts.clone(),
                claimed,
                available,
            ))
            .step(steps::move_account(
                self.directory.clone(),
                aws_account_id.clone(),
                OuPool::Available,
                OuPool::Active,
            ))
            .step(steps::grant_group_access(
                self.identity.clone(),
                aws_account_id.clone(),
                GroupRole::User,
            ))
            .run()
            .await?;

        info!(lease = %key, account = %aws_account_id, approver, "lease approved");
        self.publish_after_commit(&[DomainEvent::LeaseApproved {
            lease: key.clone(),
            aws_account_id,
            approved_by: Some(approver.to_string()),
        }])
        .await;
        Ok(active)
    }

    /// Reviewer denial: single-record update, no saga.
    pub async fn deny_lease(&self, key: &LeaseKey, denier: &str) -> Result<Lease> {
        let config = self.config.get().await?;
        let lease = self.load_lease(key).await?;
        let now = Utc::now();
        let denied = lease
            .clone()
            .deny(denier, now, config.retention_deadline(now))?;

        self.leases.update(denied.clone(), Some(&lease)).await?;

        info!(lease = %key, denier, "lease denied");
        self.publish_after_commit(&[DomainEvent::LeaseDenied {
            lease: key.clone(),
            denied_by: denier.to_string(),
        }])
        .await;
        Ok(denied)
    }

    /// Freeze an active lease and its account. Idempotent for an
    /// already-frozen lease so the monitor can re-fire safely.
    pub async fn freeze_lease(&self, key: &LeaseKey, reason: FreezeReason) -> Result<Lease> {
        let lease = self.load_lease(key).await?;
        let aws_account_id = match &lease {
            Lease::Active(m) => m.aws_account_id.clone(),
            Lease::Frozen(_) => {
                debug!(lease = %key, "already frozen");
                return Ok(lease);
            }
            other => {
                return Err(Error::InvalidStateTransition {
                    entity: "lease",
                    key: key.to_string(),
                    action: "freeze",
                    status: other.status().to_string(),
                })
            }
        };

        let account = self.load_account(&aws_account_id).await?;
        let frozen_account = account.with_status(AccountStatus::Frozen)?;
        let frozen = lease.clone().freeze()?;

        Saga::new("freeze_lease")
            .step(steps::update_record(
                "update lease to frozen",
                self.leases.clone(),
                frozen.clone(),
                lease,
            ))
            .step(steps::update_record(
                "update account to frozen",
                self.accounts.clone(),
                frozen_account,
                account,
            ))
            .step(steps::move_account(
                self.directory.clone(),
                aws_account_id.clone(),
                OuPool::Active,
                OuPool::Frozen,
            ))
            .run()
            .await?;

        info!(lease = %key, account = %aws_account_id, ?reason, "lease frozen");
        self.publish_after_commit(&[DomainEvent::LeaseFrozen {
            lease: key.clone(),
            aws_account_id,
            reason,
        }])
        .await;
        Ok(frozen)
    }

    /// End a monitored lease and hand its account to cleanup.
    pub async fn terminate_lease(
        &self,
        key: &LeaseKey,
        reason: TerminationReason,
    ) -> Result<Lease> {
        let config = self.config.get().await?;
        let lease = self.load_lease(key).await?;
        let monitored = match &lease {
            Lease::Active(m) | Lease::Frozen(m) => m.clone(),
            other => {
                return Err(Error::InvalidStateTransition {
                    entity: "lease",
                    key: key.to_string(),
                    action: "terminate",
                    status: other.status().to_string(),
                })
            }
        };

        let now = Utc::now();
        let ended = lease
            .clone()
            .terminate(reason, now, config.retention_deadline(now))?;
        let account = self.load_account(&monitored.aws_account_id).await?;
        let cleanup_account = account.with_status(AccountStatus::CleanUp)?;
        let from_pool = OuPool::from(account.status);

        Saga::new("terminate_lease")
            .step(steps::update_record(
                "update lease to terminated",
                self.leases.clone(),
                ended.clone(),
                lease,
            ))
            .step(steps::revoke_group_access(
                self.identity.clone(),
                monitored.aws_account_id.clone(),
                GroupRole::User,
            ))
            .step(steps::update_record(
                "update account to cleanup",
                self.accounts.clone(),
                cleanup_account,
                account,
            ))
            .step(steps::move_account(
                self.directory.clone(),
                monitored.aws_account_id.clone(),
                from_pool,
                OuPool::CleanUp,
            ))
            .run()
            .await?;

        info!(
            lease = %key,
            account = %monitored.aws_account_id,
            reason = %reason,
            "lease terminated"
        );
        self.publish_after_commit(&[
            DomainEvent::LeaseTerminated {
                lease: key.clone(),
                reason,
            },
            DomainEvent::CleanAccountRequest {
                aws_account_id: monitored.aws_account_id,
            },
        ])
        .await;
        Ok(ended)
    }

    /// Record the latest accrued spend on a monitored lease. Conditional
    /// single-record update; the monitor sweep reacts to the new total on
    /// its next pass.
    pub async fn update_lease_cost(
        &self,
        key: &LeaseKey,
        total_cost_accrued: Decimal,
    ) -> Result<Lease> {
        let lease = self.load_lease(key).await?;
        let updated = match lease.clone() {
            Lease::Active(mut m) => {
                m.total_cost_accrued = total_cost_accrued;
                Lease::Active(m)
            }
            Lease::Frozen(mut m) => {
                m.total_cost_accrued = total_cost_accrued;
                Lease::Frozen(m)
            }
            other => {
                return Err(Error::InvalidStateTransition {
                    entity: "lease",
                    key: key.to_string(),
                    action: "record cost",
                    status: other.status().to_string(),
                })
            }
        };
        self.leases.update(updated.clone(), Some(&lease)).await?;
        Ok(updated)
    }

    /// Adjust a monitored lease's spend ceiling and expiration date.
    ///
    /// The edited lease validates against the current policy snapshot, and
    /// the calendar bounds are what gets checked: the template's hour count
    /// stopped being authoritative when the account was assigned. `None`
    /// means unbounded, which the policy may forbid.
    pub async fn update_lease_settings(
        &self,
        key: &LeaseKey,
        max_spend: Option<Decimal>,
        expiration_date: Option<chrono::DateTime<Utc>>,
    ) -> Result<Lease> {
        let config = self.config.get().await?;
        let lease = self.load_lease(key).await?;
        let updated = match lease.clone() {
            Lease::Active(mut m) => {
                m.max_spend = max_spend;
                m.expiration_date = expiration_date;
                Lease::Active(m)
            }
            Lease::Frozen(mut m) => {
                m.max_spend = max_spend;
                m.expiration_date = expiration_date;
                Lease::Frozen(m)
            }
            other => {
                return Err(Error::InvalidStateTransition {
                    entity: "lease",
                    key: key.to_string(),
                    action: "edit",
                    status: other.status().to_string(),
                })
            }
        };
        if let Some(monitored) = updated.as_monitored() {
            policy::validate_monitored(monitored, &config)?;
        }
        self.leases.update(updated.clone(), Some(&lease)).await?;
        info!(lease = %key, "lease settings updated");
        Ok(updated)
    }

    // ── Templates ────────────────────────────────────────────

    /// Create a template; validated against the current policy snapshot.
    pub async fn create_lease_template(&self, template: LeaseTemplate) -> Result<LeaseTemplate> {
        let config = self.config.get().await?;
        policy::validate_template(&template, &config)?;
        self.templates.create(template.clone()).await?;
        info!(template = %template.name, "lease template created");
        Ok(template)
    }

    /// Edit a template. Existing leases keep the snapshot they were
    /// requested with; the edit only affects future requests.
    pub async fn update_lease_template(
        &self,
        template: LeaseTemplate,
        expected: &LeaseTemplate,
    ) -> Result<LeaseTemplate> {
        let config = self.config.get().await?;
        policy::validate_template(&template, &config)?;
        Ok(self
            .templates
            .update(template, Some(expected))
            .await?
            .new)
    }

    pub async fn get_lease_template(&self, uuid: Uuid) -> Result<Option<LeaseTemplate>> {
        self.templates.get(&uuid).await
    }
}
