//! Account pool operations: register, eject, quarantine, and the cleanup
//! round-trip.

use chrono::Utc;
use tracing::{debug, info};

use super::{steps, Orchestrator};
use crate::errors::{Error, Result};
use crate::models::account::{AccountStatus, CleanupExecutionContext, SandboxAccount};
use crate::models::events::DomainEvent;
use crate::models::lease::TerminationReason;
use crate::saga::Saga;
use crate::services::directory::OuPool;
use crate::services::identity::GroupRole;
use crate::store::Entity;

impl Orchestrator {
    /// Pull a fresh account from the entry OU into the pool.
    ///
    /// The account lands in `CleanUp` first; it only becomes `Available`
    /// once the external cleaner reports success. Fails fast when the
    /// account is not sitting in the entry OU.
    pub async fn register_account(&self, aws_account_id: &str) -> Result<SandboxAccount> {
        let described = self
            .directory
            .describe_account(aws_account_id)
            .await?
            .ok_or_else(|| Error::AccountNotFound(aws_account_id.to_string()))?;
        if described.pool != OuPool::Entry {
            return Err(Error::InvalidStateTransition {
                entity: SandboxAccount::ENTITY,
                key: aws_account_id.to_string(),
                action: "register",
                status: described.pool.to_string(),
            });
        }

        let mut account = SandboxAccount::new(aws_account_id, AccountStatus::CleanUp);
        account.name = described.name;
        account.email = described.email;

        Saga::new("register_account")
            .step(steps::move_account(
                self.directory.clone(),
                aws_account_id.to_string(),
                OuPool::Entry,
                OuPool::CleanUp,
            ))
            .step(steps::grant_group_access(
                self.identity.clone(),
                aws_account_id.to_string(),
                GroupRole::Manager,
            ))
            .step(steps::grant_group_access(
                self.identity.clone(),
                aws_account_id.to_string(),
                GroupRole::Admin,
            ))
            .step(steps::create_record(
                "create account record",
                self.accounts.clone(),
                account.clone(),
            ))
            .run()
            .await?;

        info!(account = aws_account_id, "account registered, cleanup requested");
        self.publish_after_commit(&[DomainEvent::CleanAccountRequest {
            aws_account_id: aws_account_id.to_string(),
        }])
        .await;
        Ok(account)
    }

    /// Remove an account from the fleet.
    ///
    /// When a lease backs the account, a saga first revokes all access and
    /// ends the lease as `Ejected`. The OU move to the exit pool and the
    /// record removal run after and outside that saga: once access is
    /// revoked it stays revoked, and a failed exit move does not resurrect
    /// anyone's credentials.
    pub async fn eject_account(&self, aws_account_id: &str) -> Result<()> {
        let account = self.load_account(aws_account_id).await?;
        let backing = self
            .leases
            .find_by_account(aws_account_id)
            .await?
            .into_iter()
            .next();

        if let Some(lease) = backing {
            let config = self.config.get().await?;
            let now = Utc::now();
            let ended =
                lease
                    .clone()
                    .terminate(TerminationReason::Ejected, now, config.retention_deadline(now))?;
            let key = lease.key();

            Saga::new("eject_account")
                .step(steps::revoke_all_user_access_one_way(
                    self.identity.clone(),
                    aws_account_id.to_string(),
                ))
                .step(steps::revoke_group_access_one_way(
                    self.identity.clone(),
                    aws_account_id.to_string(),
                    GroupRole::Manager,
                ))
                .step(steps::revoke_group_access_one_way(
                    self.identity.clone(),
                    aws_account_id.to_string(),
                    GroupRole::Admin,
                ))
                .step(steps::update_record(
                    "update lease to ejected",
                    self.leases.clone(),
                    ended,
                    lease,
                ))
                .run()
                .await?;

            self.publish_after_commit(&[DomainEvent::LeaseTerminated {
                lease: key,
                reason: TerminationReason::Ejected,
            }])
            .await;
        }

        // Past this point nothing is rolled back.
        self.directory
            .move_account(aws_account_id, account.status.into(), OuPool::Exit)
            .await?;
        self.accounts.delete(&aws_account_id.to_string()).await?;

        info!(account = aws_account_id, "account ejected");
        self.publish_after_commit(&[DomainEvent::AccountEjected {
            aws_account_id: aws_account_id.to_string(),
        }])
        .await;
        Ok(())
    }

    /// Pull an account from rotation after drift or by operator decision.
    /// Idempotent for an already-quarantined account.
    pub async fn quarantine_account(
        &self,
        aws_account_id: &str,
        drift: bool,
    ) -> Result<SandboxAccount> {
        let account = self.load_account(aws_account_id).await?;
        if account.status == AccountStatus::Quarantine {
            debug!(account = aws_account_id, "already quarantined");
            return Ok(account);
        }

        let now = Utc::now();
        let mut next = account.with_status(AccountStatus::Quarantine)?;
        if drift {
            next.drift_detected_at = Some(now);
        }

        let backing = self
            .leases
            .find_by_account(aws_account_id)
            .await?
            .into_iter()
            .next();

        let mut events = vec![DomainEvent::AccountQuarantined {
            aws_account_id: aws_account_id.to_string(),
            drift,
        }];
        if drift {
            events.push(DomainEvent::AccountDriftDetected {
                aws_account_id: aws_account_id.to_string(),
            });
        }

        let mut saga = Saga::new("quarantine_account");
        saga.push(steps::update_record(
            "update account to quarantine",
            self.accounts.clone(),
            next.clone(),
            account.clone(),
        ));
        saga.push(steps::move_account(
            self.directory.clone(),
            aws_account_id.to_string(),
            account.status.into(),
            OuPool::Quarantine,
        ));
        if let Some(lease) = backing {
            let config = self.config.get().await?;
            let ended = lease.clone().terminate(
                TerminationReason::AccountQuarantined,
                now,
                config.retention_deadline(now),
            )?;
            events.push(DomainEvent::LeaseTerminated {
                lease: lease.key(),
                reason: TerminationReason::AccountQuarantined,
            });
            saga.push(steps::revoke_group_access(
                self.identity.clone(),
                aws_account_id.to_string(),
                GroupRole::User,
            ));
            saga.push(steps::update_record(
                "update lease to quarantined",
                self.leases.clone(),
                ended,
                lease,
            ));
        }
        saga.run().await?;

        info!(account = aws_account_id, drift, "account quarantined");
        self.publish_after_commit(&events).await;
        Ok(next)
    }

    /// Record that the external cleaner started a run on an account.
    pub async fn mark_cleanup_started(
        &self,
        aws_account_id: &str,
        execution_id: &str,
    ) -> Result<SandboxAccount> {
        let account = self.load_account(aws_account_id).await?;
        if account.status != AccountStatus::CleanUp {
            return Err(Error::InvalidStateTransition {
                entity: SandboxAccount::ENTITY,
                key: aws_account_id.to_string(),
                action: "start cleanup",
                status: account.status.to_string(),
            });
        }
        let mut next = account.clone();
        next.cleanup_execution_context = Some(CleanupExecutionContext {
            execution_id: execution_id.to_string(),
            started_at: Utc::now(),
        });
        Ok(self.accounts.update(next, Some(&account)).await?.new)
    }

    /// Return a cleaned account to the pool: `CleanUp → Available`.
    /// Driven by the external cleaner's success signal.
    pub async fn complete_cleanup(&self, aws_account_id: &str) -> Result<SandboxAccount> {
        let account = self.load_account(aws_account_id).await?;
        let next = account.with_status(AccountStatus::Available)?;

        Saga::new("complete_cleanup")
            .step(steps::update_record(
                "update account to available",
                self.accounts.clone(),
                next.clone(),
                account,
            ))
            .step(steps::move_account(
                self.directory.clone(),
                aws_account_id.to_string(),
                OuPool::CleanUp,
                OuPool::Available,
            ))
            .run()
            .await?;

        info!(account = aws_account_id, "account cleaned, back in the pool");
        Ok(next)
    }

    /// Ask the cleaner to run (again) on an account.
    ///
    /// An account already in `CleanUp` only gets the request republished;
    /// any other eligible account is moved to `CleanUp` first. Single
    /// logical effect, no saga: the republish is idempotent on the
    /// consumer side.
    pub async fn retry_cleanup(&self, aws_account_id: &str) -> Result<SandboxAccount> {
        let account = self.load_account(aws_account_id).await?;
        let event = DomainEvent::CleanAccountRequest {
            aws_account_id: aws_account_id.to_string(),
        };

        if account.status == AccountStatus::CleanUp {
            // The republish is the operation here, so its failure is the
            // caller's failure.
            self.publisher.publish(&event).await?;
            info!(account = aws_account_id, "cleanup re-requested");
            return Ok(account);
        }

        let next = account.with_status(AccountStatus::CleanUp)?;
        self.directory
            .move_account(aws_account_id, account.status.into(), OuPool::CleanUp)
            .await?;
        let updated = self.accounts.update(next, Some(&account)).await?.new;

        self.publisher.publish(&event).await?;
        info!(account = aws_account_id, from = %account.status, "cleanup requested");
        Ok(updated)
    }
}
