//! Reusable saga steps over the record store and the collaborator services.

use async_trait::async_trait;
use std::sync::Arc;

use crate::saga::{one_way, step_fn, FnStep, SagaStep};
use crate::services::directory::{AccountDirectory, OuPool};
use crate::services::identity::{GroupRole, IdentityService};
use crate::store::{Entity, RecordStore};

/// Create a record; compensation deletes it again.
pub(crate) struct CreateRecord<T: Entity, S: ?Sized> {
    name: &'static str,
    store: Arc<S>,
    item: T,
}

pub(crate) fn create_record<T, S>(
    name: &'static str,
    store: Arc<S>,
    item: T,
) -> CreateRecord<T, S>
where
    T: Entity,
    S: RecordStore<T> + ?Sized,
{
    CreateRecord { name, store, item }
}

#[async_trait]
impl<T, S> SagaStep for CreateRecord<T, S>
where
    T: Entity,
    S: RecordStore<T> + ?Sized + 'static,
{
    fn name(&self) -> &str {
        self.name
    }

    async fn begin(&mut self) -> anyhow::Result<()> {
        self.store.create(self.item.clone()).await?;
        Ok(())
    }

    async fn compensate(&mut self) -> anyhow::Result<()> {
        self.store.delete(&self.item.key()).await?;
        Ok(())
    }
}

/// Conditionally replace `prior` with `next`; compensation writes `prior`
/// back, conditional on this step's own write still being current. A
/// compensation conflict therefore means a third party has raced in, which
/// correctly escalates to the inconsistent-state error.
pub(crate) struct UpdateRecord<T: Entity, S: ?Sized> {
    name: &'static str,
    store: Arc<S>,
    next: T,
    prior: T,
}

pub(crate) fn update_record<T, S>(
    name: &'static str,
    store: Arc<S>,
    next: T,
    prior: T,
) -> UpdateRecord<T, S>
where
    T: Entity,
    S: RecordStore<T> + ?Sized,
{
    UpdateRecord {
        name,
        store,
        next,
        prior,
    }
}

#[async_trait]
impl<T, S> SagaStep for UpdateRecord<T, S>
where
    T: Entity,
    S: RecordStore<T> + ?Sized + 'static,
{
    fn name(&self) -> &str {
        self.name
    }

    async fn begin(&mut self) -> anyhow::Result<()> {
        self.store
            .update(self.next.clone(), Some(&self.prior))
            .await?;
        Ok(())
    }

    async fn compensate(&mut self) -> anyhow::Result<()> {
        self.store
            .update(self.prior.clone(), Some(&self.next))
            .await?;
        Ok(())
    }
}

/// Grant a role group access; compensation revokes it.
pub(crate) fn grant_group_access(
    identity: Arc<dyn IdentityService>,
    aws_account_id: String,
    role: GroupRole,
) -> FnStep {
    let name = match role {
        GroupRole::User => "grant user group access",
        GroupRole::Manager => "grant manager group access",
        GroupRole::Admin => "grant admin group access",
    };
    let undo_identity = identity.clone();
    let undo_id = aws_account_id.clone();
    step_fn(
        name,
        move || async move {
            identity.assign_group_access(&aws_account_id, role).await?;
            Ok(())
        },
        move || async move {
            undo_identity.revoke_group_access(&undo_id, role).await?;
            Ok(())
        },
    )
}

/// Revoke a role group's access; compensation grants it back.
pub(crate) fn revoke_group_access(
    identity: Arc<dyn IdentityService>,
    aws_account_id: String,
    role: GroupRole,
) -> FnStep {
    let name = match role {
        GroupRole::User => "revoke user group access",
        GroupRole::Manager => "revoke manager group access",
        GroupRole::Admin => "revoke admin group access",
    };
    let undo_identity = identity.clone();
    let undo_id = aws_account_id.clone();
    step_fn(
        name,
        move || async move {
            identity.revoke_group_access(&aws_account_id, role).await?;
            Ok(())
        },
        move || async move {
            undo_identity.assign_group_access(&undo_id, role).await?;
            Ok(())
        },
    )
}

/// Revoke a role group's access with no compensation. Ejection treats its
/// revocations as independently safe one-way actions.
pub(crate) fn revoke_group_access_one_way(
    identity: Arc<dyn IdentityService>,
    aws_account_id: String,
    role: GroupRole,
) -> FnStep {
    let name = match role {
        GroupRole::User => "revoke user group access",
        GroupRole::Manager => "revoke manager group access",
        GroupRole::Admin => "revoke admin group access",
    };
    one_way(name, move || async move {
        identity.revoke_group_access(&aws_account_id, role).await?;
        Ok(())
    })
}

/// Revoke every individual user grant, one-way.
pub(crate) fn revoke_all_user_access_one_way(
    identity: Arc<dyn IdentityService>,
    aws_account_id: String,
) -> FnStep {
    one_way("revoke all user access", move || async move {
        identity.revoke_all_user_access(&aws_account_id).await?;
        Ok(())
    })
}

/// Move an account between OU pools; compensation moves it back.
pub(crate) fn move_account(
    directory: Arc<dyn AccountDirectory>,
    aws_account_id: String,
    from: OuPool,
    to: OuPool,
) -> FnStep {
    let undo_directory = directory.clone();
    let undo_id = aws_account_id.clone();
    step_fn(
        "move account",
        move || async move {
            directory.move_account(&aws_account_id, from, to).await?;
            Ok(())
        },
        move || async move {
            undo_directory.move_account(&undo_id, to, from).await?;
            Ok(())
        },
    )
}
