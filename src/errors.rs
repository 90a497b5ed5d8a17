use thiserror::Error;

use crate::saga::SagaError;

pub type Result<T> = std::result::Result<T, Error>;

/// Typed failure surface of every orchestrator operation.
///
/// Callers care about three distinct situations and the variants preserve
/// them: nothing happened (validation, precondition, quota), everything was
/// undone (`Transaction` wrapping a rolled-back saga), or manual cleanup is
/// required (`Transaction` wrapping a failed compensation).
#[derive(Debug, Error)]
pub enum Error {
    /// Request violates policy. Raised before any mutation.
    #[error("validation failed for {field}: {message}")]
    Validation { field: &'static str, message: String },

    /// Optimistic-write conflict: the record changed since it was read.
    /// Retryable by the caller; the orchestrator does not auto-retry.
    #[error("{entity} {key} was modified concurrently")]
    ConcurrentModification { entity: &'static str, key: String },

    /// A record with the same key already exists.
    #[error("{entity} {key} already exists")]
    AlreadyExists { entity: &'static str, key: String },

    /// The user is at their active-lease limit.
    #[error("{user} already holds {active} active lease(s), limit is {limit}")]
    QuotaExceeded {
        user: String,
        active: usize,
        limit: u32,
    },

    #[error("sandbox account {0} not found")]
    AccountNotFound(String),

    #[error("lease {0} not found")]
    LeaseNotFound(String),

    #[error("lease template {0} not found")]
    TemplateNotFound(String),

    /// No `Available` account exists to back a lease activation.
    #[error("no sandbox accounts available")]
    NoAccountsAvailable,

    /// The entity is not in a state that permits the requested action.
    #[error("{entity} {key}: cannot {action} while {status}")]
    InvalidStateTransition {
        entity: &'static str,
        key: String,
        action: &'static str,
        status: String,
    },

    /// One or more saga steps failed. Inspect the inner [`SagaError`] to
    /// tell a clean rollback from an inconsistent partial state.
    #[error("transaction failed: {0}")]
    Transaction(#[from] SagaError),

    /// A collaborator call failed outside any saga. Authorization failures
    /// from the identity and directory services pass through here
    /// untranslated.
    #[error(transparent)]
    Service(#[from] anyhow::Error),
}

impl Error {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Error::Validation {
            field,
            message: message.into(),
        }
    }

    /// Whether retrying the same call with the same inputs can succeed.
    ///
    /// A rolled-back saga and an optimistic-write conflict are retryable; a
    /// failed compensation is not, since the backends may be inconsistent.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::ConcurrentModification { .. } => true,
            Error::Transaction(saga) => saga.rolled_back(),
            _ => false,
        }
    }
}
