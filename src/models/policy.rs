//! Policy guards against the global configuration ceiling.
//!
//! Pure functions: the same lease or template validated against the same
//! config snapshot always yields the same verdict. Guards run before any
//! saga step is constructed, so a rejection has zero side effects.

use rust_decimal::Decimal;

use crate::errors::{Error, Result};
use crate::models::global_config::GlobalConfig;
use crate::models::lease::{MonitoredLease, PendingLease};
use crate::models::template::LeaseTemplate;

/// Check a spend ceiling against the global budget policy.
pub fn validate_budget(max_spend: Option<Decimal>, config: &GlobalConfig) -> Result<()> {
    match (max_spend, config.max_budget) {
        (None, _) if config.require_max_budget => Err(Error::validation(
            "max_spend",
            "max budget must be provided",
        )),
        (Some(spend), Some(ceiling)) if spend > ceiling => Err(Error::validation(
            "max_spend",
            format!("max spend {spend} exceeds global max budget {ceiling}"),
        )),
        _ => Ok(()),
    }
}

/// Check a duration against the global duration policy.
pub fn validate_duration(hours: Option<u32>, config: &GlobalConfig) -> Result<()> {
    match (hours, config.max_duration_hours) {
        (None, _) if config.require_max_duration => Err(Error::validation(
            "lease_duration_in_hours",
            "max duration must be provided",
        )),
        (Some(h), Some(ceiling)) if h > ceiling => Err(Error::validation(
            "lease_duration_in_hours",
            format!("lease duration {h}h exceeds global max duration {ceiling}h"),
        )),
        _ => Ok(()),
    }
}

/// Guard for template creation and edits.
pub fn validate_template(template: &LeaseTemplate, config: &GlobalConfig) -> Result<()> {
    validate_budget(template.max_spend, config)?;
    validate_duration(template.lease_duration_in_hours, config)
}

/// Guard for a pending request's policy snapshot, invoked before
/// `PendingApproval → Active`.
pub fn validate_request(request: &PendingLease, config: &GlobalConfig) -> Result<()> {
    validate_budget(request.max_spend, config)?;
    validate_duration(request.lease_duration_in_hours, config)
}

/// Guard for an already-monitored lease.
///
/// Once an account is assigned, the calendar bounds are authoritative: the
/// duration is recomputed from `expiration_date − start_date`, not taken
/// from the template's hour count.
pub fn validate_monitored(lease: &MonitoredLease, config: &GlobalConfig) -> Result<()> {
    validate_budget(lease.max_spend, config)?;

    match lease.expiration_date {
        None if config.require_max_duration => Err(Error::validation(
            "expiration_date",
            "max duration must be provided",
        )),
        None => Ok(()),
        Some(expiration) => {
            let minutes = (expiration - lease.start_date).num_minutes().max(0);
            let hours = (minutes + 59) / 60;
            match config.max_duration_hours {
                Some(ceiling) if hours > i64::from(ceiling) => Err(Error::validation(
                    "expiration_date",
                    format!("lease runs {hours}h, global max duration is {ceiling}h"),
                )),
                _ => Ok(()),
            }
        }
    }
}
