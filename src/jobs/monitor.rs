//! Budget/duration monitoring sweep.
//!
//! Periodically walks the monitored leases and applies threshold policy:
//! leases past their expiration date or spend ceiling are terminated,
//! crossed freeze-thresholds freeze the lease, and alert-thresholds are
//! logged for the notification layer to pick up.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::time;
use tracing::{debug, error, info, warn};

use crate::errors::Result;
use crate::models::lease::{FreezeReason, Lease, LeaseStatus, MonitoredLease, TerminationReason};
use crate::models::template::ThresholdAction;
use crate::orchestrator::Orchestrator;
use crate::store::{Entity, PageRequest};

const SWEEP_PAGE_SIZE: usize = 50;

/// What one sweep did.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SweepOutcome {
    pub scanned: usize,
    pub frozen: usize,
    pub terminated: usize,
    pub alerts: usize,
}

/// The action the policy calls for on one lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decision {
    Terminate(TerminationReason),
    Freeze(FreezeReason),
    Alert,
    None,
}

/// Pure threshold policy for a single monitored lease.
///
/// Hard limits win over thresholds; freeze-thresholds win over
/// alert-thresholds.
fn decide(lease: &MonitoredLease, now: DateTime<Utc>) -> Decision {
    if let Some(expiration) = lease.expiration_date {
        if now >= expiration {
            return Decision::Terminate(TerminationReason::Expired);
        }
    }
    if let Some(max_spend) = lease.max_spend {
        if lease.total_cost_accrued >= max_spend {
            return Decision::Terminate(TerminationReason::BudgetExceeded);
        }
    }

    let mut alert = false;
    for threshold in &lease.budget_thresholds {
        if lease.total_cost_accrued >= threshold.dollars_spent {
            match threshold.action {
                ThresholdAction::Freeze => {
                    return Decision::Freeze(FreezeReason::BudgetThreshold)
                }
                ThresholdAction::Alert => alert = true,
            }
        }
    }
    if let Some(expiration) = lease.expiration_date {
        let remaining_minutes = (expiration - now).num_minutes().max(0);
        for threshold in &lease.duration_thresholds {
            if remaining_minutes <= i64::from(threshold.hours_remaining) * 60 {
                match threshold.action {
                    ThresholdAction::Freeze => {
                        return Decision::Freeze(FreezeReason::DurationThreshold)
                    }
                    ThresholdAction::Alert => alert = true,
                }
            }
        }
    }

    if alert {
        Decision::Alert
    } else {
        Decision::None
    }
}

/// Run the monitor once over every monitored lease.
///
/// Per-lease failures are logged and skipped so one bad record cannot
/// stall the sweep; an optimistic-write conflict just means a concurrent
/// operation got there first.
pub async fn run_monitor_sweep(orchestrator: &Orchestrator) -> Result<SweepOutcome> {
    let now = Utc::now();
    let mut outcome = SweepOutcome::default();

    for status in [LeaseStatus::Active, LeaseStatus::Frozen] {
        let mut page = PageRequest::sized(SWEEP_PAGE_SIZE);
        loop {
            let batch = orchestrator.leases_by_status(status, page).await?;
            for lease in &batch.items {
                let Some(monitored) = lease.as_monitored() else {
                    continue;
                };
                outcome.scanned += 1;
                let key = lease.key();

                match decide(monitored, now) {
                    Decision::Terminate(reason) => {
                        match orchestrator.terminate_lease(&key, reason).await {
                            Ok(_) => outcome.terminated += 1,
                            Err(e) if e.is_retryable() => {
                                debug!(lease = %key, error = %e, "termination lost a race, will retry next sweep");
                            }
                            Err(e) => {
                                error!(lease = %key, error = %e, "monitor failed to terminate lease");
                            }
                        }
                    }
                    Decision::Freeze(reason) => {
                        if matches!(lease, Lease::Frozen(_)) {
                            continue;
                        }
                        match orchestrator.freeze_lease(&key, reason).await {
                            Ok(_) => outcome.frozen += 1,
                            Err(e) if e.is_retryable() => {
                                debug!(lease = %key, error = %e, "freeze lost a race, will retry next sweep");
                            }
                            Err(e) => {
                                error!(lease = %key, error = %e, "monitor failed to freeze lease");
                            }
                        }
                    }
                    Decision::Alert => {
                        warn!(
                            lease = %key,
                            spend = %monitored.total_cost_accrued,
                            "lease crossed an alert threshold"
                        );
                        outcome.alerts += 1;
                    }
                    Decision::None => {}
                }
            }
            match batch.next_page_identifier {
                Some(token) => page = PageRequest::starting_at(token, SWEEP_PAGE_SIZE),
                None => break,
            }
        }
    }

    Ok(outcome)
}

/// Spawn the periodic monitor task. Call this once at startup.
pub fn spawn(orchestrator: Arc<Orchestrator>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        loop {
            ticker.tick().await;
            match run_monitor_sweep(&orchestrator).await {
                Ok(outcome) if outcome.frozen + outcome.terminated + outcome.alerts > 0 => {
                    info!(
                        scanned = outcome.scanned,
                        frozen = outcome.frozen,
                        terminated = outcome.terminated,
                        alerts = outcome.alerts,
                        "monitor sweep acted"
                    );
                }
                Ok(_) => {}
                Err(e) => error!("monitor sweep failed: {e}"),
            }
        }
    })
}
