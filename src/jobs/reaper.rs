//! Retention reaper for lease records.
//!
//! Denied and terminated leases carry an epoch-seconds retention deadline
//! stamped from the global config at decision time. The reaper deletes
//! records past that deadline; everything else is never touched.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::time;
use tracing::{error, info};

use crate::errors::Result;
use crate::models::lease::LeaseKey;
use crate::store::{Entity, LeaseStore, PageRequest};

const SWEEP_PAGE_SIZE: usize = 100;

/// Delete every reaper-eligible lease whose deadline is at or before `now`.
/// Returns how many records were removed.
pub async fn run_reaper_sweep(leases: &dyn LeaseStore, now: DateTime<Utc>) -> Result<usize> {
    let cutoff = now.timestamp();
    let mut doomed: Vec<LeaseKey> = Vec::new();

    let mut page = PageRequest::sized(SWEEP_PAGE_SIZE);
    loop {
        let batch = leases.find_all(page).await?;
        for lease in &batch.items {
            if let Some(deadline) = lease.retention_deadline() {
                if deadline <= cutoff {
                    doomed.push(lease.key());
                }
            }
        }
        match batch.next_page_identifier {
            Some(token) => page = PageRequest::starting_at(token, SWEEP_PAGE_SIZE),
            None => break,
        }
    }

    for key in &doomed {
        leases.delete(key).await?;
    }
    if !doomed.is_empty() {
        info!(deleted = doomed.len(), "reaped expired lease records");
    }
    Ok(doomed.len())
}

/// Spawn the periodic reaper task. Call this once at startup.
pub fn spawn(leases: Arc<dyn LeaseStore>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        loop {
            ticker.tick().await;
            if let Err(e) = run_reaper_sweep(leases.as_ref(), Utc::now()).await {
                error!("reaper sweep failed: {e}");
            }
        }
    })
}
