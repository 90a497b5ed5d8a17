//! Domain event publishing seam.

use async_trait::async_trait;
use tracing::info;

use crate::models::events::DomainEvent;

/// At-least-once publisher for committed transitions.
///
/// Publishing is fire-and-forget from the orchestrator's perspective: a
/// failure after a committed saga is logged, never rolled back.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &DomainEvent) -> anyhow::Result<()>;
}

/// Publisher that records events as structured log lines. The default when
/// no event bus is wired in.
pub struct LogPublisher;

#[async_trait]
impl EventPublisher for LogPublisher {
    async fn publish(&self, event: &DomainEvent) -> anyhow::Result<()> {
        info!(
            event_type = event.event_type(),
            detail = %serde_json::to_string(event)?,
            "domain event"
        );
        Ok(())
    }
}
