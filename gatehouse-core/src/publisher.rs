use async_trait::async_trait;
use gatehouse_shared::models::events::TicketLifecycleEvent;

use crate::CoreResult;

/// Outbound sink for ticket lifecycle messages. Callers treat publishing as
/// best-effort and only log failures.
#[async_trait]
pub trait TicketEventPublisher: Send + Sync {
    async fn publish(&self, event: &TicketLifecycleEvent) -> CoreResult<()>;
}

/// Default publisher: writes each message to the log.
pub struct TracingPublisher;

#[async_trait]
impl TicketEventPublisher for TracingPublisher {
    async fn publish(&self, event: &TicketLifecycleEvent) -> CoreResult<()> {
        tracing::info!(event_id = %event.event_id(), ?event, "ticket lifecycle event");
        Ok(())
    }
}
