use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use gatehouse_core::repository::TicketRepository;
use gatehouse_core::CoreResult;
use serde::Serialize;
use tracing::{info, warn};

use crate::lifecycle::InvitationEngine;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub examined: usize,
    pub expired: usize,
    /// Invitations resolved by someone else between listing and expiry.
    pub skipped: usize,
    /// Accepted tickets whose deferred seat confirmation went through.
    pub settled: usize,
    pub failed: usize,
}

/// Expires every overdue invitation in one pass, then settles accepted
/// tickets whose seat confirmation failed earlier. Safe to run alongside
/// request handlers: each expiry goes through the engine's compare-and-swap,
/// and only tickets untouched for `settle_after` are settled, which leaves
/// in-flight purchases and accepts alone.
pub struct ExpirySweep {
    tickets: Arc<dyn TicketRepository>,
    engine: Arc<InvitationEngine>,
    settle_after: Duration,
}

impl ExpirySweep {
    pub fn new(tickets: Arc<dyn TicketRepository>, engine: Arc<InvitationEngine>) -> Self {
        Self { tickets, engine, settle_after: Duration::minutes(5) }
    }

    pub fn with_settle_after(mut self, settle_after: Duration) -> Self {
        self.settle_after = settle_after;
        self
    }

    pub async fn run(&self, now: DateTime<Utc>) -> CoreResult<SweepReport> {
        let overdue = self.tickets.list_overdue(now).await?;
        let mut report = SweepReport { examined: overdue.len(), ..Default::default() };

        for ticket in overdue {
            match self.engine.expire(ticket.id, now).await {
                Ok(Some(_)) => report.expired += 1,
                Ok(None) => report.skipped += 1,
                Err(e) => {
                    warn!(ticket_id = %ticket.id, error = %e, "failed to expire invitation");
                    report.failed += 1;
                }
            }
        }

        let unsettled = self.tickets.list_unsettled(now - self.settle_after).await?;
        report.examined += unsettled.len();
        for ticket in unsettled {
            match self.engine.settle(&ticket).await {
                Ok(_) => report.settled += 1,
                Err(e) => {
                    warn!(ticket_id = %ticket.id, error = %e, "failed to settle accepted ticket");
                    report.failed += 1;
                }
            }
        }

        if report.examined > 0 {
            info!(
                examined = report.examined,
                expired = report.expired,
                skipped = report.skipped,
                settled = report.settled,
                failed = report.failed,
                "expiry sweep finished"
            );
        }
        Ok(report)
    }
}
