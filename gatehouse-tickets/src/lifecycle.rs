use std::sync::Arc;

use chrono::{DateTime, Utc};
use gatehouse_core::publisher::TicketEventPublisher;
use gatehouse_core::repository::{CapacityLedger, EventRepository, StatusChange, TicketRepository};
use gatehouse_core::ticket::audit_hash;
use gatehouse_core::{Actor, CoreError, CoreResult, Requester, Ticket, TicketStatus};
use gatehouse_shared::models::events::{
    InvitationResolvedEvent, TicketCheckedInEvent, TicketLifecycleEvent,
};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Drives invitation tickets through the state machine:
///
/// ```text
/// pending_acceptance --accept--> accepted --(system)--> confirmed --check-in--> used
/// pending_acceptance --decline--> declined   (releases the seat)
/// pending_acceptance --deadline--> expired   (releases the seat)
/// ```
///
/// Every step is a compare-and-swap on the stored status, so concurrent
/// accept/decline/expiry on one ticket have exactly one winner.
pub struct InvitationEngine {
    tickets: Arc<dyn TicketRepository>,
    events: Arc<dyn EventRepository>,
    ledger: Arc<dyn CapacityLedger>,
    publisher: Arc<dyn TicketEventPublisher>,
}

impl InvitationEngine {
    pub fn new(
        tickets: Arc<dyn TicketRepository>,
        events: Arc<dyn EventRepository>,
        ledger: Arc<dyn CapacityLedger>,
        publisher: Arc<dyn TicketEventPublisher>,
    ) -> Self {
        Self { tickets, events, ledger, publisher }
    }

    pub async fn accept(&self, ticket_id: Uuid, invitee: &Requester) -> CoreResult<Ticket> {
        let ticket = self.open_invitation(ticket_id, invitee).await?;

        let accepted = self
            .tickets
            .update_status(
                ticket.id,
                StatusChange {
                    from: TicketStatus::PendingAcceptance,
                    to: TicketStatus::Accepted,
                    actor: Actor::User(invitee.user_id),
                    holder_id: Some(invitee.user_id),
                },
            )
            .await
            .map_err(already_resolved)?;

        // On failure the seat stays reserved and the sweep settles the ticket later.
        let confirmed = self.settle(&accepted).await.map_err(|e| {
            error!(ticket_id = %accepted.id, error = %e, "seat confirmation failed; ticket left accepted");
            already_resolved(e)
        })?;

        info!(ticket_id = %confirmed.id, event_id = %confirmed.event_id, "invitation accepted");
        self.announce_resolution(&confirmed).await;
        Ok(confirmed)
    }

    /// Finish an `accepted` ticket: move its seat from reserved to sold, then
    /// mark it `confirmed` and record the audit hash.
    pub async fn settle(&self, ticket: &Ticket) -> CoreResult<Ticket> {
        self.ledger.confirm(ticket.event_id, 1).await?;
        let mut confirmed = self.tickets.update_status(ticket.id, StatusChange::settle()).await?;
        stamp_audit_hash(self.tickets.as_ref(), &mut confirmed).await;
        Ok(confirmed)
    }

    /// Irrevocable; returns the seat to the event.
    pub async fn decline(&self, ticket_id: Uuid, invitee: &Requester) -> CoreResult<Ticket> {
        let ticket = self.open_invitation(ticket_id, invitee).await?;

        let declined = self
            .tickets
            .update_status(
                ticket.id,
                StatusChange {
                    from: TicketStatus::PendingAcceptance,
                    to: TicketStatus::Declined,
                    actor: Actor::User(invitee.user_id),
                    holder_id: None,
                },
            )
            .await
            .map_err(already_resolved)?;

        if let Err(e) = self.ledger.release(declined.event_id, 1).await {
            error!(ticket_id = %declined.id, error = %e, "seat release failed after decline");
            return Err(e);
        }

        info!(ticket_id = %declined.id, event_id = %declined.event_id, "invitation declined");
        self.announce_resolution(&declined).await;
        Ok(declined)
    }

    /// Expire one invitation if its deadline has passed. `Ok(None)` means the
    /// ticket was not due or another transition won the race.
    pub async fn expire(&self, ticket_id: Uuid, now: DateTime<Utc>) -> CoreResult<Option<Ticket>> {
        let ticket = self.tickets.get(ticket_id).await?;
        if !ticket.is_overdue(now) {
            return Ok(None);
        }

        let expired = match self
            .tickets
            .update_status(
                ticket.id,
                StatusChange {
                    from: TicketStatus::PendingAcceptance,
                    to: TicketStatus::Expired,
                    actor: Actor::System,
                    holder_id: None,
                },
            )
            .await
        {
            Ok(t) => t,
            Err(CoreError::StateConflict { actual, .. }) => {
                info!(ticket_id = %ticket.id, status = %actual, "expiry lost the race");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        // Only the winning CAS releases, so the seat is returned exactly once.
        if let Err(e) = self.ledger.release(expired.event_id, 1).await {
            error!(ticket_id = %expired.id, error = %e, "seat release failed after expiry");
            return Err(e);
        }

        info!(ticket_id = %expired.id, event_id = %expired.event_id, "invitation expired");
        self.announce_resolution(&expired).await;
        Ok(Some(expired))
    }

    /// Entry scan at the venue: `confirmed -> used`, by the event's organizer.
    pub async fn check_in(&self, ticket_id: Uuid, organizer: &Requester) -> CoreResult<Ticket> {
        let ticket = self.tickets.get(ticket_id).await?;
        let event = self.events.get(ticket.event_id).await?;
        if event.organizer_id != organizer.user_id {
            return Err(CoreError::Forbidden("only the event organizer can check tickets in".to_string()));
        }

        let used = self
            .tickets
            .update_status(
                ticket.id,
                StatusChange {
                    from: TicketStatus::Confirmed,
                    to: TicketStatus::Used,
                    actor: Actor::User(organizer.user_id),
                    holder_id: None,
                },
            )
            .await
            .map_err(|e| match e {
                CoreError::StateConflict { actual: TicketStatus::Used, .. } => {
                    CoreError::Conflict("ticket already checked in".to_string())
                }
                CoreError::StateConflict { actual, .. } => {
                    CoreError::InvalidTransition { from: actual, to: TicketStatus::Used }
                }
                other => other,
            })?;

        info!(ticket_id = %used.id, event_id = %used.event_id, "ticket checked in");
        let message = TicketLifecycleEvent::TicketCheckedIn(TicketCheckedInEvent {
            ticket_id: used.id,
            event_id: used.event_id,
            holder_id: used.holder_id,
            timestamp: Utc::now().timestamp(),
        });
        publish_best_effort(self.publisher.as_ref(), &message).await;
        Ok(used)
    }

    /// Load a ticket the caller was invited to and make sure it is still open.
    async fn open_invitation(&self, ticket_id: Uuid, invitee: &Requester) -> CoreResult<Ticket> {
        let ticket = self.tickets.get(ticket_id).await?;

        if !ticket.is_invited(&invitee.email) {
            return Err(CoreError::Forbidden("this invitation was sent to a different email".to_string()));
        }
        if ticket.status != TicketStatus::PendingAcceptance {
            return Err(CoreError::AlreadyResolved { status: ticket.status });
        }
        if ticket.is_overdue(Utc::now()) {
            self.expire(ticket.id, Utc::now()).await?;
            let current = self.tickets.get(ticket.id).await?;
            return Err(CoreError::AlreadyResolved { status: current.status });
        }
        Ok(ticket)
    }

    async fn announce_resolution(&self, ticket: &Ticket) {
        let message = TicketLifecycleEvent::InvitationResolved(InvitationResolvedEvent {
            ticket_id: ticket.id,
            event_id: ticket.event_id,
            outcome: ticket.status.to_string(),
            timestamp: Utc::now().timestamp(),
        });
        publish_best_effort(self.publisher.as_ref(), &message).await;
    }
}

/// A lost compare-and-swap means someone else already settled the invitation.
fn already_resolved(e: CoreError) -> CoreError {
    match e {
        CoreError::StateConflict { actual, .. } => CoreError::AlreadyResolved { status: actual },
        other => other,
    }
}

/// Record the confirmation digest. A failure here is logged, not surfaced:
/// the ticket is already confirmed.
pub(crate) async fn stamp_audit_hash(tickets: &dyn TicketRepository, ticket: &mut Ticket) {
    let hash = audit_hash(ticket, Utc::now());
    match tickets.set_tx_hash(ticket.id, &hash).await {
        Ok(()) => ticket.tx_hash = Some(hash),
        Err(e) => warn!(ticket_id = %ticket.id, error = %e, "could not record audit hash"),
    }
}

pub(crate) async fn publish_best_effort(publisher: &dyn TicketEventPublisher, message: &TicketLifecycleEvent) {
    if let Err(e) = publisher.publish(message).await {
        warn!(event_id = %message.event_id(), error = %e, "failed to publish lifecycle event");
    }
}
