use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Duration, Utc};
use gatehouse_core::publisher::TicketEventPublisher;
use gatehouse_core::repository::{CapacityLedger, EventRepository, StatusChange, TicketRepository};
use gatehouse_core::user::normalize_email;
use gatehouse_core::{CoreError, CoreResult, Requester, Ticket, MAX_GROUP_SIZE};
use gatehouse_shared::models::events::{InvitationSentEvent, TicketLifecycleEvent, TicketsReservedEvent};
use gatehouse_shared::Masked;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::lifecycle::{publish_best_effort, stamp_audit_hash};
use crate::retry::{retry_transient, RetryPolicy};

#[derive(Debug, Clone)]
pub struct ReservationRules {
    /// How long an invitee has to accept before the seat is released.
    pub invitation_window: Duration,
    /// Tickets per reservation, purchaser included. Never above
    /// `MAX_GROUP_SIZE`.
    pub max_group_size: usize,
}

impl ReservationRules {
    /// Pull `max_group_size` into `1..=MAX_GROUP_SIZE`.
    pub fn clamped(mut self) -> Self {
        let limit = self.max_group_size.clamp(1, MAX_GROUP_SIZE);
        if limit != self.max_group_size {
            warn!(configured = self.max_group_size, applied = limit, "group size limit out of range");
            self.max_group_size = limit;
        }
        self
    }
}

impl Default for ReservationRules {
    fn default() -> Self {
        Self {
            invitation_window: Duration::hours(24),
            max_group_size: MAX_GROUP_SIZE,
        }
    }
}

/// Turns purchase requests into ledger + ticket store writes.
///
/// Seats are reserved first in a single atomic ledger call; if a later write
/// fails, the reservation is released again (with bounded retries) so no
/// capacity is stranded.
pub struct ReservationCoordinator {
    tickets: Arc<dyn TicketRepository>,
    events: Arc<dyn EventRepository>,
    ledger: Arc<dyn CapacityLedger>,
    publisher: Arc<dyn TicketEventPublisher>,
    rules: ReservationRules,
    retry: RetryPolicy,
}

impl ReservationCoordinator {
    pub fn new(
        tickets: Arc<dyn TicketRepository>,
        events: Arc<dyn EventRepository>,
        ledger: Arc<dyn CapacityLedger>,
        publisher: Arc<dyn TicketEventPublisher>,
        rules: ReservationRules,
    ) -> Self {
        Self {
            tickets,
            events,
            ledger,
            publisher,
            rules: rules.clamped(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn rules(&self) -> &ReservationRules {
        &self.rules
    }

    /// Single ticket for the purchaser. The returned ticket is `confirmed`,
    /// or `accepted` if the seat confirmation was deferred to the sweep.
    pub async fn purchase_solo(&self, purchaser: &Requester, event_id: Uuid) -> CoreResult<Ticket> {
        self.ensure_on_sale(event_id).await?;
        self.reserve(event_id, 1).await?;

        let mut ticket = Ticket::purchased(event_id, Uuid::new_v4(), purchaser.user_id);
        if let Err(e) = self.tickets.create(&ticket).await {
            self.compensate(event_id, 1).await;
            return Err(e);
        }
        self.settle_purchaser_ticket(&mut ticket).await;

        info!(ticket_id = %ticket.id, %event_id, purchaser_id = %purchaser.user_id, "ticket purchased");
        self.announce_reservation(&[ticket.clone()], 0).await;
        Ok(ticket)
    }

    /// One confirmed ticket for the purchaser plus one pending invitation per
    /// email. Either every seat is reserved or none is.
    pub async fn purchase_group(
        &self,
        purchaser: &Requester,
        event_id: Uuid,
        invitee_emails: &[String],
    ) -> CoreResult<Vec<Ticket>> {
        let invitees = self.validate_invitees(purchaser, invitee_emails)?;
        self.ensure_on_sale(event_id).await?;

        let seats = invitees.len() as u32 + 1;
        self.reserve(event_id, seats).await?;

        let reservation_id = Uuid::new_v4();
        let expires_at = Utc::now() + self.rules.invitation_window;
        let mut tickets = Vec::with_capacity(invitees.len() + 1);
        tickets.push(Ticket::purchased(event_id, reservation_id, purchaser.user_id));
        for email in invitees {
            tickets.push(Ticket::invitation(event_id, reservation_id, purchaser.user_id, email, expires_at));
        }

        if let Err(e) = self.tickets.create_many(&tickets).await {
            self.compensate(event_id, seats).await;
            return Err(e);
        }
        self.settle_purchaser_ticket(&mut tickets[0]).await;

        info!(
            %reservation_id,
            %event_id,
            purchaser_id = %purchaser.user_id,
            invitations = seats - 1,
            "group reservation created"
        );
        self.announce_reservation(&tickets, seats as usize - 1).await;
        Ok(tickets)
    }

    fn validate_invitees(&self, purchaser: &Requester, emails: &[String]) -> CoreResult<Vec<String>> {
        let max_invitees = self.rules.max_group_size.saturating_sub(1);
        if emails.is_empty() {
            return Err(CoreError::Validation("a group reservation needs at least one invitee".to_string()));
        }
        if emails.len() > max_invitees {
            return Err(CoreError::Validation(format!(
                "a group reservation holds at most {} tickets",
                self.rules.max_group_size
            )));
        }

        let own = purchaser.email.trim().to_lowercase();
        let mut seen = HashSet::new();
        let mut invitees = Vec::with_capacity(emails.len());
        for raw in emails {
            let email = normalize_email(raw)?;
            if email == own {
                return Err(CoreError::Validation("you already hold the purchaser ticket".to_string()));
            }
            if !seen.insert(email.clone()) {
                return Err(CoreError::Validation(format!("'{}' is listed more than once", email)));
            }
            invitees.push(email);
        }
        Ok(invitees)
    }

    async fn ensure_on_sale(&self, event_id: Uuid) -> CoreResult<()> {
        let event = self.events.get(event_id).await?;
        if event.is_past(Utc::now()) {
            return Err(CoreError::Validation("this event has already taken place".to_string()));
        }
        Ok(())
    }

    async fn reserve(&self, event_id: Uuid, seats: u32) -> CoreResult<()> {
        self.ledger.reserve(event_id, seats).await.map_err(|e| match e {
            CoreError::CapacityExceeded { requested, available } => {
                info!(%event_id, requested, available, "sold out");
                CoreError::SoldOut { requested, available }
            }
            other => other,
        })
    }

    /// Move the purchaser's seat to sold and confirm the ticket. The tickets
    /// already exist, so nothing here fails the purchase: if the ledger keeps
    /// refusing, the ticket stays `accepted` on its reserved seat and the
    /// expiry sweep settles it.
    async fn settle_purchaser_ticket(&self, ticket: &mut Ticket) {
        let ledger = self.ledger.clone();
        let event_id = ticket.event_id;
        let sold = retry_transient(&self.retry, "confirm", || {
            let ledger = ledger.clone();
            async move { ledger.confirm(event_id, 1).await }
        })
        .await;
        if let Err(e) = sold {
            warn!(ticket_id = %ticket.id, %event_id, error = %e, "seat confirmation deferred to the sweep");
            return;
        }

        let tickets = self.tickets.clone();
        let ticket_id = ticket.id;
        let marked = retry_transient(&self.retry, "settle", || {
            let tickets = tickets.clone();
            async move { tickets.update_status(ticket_id, StatusChange::settle()).await }
        })
        .await;
        match marked {
            Ok(confirmed) => {
                *ticket = confirmed;
                stamp_audit_hash(self.tickets.as_ref(), ticket).await;
            }
            Err(e) => error!(%ticket_id, %event_id, error = %e, "seat sold but ticket left accepted"),
        }
    }

    async fn compensate(&self, event_id: Uuid, seats: u32) {
        let ledger = self.ledger.clone();
        let released = retry_transient(&self.retry, "release", || {
            let ledger = ledger.clone();
            async move { ledger.release(event_id, seats).await }
        })
        .await;

        match released {
            Ok(()) => info!(%event_id, seats, "reservation released after failed write"),
            Err(e) => error!(%event_id, seats, error = %e, "compensating release failed; capacity stranded"),
        }
    }

    async fn announce_reservation(&self, tickets: &[Ticket], invitee_count: usize) {
        let Some(first) = tickets.first() else { return };
        let reserved = TicketLifecycleEvent::TicketsReserved(TicketsReservedEvent {
            reservation_id: first.reservation_id,
            event_id: first.event_id,
            purchaser_id: first.purchaser_id,
            ticket_ids: tickets.iter().map(|t| t.id).collect(),
            invitee_count,
            timestamp: Utc::now().timestamp(),
        });
        publish_best_effort(self.publisher.as_ref(), &reserved).await;

        for ticket in tickets {
            if let (Some(email), Some(expires_at)) = (&ticket.invitee_email, ticket.expires_at) {
                let sent = TicketLifecycleEvent::InvitationSent(InvitationSentEvent {
                    ticket_id: ticket.id,
                    event_id: ticket.event_id,
                    invitee_email: Masked::new(email.expose().clone()),
                    expires_at: expires_at.timestamp(),
                });
                publish_best_effort(self.publisher.as_ref(), &sent).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryTicketStore;
    use gatehouse_core::publisher::TracingPublisher;
    use gatehouse_core::Role;

    struct NoEvents;

    #[async_trait::async_trait]
    impl EventRepository for NoEvents {
        async fn create(&self, event: &gatehouse_core::Event) -> CoreResult<Uuid> {
            Ok(event.id)
        }
        async fn get(&self, id: Uuid) -> CoreResult<gatehouse_core::Event> {
            Err(CoreError::NotFound(format!("event {}", id)))
        }
        async fn list(&self) -> CoreResult<Vec<gatehouse_core::Event>> {
            Ok(vec![])
        }
        async fn list_by_organizer(&self, _: Uuid) -> CoreResult<Vec<gatehouse_core::Event>> {
            Ok(vec![])
        }
        async fn update(&self, id: Uuid, _: &gatehouse_core::EventChanges) -> CoreResult<gatehouse_core::Event> {
            Err(CoreError::NotFound(format!("event {}", id)))
        }
        async fn delete(&self, id: Uuid) -> CoreResult<()> {
            Err(CoreError::NotFound(format!("event {}", id)))
        }
    }

    #[async_trait::async_trait]
    impl CapacityLedger for NoEvents {
        async fn reserve(&self, id: Uuid, _: u32) -> CoreResult<()> {
            Err(CoreError::NotFound(format!("event {}", id)))
        }
        async fn release(&self, id: Uuid, _: u32) -> CoreResult<()> {
            Err(CoreError::NotFound(format!("event {}", id)))
        }
        async fn confirm(&self, id: Uuid, _: u32) -> CoreResult<()> {
            Err(CoreError::NotFound(format!("event {}", id)))
        }
        async fn headroom(&self, id: Uuid) -> CoreResult<u32> {
            Err(CoreError::NotFound(format!("event {}", id)))
        }
    }

    fn coordinator() -> ReservationCoordinator {
        let backend = Arc::new(NoEvents);
        ReservationCoordinator::new(
            Arc::new(InMemoryTicketStore::new()),
            backend.clone(),
            backend,
            Arc::new(TracingPublisher),
            ReservationRules::default(),
        )
    }

    fn purchaser() -> Requester {
        Requester { user_id: Uuid::new_v4(), email: "buyer@example.com".to_string(), role: Role::Attendee }
    }

    fn emails(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_group_size_bounds() {
        let c = coordinator();
        let p = purchaser();

        assert!(c.validate_invitees(&p, &[]).is_err());
        assert_eq!(
            c.validate_invitees(&p, &emails(&["a@x.io", "b@x.io", "c@x.io", "d@x.io"])).unwrap().len(),
            4
        );
        assert!(matches!(
            c.validate_invitees(&p, &emails(&["a@x.io", "b@x.io", "c@x.io", "d@x.io", "e@x.io"])),
            Err(CoreError::Validation(_))
        ));
    }

    #[test]
    fn test_group_limit_is_clamped() {
        let wide = ReservationRules { max_group_size: 8, ..Default::default() }.clamped();
        assert_eq!(wide.max_group_size, MAX_GROUP_SIZE);

        let zero = ReservationRules { max_group_size: 0, ..Default::default() }.clamped();
        assert_eq!(zero.max_group_size, 1);

        assert_eq!(ReservationRules { max_group_size: 3, ..Default::default() }.clamped().max_group_size, 3);
    }

    #[test]
    fn test_invitee_emails_are_checked() {
        let c = coordinator();
        let p = purchaser();

        assert!(c.validate_invitees(&p, &emails(&[" "])).is_err());
        assert!(c.validate_invitees(&p, &emails(&["not-an-email"])).is_err());
        assert!(c.validate_invitees(&p, &emails(&["a@x.io", "A@X.io"])).is_err());
        assert!(c.validate_invitees(&p, &emails(&["Buyer@Example.com"])).is_err());
        assert_eq!(c.validate_invitees(&p, &emails(&[" Pal@X.io "])).unwrap(), vec!["pal@x.io"]);
    }

    #[tokio::test]
    async fn test_unknown_event_is_not_found() {
        let c = coordinator();
        let err = c.purchase_solo(&purchaser(), Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }
}
