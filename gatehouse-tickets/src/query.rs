use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use gatehouse_core::repository::{EventRepository, TicketFilter, TicketRepository, UserRepository};
use gatehouse_core::{
    AuditEntry, CoreError, CoreResult, Event, EventSummary, Requester, Ticket, TicketScope, TicketStatus,
};
use gatehouse_shared::Masked;
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::lifecycle::InvitationEngine;

/// A ticket as listed to its owner, with the event it admits to.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketView {
    #[serde(flatten)]
    pub ticket: Ticket,
    pub event: Option<EventSummary>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendeeRecord {
    pub ticket_id: Uuid,
    pub name: Option<String>,
    pub email: Option<Masked<String>>,
    pub status: TicketStatus,
    pub purchase_date: DateTime<Utc>,
    pub tx_hash: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventAnalytics {
    pub event_id: Uuid,
    pub tickets_sold: u32,
    pub tickets_reserved: u32,
    pub capacity: u32,
    pub total_revenue: f64,
    pub attendees: Vec<AttendeeRecord>,
}

/// Read side: ticket listings, audit trails and organizer analytics.
pub struct TicketQuery {
    tickets: Arc<dyn TicketRepository>,
    events: Arc<dyn EventRepository>,
    users: Arc<dyn UserRepository>,
    engine: Arc<InvitationEngine>,
}

impl TicketQuery {
    pub fn new(
        tickets: Arc<dyn TicketRepository>,
        events: Arc<dyn EventRepository>,
        users: Arc<dyn UserRepository>,
        engine: Arc<InvitationEngine>,
    ) -> Self {
        Self { tickets, events, users, engine }
    }

    /// Tickets the caller purchased, holds, or was invited to, narrowed by scope.
    ///
    /// Overdue invitations found along the way are expired first, so the
    /// listing never shows a pending ticket whose deadline has passed.
    pub async fn list_my_tickets(
        &self,
        requester: &Requester,
        scope: TicketScope,
        now: DateTime<Utc>,
    ) -> CoreResult<Vec<TicketView>> {
        let mut tickets = self
            .tickets
            .list_by_holder_or_purchaser(requester.user_id, &requester.email, &TicketFilter::default())
            .await?;

        for ticket in tickets.iter_mut().filter(|t| t.is_overdue(now)) {
            match self.engine.expire(ticket.id, now).await {
                Ok(Some(expired)) => *ticket = expired,
                Ok(None) => *ticket = self.tickets.get(ticket.id).await?,
                Err(e) => warn!(ticket_id = %ticket.id, error = %e, "lazy expiry failed"),
            }
        }

        let mut events: HashMap<Uuid, Option<Event>> = HashMap::new();
        let mut views = Vec::with_capacity(tickets.len());
        for ticket in tickets {
            if !events.contains_key(&ticket.event_id) {
                let event = match self.events.get(ticket.event_id).await {
                    Ok(event) => Some(event),
                    Err(CoreError::NotFound(_)) => None,
                    Err(e) => return Err(e),
                };
                events.insert(ticket.event_id, event);
            }
            let event = events.get(&ticket.event_id).and_then(Option::as_ref);

            // A ticket whose event is gone can't be dated; only the unscoped view lists it.
            let in_scope = match event {
                Some(event) => scope.includes(ticket.status, event.date, now),
                None => scope == TicketScope::All,
            };
            if in_scope {
                views.push(TicketView { event: event.map(Event::summary), ticket });
            }
        }

        debug!(user_id = %requester.user_id, ?scope, count = views.len(), "listed tickets");
        Ok(views)
    }

    /// Status history of one ticket; visible to its purchaser, holder, invitee
    /// and the event organizer.
    pub async fn audit_trail(&self, ticket_id: Uuid, requester: &Requester) -> CoreResult<Vec<AuditEntry>> {
        let ticket = self.tickets.get(ticket_id).await?;
        if !ticket.involves(requester.user_id, &requester.email) {
            let event = self.events.get(ticket.event_id).await?;
            if event.organizer_id != requester.user_id {
                return Err(CoreError::Forbidden("not your ticket".to_string()));
            }
        }
        self.tickets.audit_trail(ticket_id).await
    }

    pub async fn event_analytics(&self, organizer: &Requester, event_id: Uuid) -> CoreResult<EventAnalytics> {
        let event = self.events.get(event_id).await?;
        if event.organizer_id != organizer.user_id {
            return Err(CoreError::Forbidden("event belongs to another organizer".to_string()));
        }

        let tickets = self.tickets.list_by_event(event_id).await?;
        let mut attendees = Vec::with_capacity(tickets.len());
        for ticket in tickets {
            let user = match ticket.holder_id {
                Some(holder) => match self.users.get(holder).await {
                    Ok(user) => Some(user),
                    Err(CoreError::NotFound(_)) => None,
                    Err(e) => return Err(e),
                },
                None => None,
            };
            let email = match &user {
                Some(user) => Some(user.email.clone()),
                None => ticket.invitee_email.clone(),
            };
            attendees.push(AttendeeRecord {
                ticket_id: ticket.id,
                name: user.map(|u| u.name),
                email,
                status: ticket.status,
                purchase_date: ticket.created_at,
                tx_hash: ticket.tx_hash,
            });
        }

        Ok(EventAnalytics {
            event_id,
            tickets_sold: event.tickets_sold,
            tickets_reserved: event.tickets_reserved,
            capacity: event.capacity,
            total_revenue: event.revenue(),
            attendees,
        })
    }
}
