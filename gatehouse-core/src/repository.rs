use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::event::{Event, EventChanges};
use crate::ticket::{Actor, AuditEntry, Ticket, TicketStatus};
use crate::user::User;
use crate::CoreResult;

/// Optional narrowing applied by the ticket store when listing.
#[derive(Debug, Clone, Default)]
pub struct TicketFilter {
    pub event_id: Option<Uuid>,
    pub statuses: Option<Vec<TicketStatus>>,
}

impl TicketFilter {
    pub fn matches(&self, ticket: &Ticket) -> bool {
        self.event_id.map_or(true, |id| ticket.event_id == id)
            && self
                .statuses
                .as_ref()
                .map_or(true, |statuses| statuses.contains(&ticket.status))
    }
}

/// A conditional status change: applied only while the stored status equals `from`.
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub from: TicketStatus,
    pub to: TicketStatus,
    pub actor: Actor,
    /// Set on transitions that hand the ticket to its holder.
    pub holder_id: Option<Uuid>,
}

impl StatusChange {
    /// `accepted -> confirmed`, made by the system once the seat is sold.
    pub fn settle() -> Self {
        Self {
            from: TicketStatus::Accepted,
            to: TicketStatus::Confirmed,
            actor: Actor::System,
            holder_id: None,
        }
    }
}

/// Durable ticket and invitation records
#[async_trait]
pub trait TicketRepository: Send + Sync {
    async fn create(&self, ticket: &Ticket) -> CoreResult<Uuid>;

    /// All-or-nothing insert of one reservation's tickets.
    async fn create_many(&self, tickets: &[Ticket]) -> CoreResult<Vec<Uuid>>;

    async fn get(&self, id: Uuid) -> CoreResult<Ticket>;

    /// Tickets the user holds, purchased, or was invited to by email.
    async fn list_by_holder_or_purchaser(
        &self,
        user_id: Uuid,
        email: &str,
        filter: &TicketFilter,
    ) -> CoreResult<Vec<Ticket>>;

    async fn list_by_event(&self, event_id: Uuid) -> CoreResult<Vec<Ticket>>;

    /// Pending invitations whose deadline is at or before `now`.
    async fn list_overdue(&self, now: DateTime<Utc>) -> CoreResult<Vec<Ticket>>;

    /// Accepted tickets last changed at or before `before`, i.e. whose seat
    /// confirmation was left unfinished.
    async fn list_unsettled(&self, before: DateTime<Utc>) -> CoreResult<Vec<Ticket>>;

    /// Compare-and-swap on status. Fails with `StateConflict` when the stored
    /// status is not `change.from`; appends an audit entry on success.
    async fn update_status(&self, id: Uuid, change: StatusChange) -> CoreResult<Ticket>;

    /// Append-only: fails with `Conflict` if a hash is already recorded.
    async fn set_tx_hash(&self, id: Uuid, hash: &str) -> CoreResult<()>;

    async fn audit_trail(&self, id: Uuid) -> CoreResult<Vec<AuditEntry>>;
}

/// Sold-vs-capacity accounting per event; the only writer of
/// `tickets_sold`/`tickets_reserved`.
#[async_trait]
pub trait CapacityLedger: Send + Sync {
    /// Atomically hold `count` seats or fail with `CapacityExceeded`.
    async fn reserve(&self, event_id: Uuid, count: u32) -> CoreResult<()>;

    /// Give back `count` provisionally held seats.
    async fn release(&self, event_id: Uuid, count: u32) -> CoreResult<()>;

    /// Move `count` provisionally held seats to the sold count.
    async fn confirm(&self, event_id: Uuid, count: u32) -> CoreResult<()>;

    async fn headroom(&self, event_id: Uuid) -> CoreResult<u32>;
}

#[async_trait]
pub trait EventRepository: Send + Sync {
    async fn create(&self, event: &Event) -> CoreResult<Uuid>;

    async fn get(&self, id: Uuid) -> CoreResult<Event>;

    async fn list(&self) -> CoreResult<Vec<Event>>;

    async fn list_by_organizer(&self, organizer_id: Uuid) -> CoreResult<Vec<Event>>;

    /// Applies `Event::apply_changes` atomically against the stored row.
    async fn update(&self, id: Uuid, changes: &EventChanges) -> CoreResult<Event>;

    /// Deletes only while `Event::ensure_deletable` holds.
    async fn delete(&self, id: Uuid) -> CoreResult<()>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, user: &User) -> CoreResult<Uuid>;

    async fn get(&self, id: Uuid) -> CoreResult<User>;

    async fn find_by_email(&self, email: &str) -> CoreResult<Option<User>>;
}
