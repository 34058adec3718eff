use uuid::Uuid;
use crate::pii::Masked;

/// Messages emitted on the `tickets.lifecycle` topic.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketLifecycleEvent {
    TicketsReserved(TicketsReservedEvent),
    InvitationSent(InvitationSentEvent),
    InvitationResolved(InvitationResolvedEvent),
    TicketCheckedIn(TicketCheckedInEvent),
}

impl TicketLifecycleEvent {
    /// Partition key; every message for one event lands on the same partition.
    pub fn event_id(&self) -> Uuid {
        match self {
            Self::TicketsReserved(e) => e.event_id,
            Self::InvitationSent(e) => e.event_id,
            Self::InvitationResolved(e) => e.event_id,
            Self::TicketCheckedIn(e) => e.event_id,
        }
    }
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct TicketsReservedEvent {
    pub reservation_id: Uuid,
    pub event_id: Uuid,
    pub purchaser_id: Uuid,
    pub ticket_ids: Vec<Uuid>,
    pub invitee_count: usize,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct InvitationSentEvent {
    pub ticket_id: Uuid,
    pub event_id: Uuid,
    pub invitee_email: Masked<String>,
    pub expires_at: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct InvitationResolvedEvent {
    pub ticket_id: Uuid,
    pub event_id: Uuid,
    /// Final status name, e.g. `confirmed`, `declined`, `expired`.
    pub outcome: String,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct TicketCheckedInEvent {
    pub ticket_id: Uuid,
    pub event_id: Uuid,
    pub holder_id: Option<Uuid>,
    pub timestamp: i64,
}
