use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use gatehouse_shared::Masked;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{CoreError, CoreResult};

/// Tickets per reservation, purchaser included.
pub const MAX_GROUP_SIZE: usize = 5;

/// Ticket status in the invitation lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    PendingAcceptance,
    Accepted,
    Confirmed,
    Used,
    Declined,
    Expired,
}

impl TicketStatus {
    pub const ALL: [TicketStatus; 6] = [
        TicketStatus::PendingAcceptance,
        TicketStatus::Accepted,
        TicketStatus::Confirmed,
        TicketStatus::Used,
        TicketStatus::Declined,
        TicketStatus::Expired,
    ];

    /// The transition table. Anything not listed here is rejected.
    pub fn can_transition_to(self, next: TicketStatus) -> bool {
        use TicketStatus::*;
        match (self, next) {
            (PendingAcceptance, Accepted) => true,
            (PendingAcceptance, Declined) => true,
            (PendingAcceptance, Expired) => true,
            (Accepted, Confirmed) => true,
            (Confirmed, Used) => true,
            (PendingAcceptance, _)
            | (Accepted, _)
            | (Confirmed, _)
            | (Used, _)
            | (Declined, _)
            | (Expired, _) => false,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TicketStatus::Used | TicketStatus::Declined | TicketStatus::Expired)
    }

    /// Statuses that hold a seat permanently.
    pub fn counts_against_capacity(self) -> bool {
        matches!(self, TicketStatus::Accepted | TicketStatus::Confirmed | TicketStatus::Used)
    }

    /// Statuses that file a ticket under "past" regardless of the event date.
    pub fn is_closed(self) -> bool {
        matches!(self, TicketStatus::Used | TicketStatus::Declined | TicketStatus::Expired)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TicketStatus::PendingAcceptance => "pending_acceptance",
            TicketStatus::Accepted => "accepted",
            TicketStatus::Confirmed => "confirmed",
            TicketStatus::Used => "used",
            TicketStatus::Declined => "declined",
            TicketStatus::Expired => "expired",
        }
    }

    pub fn ensure_transition(self, next: TicketStatus) -> CoreResult<()> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(CoreError::InvalidTransition { from: self, to: next })
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TicketStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| CoreError::Storage(format!("unknown ticket status '{}'", s)))
    }
}

/// Who caused a status change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    User(Uuid),
    System,
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Actor::User(id) => write!(f, "user:{}", id),
            Actor::System => f.write_str("system"),
        }
    }
}

impl Serialize for Actor {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl FromStr for Actor {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "system" {
            return Ok(Actor::System);
        }
        s.strip_prefix("user:")
            .and_then(|id| Uuid::parse_str(id).ok())
            .map(Actor::User)
            .ok_or_else(|| CoreError::Storage(format!("unknown actor '{}'", s)))
    }
}

/// One row of the append-only audit trail. `from` is empty for the creation entry.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub ticket_id: Uuid,
    pub from: Option<TicketStatus>,
    pub to: TicketStatus,
    pub actor: Actor,
    pub at: DateTime<Utc>,
}

/// The unit of capacity consumption. Never deleted; expiry is a status.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: Uuid,
    pub event_id: Uuid,
    /// Shared by every ticket created from one purchase call.
    pub reservation_id: Uuid,
    pub purchaser_id: Uuid,
    pub holder_id: Option<Uuid>,
    pub invitee_email: Option<Masked<String>>,
    pub status: TicketStatus,
    pub tx_hash: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Ticket {
    /// A ticket held by its purchaser from the start. It enters as `accepted`
    /// on a reserved seat and becomes `confirmed` once the ledger counts the
    /// seat as sold.
    pub fn purchased(event_id: Uuid, reservation_id: Uuid, purchaser_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            event_id,
            reservation_id,
            purchaser_id,
            holder_id: Some(purchaser_id),
            invitee_email: None,
            status: TicketStatus::Accepted,
            tx_hash: None,
            expires_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// An invitation earmarked for an email, waiting for accept/decline.
    pub fn invitation(
        event_id: Uuid,
        reservation_id: Uuid,
        purchaser_id: Uuid,
        invitee_email: String,
        expires_at: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            event_id,
            reservation_id,
            purchaser_id,
            holder_id: None,
            invitee_email: Some(Masked::new(invitee_email)),
            status: TicketStatus::PendingAcceptance,
            tx_hash: None,
            expires_at: Some(expires_at),
            created_at: now,
            updated_at: now,
        }
    }

    /// Pending and past its acceptance deadline.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == TicketStatus::PendingAcceptance
            && self.expires_at.map_or(false, |deadline| deadline <= now)
    }

    pub fn is_invited(&self, email: &str) -> bool {
        self.invitee_email
            .as_ref()
            .map_or(false, |invited| invited.expose().eq_ignore_ascii_case(email.trim()))
    }

    pub fn involves(&self, user_id: Uuid, email: &str) -> bool {
        self.purchaser_id == user_id || self.holder_id == Some(user_id) || self.is_invited(email)
    }
}

/// Digest recorded in `tx_hash` when a ticket is confirmed.
pub fn audit_hash(ticket: &Ticket, confirmed_at: DateTime<Utc>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(ticket.id.as_bytes());
    hasher.update(ticket.event_id.as_bytes());
    if let Some(holder) = ticket.holder_id {
        hasher.update(holder.as_bytes());
    }
    hasher.update(confirmed_at.timestamp_micros().to_be_bytes());
    format!("{:x}", hasher.finalize())
}

/// `?status=` scope of the ticket listing
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TicketScope {
    #[default]
    All,
    Upcoming,
    Past,
}

impl TicketScope {
    /// Date and status both classify a ticket, so a pending invitation for a past
    /// event is listed under both `upcoming` and `past`.
    pub fn includes(self, status: TicketStatus, event_date: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match self {
            TicketScope::All => true,
            TicketScope::Upcoming => {
                status == TicketStatus::PendingAcceptance || (event_date >= now && !status.is_closed())
            }
            TicketScope::Past => event_date < now || status.is_closed(),
        }
    }
}
