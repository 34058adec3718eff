pub mod event;
pub mod ticket;
pub mod user;
pub mod repository;
pub mod publisher;

pub use event::{Event, EventChanges, EventSummary, NewEvent};
pub use ticket::{Actor, AuditEntry, Ticket, TicketScope, TicketStatus, MAX_GROUP_SIZE};
pub use user::{Requester, Role, User};

use ticket::TicketStatus as Status;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Capacity exceeded: requested {requested}, available {available}")]
    CapacityExceeded { requested: u32, available: u32 },

    #[error("Sold out: requested {requested}, available {available}")]
    SoldOut { requested: u32, available: u32 },

    #[error("State conflict: expected {expected}, found {actual}")]
    StateConflict { expected: Status, actual: Status },

    #[error("Invitation already resolved: {status}")]
    AlreadyResolved { status: Status },

    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: Status, to: Status },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl CoreError {
    /// Transient backend failures; the only kind worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, CoreError::Storage(_))
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
