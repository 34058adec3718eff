pub mod store;
pub mod retry;
pub mod coordinator;
pub mod lifecycle;
pub mod expiry;
pub mod query;

pub use store::InMemoryTicketStore;
pub use retry::RetryPolicy;
pub use coordinator::{ReservationCoordinator, ReservationRules};
pub use lifecycle::InvitationEngine;
pub use expiry::{ExpirySweep, SweepReport};
pub use query::{AttendeeRecord, EventAnalytics, TicketQuery, TicketView};
