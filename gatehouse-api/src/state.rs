use std::sync::Arc;

use gatehouse_catalog::{EventCatalog, InMemoryInventory};
use gatehouse_core::publisher::{TicketEventPublisher, TracingPublisher};
use gatehouse_core::repository::{CapacityLedger, EventRepository, TicketRepository, UserRepository};
use gatehouse_core::user::InMemoryUserRepository;
use gatehouse_store::{
    BusinessRules, DbClient, RedisClient, StoreEventRepository, StoreTicketRepository, StoreUserRepository,
};
use gatehouse_tickets::{
    ExpirySweep, InMemoryTicketStore, InvitationEngine, ReservationCoordinator, ReservationRules, TicketQuery,
};

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
    pub expiration: u64,
}

/// Storage seams the services are wired over.
#[derive(Clone)]
pub struct Backends {
    pub tickets: Arc<dyn TicketRepository>,
    pub events: Arc<dyn EventRepository>,
    pub ledger: Arc<dyn CapacityLedger>,
    pub users: Arc<dyn UserRepository>,
}

impl Backends {
    pub fn in_memory() -> Self {
        let inventory = Arc::new(InMemoryInventory::new());
        Self {
            tickets: Arc::new(InMemoryTicketStore::new()),
            events: inventory.clone(),
            ledger: inventory,
            users: Arc::new(InMemoryUserRepository::new()),
        }
    }

    pub fn postgres(db: &DbClient) -> Self {
        let events = Arc::new(StoreEventRepository::new(db.pool.clone()));
        Self {
            tickets: Arc::new(StoreTicketRepository::new(db.pool.clone())),
            events: events.clone(),
            ledger: events,
            users: Arc::new(StoreUserRepository::new(db.pool.clone())),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn UserRepository>,
    pub catalog: Arc<EventCatalog>,
    pub reservations: Arc<ReservationCoordinator>,
    pub invitations: Arc<InvitationEngine>,
    pub queries: Arc<TicketQuery>,
    pub sweep: Arc<ExpirySweep>,
    pub redis: Option<Arc<RedisClient>>,
    pub auth: AuthConfig,
    pub business_rules: BusinessRules,
}

impl AppState {
    pub fn new(
        backends: Backends,
        publisher: Arc<dyn TicketEventPublisher>,
        redis: Option<Arc<RedisClient>>,
        auth: AuthConfig,
        business_rules: BusinessRules,
    ) -> Self {
        let rules = ReservationRules {
            invitation_window: chrono::Duration::seconds(business_rules.invitation_window_seconds as i64),
            max_group_size: business_rules.max_group_size,
        };

        let invitations = Arc::new(InvitationEngine::new(
            backends.tickets.clone(),
            backends.events.clone(),
            backends.ledger.clone(),
            publisher.clone(),
        ));
        let reservations = Arc::new(ReservationCoordinator::new(
            backends.tickets.clone(),
            backends.events.clone(),
            backends.ledger.clone(),
            publisher,
            rules,
        ));
        let queries = Arc::new(TicketQuery::new(
            backends.tickets.clone(),
            backends.events.clone(),
            backends.users.clone(),
            invitations.clone(),
        ));
        let sweep = Arc::new(ExpirySweep::new(backends.tickets.clone(), invitations.clone()));

        Self {
            users: backends.users,
            catalog: Arc::new(EventCatalog::new(backends.events)),
            reservations,
            invitations,
            queries,
            sweep,
            redis,
            auth,
            business_rules,
        }
    }

    /// Everything in process memory, no rate limiting; for tests and local runs.
    pub fn in_memory(auth: AuthConfig, business_rules: BusinessRules) -> Self {
        Self::new(Backends::in_memory(), Arc::new(TracingPublisher), None, auth, business_rules)
    }
}
