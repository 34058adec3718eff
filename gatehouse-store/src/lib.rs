pub mod app_config;
pub mod database;
pub mod event_repo;
pub mod redis_repo;
pub mod ticket_repo;
pub mod user_repo;
#[cfg(feature = "kafka")]
pub mod events;

pub use app_config::{BusinessRules, Config};
pub use database::DbClient;
pub use event_repo::StoreEventRepository;
pub use redis_repo::RedisClient;
pub use ticket_repo::StoreTicketRepository;
pub use user_repo::StoreUserRepository;
#[cfg(feature = "kafka")]
pub use events::EventProducer;
