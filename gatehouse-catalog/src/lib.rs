pub mod catalog;
pub mod inventory;

pub use catalog::EventCatalog;
pub use inventory::InMemoryInventory;
