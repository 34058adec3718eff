use std::sync::Arc;

use gatehouse_core::repository::EventRepository;
use gatehouse_core::{CoreError, CoreResult, Event, EventChanges, NewEvent, Requester, Role};
use tracing::info;
use uuid::Uuid;

/// Organizer-facing event management. Seat counts are never written here.
pub struct EventCatalog {
    events: Arc<dyn EventRepository>,
}

impl EventCatalog {
    pub fn new(events: Arc<dyn EventRepository>) -> Self {
        Self { events }
    }

    pub async fn create_event(&self, organizer: &Requester, draft: NewEvent) -> CoreResult<Event> {
        ensure_organizer(organizer)?;
        let event = Event::new(organizer.user_id, draft)?;
        self.events.create(&event).await?;
        info!(event_id = %event.id, organizer_id = %organizer.user_id, "event created");
        Ok(event)
    }

    pub async fn get_event(&self, id: Uuid) -> CoreResult<Event> {
        self.events.get(id).await
    }

    pub async fn list_events(&self) -> CoreResult<Vec<Event>> {
        self.events.list().await
    }

    pub async fn list_my_events(&self, organizer: &Requester) -> CoreResult<Vec<Event>> {
        ensure_organizer(organizer)?;
        self.events.list_by_organizer(organizer.user_id).await
    }

    pub async fn update_event(
        &self,
        organizer: &Requester,
        id: Uuid,
        changes: EventChanges,
    ) -> CoreResult<Event> {
        self.owned_event(organizer, id).await?;
        let event = self.events.update(id, &changes).await?;
        info!(event_id = %id, "event updated");
        Ok(event)
    }

    pub async fn delete_event(&self, organizer: &Requester, id: Uuid) -> CoreResult<()> {
        self.owned_event(organizer, id).await?;
        self.events.delete(id).await?;
        info!(event_id = %id, "event deleted");
        Ok(())
    }

    /// Fetch an event the caller organizes.
    pub async fn owned_event(&self, organizer: &Requester, id: Uuid) -> CoreResult<Event> {
        ensure_organizer(organizer)?;
        let event = self.events.get(id).await?;
        if event.organizer_id != organizer.user_id {
            return Err(CoreError::Forbidden("event belongs to another organizer".to_string()));
        }
        Ok(event)
    }
}

fn ensure_organizer(requester: &Requester) -> CoreResult<()> {
    if requester.role != Role::Organizer {
        return Err(CoreError::Forbidden("organizer account required".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryInventory;
    use chrono::{Duration, Utc};
    use gatehouse_core::repository::CapacityLedger;

    fn organizer() -> Requester {
        Requester { user_id: Uuid::new_v4(), email: "host@example.com".to_string(), role: Role::Organizer }
    }

    fn draft() -> NewEvent {
        NewEvent {
            name: "Rooftop Jazz".to_string(),
            description: "Late set".to_string(),
            date: Utc::now() + Duration::days(14),
            location: "Level 9".to_string(),
            capacity: 50,
            ticket_price: 800.0,
        }
    }

    #[tokio::test]
    async fn test_only_organizers_create_events() {
        let catalog = EventCatalog::new(Arc::new(InMemoryInventory::new()));
        let attendee = Requester { role: Role::Attendee, ..organizer() };

        assert!(matches!(catalog.create_event(&attendee, draft()).await, Err(CoreError::Forbidden(_))));
        let event = catalog.create_event(&organizer(), draft()).await.unwrap();
        assert_eq!(event.tickets_sold, 0);
    }

    #[tokio::test]
    async fn test_only_owner_edits_or_deletes() {
        let catalog = EventCatalog::new(Arc::new(InMemoryInventory::new()));
        let owner = organizer();
        let rival = organizer();
        let event = catalog.create_event(&owner, draft()).await.unwrap();

        let rename = EventChanges { name: Some("Rooftop Blues".to_string()), ..Default::default() };
        assert!(matches!(
            catalog.update_event(&rival, event.id, rename.clone()).await,
            Err(CoreError::Forbidden(_))
        ));
        assert!(matches!(catalog.delete_event(&rival, event.id).await, Err(CoreError::Forbidden(_))));

        let updated = catalog.update_event(&owner, event.id, rename).await.unwrap();
        assert_eq!(updated.name, "Rooftop Blues");

        catalog.delete_event(&owner, event.id).await.unwrap();
        assert!(matches!(catalog.get_event(event.id).await, Err(CoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_sold_event_cannot_be_deleted_or_repriced() {
        let inventory = Arc::new(InMemoryInventory::new());
        let catalog = EventCatalog::new(inventory.clone());
        let owner = organizer();
        let event = catalog.create_event(&owner, draft()).await.unwrap();

        inventory.reserve(event.id, 1).await.unwrap();
        inventory.confirm(event.id, 1).await.unwrap();

        assert!(matches!(catalog.delete_event(&owner, event.id).await, Err(CoreError::Conflict(_))));
        let reprice = EventChanges { ticket_price: Some(900.0), ..Default::default() };
        assert!(matches!(
            catalog.update_event(&owner, event.id, reprice).await,
            Err(CoreError::Conflict(_))
        ));

        let mine = catalog.list_my_events(&owner).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].tickets_sold, 1);
    }
}
