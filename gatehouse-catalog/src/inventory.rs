use std::collections::HashMap;

use async_trait::async_trait;
use gatehouse_core::repository::{CapacityLedger, EventRepository};
use gatehouse_core::{CoreError, CoreResult, Event, EventChanges};
use tokio::sync::Mutex;
use uuid::Uuid;

/// Hold `count` seats, failing when headroom is short.
pub fn reserve_seats(event: &mut Event, count: u32) -> CoreResult<()> {
    let available = event.headroom();
    if available < count {
        return Err(CoreError::CapacityExceeded { requested: count, available });
    }
    event.tickets_reserved += count;
    Ok(())
}

/// Return held seats to the pool.
pub fn release_seats(event: &mut Event, count: u32) -> CoreResult<()> {
    if event.tickets_reserved < count {
        return Err(CoreError::Storage(format!(
            "release of {} seats exceeds the {} reserved on event {}",
            count, event.tickets_reserved, event.id
        )));
    }
    event.tickets_reserved -= count;
    Ok(())
}

/// Move held seats to sold.
pub fn confirm_seats(event: &mut Event, count: u32) -> CoreResult<()> {
    if event.tickets_reserved < count {
        return Err(CoreError::Storage(format!(
            "confirm of {} seats exceeds the {} reserved on event {}",
            count, event.tickets_reserved, event.id
        )));
    }
    event.tickets_reserved -= count;
    event.tickets_sold += count;
    Ok(())
}

/// In-memory events table. One lock guards every event so catalog edits and
/// ledger moves on the same row are serialized.
#[derive(Default)]
pub struct InMemoryInventory {
    events: Mutex<HashMap<Uuid, Event>>,
}

impl InMemoryInventory {
    pub fn new() -> Self {
        Self::default()
    }

    async fn with_event<T>(
        &self,
        event_id: Uuid,
        f: impl FnOnce(&mut Event) -> CoreResult<T>,
    ) -> CoreResult<T> {
        let mut events = self.events.lock().await;
        let event = events
            .get_mut(&event_id)
            .ok_or_else(|| CoreError::NotFound(format!("event {}", event_id)))?;
        f(event)
    }
}

#[async_trait]
impl CapacityLedger for InMemoryInventory {
    async fn reserve(&self, event_id: Uuid, count: u32) -> CoreResult<()> {
        self.with_event(event_id, |event| reserve_seats(event, count)).await
    }

    async fn release(&self, event_id: Uuid, count: u32) -> CoreResult<()> {
        self.with_event(event_id, |event| release_seats(event, count)).await
    }

    async fn confirm(&self, event_id: Uuid, count: u32) -> CoreResult<()> {
        self.with_event(event_id, |event| confirm_seats(event, count)).await
    }

    async fn headroom(&self, event_id: Uuid) -> CoreResult<u32> {
        self.with_event(event_id, |event| Ok(event.headroom())).await
    }
}

#[async_trait]
impl EventRepository for InMemoryInventory {
    async fn create(&self, event: &Event) -> CoreResult<Uuid> {
        self.events.lock().await.insert(event.id, event.clone());
        Ok(event.id)
    }

    async fn get(&self, id: Uuid) -> CoreResult<Event> {
        self.with_event(id, |event| Ok(event.clone())).await
    }

    async fn list(&self) -> CoreResult<Vec<Event>> {
        let mut events: Vec<Event> = self.events.lock().await.values().cloned().collect();
        events.sort_by_key(|e| e.date);
        Ok(events)
    }

    async fn list_by_organizer(&self, organizer_id: Uuid) -> CoreResult<Vec<Event>> {
        let mut events: Vec<Event> = self
            .events
            .lock()
            .await
            .values()
            .filter(|e| e.organizer_id == organizer_id)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.date);
        Ok(events)
    }

    async fn update(&self, id: Uuid, changes: &EventChanges) -> CoreResult<Event> {
        self.with_event(id, |event| {
            event.apply_changes(changes)?;
            Ok(event.clone())
        })
        .await
    }

    async fn delete(&self, id: Uuid) -> CoreResult<()> {
        let mut events = self.events.lock().await;
        let event = events
            .get(&id)
            .ok_or_else(|| CoreError::NotFound(format!("event {}", id)))?;
        event.ensure_deletable()?;
        events.remove(&id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use gatehouse_core::NewEvent;
    use std::sync::Arc;

    fn event(capacity: u32) -> Event {
        Event::new(
            Uuid::new_v4(),
            NewEvent {
                name: "Night Market".to_string(),
                description: String::new(),
                date: Utc::now() + Duration::days(3),
                location: "Old Town".to_string(),
                capacity,
                ticket_price: 150.0,
            },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_reserve_confirm_release_lifecycle() {
        let inventory = InMemoryInventory::new();
        let e = event(10);
        inventory.create(&e).await.unwrap();

        inventory.reserve(e.id, 3).await.unwrap();
        assert_eq!(inventory.headroom(e.id).await.unwrap(), 7);

        inventory.confirm(e.id, 1).await.unwrap();
        inventory.release(e.id, 1).await.unwrap();

        let stored = EventRepository::get(&inventory, e.id).await.unwrap();
        assert_eq!(stored.tickets_sold, 1);
        assert_eq!(stored.tickets_reserved, 1);
        assert_eq!(inventory.headroom(e.id).await.unwrap(), 8);
    }

    #[tokio::test]
    async fn test_reserve_is_all_or_nothing() {
        let inventory = InMemoryInventory::new();
        let e = event(2);
        inventory.create(&e).await.unwrap();

        let err = inventory.reserve(e.id, 3).await.unwrap_err();
        assert!(matches!(err, CoreError::CapacityExceeded { requested: 3, available: 2 }));
        assert_eq!(inventory.headroom(e.id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_unknown_event() {
        let inventory = InMemoryInventory::new();
        assert!(matches!(inventory.reserve(Uuid::new_v4(), 1).await, Err(CoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_over_release_is_rejected() {
        let inventory = InMemoryInventory::new();
        let e = event(5);
        inventory.create(&e).await.unwrap();
        inventory.reserve(e.id, 1).await.unwrap();

        assert!(inventory.release(e.id, 2).await.is_err());
        assert!(inventory.confirm(e.id, 2).await.is_err());
        assert_eq!(inventory.headroom(e.id).await.unwrap(), 4);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_reserves_never_oversell() {
        let inventory = Arc::new(InMemoryInventory::new());
        let e = event(7);
        inventory.create(&e).await.unwrap();
        let event_id = e.id;

        let mut handles = Vec::new();
        for _ in 0..20 {
            let inventory = inventory.clone();
            handles.push(tokio::spawn(async move { inventory.reserve(event_id, 2).await.is_ok() }));
        }

        let mut granted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                granted += 1;
            }
        }

        assert_eq!(granted, 3);
        assert_eq!(inventory.headroom(e.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_rejected_update_leaves_event_unchanged() {
        let inventory = InMemoryInventory::new();
        let e = event(5);
        inventory.create(&e).await.unwrap();
        inventory.reserve(e.id, 1).await.unwrap();
        inventory.confirm(e.id, 1).await.unwrap();

        let changes = EventChanges {
            name: Some("Renamed".to_string()),
            ticket_price: Some(1.0),
            ..Default::default()
        };
        assert!(inventory.update(e.id, &changes).await.is_err());

        let stored = EventRepository::get(&inventory, e.id).await.unwrap();
        assert_eq!(stored.name, "Night Market");
        assert!(inventory.delete(e.id).await.is_err());
    }
}
