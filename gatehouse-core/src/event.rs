use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{CoreError, CoreResult};

/// An organizer-owned event with its seat accounting.
///
/// `tickets_sold` and `tickets_reserved` are written only by the capacity
/// ledger; catalog updates never touch them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: Uuid,
    pub organizer_id: Uuid,
    pub name: String,
    pub description: String,
    pub date: DateTime<Utc>,
    pub location: String,
    pub capacity: u32,
    pub ticket_price: f64,
    pub tickets_sold: u32,
    pub tickets_reserved: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Event {
    pub fn new(organizer_id: Uuid, draft: NewEvent) -> CoreResult<Self> {
        draft.validate()?;
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            organizer_id,
            name: draft.name.trim().to_string(),
            description: draft.description,
            date: draft.date,
            location: draft.location.trim().to_string(),
            capacity: draft.capacity,
            ticket_price: draft.ticket_price,
            tickets_sold: 0,
            tickets_reserved: 0,
            created_at: now,
            updated_at: now,
        })
    }

    /// Capacity minus everything reserved or sold.
    pub fn headroom(&self) -> u32 {
        self.capacity
            .saturating_sub(self.tickets_sold)
            .saturating_sub(self.tickets_reserved)
    }

    pub fn is_past(&self, now: DateTime<Utc>) -> bool {
        self.date < now
    }

    pub fn revenue(&self) -> f64 {
        self.tickets_sold as f64 * self.ticket_price
    }

    /// Apply an organizer edit. Price locks once anything has sold and capacity
    /// never drops below the seats already held.
    pub fn apply_changes(&mut self, changes: &EventChanges) -> CoreResult<()> {
        if let Some(price) = changes.ticket_price {
            validate_price(price)?;
            if self.tickets_sold > 0 && price != self.ticket_price {
                return Err(CoreError::Conflict(
                    "ticket price cannot change after tickets have sold".to_string(),
                ));
            }
        }
        if let Some(capacity) = changes.capacity {
            validate_capacity(capacity)?;
            let held = self.tickets_sold + self.tickets_reserved;
            if capacity < held {
                return Err(CoreError::Validation(format!(
                    "capacity {} is below the {} seats already held",
                    capacity, held
                )));
            }
        }
        if let Some(name) = &changes.name {
            require_text("name", name)?;
        }
        if let Some(location) = &changes.location {
            require_text("location", location)?;
        }

        if let Some(name) = &changes.name {
            self.name = name.trim().to_string();
        }
        if let Some(description) = &changes.description {
            self.description = description.clone();
        }
        if let Some(date) = changes.date {
            self.date = date;
        }
        if let Some(location) = &changes.location {
            self.location = location.trim().to_string();
        }
        if let Some(capacity) = changes.capacity {
            self.capacity = capacity;
        }
        if let Some(price) = changes.ticket_price {
            self.ticket_price = price;
        }
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn ensure_deletable(&self) -> CoreResult<()> {
        if self.tickets_sold > 0 {
            return Err(CoreError::Conflict(
                "an event that has sold tickets cannot be deleted".to_string(),
            ));
        }
        if self.tickets_reserved > 0 {
            return Err(CoreError::Conflict(
                "an event with open invitations cannot be deleted".to_string(),
            ));
        }
        Ok(())
    }

    pub fn summary(&self) -> EventSummary {
        EventSummary {
            id: self.id,
            name: self.name.clone(),
            date: self.date,
            location: self.location.clone(),
            ticket_price: self.ticket_price,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEvent {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub date: DateTime<Utc>,
    pub location: String,
    pub capacity: u32,
    pub ticket_price: f64,
}

impl NewEvent {
    pub fn validate(&self) -> CoreResult<()> {
        require_text("name", &self.name)?;
        require_text("location", &self.location)?;
        validate_capacity(self.capacity)?;
        validate_price(self.ticket_price)
    }
}

/// Partial update; absent fields keep their value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub location: Option<String>,
    pub capacity: Option<u32>,
    pub ticket_price: Option<f64>,
}

/// Event fields embedded in ticket listings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSummary {
    pub id: Uuid,
    pub name: String,
    pub date: DateTime<Utc>,
    pub location: String,
    pub ticket_price: f64,
}

fn require_text(field: &str, value: &str) -> CoreResult<()> {
    if value.trim().is_empty() {
        return Err(CoreError::Validation(format!("{} must not be empty", field)));
    }
    Ok(())
}

/// Seat counts are stored as Postgres `INTEGER`.
pub const MAX_CAPACITY: u32 = i32::MAX as u32;

fn validate_capacity(capacity: u32) -> CoreResult<()> {
    if capacity > MAX_CAPACITY {
        return Err(CoreError::Validation(format!("capacity must be at most {}", MAX_CAPACITY)));
    }
    Ok(())
}

fn validate_price(price: f64) -> CoreResult<()> {
    if !price.is_finite() || price < 0.0 {
        return Err(CoreError::Validation("ticket price must be a non-negative number".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn draft() -> NewEvent {
        NewEvent {
            name: "Harbour Lights".to_string(),
            description: "Open-air concert".to_string(),
            date: Utc::now() + Duration::days(7),
            location: "Pier 4".to_string(),
            capacity: 10,
            ticket_price: 499.0,
        }
    }

    #[test]
    fn test_new_event_validation() {
        assert!(Event::new(Uuid::new_v4(), draft()).is_ok());

        let mut bad = draft();
        bad.name = "  ".to_string();
        assert!(matches!(Event::new(Uuid::new_v4(), bad), Err(CoreError::Validation(_))));

        let mut bad = draft();
        bad.ticket_price = -1.0;
        assert!(matches!(Event::new(Uuid::new_v4(), bad), Err(CoreError::Validation(_))));

        let mut bad = draft();
        bad.ticket_price = f64::NAN;
        assert!(matches!(Event::new(Uuid::new_v4(), bad), Err(CoreError::Validation(_))));
    }

    #[test]
    fn test_price_locks_after_sales() {
        let mut event = Event::new(Uuid::new_v4(), draft()).unwrap();
        let reprice = EventChanges { ticket_price: Some(599.0), ..Default::default() };

        event.apply_changes(&reprice).unwrap();
        assert_eq!(event.ticket_price, 599.0);

        event.tickets_sold = 1;
        let again = EventChanges { ticket_price: Some(699.0), ..Default::default() };
        assert!(matches!(event.apply_changes(&again), Err(CoreError::Conflict(_))));
        assert_eq!(event.ticket_price, 599.0);

        // resubmitting the same price alongside other edits is fine
        let same = EventChanges {
            ticket_price: Some(599.0),
            location: Some("Pier 5".to_string()),
            ..Default::default()
        };
        event.apply_changes(&same).unwrap();
        assert_eq!(event.location, "Pier 5");
    }

    #[test]
    fn test_capacity_cannot_drop_below_held_seats() {
        let mut event = Event::new(Uuid::new_v4(), draft()).unwrap();
        event.tickets_sold = 3;
        event.tickets_reserved = 2;

        let shrink = EventChanges { capacity: Some(4), ..Default::default() };
        assert!(matches!(event.apply_changes(&shrink), Err(CoreError::Validation(_))));

        let ok = EventChanges { capacity: Some(5), ..Default::default() };
        event.apply_changes(&ok).unwrap();
        assert_eq!(event.headroom(), 0);
    }

    #[test]
    fn test_capacity_fits_storage() {
        let huge = NewEvent { capacity: 3_000_000_000, ..draft() };
        assert!(matches!(Event::new(Uuid::new_v4(), huge), Err(CoreError::Validation(_))));

        let largest = NewEvent { capacity: MAX_CAPACITY, ..draft() };
        assert!(Event::new(Uuid::new_v4(), largest).is_ok());

        let mut event = Event::new(Uuid::new_v4(), draft()).unwrap();
        let grow = EventChanges { capacity: Some(MAX_CAPACITY + 1), ..Default::default() };
        assert!(matches!(event.apply_changes(&grow), Err(CoreError::Validation(_))));
    }

    #[test]
    fn test_delete_rules() {
        let mut event = Event::new(Uuid::new_v4(), draft()).unwrap();
        assert!(event.ensure_deletable().is_ok());

        event.tickets_reserved = 1;
        assert!(event.ensure_deletable().is_err());

        event.tickets_reserved = 0;
        event.tickets_sold = 1;
        assert!(event.ensure_deletable().is_err());
    }
}
