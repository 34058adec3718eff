use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gatehouse_core::repository::{CapacityLedger, EventRepository};
use gatehouse_core::{CoreError, CoreResult, Event, EventChanges};
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use crate::database::storage_error;

const EVENT_COLUMNS: &str = "id, organizer_id, name, description, date, location, capacity, ticket_price, \
                             tickets_sold, tickets_reserved, created_at, updated_at";

/// Events table. Doubles as the capacity ledger: every seat movement is a
/// single conditional `UPDATE`, so concurrent reservations on one event are
/// serialized by the row lock.
pub struct StoreEventRepository {
    pool: PgPool,
}

impl StoreEventRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run a guarded seat update; `None` means the guard rejected it.
    async fn move_seats(&self, sql: &str, event_id: Uuid, count: u32) -> CoreResult<Option<Event>> {
        let row: Option<EventRow> = sqlx::query_as(&format!("{} RETURNING {}", sql, EVENT_COLUMNS))
            .bind(event_id)
            .bind(seat_count("seat count", count)?)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(row.map(Event::from))
    }
}

/// Seat columns are `INTEGER`; reject counts that would wrap.
fn seat_count(field: &str, value: u32) -> CoreResult<i32> {
    i32::try_from(value).map_err(|_| CoreError::Validation(format!("{} {} is out of range", field, value)))
}

#[derive(sqlx::FromRow)]
struct EventRow {
    id: Uuid,
    organizer_id: Uuid,
    name: String,
    description: String,
    date: DateTime<Utc>,
    location: String,
    capacity: i32,
    ticket_price: f64,
    tickets_sold: i32,
    tickets_reserved: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<EventRow> for Event {
    fn from(row: EventRow) -> Self {
        Event {
            id: row.id,
            organizer_id: row.organizer_id,
            name: row.name,
            description: row.description,
            date: row.date,
            location: row.location,
            capacity: row.capacity.max(0) as u32,
            ticket_price: row.ticket_price,
            tickets_sold: row.tickets_sold.max(0) as u32,
            tickets_reserved: row.tickets_reserved.max(0) as u32,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl EventRepository for StoreEventRepository {
    async fn create(&self, event: &Event) -> CoreResult<Uuid> {
        sqlx::query(
            r#"
            INSERT INTO events (id, organizer_id, name, description, date, location, capacity, ticket_price,
                                tickets_sold, tickets_reserved, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(event.id)
        .bind(event.organizer_id)
        .bind(&event.name)
        .bind(&event.description)
        .bind(event.date)
        .bind(&event.location)
        .bind(seat_count("capacity", event.capacity)?)
        .bind(event.ticket_price)
        .bind(seat_count("tickets sold", event.tickets_sold)?)
        .bind(seat_count("tickets reserved", event.tickets_reserved)?)
        .bind(event.created_at)
        .bind(event.updated_at)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(event.id)
    }

    async fn get(&self, id: Uuid) -> CoreResult<Event> {
        let row: Option<EventRow> = sqlx::query_as(&format!("SELECT {} FROM events WHERE id = $1", EVENT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;
        row.map(Event::from).ok_or_else(|| CoreError::NotFound(format!("event {}", id)))
    }

    async fn list(&self) -> CoreResult<Vec<Event>> {
        let rows: Vec<EventRow> = sqlx::query_as(&format!("SELECT {} FROM events ORDER BY date", EVENT_COLUMNS))
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(rows.into_iter().map(Event::from).collect())
    }

    async fn list_by_organizer(&self, organizer_id: Uuid) -> CoreResult<Vec<Event>> {
        let rows: Vec<EventRow> = sqlx::query_as(&format!(
            "SELECT {} FROM events WHERE organizer_id = $1 ORDER BY date",
            EVENT_COLUMNS
        ))
        .bind(organizer_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;
        Ok(rows.into_iter().map(Event::from).collect())
    }

    async fn update(&self, id: Uuid, changes: &EventChanges) -> CoreResult<Event> {
        let mut tx = self.pool.begin().await.map_err(storage_error)?;
        let row: Option<EventRow> =
            sqlx::query_as(&format!("SELECT {} FROM events WHERE id = $1 FOR UPDATE", EVENT_COLUMNS))
                .bind(id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(storage_error)?;
        let mut event = row.map(Event::from).ok_or_else(|| CoreError::NotFound(format!("event {}", id)))?;

        event.apply_changes(changes)?;

        sqlx::query(
            r#"
            UPDATE events
            SET name = $2, description = $3, date = $4, location = $5, capacity = $6, ticket_price = $7,
                updated_at = $8
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&event.name)
        .bind(&event.description)
        .bind(event.date)
        .bind(&event.location)
        .bind(seat_count("capacity", event.capacity)?)
        .bind(event.ticket_price)
        .bind(event.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(storage_error)?;

        tx.commit().await.map_err(storage_error)?;
        Ok(event)
    }

    async fn delete(&self, id: Uuid) -> CoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(storage_error)?;
        let row: Option<EventRow> =
            sqlx::query_as(&format!("SELECT {} FROM events WHERE id = $1 FOR UPDATE", EVENT_COLUMNS))
                .bind(id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(storage_error)?;
        let event = row.map(Event::from).ok_or_else(|| CoreError::NotFound(format!("event {}", id)))?;
        event.ensure_deletable()?;

        sqlx::query("DELETE FROM events WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?;
        tx.commit().await.map_err(storage_error)?;
        Ok(())
    }
}

#[async_trait]
impl CapacityLedger for StoreEventRepository {
    async fn reserve(&self, event_id: Uuid, count: u32) -> CoreResult<()> {
        let moved = self
            .move_seats(
                "UPDATE events SET tickets_reserved = tickets_reserved + $2, updated_at = NOW() \
                 WHERE id = $1 AND capacity - tickets_sold - tickets_reserved >= $2",
                event_id,
                count,
            )
            .await?;

        match moved {
            Some(event) => {
                debug!(%event_id, count, headroom = event.headroom(), "seats reserved");
                Ok(())
            }
            None => {
                let event = self.get(event_id).await?;
                Err(CoreError::CapacityExceeded { requested: count, available: event.headroom() })
            }
        }
    }

    async fn release(&self, event_id: Uuid, count: u32) -> CoreResult<()> {
        let moved = self
            .move_seats(
                "UPDATE events SET tickets_reserved = tickets_reserved - $2, updated_at = NOW() \
                 WHERE id = $1 AND tickets_reserved >= $2",
                event_id,
                count,
            )
            .await?;

        if moved.is_none() {
            let event = self.get(event_id).await?;
            return Err(CoreError::Storage(format!(
                "release of {} seats exceeds the {} reserved on event {}",
                count, event.tickets_reserved, event_id
            )));
        }
        Ok(())
    }

    async fn confirm(&self, event_id: Uuid, count: u32) -> CoreResult<()> {
        let moved = self
            .move_seats(
                "UPDATE events SET tickets_reserved = tickets_reserved - $2, \
                 tickets_sold = tickets_sold + $2, updated_at = NOW() \
                 WHERE id = $1 AND tickets_reserved >= $2",
                event_id,
                count,
            )
            .await?;

        if moved.is_none() {
            let event = self.get(event_id).await?;
            return Err(CoreError::Storage(format!(
                "confirm of {} seats exceeds the {} reserved on event {}",
                count, event.tickets_reserved, event_id
            )));
        }
        Ok(())
    }

    async fn headroom(&self, event_id: Uuid) -> CoreResult<u32> {
        Ok(self.get(event_id).await?.headroom())
    }
}
