use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gatehouse_core::repository::{StatusChange, TicketFilter, TicketRepository};
use gatehouse_core::{Actor, AuditEntry, CoreError, CoreResult, Ticket, TicketStatus};
use gatehouse_shared::Masked;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::database::storage_error;

const TICKET_COLUMNS: &str = "id, event_id, reservation_id, purchaser_id, holder_id, invitee_email, \
                              status, tx_hash, expires_at, created_at, updated_at";

pub struct StoreTicketRepository {
    pool: PgPool,
}

impl StoreTicketRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert(tx: &mut Transaction<'_, Postgres>, ticket: &Ticket) -> CoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO tickets (id, event_id, reservation_id, purchaser_id, holder_id, invitee_email,
                                 status, tx_hash, expires_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(ticket.id)
        .bind(ticket.event_id)
        .bind(ticket.reservation_id)
        .bind(ticket.purchaser_id)
        .bind(ticket.holder_id)
        .bind(ticket.invitee_email.as_ref().map(|e| e.expose().as_str()))
        .bind(ticket.status.as_str())
        .bind(ticket.tx_hash.as_deref())
        .bind(ticket.expires_at)
        .bind(ticket.created_at)
        .bind(ticket.updated_at)
        .execute(&mut **tx)
        .await
        .map_err(storage_error)?;

        Self::record(tx, ticket.id, None, ticket.status, Actor::User(ticket.purchaser_id)).await
    }

    async fn record(
        tx: &mut Transaction<'_, Postgres>,
        ticket_id: Uuid,
        from: Option<TicketStatus>,
        to: TicketStatus,
        actor: Actor,
    ) -> CoreResult<()> {
        sqlx::query("INSERT INTO ticket_audit (ticket_id, from_status, to_status, actor) VALUES ($1, $2, $3, $4)")
            .bind(ticket_id)
            .bind(from.map(TicketStatus::as_str))
            .bind(to.as_str())
            .bind(actor.to_string())
            .execute(&mut **tx)
            .await
            .map_err(storage_error)?;
        Ok(())
    }

    async fn current_status(&self, id: Uuid) -> CoreResult<Option<TicketStatus>> {
        let status: Option<String> = sqlx::query_scalar("SELECT status FROM tickets WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;
        status.map(|s| s.parse()).transpose()
    }
}

#[derive(sqlx::FromRow)]
struct TicketRow {
    id: Uuid,
    event_id: Uuid,
    reservation_id: Uuid,
    purchaser_id: Uuid,
    holder_id: Option<Uuid>,
    invitee_email: Option<String>,
    status: String,
    tx_hash: Option<String>,
    expires_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TicketRow> for Ticket {
    type Error = CoreError;

    fn try_from(row: TicketRow) -> Result<Self, Self::Error> {
        Ok(Ticket {
            id: row.id,
            event_id: row.event_id,
            reservation_id: row.reservation_id,
            purchaser_id: row.purchaser_id,
            holder_id: row.holder_id,
            invitee_email: row.invitee_email.map(Masked::new),
            status: row.status.parse()?,
            tx_hash: row.tx_hash,
            expires_at: row.expires_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct AuditRow {
    ticket_id: Uuid,
    from_status: Option<String>,
    to_status: String,
    actor: String,
    at: DateTime<Utc>,
}

impl TryFrom<AuditRow> for AuditEntry {
    type Error = CoreError;

    fn try_from(row: AuditRow) -> Result<Self, Self::Error> {
        Ok(AuditEntry {
            ticket_id: row.ticket_id,
            from: row.from_status.map(|s| s.parse()).transpose()?,
            to: row.to_status.parse()?,
            actor: row.actor.parse()?,
            at: row.at,
        })
    }
}

fn into_tickets(rows: Vec<TicketRow>) -> CoreResult<Vec<Ticket>> {
    rows.into_iter().map(Ticket::try_from).collect()
}

#[async_trait]
impl TicketRepository for StoreTicketRepository {
    async fn create(&self, ticket: &Ticket) -> CoreResult<Uuid> {
        let mut tx = self.pool.begin().await.map_err(storage_error)?;
        Self::insert(&mut tx, ticket).await?;
        tx.commit().await.map_err(storage_error)?;
        Ok(ticket.id)
    }

    async fn create_many(&self, tickets: &[Ticket]) -> CoreResult<Vec<Uuid>> {
        let mut tx = self.pool.begin().await.map_err(storage_error)?;
        for ticket in tickets {
            Self::insert(&mut tx, ticket).await?;
        }
        tx.commit().await.map_err(storage_error)?;
        Ok(tickets.iter().map(|t| t.id).collect())
    }

    async fn get(&self, id: Uuid) -> CoreResult<Ticket> {
        let row: Option<TicketRow> = sqlx::query_as(&format!("SELECT {} FROM tickets WHERE id = $1", TICKET_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;
        row.ok_or_else(|| CoreError::NotFound(format!("ticket {}", id)))?.try_into()
    }

    async fn list_by_holder_or_purchaser(
        &self,
        user_id: Uuid,
        email: &str,
        filter: &TicketFilter,
    ) -> CoreResult<Vec<Ticket>> {
        let statuses: Option<Vec<String>> = filter
            .statuses
            .as_ref()
            .map(|list| list.iter().map(|s| s.as_str().to_string()).collect());

        let rows: Vec<TicketRow> = sqlx::query_as(&format!(
            r#"
            SELECT {} FROM tickets
            WHERE (purchaser_id = $1 OR holder_id = $1 OR LOWER(invitee_email) = LOWER($2))
              AND ($3::uuid IS NULL OR event_id = $3)
              AND ($4::text[] IS NULL OR status = ANY($4))
            ORDER BY created_at
            "#,
            TICKET_COLUMNS
        ))
        .bind(user_id)
        .bind(email.trim())
        .bind(filter.event_id)
        .bind(statuses)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        into_tickets(rows)
    }

    async fn list_by_event(&self, event_id: Uuid) -> CoreResult<Vec<Ticket>> {
        let rows: Vec<TicketRow> = sqlx::query_as(&format!(
            "SELECT {} FROM tickets WHERE event_id = $1 ORDER BY created_at",
            TICKET_COLUMNS
        ))
        .bind(event_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        into_tickets(rows)
    }

    async fn list_overdue(&self, now: DateTime<Utc>) -> CoreResult<Vec<Ticket>> {
        let rows: Vec<TicketRow> = sqlx::query_as(&format!(
            "SELECT {} FROM tickets WHERE status = 'pending_acceptance' AND expires_at <= $1",
            TICKET_COLUMNS
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        into_tickets(rows)
    }

    async fn list_unsettled(&self, before: DateTime<Utc>) -> CoreResult<Vec<Ticket>> {
        let rows: Vec<TicketRow> = sqlx::query_as(&format!(
            "SELECT {} FROM tickets WHERE status = 'accepted' AND updated_at <= $1",
            TICKET_COLUMNS
        ))
        .bind(before)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        into_tickets(rows)
    }

    async fn update_status(&self, id: Uuid, change: StatusChange) -> CoreResult<Ticket> {
        change.from.ensure_transition(change.to)?;

        let mut tx = self.pool.begin().await.map_err(storage_error)?;
        let row: Option<TicketRow> = sqlx::query_as(&format!(
            r#"
            UPDATE tickets
            SET status = $3, holder_id = COALESCE($4, holder_id), updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING {}
            "#,
            TICKET_COLUMNS
        ))
        .bind(id)
        .bind(change.from.as_str())
        .bind(change.to.as_str())
        .bind(change.holder_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(storage_error)?;

        let Some(row) = row else {
            drop(tx);
            return match self.current_status(id).await? {
                Some(actual) => Err(CoreError::StateConflict { expected: change.from, actual }),
                None => Err(CoreError::NotFound(format!("ticket {}", id))),
            };
        };

        Self::record(&mut tx, id, Some(change.from), change.to, change.actor).await?;
        tx.commit().await.map_err(storage_error)?;
        row.try_into()
    }

    async fn set_tx_hash(&self, id: Uuid, hash: &str) -> CoreResult<()> {
        let result = sqlx::query("UPDATE tickets SET tx_hash = $2 WHERE id = $1 AND tx_hash IS NULL")
            .bind(id)
            .bind(hash)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;

        if result.rows_affected() == 0 {
            return match self.current_status(id).await? {
                Some(_) => Err(CoreError::Conflict(format!("ticket {} already has an audit hash", id))),
                None => Err(CoreError::NotFound(format!("ticket {}", id))),
            };
        }
        Ok(())
    }

    async fn audit_trail(&self, id: Uuid) -> CoreResult<Vec<AuditEntry>> {
        if self.current_status(id).await?.is_none() {
            return Err(CoreError::NotFound(format!("ticket {}", id)));
        }
        let rows: Vec<AuditRow> = sqlx::query_as(
            "SELECT ticket_id, from_status, to_status, actor, at FROM ticket_audit WHERE ticket_id = $1 ORDER BY id",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        rows.into_iter().map(AuditEntry::try_from).collect()
    }
}
