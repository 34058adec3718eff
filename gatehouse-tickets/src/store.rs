use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gatehouse_core::repository::{StatusChange, TicketFilter, TicketRepository};
use gatehouse_core::{Actor, AuditEntry, CoreError, CoreResult, Ticket, TicketStatus};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct StoreInner {
    tickets: HashMap<Uuid, Ticket>,
    audit: Vec<AuditEntry>,
}

impl StoreInner {
    fn insert(&mut self, ticket: &Ticket) {
        self.audit.push(AuditEntry {
            ticket_id: ticket.id,
            from: None,
            to: ticket.status,
            actor: Actor::User(ticket.purchaser_id),
            at: ticket.created_at,
        });
        self.tickets.insert(ticket.id, ticket.clone());
    }
}

/// Ticket records held in process memory. The write lock makes each status
/// compare-and-swap atomic.
#[derive(Default)]
pub struct InMemoryTicketStore {
    inner: RwLock<StoreInner>,
}

impl InMemoryTicketStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TicketRepository for InMemoryTicketStore {
    async fn create(&self, ticket: &Ticket) -> CoreResult<Uuid> {
        let mut inner = self.inner.write().await;
        if inner.tickets.contains_key(&ticket.id) {
            return Err(CoreError::Conflict(format!("ticket {} already exists", ticket.id)));
        }
        inner.insert(ticket);
        Ok(ticket.id)
    }

    async fn create_many(&self, tickets: &[Ticket]) -> CoreResult<Vec<Uuid>> {
        let mut inner = self.inner.write().await;
        if let Some(dup) = tickets.iter().find(|t| inner.tickets.contains_key(&t.id)) {
            return Err(CoreError::Conflict(format!("ticket {} already exists", dup.id)));
        }
        for ticket in tickets {
            inner.insert(ticket);
        }
        Ok(tickets.iter().map(|t| t.id).collect())
    }

    async fn get(&self, id: Uuid) -> CoreResult<Ticket> {
        self.inner
            .read()
            .await
            .tickets
            .get(&id)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(format!("ticket {}", id)))
    }

    async fn list_by_holder_or_purchaser(
        &self,
        user_id: Uuid,
        email: &str,
        filter: &TicketFilter,
    ) -> CoreResult<Vec<Ticket>> {
        let inner = self.inner.read().await;
        let mut tickets: Vec<Ticket> = inner
            .tickets
            .values()
            .filter(|t| t.involves(user_id, email) && filter.matches(t))
            .cloned()
            .collect();
        tickets.sort_by_key(|t| t.created_at);
        Ok(tickets)
    }

    async fn list_by_event(&self, event_id: Uuid) -> CoreResult<Vec<Ticket>> {
        let inner = self.inner.read().await;
        let mut tickets: Vec<Ticket> =
            inner.tickets.values().filter(|t| t.event_id == event_id).cloned().collect();
        tickets.sort_by_key(|t| t.created_at);
        Ok(tickets)
    }

    async fn list_overdue(&self, now: DateTime<Utc>) -> CoreResult<Vec<Ticket>> {
        let inner = self.inner.read().await;
        Ok(inner.tickets.values().filter(|t| t.is_overdue(now)).cloned().collect())
    }

    async fn list_unsettled(&self, before: DateTime<Utc>) -> CoreResult<Vec<Ticket>> {
        let inner = self.inner.read().await;
        Ok(inner
            .tickets
            .values()
            .filter(|t| t.status == TicketStatus::Accepted && t.updated_at <= before)
            .cloned()
            .collect())
    }

    async fn update_status(&self, id: Uuid, change: StatusChange) -> CoreResult<Ticket> {
        change.from.ensure_transition(change.to)?;

        let mut inner = self.inner.write().await;
        let ticket = inner
            .tickets
            .get_mut(&id)
            .ok_or_else(|| CoreError::NotFound(format!("ticket {}", id)))?;

        if ticket.status != change.from {
            return Err(CoreError::StateConflict { expected: change.from, actual: ticket.status });
        }

        let now = Utc::now();
        ticket.status = change.to;
        if let Some(holder) = change.holder_id {
            ticket.holder_id = Some(holder);
        }
        ticket.updated_at = now;
        let updated = ticket.clone();

        inner.audit.push(AuditEntry {
            ticket_id: id,
            from: Some(change.from),
            to: change.to,
            actor: change.actor,
            at: now,
        });
        Ok(updated)
    }

    async fn set_tx_hash(&self, id: Uuid, hash: &str) -> CoreResult<()> {
        let mut inner = self.inner.write().await;
        let ticket = inner
            .tickets
            .get_mut(&id)
            .ok_or_else(|| CoreError::NotFound(format!("ticket {}", id)))?;
        if ticket.tx_hash.is_some() {
            return Err(CoreError::Conflict(format!("ticket {} already has an audit hash", id)));
        }
        ticket.tx_hash = Some(hash.to_string());
        Ok(())
    }

    async fn audit_trail(&self, id: Uuid) -> CoreResult<Vec<AuditEntry>> {
        let inner = self.inner.read().await;
        if !inner.tickets.contains_key(&id) {
            return Err(CoreError::NotFound(format!("ticket {}", id)));
        }
        Ok(inner.audit.iter().filter(|e| e.ticket_id == id).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn invitation() -> Ticket {
        Ticket::invitation(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            "guest@example.com".to_string(),
            Utc::now() + Duration::hours(24),
        )
    }

    fn accept(holder: Uuid) -> StatusChange {
        StatusChange {
            from: TicketStatus::PendingAcceptance,
            to: TicketStatus::Accepted,
            actor: Actor::User(holder),
            holder_id: Some(holder),
        }
    }

    #[tokio::test]
    async fn test_cas_rejects_stale_from_state() {
        let store = InMemoryTicketStore::new();
        let ticket = invitation();
        store.create(&ticket).await.unwrap();
        let holder = Uuid::new_v4();

        let updated = store.update_status(ticket.id, accept(holder)).await.unwrap();
        assert_eq!(updated.status, TicketStatus::Accepted);
        assert_eq!(updated.holder_id, Some(holder));

        let err = store.update_status(ticket.id, accept(holder)).await.unwrap_err();
        assert!(matches!(
            err,
            CoreError::StateConflict { expected: TicketStatus::PendingAcceptance, actual: TicketStatus::Accepted }
        ));
    }

    #[tokio::test]
    async fn test_transition_outside_table_is_rejected() {
        let store = InMemoryTicketStore::new();
        let ticket = invitation();
        store.create(&ticket).await.unwrap();

        let change = StatusChange {
            from: TicketStatus::PendingAcceptance,
            to: TicketStatus::Used,
            actor: Actor::System,
            holder_id: None,
        };
        assert!(matches!(
            store.update_status(ticket.id, change).await,
            Err(CoreError::InvalidTransition { .. })
        ));
        assert_eq!(store.get(ticket.id).await.unwrap().status, TicketStatus::PendingAcceptance);
    }

    #[tokio::test]
    async fn test_audit_trail_records_creation_and_changes() {
        let store = InMemoryTicketStore::new();
        let ticket = invitation();
        store.create(&ticket).await.unwrap();
        store.update_status(ticket.id, accept(Uuid::new_v4())).await.unwrap();

        let trail = store.audit_trail(ticket.id).await.unwrap();
        assert_eq!(trail.len(), 2);
        assert_eq!(trail[0].from, None);
        assert_eq!(trail[1].from, Some(TicketStatus::PendingAcceptance));
        assert_eq!(trail[1].to, TicketStatus::Accepted);
    }

    #[tokio::test]
    async fn test_tx_hash_is_append_only() {
        let store = InMemoryTicketStore::new();
        let ticket = Ticket::purchased(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        store.create(&ticket).await.unwrap();

        store.set_tx_hash(ticket.id, "abc").await.unwrap();
        assert!(matches!(store.set_tx_hash(ticket.id, "def").await, Err(CoreError::Conflict(_))));
        assert_eq!(store.get(ticket.id).await.unwrap().tx_hash.as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn test_listing_matches_holder_purchaser_and_invitee() {
        let store = InMemoryTicketStore::new();
        let mine = Ticket::purchased(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let invited = invitation();
        store.create_many(&[mine.clone(), invited.clone()]).await.unwrap();

        let by_purchaser = store
            .list_by_holder_or_purchaser(mine.purchaser_id, "nobody@example.com", &TicketFilter::default())
            .await
            .unwrap();
        assert_eq!(by_purchaser.len(), 1);

        let by_email = store
            .list_by_holder_or_purchaser(Uuid::new_v4(), "GUEST@example.com", &TicketFilter::default())
            .await
            .unwrap();
        assert_eq!(by_email.len(), 1);
        assert_eq!(by_email[0].id, invited.id);

        let pending_only = TicketFilter {
            statuses: Some(vec![TicketStatus::Confirmed]),
            ..Default::default()
        };
        let none = store
            .list_by_holder_or_purchaser(Uuid::new_v4(), "guest@example.com", &pending_only)
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_create_many_is_all_or_nothing() {
        let store = InMemoryTicketStore::new();
        let existing = invitation();
        store.create(&existing).await.unwrap();

        let fresh = invitation();
        assert!(store.create_many(&[fresh.clone(), existing.clone()]).await.is_err());
        assert!(matches!(store.get(fresh.id).await, Err(CoreError::NotFound(_))));
    }
}
