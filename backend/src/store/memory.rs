use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use triage_shared::{readiness, DerivedValue, NewTicket, Ticket, TicketUpdate};
use uuid::Uuid;

use super::{StoreError, StoreResult, TicketStore, WriteOutcome};

/// In-process store with the same conditional-write semantics as the
/// PostgreSQL store. Each operation holds the write lock for its whole
/// check-and-set.
#[derive(Clone, Default)]
pub struct MemoryTicketStore {
    tickets: Arc<RwLock<HashMap<Uuid, Ticket>>>,
}

impl MemoryTicketStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record as-is, bypassing creation.
    #[cfg(test)]
    pub async fn insert(&self, ticket: Ticket) {
        self.tickets.write().await.insert(ticket.id, ticket);
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.tickets.read().await.len()
    }
}

fn claim_expired(ticket: &Ticket, ttl: Duration) -> bool {
    match ticket.sync_claimed_at {
        None => true,
        Some(at) => {
            match chrono::Duration::from_std(ttl) {
                Ok(ttl) => at + ttl < Utc::now(),
                Err(_) => false,
            }
        }
    }
}

#[async_trait]
impl TicketStore for MemoryTicketStore {
    async fn create(&self, new: NewTicket) -> StoreResult<Ticket> {
        let ticket = Ticket::from_new(Uuid::new_v4(), new, Utc::now());
        self.tickets.write().await.insert(ticket.id, ticket.clone());
        Ok(ticket)
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Ticket>> {
        Ok(self.tickets.read().await.get(&id).cloned())
    }

    async fn set_derived_if_absent(
        &self,
        id: Uuid,
        value: &DerivedValue,
    ) -> StoreResult<WriteOutcome> {
        let mut tickets = self.tickets.write().await;
        let ticket = tickets.get_mut(&id).ok_or(StoreError::NotFound(id))?;

        if value.apply_if_absent(ticket) {
            ticket.updated_at = Some(Utc::now());
            Ok(WriteOutcome::Written(ticket.clone()))
        } else {
            Ok(WriteOutcome::AlreadySet(ticket.clone()))
        }
    }

    async fn update_operator_fields(&self, id: Uuid, update: &TicketUpdate) -> StoreResult<Ticket> {
        let mut tickets = self.tickets.write().await;
        let ticket = tickets.get_mut(&id).ok_or(StoreError::NotFound(id))?;

        if let Some(priority) = &update.priority {
            ticket.priority = Some(priority.clone());
        }
        if let Some(t) = update.t_resolution {
            ticket.t_resolution = Some(t);
        }
        ticket.updated_at = Some(Utc::now());
        Ok(ticket.clone())
    }

    async fn claim_sync(&self, id: Uuid, ttl: Duration) -> StoreResult<Option<Ticket>> {
        let mut tickets = self.tickets.write().await;
        let ticket = tickets.get_mut(&id).ok_or(StoreError::NotFound(id))?;

        if ticket.sfdc_key.is_some() || !readiness(ticket) || !claim_expired(ticket, ttl) {
            return Ok(None);
        }
        ticket.sync_claimed_at = Some(Utc::now());
        Ok(Some(ticket.clone()))
    }

    async fn complete_sync(&self, id: Uuid, sfdc_key: &str) -> StoreResult<WriteOutcome> {
        let mut tickets = self.tickets.write().await;
        let ticket = tickets.get_mut(&id).ok_or(StoreError::NotFound(id))?;

        if ticket.sfdc_key.is_some() {
            return Ok(WriteOutcome::AlreadySet(ticket.clone()));
        }
        ticket.sfdc_key = Some(sfdc_key.to_string());
        ticket.sync_claimed_at = None;
        ticket.last_sync_error = None;
        ticket.updated_at = Some(Utc::now());
        Ok(WriteOutcome::Written(ticket.clone()))
    }

    async fn fail_sync(&self, id: Uuid, error: &str) -> StoreResult<Ticket> {
        let mut tickets = self.tickets.write().await;
        let ticket = tickets.get_mut(&id).ok_or(StoreError::NotFound(id))?;

        ticket.sync_attempts += 1;
        ticket.last_sync_error = Some(error.to_string());
        ticket.sync_claimed_at = None;
        Ok(ticket.clone())
    }

    async fn list_awaiting_sync(
        &self,
        max_attempts: i32,
        claim_ttl: Duration,
        limit: i64,
    ) -> StoreResult<Vec<Ticket>> {
        let tickets = self.tickets.read().await;
        let mut pending: Vec<Ticket> = tickets
            .values()
            .filter(|t| t.sfdc_key.is_none() && readiness(t))
            .filter(|t| t.sync_attempts < max_attempts && claim_expired(t, claim_ttl))
            .cloned()
            .collect();

        pending.sort_by_key(|t| t.created_at);
        pending.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(pending)
    }

    async fn list_unenriched(
        &self,
        grace: Duration,
        horizon: Duration,
        limit: i64,
    ) -> StoreResult<Vec<Ticket>> {
        let (Ok(grace), Ok(horizon)) = (
            chrono::Duration::from_std(grace),
            chrono::Duration::from_std(horizon),
        ) else {
            return Ok(Vec::new());
        };
        let now = Utc::now();
        let (newest, oldest) = (now - grace, now - horizon);

        let tickets = self.tickets.read().await;
        let mut stale: Vec<Ticket> = tickets
            .values()
            .filter(|t| t.sfdc_key.is_none() && !t.is_fully_enriched())
            .filter(|t| t.created_at < newest && t.created_at > oldest)
            .cloned()
            .collect();

        stale.sort_by_key(|t| t.created_at);
        stale.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(stale)
    }

    async fn ping(&self) -> bool {
        true
    }
}
