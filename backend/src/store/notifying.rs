use async_trait::async_trait;
use std::time::Duration;
use tracing::warn;
use triage_shared::{DerivedValue, NewTicket, Ticket, TicketUpdate};
use uuid::Uuid;

use super::{StoreResult, TicketStore, WriteOutcome};
use crate::workflows::triggers::{EventSender, TriggerEvent};

/// Decorator that turns successful record writes into change notifications.
///
/// Creation publishes `TicketCreated`; derived-field, operator-field and
/// correlation-key writes publish `TicketUpdated`. Sync lease bookkeeping
/// (claim and failure) publishes nothing, otherwise a failed sync would
/// immediately re-trigger itself.
pub struct NotifyingStore<S> {
    inner: S,
    events: EventSender,
}

impl<S: TicketStore> NotifyingStore<S> {
    pub fn new(inner: S, events: EventSender) -> Self {
        Self { inner, events }
    }

    fn publish(&self, event: TriggerEvent) {
        if self.events.send(event).is_err() {
            warn!("Trigger engine is not listening; change notification dropped");
        }
    }
}

#[async_trait]
impl<S: TicketStore> TicketStore for NotifyingStore<S> {
    async fn create(&self, new: NewTicket) -> StoreResult<Ticket> {
        let ticket = self.inner.create(new).await?;
        self.publish(TriggerEvent::ticket_created(ticket.clone()));
        Ok(ticket)
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Ticket>> {
        self.inner.get(id).await
    }

    async fn set_derived_if_absent(
        &self,
        id: Uuid,
        value: &DerivedValue,
    ) -> StoreResult<WriteOutcome> {
        let outcome = self.inner.set_derived_if_absent(id, value).await?;
        if let WriteOutcome::Written(ticket) = &outcome {
            self.publish(TriggerEvent::ticket_updated(
                ticket.clone(),
                &[value.field().column()],
            ));
        }
        Ok(outcome)
    }

    async fn update_operator_fields(&self, id: Uuid, update: &TicketUpdate) -> StoreResult<Ticket> {
        let ticket = self.inner.update_operator_fields(id, update).await?;

        let mut changed = Vec::new();
        if update.priority.is_some() {
            changed.push("priority");
        }
        if update.t_resolution.is_some() {
            changed.push("t_resolution");
        }
        self.publish(TriggerEvent::ticket_updated(ticket.clone(), &changed));
        Ok(ticket)
    }

    async fn claim_sync(&self, id: Uuid, ttl: Duration) -> StoreResult<Option<Ticket>> {
        self.inner.claim_sync(id, ttl).await
    }

    async fn complete_sync(&self, id: Uuid, sfdc_key: &str) -> StoreResult<WriteOutcome> {
        let outcome = self.inner.complete_sync(id, sfdc_key).await?;
        if let WriteOutcome::Written(ticket) = &outcome {
            self.publish(TriggerEvent::ticket_updated(ticket.clone(), &["sfdc_key"]));
        }
        Ok(outcome)
    }

    async fn fail_sync(&self, id: Uuid, error: &str) -> StoreResult<Ticket> {
        self.inner.fail_sync(id, error).await
    }

    async fn list_awaiting_sync(
        &self,
        max_attempts: i32,
        claim_ttl: Duration,
        limit: i64,
    ) -> StoreResult<Vec<Ticket>> {
        self.inner.list_awaiting_sync(max_attempts, claim_ttl, limit).await
    }

    async fn list_unenriched(
        &self,
        grace: Duration,
        horizon: Duration,
        limit: i64,
    ) -> StoreResult<Vec<Ticket>> {
        self.inner.list_unenriched(grace, horizon, limit).await
    }

    async fn ping(&self) -> bool {
        self.inner.ping().await
    }
}
