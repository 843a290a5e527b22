// Workflow Engine - routes record change events to the triggers

use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use triage_shared::Ticket;
use uuid::Uuid;

use super::{
    CrmSyncTrigger, EnrichmentOutcome, EnrichmentTrigger, EventReceiver, SyncOutcome,
    TriggerEvent, TriggerType,
};
use crate::store::TicketStore;

/// What the engine did for one event
#[derive(Debug, Clone)]
pub struct EventReport {
    pub event_id: Uuid,
    pub ticket_id: Uuid,
    pub enrichment: Vec<(&'static str, EnrichmentOutcome)>,
    pub sync: SyncOutcome,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct EngineStats {
    pub events: usize,
    pub fields_written: usize,
    pub synced: usize,
    pub failures: usize,
}

pub struct TriggerEngine {
    store: Arc<dyn TicketStore>,
    enrichers: Vec<EnrichmentTrigger>,
    completion: Arc<CrmSyncTrigger>,
}

impl TriggerEngine {
    pub fn new(
        store: Arc<dyn TicketStore>,
        enrichers: Vec<EnrichmentTrigger>,
        completion: Arc<CrmSyncTrigger>,
    ) -> Self {
        Self {
            store,
            enrichers,
            completion,
        }
    }

    pub fn completion(&self) -> &Arc<CrmSyncTrigger> {
        &self.completion
    }

    /// Run every enricher concurrently against one snapshot. Fields already
    /// present are skipped by the enrichers' own guards.
    pub async fn enrich(&self, snapshot: Option<&Ticket>) -> Vec<(&'static str, EnrichmentOutcome)> {
        let runs = self
            .enrichers
            .iter()
            .map(|trigger| async move { (trigger.name(), trigger.run(snapshot).await) });
        join_all(runs).await
    }

    /// Handle one event. Creation fans out to every enricher concurrently; every
    /// event, creation included, is also a record write and so is evaluated by the
    /// completion trigger.
    pub async fn process_event(&self, event: TriggerEvent) -> EventReport {
        let TriggerEvent {
            event_id,
            trigger_type,
            ticket_id,
            snapshot,
            changed_fields,
            ..
        } = event;

        let snapshot = match snapshot {
            Some(ticket) => Some(ticket),
            None => match self.store.get(ticket_id).await {
                Ok(ticket) => ticket,
                Err(e) => {
                    error!(%ticket_id, error = %e, "Could not load ticket for event");
                    None
                }
            },
        };

        debug!(
            %event_id,
            %ticket_id,
            trigger = ?trigger_type,
            changed = ?changed_fields,
            "Processing event"
        );

        let enrichment = async {
            if trigger_type != TriggerType::TicketCreated {
                return Vec::new();
            }
            self.enrich(snapshot.as_ref()).await
        };
        let sync = self.completion.handle(snapshot.as_ref());

        let (enrichment, sync) = tokio::join!(enrichment, sync);

        EventReport {
            event_id,
            ticket_id,
            enrichment,
            sync,
        }
    }

    /// Consume events until every sender is dropped. Each event runs as its own
    /// task, so invocations for one ticket may overlap.
    pub fn spawn(self: Arc<Self>, mut events: EventReceiver) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("Trigger engine started");
            while let Some(event) = events.recv().await {
                let engine = self.clone();
                tokio::spawn(async move {
                    engine.process_event(event).await;
                });
            }
            info!("Trigger engine stopped: event channel closed");
        })
    }

    /// Process queued events one at a time until the queue is empty, including
    /// events raised while processing. Returns aggregate counts.
    pub async fn drain(&self, events: &mut EventReceiver) -> EngineStats {
        let mut stats = EngineStats::default();
        while let Ok(event) = events.try_recv() {
            let report = self.process_event(event).await;
            stats.events += 1;
            for (_, outcome) in &report.enrichment {
                match outcome {
                    EnrichmentOutcome::Written(_) => stats.fields_written += 1,
                    EnrichmentOutcome::Failed(_) => stats.failures += 1,
                    _ => {}
                }
            }
            match report.sync {
                SyncOutcome::Synced { .. } => stats.synced += 1,
                SyncOutcome::Failed { .. } => stats.failures += 1,
                _ => {}
            }
        }
        stats
    }
}
