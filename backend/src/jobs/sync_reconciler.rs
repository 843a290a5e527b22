// Sync Reconciler Job - recovers tickets the event path left behind: tickets
// whose enrichment never finished and ready tickets left unsynced

use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::SyncConfig;
use crate::store::{StoreError, TicketStore};
use crate::workflows::{EnrichmentOutcome, SyncOutcome, TriggerEngine};

/// Upper bound on tickets handled per sweep phase
pub const SWEEP_BATCH_SIZE: i64 = 200;

pub struct SyncReconcilerJob {
    store: Arc<dyn TicketStore>,
    engine: Arc<TriggerEngine>,
    config: SyncConfig,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct SyncSweepResult {
    pub tickets_checked: i32,
    pub tickets_synced: i32,
    pub tickets_skipped: i32,
    pub tickets_reenriched: i32,
    pub fields_recovered: i32,
    pub errors: Vec<String>,
}

impl SyncSweepResult {
    /// Tickets the sweep acted on, across both phases
    pub fn items(&self) -> i32 {
        self.tickets_reenriched + self.tickets_checked
    }
}

impl SyncReconcilerJob {
    pub fn new(store: Arc<dyn TicketStore>, engine: Arc<TriggerEngine>, config: SyncConfig) -> Self {
        Self {
            store,
            engine,
            config,
        }
    }

    pub async fn run(&self) -> Result<SyncSweepResult, StoreError> {
        let mut result = SyncSweepResult::default();
        self.reenrich(&mut result).await?;
        self.resync(&mut result).await?;

        if result.tickets_checked > 0 || result.tickets_reenriched > 0 {
            info!(
                "Sync sweep: {} re-enriched ({} fields), {} checked, {} synced, {} skipped, {} failed",
                result.tickets_reenriched,
                result.fields_recovered,
                result.tickets_checked,
                result.tickets_synced,
                result.tickets_skipped,
                result.errors.len()
            );
        }

        Ok(result)
    }

    /// Re-run the enrichers for tickets whose creation was never fully handled,
    /// e.g. because the process stopped with the event still queued. Writes
    /// notify as usual, so the completion trigger follows on the event path.
    async fn reenrich(&self, result: &mut SyncSweepResult) -> Result<(), StoreError> {
        let stale = self
            .store
            .list_unenriched(
                self.config.enrichment_grace(),
                self.config.enrichment_horizon(),
                SWEEP_BATCH_SIZE,
            )
            .await?;

        for ticket in stale {
            result.tickets_reenriched += 1;
            for (name, outcome) in self.engine.enrich(Some(&ticket)).await {
                match outcome {
                    EnrichmentOutcome::Written(_) => result.fields_recovered += 1,
                    EnrichmentOutcome::Failed(error) => {
                        result.errors.push(format!("Ticket {}: {} failed: {}", ticket.id, name, error));
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }

    async fn resync(&self, result: &mut SyncSweepResult) -> Result<(), StoreError> {
        let pending = self
            .store
            .list_awaiting_sync(
                self.config.max_attempts,
                self.config.claim_ttl(),
                SWEEP_BATCH_SIZE,
            )
            .await?;
        result.tickets_checked = pending.len() as i32;

        for ticket in pending {
            match self.engine.completion().handle(Some(&ticket)).await {
                SyncOutcome::Synced { .. } => result.tickets_synced += 1,
                SyncOutcome::Failed { error } => {
                    warn!(ticket_id = %ticket.id, attempts = ticket.sync_attempts + 1, "Sweep sync failed");
                    result.errors.push(format!("Ticket {}: {}", ticket.id, error));
                }
                _ => result.tickets_skipped += 1,
            }
        }
        Ok(())
    }
}
