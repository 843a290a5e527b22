// Completion Trigger - pushes a fully enriched ticket to the CRM exactly once

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};
use triage_shared::{missing_predictions, DerivedField, Ticket};

use crate::integrations::{CrmConnector, IntegrationError, IntegrationResult};
use crate::store::{TicketStore, WriteOutcome};

pub const CASE_OBJECT: &str = "Case";

/// Pure verdict over a ticket snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum SyncDecision {
    AlreadySynced { sfdc_key: String },
    Waiting { missing: Vec<DerivedField> },
    Ready,
}

/// Decide whether a ticket should be pushed to the CRM.
pub fn evaluate(ticket: &Ticket) -> SyncDecision {
    if let Some(key) = &ticket.sfdc_key {
        return SyncDecision::AlreadySynced {
            sfdc_key: key.clone(),
        };
    }
    let missing = missing_predictions(ticket);
    if missing.is_empty() {
        SyncDecision::Ready
    } else {
        SyncDecision::Waiting { missing }
    }
}

/// What one completion invocation did
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOutcome {
    NoSnapshot,
    AlreadySynced { sfdc_key: String },
    Waiting { missing: Vec<DerivedField> },
    /// Another invocation holds the sync lease or finished first.
    ClaimLost,
    Synced { sfdc_key: String },
    Failed { error: String },
}

/// Case fields sent to the CRM. Operator values win over predictions.
pub fn case_fields(ticket: &Ticket, supplied_email: &str) -> serde_json::Value {
    let priority = ticket
        .priority
        .clone()
        .or_else(|| ticket.pred_priority.map(|p| p.to_string()));
    let resolution_time = ticket.t_resolution.or(ticket.pred_resolution_time);

    serde_json::json!({
        "SuppliedEmail": supplied_email,
        "Description": ticket.description,
        "Type": ticket.ticket_type,
        "Reason": ticket.category,
        "Priority": priority,
        "ResolutionTime__c": resolution_time,
    })
}

pub struct CrmSyncTrigger {
    store: Arc<dyn TicketStore>,
    crm: Arc<dyn CrmConnector>,
    supplied_email: String,
    claim_ttl: Duration,
}

impl CrmSyncTrigger {
    pub fn new(
        store: Arc<dyn TicketStore>,
        crm: Arc<dyn CrmConnector>,
        supplied_email: impl Into<String>,
        claim_ttl: Duration,
    ) -> Self {
        Self {
            store,
            crm,
            supplied_email: supplied_email.into(),
            claim_ttl,
        }
    }

    /// Evaluate a snapshot and sync it when ready.
    pub async fn handle(&self, snapshot: Option<&Ticket>) -> SyncOutcome {
        let Some(ticket) = snapshot else {
            return SyncOutcome::NoSnapshot;
        };

        match evaluate(ticket) {
            SyncDecision::AlreadySynced { sfdc_key } => {
                debug!(ticket_id = %ticket.id, "Ticket has been created already");
                SyncOutcome::AlreadySynced { sfdc_key }
            }
            SyncDecision::Waiting { missing } => {
                debug!(ticket_id = %ticket.id, ?missing, "Still waiting for some values");
                SyncOutcome::Waiting { missing }
            }
            SyncDecision::Ready => self.sync(ticket).await,
        }
    }

    async fn sync(&self, ticket: &Ticket) -> SyncOutcome {
        let claimed = match self.store.claim_sync(ticket.id, self.claim_ttl).await {
            Ok(Some(claimed)) => claimed,
            Ok(None) => {
                debug!(ticket_id = %ticket.id, "Sync already claimed or completed elsewhere");
                return SyncOutcome::ClaimLost;
            }
            Err(e) => {
                error!(ticket_id = %ticket.id, error = %e, "Could not claim ticket for sync");
                return SyncOutcome::Failed {
                    error: e.to_string(),
                };
            }
        };

        match self.push_case(&claimed).await {
            Ok(sfdc_key) => match self.store.complete_sync(claimed.id, &sfdc_key).await {
                Ok(WriteOutcome::Written(_)) => {
                    info!(ticket_id = %claimed.id, %sfdc_key, "Ticket synced to CRM");
                    SyncOutcome::Synced { sfdc_key }
                }
                Ok(WriteOutcome::AlreadySet(existing)) => {
                    error!(
                        ticket_id = %claimed.id,
                        created = %sfdc_key,
                        existing = ?existing.sfdc_key,
                        "Correlation key was set while the case was being created"
                    );
                    SyncOutcome::ClaimLost
                }
                Err(e) => {
                    error!(ticket_id = %claimed.id, %sfdc_key, error = %e, "Case created but key not stored");
                    SyncOutcome::Failed {
                        error: e.to_string(),
                    }
                }
            },
            Err(e) => {
                let message = e.to_string();
                error!(ticket_id = %claimed.id, service = e.service(), error = %message, "CRM sync failed");
                if let Err(store_err) = self.store.fail_sync(claimed.id, &message).await {
                    error!(ticket_id = %claimed.id, error = %store_err, "Could not record sync failure");
                }
                SyncOutcome::Failed { error: message }
            }
        }
    }

    async fn push_case(&self, ticket: &Ticket) -> IntegrationResult<String> {
        let session = self.crm.login().await?;
        let fields = case_fields(ticket, &self.supplied_email);
        let result = self.crm.create(&session, CASE_OBJECT, &fields).await?;

        match result.id {
            Some(id) if result.success => Ok(id),
            _ => Err(IntegrationError::Rejected {
                service: "crm",
                detail: format!("{} create failed: {:?}", CASE_OBJECT, result.errors),
            }),
        }
    }
}
