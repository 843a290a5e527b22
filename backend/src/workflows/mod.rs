// Trigger workflows
//
// Four enrichment triggers react to ticket creation; the completion trigger
// re-evaluates readiness on every write and pushes the ticket to the CRM once.

pub mod completion;
pub mod engine;
pub mod enrichment;
pub mod triggers;

pub use completion::{evaluate, CrmSyncTrigger, SyncDecision, SyncOutcome};
pub use engine::{EngineStats, EventReport, TriggerEngine};
pub use enrichment::{
    EnrichmentOutcome, EnrichmentTrigger, Enricher, ModelEnricher, SentimentEnricher, TagEnricher,
};
pub use triggers::{event_channel, EventReceiver, EventSender, TriggerEvent, TriggerType};

use std::sync::Arc;

use crate::config::{ModelConfig, SyncConfig};
use crate::integrations::{CrmConnector, LanguageService, PredictionService};
use crate::store::TicketStore;

/// External collaborators the triggers call
#[derive(Clone)]
pub struct Services {
    pub prediction: Arc<dyn PredictionService>,
    pub language: Arc<dyn LanguageService>,
    pub crm: Arc<dyn CrmConnector>,
}

/// Wire the four enrichment triggers and the CRM sync trigger into an engine.
pub fn build_engine(
    store: Arc<dyn TicketStore>,
    services: Services,
    model: &ModelConfig,
    sync: &SyncConfig,
    supplied_email: &str,
) -> TriggerEngine {
    let enrichers: Vec<Arc<dyn Enricher>> = vec![
        Arc::new(ModelEnricher::priority(
            services.prediction.clone(),
            model.priority_model.clone(),
        )),
        Arc::new(ModelEnricher::resolution_time(
            services.prediction.clone(),
            model.resolution_time_model.clone(),
        )),
        Arc::new(SentimentEnricher::new(services.language.clone())),
        Arc::new(TagEnricher::new(services.language.clone())),
    ];

    let enrichers = enrichers
        .into_iter()
        .map(|enricher| EnrichmentTrigger::new(enricher, store.clone()))
        .collect();

    let completion = Arc::new(CrmSyncTrigger::new(
        store.clone(),
        services.crm,
        supplied_email,
        sync.claim_ttl(),
    ));

    TriggerEngine::new(store, enrichers, completion)
}
