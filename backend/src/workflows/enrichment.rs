// Enrichment Triggers - one predictor call, one derived field write

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};
use triage_shared::{DerivedField, DerivedValue, Ticket};

use crate::integrations::{IntegrationResult, LanguageService, PredictionService};
use crate::store::{TicketStore, WriteOutcome};

/// A predictor bound to the derived field it fills.
#[async_trait]
pub trait Enricher: Send + Sync {
    fn name(&self) -> &'static str;

    fn field(&self) -> DerivedField;

    /// Whether a blank description makes the ticket unusable for this predictor
    fn requires_description(&self) -> bool {
        false
    }

    async fn predict(&self, ticket: &Ticket) -> IntegrationResult<DerivedValue>;
}

/// What one enrichment invocation did
#[derive(Debug, Clone, PartialEq)]
pub enum EnrichmentOutcome {
    Written(DerivedValue),
    /// The field was present on the snapshot; nothing was called.
    AlreadySet,
    NoSnapshot,
    EmptyDescription,
    /// The predictor ran but another invocation stored the field first.
    LostRace,
    Failed(String),
}

impl EnrichmentOutcome {
    pub fn is_written(&self) -> bool {
        matches!(self, Self::Written(_))
    }
}

/// Runs an [`Enricher`] against a snapshot: guard, predict, conditional write.
pub struct EnrichmentTrigger {
    enricher: Arc<dyn Enricher>,
    store: Arc<dyn TicketStore>,
}

impl EnrichmentTrigger {
    pub fn new(enricher: Arc<dyn Enricher>, store: Arc<dyn TicketStore>) -> Self {
        Self { enricher, store }
    }

    pub fn name(&self) -> &'static str {
        self.enricher.name()
    }

    pub async fn run(&self, snapshot: Option<&Ticket>) -> EnrichmentOutcome {
        let name = self.enricher.name();
        let field = self.enricher.field();

        let Some(ticket) = snapshot else {
            debug!(trigger = name, "No ticket yet");
            return EnrichmentOutcome::NoSnapshot;
        };

        if field.is_set(ticket) {
            debug!(trigger = name, ticket_id = %ticket.id, "{} has been done", field);
            return EnrichmentOutcome::AlreadySet;
        }

        if self.enricher.requires_description() && ticket.description.trim().is_empty() {
            debug!(trigger = name, ticket_id = %ticket.id, "Ticket has no description to analyze");
            return EnrichmentOutcome::EmptyDescription;
        }

        let value = match self.enricher.predict(ticket).await {
            Ok(value) => value,
            Err(e) => {
                warn!(trigger = name, ticket_id = %ticket.id, service = e.service(), error = %e, "Prediction failed");
                return EnrichmentOutcome::Failed(e.to_string());
            }
        };

        match self.store.set_derived_if_absent(ticket.id, &value).await {
            Ok(WriteOutcome::Written(_)) => {
                info!(trigger = name, ticket_id = %ticket.id, "Wrote {}", field);
                EnrichmentOutcome::Written(value)
            }
            Ok(WriteOutcome::AlreadySet(_)) => {
                info!(trigger = name, ticket_id = %ticket.id, "{} was written concurrently; discarding", field);
                EnrichmentOutcome::LostRace
            }
            Err(e) => {
                warn!(trigger = name, ticket_id = %ticket.id, error = %e, "Failed to store {}", field);
                EnrichmentOutcome::Failed(e.to_string())
            }
        }
    }
}

/// Comma-joined model instance: key, seniority, experience, category, type, impact
pub fn model_instance(ticket: &Ticket) -> String {
    [
        ticket.id.to_string().as_str(),
        ticket.seniority.as_str(),
        ticket.experience.as_str(),
        ticket.category.as_str(),
        ticket.ticket_type.as_str(),
        ticket.impact.as_str(),
    ]
    .join(",")
}

/// Scalar prediction from a hosted model (priority or resolution time).
pub struct ModelEnricher {
    name: &'static str,
    field: DerivedField,
    model: String,
    service: Arc<dyn PredictionService>,
}

impl ModelEnricher {
    pub fn priority(service: Arc<dyn PredictionService>, model: impl Into<String>) -> Self {
        Self {
            name: "priority",
            field: DerivedField::Priority,
            model: model.into(),
            service,
        }
    }

    pub fn resolution_time(service: Arc<dyn PredictionService>, model: impl Into<String>) -> Self {
        Self {
            name: "resolution_time",
            field: DerivedField::ResolutionTime,
            model: model.into(),
            service,
        }
    }
}

#[async_trait]
impl Enricher for ModelEnricher {
    fn name(&self) -> &'static str {
        self.name
    }

    fn field(&self) -> DerivedField {
        self.field
    }

    async fn predict(&self, ticket: &Ticket) -> IntegrationResult<DerivedValue> {
        let predicted = self
            .service
            .predict(&self.model, &model_instance(ticket))
            .await?;
        Ok(match self.field {
            DerivedField::ResolutionTime => DerivedValue::ResolutionTime(predicted),
            _ => DerivedValue::Priority(predicted),
        })
    }
}

pub struct SentimentEnricher {
    service: Arc<dyn LanguageService>,
}

impl SentimentEnricher {
    pub fn new(service: Arc<dyn LanguageService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Enricher for SentimentEnricher {
    fn name(&self) -> &'static str {
        "sentiment"
    }

    fn field(&self) -> DerivedField {
        DerivedField::Sentiment
    }

    fn requires_description(&self) -> bool {
        true
    }

    async fn predict(&self, ticket: &Ticket) -> IntegrationResult<DerivedValue> {
        let score = self.service.analyze_sentiment(&ticket.description).await?;
        Ok(DerivedValue::Sentiment(score))
    }
}

pub struct TagEnricher {
    service: Arc<dyn LanguageService>,
}

impl TagEnricher {
    pub fn new(service: Arc<dyn LanguageService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Enricher for TagEnricher {
    fn name(&self) -> &'static str {
        "tags"
    }

    fn field(&self) -> DerivedField {
        DerivedField::Tags
    }

    fn requires_description(&self) -> bool {
        true
    }

    async fn predict(&self, ticket: &Ticket) -> IntegrationResult<DerivedValue> {
        let names = self.service.analyze_entities(&ticket.description).await?;
        Ok(DerivedValue::Tags(names))
    }
}
