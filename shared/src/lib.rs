use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A support ticket as persisted by the record store.
///
/// Input attributes are fixed at creation. Derived attributes are each owned by one
/// enrichment trigger and written at most once. `sfdc_key` is the CRM correlation key.
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: Uuid,
    pub description: String,
    pub seniority: String,
    pub experience: String,
    pub category: String,
    #[serde(rename = "type")]
    pub ticket_type: String,
    pub impact: String,

    // Operator attributes
    pub priority: Option<String>,
    pub t_resolution: Option<f64>,

    // Derived attributes
    pub pred_priority: Option<f64>,
    pub pred_resolution_time: Option<f64>,
    pub pred_sentiment: Option<f64>,
    pub tags: Option<Vec<String>>,

    // CRM sync
    pub sfdc_key: Option<String>,
    pub sync_claimed_at: Option<DateTime<Utc>>,
    pub sync_attempts: i32,
    pub last_sync_error: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Input attributes supplied by whoever opens the ticket.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewTicket {
    pub description: String,
    #[serde(default)]
    pub seniority: String,
    #[serde(default)]
    pub experience: String,
    #[serde(default)]
    pub category: String,
    #[serde(rename = "type", default)]
    pub ticket_type: String,
    #[serde(default)]
    pub impact: String,
}

/// Operator-controlled attributes that may change after creation. Any other
/// field in a payload is rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TicketUpdate {
    pub priority: Option<String>,
    pub t_resolution: Option<f64>,
}

impl TicketUpdate {
    pub fn is_empty(&self) -> bool {
        self.priority.is_none() && self.t_resolution.is_none()
    }
}

/// The fields written by enrichment triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DerivedField {
    Priority,
    ResolutionTime,
    Sentiment,
    Tags,
}

impl DerivedField {
    pub const ALL: [DerivedField; 4] = [
        DerivedField::Priority,
        DerivedField::ResolutionTime,
        DerivedField::Sentiment,
        DerivedField::Tags,
    ];

    /// Record attribute (and column) name.
    pub fn column(&self) -> &'static str {
        match self {
            Self::Priority => "pred_priority",
            Self::ResolutionTime => "pred_resolution_time",
            Self::Sentiment => "pred_sentiment",
            Self::Tags => "tags",
        }
    }

    pub fn is_set(&self, ticket: &Ticket) -> bool {
        match self {
            Self::Priority => ticket.pred_priority.is_some(),
            Self::ResolutionTime => ticket.pred_resolution_time.is_some(),
            Self::Sentiment => ticket.pred_sentiment.is_some(),
            Self::Tags => ticket.tags.is_some(),
        }
    }
}

impl std::fmt::Display for DerivedField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.column())
    }
}

/// A value produced by a predictor, tagged with the field it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "snake_case")]
pub enum DerivedValue {
    Priority(f64),
    ResolutionTime(f64),
    Sentiment(f64),
    Tags(Vec<String>),
}

impl DerivedValue {
    pub fn field(&self) -> DerivedField {
        match self {
            Self::Priority(_) => DerivedField::Priority,
            Self::ResolutionTime(_) => DerivedField::ResolutionTime,
            Self::Sentiment(_) => DerivedField::Sentiment,
            Self::Tags(_) => DerivedField::Tags,
        }
    }

    /// Apply to a ticket unless the field is already present. Returns whether it wrote.
    pub fn apply_if_absent(&self, ticket: &mut Ticket) -> bool {
        if self.field().is_set(ticket) {
            return false;
        }
        match self {
            Self::Priority(v) => ticket.pred_priority = Some(*v),
            Self::ResolutionTime(v) => ticket.pred_resolution_time = Some(*v),
            Self::Sentiment(v) => ticket.pred_sentiment = Some(*v),
            Self::Tags(v) => ticket.tags = Some(v.clone()),
        }
        true
    }
}

/// Predictions that must all be present before a ticket is pushed to the CRM.
/// Tags are deliberately not part of this set.
pub const REQUIRED_FOR_SYNC: [DerivedField; 3] = [
    DerivedField::Priority,
    DerivedField::Sentiment,
    DerivedField::ResolutionTime,
];

/// Lifecycle of a ticket across the enrichment and sync triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketState {
    Created,
    PartiallyEnriched,
    Ready,
    Synced,
}

/// True when every prediction in [`REQUIRED_FOR_SYNC`] is present.
pub fn readiness(ticket: &Ticket) -> bool {
    REQUIRED_FOR_SYNC.iter().all(|field| field.is_set(ticket))
}

/// Required predictions still absent, in [`REQUIRED_FOR_SYNC`] order.
pub fn missing_predictions(ticket: &Ticket) -> Vec<DerivedField> {
    REQUIRED_FOR_SYNC
        .iter()
        .copied()
        .filter(|field| !field.is_set(ticket))
        .collect()
}

impl Ticket {
    /// Build a fresh record for a newly assigned key.
    pub fn from_new(id: Uuid, new: NewTicket, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            description: new.description,
            seniority: new.seniority,
            experience: new.experience,
            category: new.category,
            ticket_type: new.ticket_type,
            impact: new.impact,
            priority: None,
            t_resolution: None,
            pred_priority: None,
            pred_resolution_time: None,
            pred_sentiment: None,
            tags: None,
            sfdc_key: None,
            sync_claimed_at: None,
            sync_attempts: 0,
            last_sync_error: None,
            created_at,
            updated_at: None,
        }
    }

    /// Every derived field, tags included, is present.
    pub fn is_fully_enriched(&self) -> bool {
        DerivedField::ALL.iter().all(|field| field.is_set(self))
    }

    pub fn is_synced(&self) -> bool {
        self.sfdc_key.is_some()
    }

    pub fn state(&self) -> TicketState {
        if self.is_synced() {
            TicketState::Synced
        } else if readiness(self) {
            TicketState::Ready
        } else if DerivedField::ALL.iter().any(|field| field.is_set(self)) {
            TicketState::PartiallyEnriched
        } else {
            TicketState::Created
        }
    }
}
