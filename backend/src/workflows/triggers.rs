// Workflow Triggers - Record change events that drive the enrichment triggers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use triage_shared::Ticket;
use uuid::Uuid;

/// Kinds of record change the engine reacts to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    TicketCreated,
    TicketUpdated,
}

/// A record change notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerEvent {
    pub event_id: Uuid,
    pub trigger_type: TriggerType,
    pub ticket_id: Uuid,
    /// Record as of the change. `None` when the notifier only knows the key.
    pub snapshot: Option<Ticket>,
    /// Attribute names written by the change, empty for creation
    pub changed_fields: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl TriggerEvent {
    pub fn new(trigger_type: TriggerType, ticket_id: Uuid, snapshot: Option<Ticket>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            trigger_type,
            ticket_id,
            snapshot,
            changed_fields: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    /// Create a ticket created event
    pub fn ticket_created(ticket: Ticket) -> Self {
        Self::new(TriggerType::TicketCreated, ticket.id, Some(ticket))
    }

    /// Create a ticket updated event
    pub fn ticket_updated(ticket: Ticket, changed_fields: &[&str]) -> Self {
        let mut event = Self::new(TriggerType::TicketUpdated, ticket.id, Some(ticket));
        event.changed_fields = changed_fields.iter().map(|f| f.to_string()).collect();
        event
    }

    /// Key-only notification; the engine loads the record itself
    pub fn notification(trigger_type: TriggerType, ticket_id: Uuid) -> Self {
        Self::new(trigger_type, ticket_id, None)
    }
}

pub type EventSender = mpsc::UnboundedSender<TriggerEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<TriggerEvent>;

pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
