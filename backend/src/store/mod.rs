// Ticket record store
//
// The store is the only shared mutable resource between trigger invocations.
// Derived fields and the correlation key are written with compare-and-set on
// field absence, so duplicate deliveries of the same trigger cannot overwrite.

pub mod memory;
pub mod notifying;
pub mod postgres;

pub use memory::MemoryTicketStore;
pub use notifying::NotifyingStore;
pub use postgres::PgTicketStore;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use triage_shared::{DerivedValue, NewTicket, Ticket, TicketUpdate};
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Ticket {0} not found")]
    NotFound(Uuid),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Result of a conditional write.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome {
    /// The value was stored; carries the record after the write.
    Written(Ticket),
    /// The field was already present and was left untouched.
    AlreadySet(Ticket),
}

impl WriteOutcome {
    pub fn ticket(&self) -> &Ticket {
        match self {
            Self::Written(t) | Self::AlreadySet(t) => t,
        }
    }

    pub fn was_written(&self) -> bool {
        matches!(self, Self::Written(_))
    }
}

#[async_trait]
pub trait TicketStore: Send + Sync {
    /// Persist a new ticket under a freshly assigned key.
    async fn create(&self, new: NewTicket) -> StoreResult<Ticket>;

    async fn get(&self, id: Uuid) -> StoreResult<Option<Ticket>>;

    /// Write one derived field if and only if it is absent. Tags replace the
    /// whole field.
    async fn set_derived_if_absent(&self, id: Uuid, value: &DerivedValue)
        -> StoreResult<WriteOutcome>;

    /// Change operator attributes. Input and derived attributes are never touched.
    async fn update_operator_fields(&self, id: Uuid, update: &TicketUpdate) -> StoreResult<Ticket>;

    /// Take the pending-sync lease. Succeeds only when the ticket is ready, has no
    /// correlation key and no other claim younger than `ttl` exists.
    async fn claim_sync(&self, id: Uuid, ttl: Duration) -> StoreResult<Option<Ticket>>;

    /// Stamp the correlation key if absent and release the lease.
    async fn complete_sync(&self, id: Uuid, sfdc_key: &str) -> StoreResult<WriteOutcome>;

    /// Record a failed attempt and release the lease.
    async fn fail_sync(&self, id: Uuid, error: &str) -> StoreResult<Ticket>;

    /// Ready, unsynced, unclaimed tickets with fewer than `max_attempts` failures,
    /// oldest first.
    async fn list_awaiting_sync(
        &self,
        max_attempts: i32,
        claim_ttl: Duration,
        limit: i64,
    ) -> StoreResult<Vec<Ticket>>;

    /// Unsynced tickets still missing a derived field, created more than `grace`
    /// and less than `horizon` ago, oldest first.
    async fn list_unenriched(
        &self,
        grace: Duration,
        horizon: Duration,
        limit: i64,
    ) -> StoreResult<Vec<Ticket>>;

    async fn ping(&self) -> bool;
}
