use async_trait::async_trait;
use sqlx::PgPool;
use std::time::Duration;
use triage_shared::{DerivedValue, NewTicket, Ticket, TicketUpdate};
use uuid::Uuid;

use super::{StoreError, StoreResult, TicketStore, WriteOutcome};

const READY_CLAUSE: &str = "pred_priority IS NOT NULL \
     AND pred_sentiment IS NOT NULL \
     AND pred_resolution_time IS NOT NULL";

#[derive(Clone)]
pub struct PgTicketStore {
    pool: PgPool,
}

impl PgTicketStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch(&self, id: Uuid) -> StoreResult<Ticket> {
        self.get(id).await?.ok_or(StoreError::NotFound(id))
    }
}

#[async_trait]
impl TicketStore for PgTicketStore {
    async fn create(&self, new: NewTicket) -> StoreResult<Ticket> {
        let ticket = sqlx::query_as::<_, Ticket>(
            r#"
            INSERT INTO tickets (id, description, seniority, experience, category, ticket_type, impact)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&new.description)
        .bind(&new.seniority)
        .bind(&new.experience)
        .bind(&new.category)
        .bind(&new.ticket_type)
        .bind(&new.impact)
        .fetch_one(&self.pool)
        .await?;

        Ok(ticket)
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Ticket>> {
        let ticket = sqlx::query_as::<_, Ticket>("SELECT * FROM tickets WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(ticket)
    }

    async fn set_derived_if_absent(
        &self,
        id: Uuid,
        value: &DerivedValue,
    ) -> StoreResult<WriteOutcome> {
        let column = value.field().column();
        let sql = format!(
            "UPDATE tickets SET {column} = $2, updated_at = NOW() \
             WHERE id = $1 AND {column} IS NULL RETURNING *"
        );

        let query = sqlx::query_as::<_, Ticket>(&sql).bind(id);
        let query = match value {
            DerivedValue::Priority(v)
            | DerivedValue::ResolutionTime(v)
            | DerivedValue::Sentiment(v) => query.bind(*v),
            // Whole-array replacement, never array_append
            DerivedValue::Tags(tags) => query.bind(tags.clone()),
        };

        match query.fetch_optional(&self.pool).await? {
            Some(ticket) => Ok(WriteOutcome::Written(ticket)),
            None => Ok(WriteOutcome::AlreadySet(self.fetch(id).await?)),
        }
    }

    async fn update_operator_fields(&self, id: Uuid, update: &TicketUpdate) -> StoreResult<Ticket> {
        sqlx::query_as::<_, Ticket>(
            r#"
            UPDATE tickets
            SET priority = COALESCE($2, priority),
                t_resolution = COALESCE($3, t_resolution),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&update.priority)
        .bind(update.t_resolution)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound(id))
    }

    async fn claim_sync(&self, id: Uuid, ttl: Duration) -> StoreResult<Option<Ticket>> {
        let sql = format!(
            "UPDATE tickets SET sync_claimed_at = NOW() \
             WHERE id = $1 AND sfdc_key IS NULL AND {READY_CLAUSE} \
               AND (sync_claimed_at IS NULL \
                    OR sync_claimed_at < NOW() - ($2::float8 * INTERVAL '1 second')) \
             RETURNING *"
        );

        let ticket = sqlx::query_as::<_, Ticket>(&sql)
            .bind(id)
            .bind(ttl.as_secs_f64())
            .fetch_optional(&self.pool)
            .await?;
        Ok(ticket)
    }

    async fn complete_sync(&self, id: Uuid, sfdc_key: &str) -> StoreResult<WriteOutcome> {
        let written = sqlx::query_as::<_, Ticket>(
            r#"
            UPDATE tickets
            SET sfdc_key = $2,
                sync_claimed_at = NULL,
                last_sync_error = NULL,
                updated_at = NOW()
            WHERE id = $1 AND sfdc_key IS NULL
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(sfdc_key)
        .fetch_optional(&self.pool)
        .await?;

        match written {
            Some(ticket) => Ok(WriteOutcome::Written(ticket)),
            None => Ok(WriteOutcome::AlreadySet(self.fetch(id).await?)),
        }
    }

    async fn fail_sync(&self, id: Uuid, error: &str) -> StoreResult<Ticket> {
        sqlx::query_as::<_, Ticket>(
            r#"
            UPDATE tickets
            SET sync_attempts = sync_attempts + 1,
                last_sync_error = $2,
                sync_claimed_at = NULL
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(error)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound(id))
    }

    async fn list_awaiting_sync(
        &self,
        max_attempts: i32,
        claim_ttl: Duration,
        limit: i64,
    ) -> StoreResult<Vec<Ticket>> {
        let sql = format!(
            "SELECT * FROM tickets \
             WHERE sfdc_key IS NULL AND {READY_CLAUSE} \
               AND sync_attempts < $1 \
               AND (sync_claimed_at IS NULL \
                    OR sync_claimed_at < NOW() - ($2::float8 * INTERVAL '1 second')) \
             ORDER BY created_at ASC \
             LIMIT $3"
        );

        let tickets = sqlx::query_as::<_, Ticket>(&sql)
            .bind(max_attempts)
            .bind(claim_ttl.as_secs_f64())
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(tickets)
    }

    async fn list_unenriched(
        &self,
        grace: Duration,
        horizon: Duration,
        limit: i64,
    ) -> StoreResult<Vec<Ticket>> {
        let tickets = sqlx::query_as::<_, Ticket>(
            r#"
            SELECT * FROM tickets
            WHERE sfdc_key IS NULL
              AND (pred_priority IS NULL OR pred_resolution_time IS NULL
                   OR pred_sentiment IS NULL OR tags IS NULL)
              AND created_at < NOW() - ($1::float8 * INTERVAL '1 second')
              AND created_at > NOW() - ($2::float8 * INTERVAL '1 second')
            ORDER BY created_at ASC
            LIMIT $3
            "#,
        )
        .bind(grace.as_secs_f64())
        .bind(horizon.as_secs_f64())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(tickets)
    }

    async fn ping(&self) -> bool {
        crate::database::health_check(&self.pool).await
    }
}
