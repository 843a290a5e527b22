use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use triage_shared::{NewTicket, Ticket, TicketState, TicketUpdate};
use uuid::Uuid;

use crate::error::{ApiResult, AppError};
use crate::jobs::{record, JobExecutionLog, SyncSweepResult};
use crate::validation::ticket::{validate_new, validate_update};
use crate::workflows::{evaluate, SyncDecision, SyncOutcome};
use crate::AppState;

/// A ticket with its computed lifecycle state
#[derive(Debug, Serialize)]
pub struct TicketView {
    #[serde(flatten)]
    pub ticket: Ticket,
    pub state: TicketState,
}

impl From<Ticket> for TicketView {
    fn from(ticket: Ticket) -> Self {
        let state = ticket.state();
        Self { ticket, state }
    }
}

#[derive(Debug, Serialize)]
pub struct SyncResponse {
    pub decision: SyncDecision,
    pub outcome: SyncOutcome,
}

pub fn ticket_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(create_ticket))
        .route("/:id", get(get_ticket).patch(update_ticket))
        .route("/:id/sync", post(sync_ticket))
}

pub fn job_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/sync-sweep", post(run_sync_sweep))
        .route("/executions", get(list_executions))
}

async fn create_ticket(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewTicket>,
) -> ApiResult<(StatusCode, Json<TicketView>)> {
    let new = validate_new(payload)?;
    let ticket = state.store.create(new).await?;
    info!(ticket_id = %ticket.id, "Ticket created");
    Ok((StatusCode::CREATED, Json(ticket.into())))
}

async fn get_ticket(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<TicketView>> {
    let ticket = load(&state, id).await?;
    Ok(Json(ticket.into()))
}

async fn update_ticket(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<TicketUpdate>,
) -> ApiResult<Json<TicketView>> {
    let update = validate_update(payload)?;
    let ticket = state.store.update_operator_fields(id, &update).await?;
    Ok(Json(ticket.into()))
}

/// Evaluate and, when ready, push the ticket to the CRM right away.
async fn sync_ticket(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<SyncResponse>> {
    let ticket = load(&state, id).await?;
    let decision = evaluate(&ticket);
    let outcome = state.engine.completion().handle(Some(&ticket)).await;
    Ok(Json(SyncResponse { decision, outcome }))
}

async fn run_sync_sweep(State(state): State<Arc<AppState>>) -> ApiResult<Json<SyncSweepResult>> {
    let started_at = Utc::now();
    let outcome = state.reconciler.run().await;
    record(
        &state.job_log,
        JobExecutionLog::for_sweep("Sync Reconciler (manual)", started_at, &outcome),
    )
    .await;
    Ok(Json(outcome?))
}

/// Recent job runs, newest last
async fn list_executions(State(state): State<Arc<AppState>>) -> Json<Vec<JobExecutionLog>> {
    Json(state.job_log.read().await.clone())
}

async fn load(state: &AppState, id: Uuid) -> ApiResult<Ticket> {
    state
        .store
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Ticket {}", id)))
}
