use axum::{extract::State, http::StatusCode, response::Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::AppState;

pub mod tickets;

pub use tickets::{job_routes, ticket_routes};

pub async fn health_check() -> (StatusCode, Json<serde_json::Value>) {
    (StatusCode::OK, Json(json!({"status": "healthy", "service": "triage-api"})))
}

#[derive(Debug, Serialize)]
pub struct HealthCheckResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub services: HashMap<String, ServiceStatus>,
}

#[derive(Debug, Serialize)]
pub struct ServiceStatus {
    pub status: String,
    pub response_time_ms: Option<u64>,
    pub details: Option<serde_json::Value>,
}

/// Liveness plus a round trip to the record store
pub async fn detailed_health_check(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<HealthCheckResponse>) {
    let started = Instant::now();
    let healthy = state.store.ping().await;

    let store_status = ServiceStatus {
        status: if healthy { "healthy" } else { "unhealthy" }.to_string(),
        response_time_ms: Some(started.elapsed().as_millis() as u64),
        details: Some(json!({ "backend": state.store_backend })),
    };

    let response = HealthCheckResponse {
        status: store_status.status.clone(),
        timestamp: Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        services: HashMap::from([("store".to_string(), store_status)]),
    };

    let code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(response))
}
