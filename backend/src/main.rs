use axum::{
    http::Method,
    routing::get,
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;
mod database;
mod error;
mod handlers;
mod integrations;
mod jobs;
mod store;
mod validation;
mod workflows;

pub use error::{ApiError, ApiResult, AppError};


use config::{Config, StoreBackend};
use integrations::{http_client, CloudLanguageClient, MlEngineClient, SalesforceClient};
use jobs::{ExecutionLog, JobScheduler, SyncReconcilerJob};
use store::{MemoryTicketStore, NotifyingStore, PgTicketStore, TicketStore};
use workflows::{build_engine, event_channel, EventSender, Services, TriggerEngine};

pub struct AppState {
    pub store: Arc<dyn TicketStore>,
    pub store_backend: StoreBackend,
    pub engine: Arc<TriggerEngine>,
    pub reconciler: Arc<SyncReconcilerJob>,
    pub job_log: ExecutionLog,
}

pub fn app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PATCH])
        .allow_headers(Any);

    Router::new()
        .route("/", get(|| async { "Triage API v1.0.0" }))
        .route("/health", get(handlers::health_check))
        .route("/health/detailed", get(handlers::detailed_health_check))
        .nest("/api/v1/tickets", handlers::ticket_routes())
        .nest("/api/v1/jobs", handlers::job_routes())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

async fn open_store(config: &Config, events: EventSender) -> anyhow::Result<Arc<dyn TicketStore>> {
    let store: Arc<dyn TicketStore> = match config.store_backend {
        StoreBackend::Postgres => {
            let pool = database::create_pool(&config.database_url, &config.pool).await?;
            database::migrate(&pool).await?;
            Arc::new(NotifyingStore::new(PgTicketStore::new(pool), events))
        }
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory ticket store; records are lost on restart");
            Arc::new(NotifyingStore::new(MemoryTicketStore::new(), events))
        }
    };
    Ok(store)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("triage_backend=info,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let (events_tx, events_rx) = event_channel();
    let store = open_store(&config, events_tx).await?;

    let client = http_client(config.http_timeout)?;
    let services = Services {
        prediction: Arc::new(MlEngineClient::new(client.clone(), &config.model)),
        language: Arc::new(CloudLanguageClient::new(client.clone(), &config.language)),
        crm: Arc::new(SalesforceClient::new(client, config.crm.clone())),
    };

    let engine = Arc::new(build_engine(
        store.clone(),
        services,
        &config.model,
        &config.sync,
        &config.crm.supplied_email,
    ));
    let engine_task = engine.clone().spawn(events_rx);

    let reconciler = Arc::new(SyncReconcilerJob::new(
        store.clone(),
        engine.clone(),
        config.sync.clone(),
    ));
    let job_log = ExecutionLog::default();
    let mut scheduler = JobScheduler::new(
        reconciler.clone(),
        config.sync.sweep_interval_minutes,
        job_log.clone(),
    )
    .await?;
    scheduler.start().await?;

    let app_state = Arc::new(AppState {
        store,
        store_backend: config.store_backend,
        engine,
        reconciler,
        job_log,
    });

    let listener = tokio::net::TcpListener::bind(&config.server_addr).await?;
    tracing::info!("Server running on {}", config.server_addr);

    axum::serve(listener, app(app_state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        })
        .await?;

    scheduler.shutdown().await?;
    engine_task.abort();

    Ok(())
}
