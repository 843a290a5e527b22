use sqlx::{migrate::MigrateDatabase, postgres::PgPoolOptions, PgPool, Postgres};

use crate::config::PoolConfig;

/// Open the ticket database, creating it on first start.
pub async fn create_pool(database_url: &str, pool: &PoolConfig) -> anyhow::Result<PgPool> {
    if !Postgres::database_exists(database_url).await? {
        Postgres::create_database(database_url).await?;
        tracing::info!("Created ticket database");
    }

    let connections = PgPoolOptions::new()
        .max_connections(pool.max_connections)
        .min_connections(pool.min_connections)
        .acquire_timeout(pool.acquire_timeout)
        .idle_timeout(pool.idle_timeout)
        .max_lifetime(pool.max_lifetime)
        .test_before_acquire(true)
        .connect(database_url)
        .await?;

    tracing::info!(
        max = pool.max_connections,
        min = pool.min_connections,
        "Ticket database pool ready"
    );
    Ok(connections)
}

pub async fn migrate(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("Ticket migrations applied");
    Ok(())
}

/// Store liveness check for the detailed health endpoint
pub async fn health_check(pool: &PgPool) -> bool {
    sqlx::query("SELECT 1").execute(pool).await.is_ok()
}
