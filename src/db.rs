use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::config::AppConfig;

/// Build the Postgres pool lazily: connections are only opened on first
/// use, so the API can boot (and serve its healthcheck) before the
/// database is reachable.
pub fn build_pg_pool(config: &AppConfig) -> Option<PgPool> {
    let url = config.database_url.as_deref()?;

    match PgPoolOptions::new()
        .max_connections(config.db_pool_max_connections)
        .min_connections(config.db_pool_min_connections)
        .acquire_timeout(Duration::from_secs(config.db_pool_acquire_timeout_seconds))
        .idle_timeout(Duration::from_secs(config.db_pool_idle_timeout_seconds))
        .connect_lazy(url)
    {
        Ok(pool) => Some(pool),
        Err(error) => {
            tracing::error!(error = %error, "Invalid DATABASE_URL; running without a database");
            None
        }
    }
}
