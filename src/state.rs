use std::time::Duration;

use moka::future::Cache;
use sqlx::PgPool;

use crate::config::AppConfig;
use crate::db::build_pg_pool;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub db_pool: Option<PgPool>,
    pub http_client: reqwest::Client,
    /// user_id -> role, so the admin gate doesn't hit app_users on every call.
    pub role_cache: Cache<String, String>,
}

impl AppState {
    pub fn build(config: AppConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let db_pool = build_pg_pool(&config);
        if db_pool.is_none() {
            tracing::warn!("DATABASE_URL is not set — all data endpoints will fail");
        }

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;

        let role_cache = Cache::builder()
            .time_to_live(Duration::from_secs(config.role_cache_ttl_seconds))
            .max_capacity(config.role_cache_max_entries)
            .build();

        Ok(Self {
            config,
            db_pool,
            http_client,
            role_cache,
        })
    }
}
