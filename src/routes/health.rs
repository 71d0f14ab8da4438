use std::time::Duration;

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde_json::{json, Value};

use crate::state::AppState;

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let db_ok = match &state.db_pool {
        Some(pool) => probe_db(pool).await,
        // No DB configured: report healthy so the process can still boot.
        None => true,
    };

    Json(json!({
        "status": if db_ok { "ok" } else { "degraded" },
        "service": state.config.app_name,
        "environment": state.config.environment,
        "now": Utc::now().to_rfc3339(),
        "db": db_ok
    }))
}

/// Short-timeout probe so the healthcheck answers quickly even when the
/// first pooled connection hangs on DNS/TLS/TCP.
async fn probe_db(pool: &sqlx::PgPool) -> bool {
    match tokio::time::timeout(Duration::from_secs(3), sqlx::query("SELECT 1").fetch_one(pool))
        .await
    {
        Ok(Ok(_)) => true,
        Ok(Err(error)) => {
            tracing::error!(error = %error, "Health check DB query failed");
            false
        }
        Err(_) => {
            tracing::error!("Health check DB query timed out (3s)");
            false
        }
    }
}
