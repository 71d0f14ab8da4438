use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};

use crate::{
    auth::{require_admin, require_user_id},
    error::{AppError, AppResult},
    models::Balance,
    schemas::TenantPath,
    services::{audit::write_audit_log, balances},
    state::AppState,
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/tenants/{tenant_id}/balance",
            axum::routing::get(get_balance),
        )
        .route(
            "/tenants/{tenant_id}/balance/reset",
            axum::routing::post(reset_balance),
        )
}

async fn get_balance(
    State(state): State<AppState>,
    Path(path): Path<TenantPath>,
    headers: HeaderMap,
) -> AppResult<Json<Balance>> {
    require_user_id(&state, &headers).await?;
    let pool = db_pool(&state)?;

    let balance = balances::get_balance(pool, &path.tenant_id).await?;
    Ok(Json(balance))
}

async fn reset_balance(
    State(state): State<AppState>,
    Path(path): Path<TenantPath>,
    headers: HeaderMap,
) -> AppResult<Json<Balance>> {
    let user_id = require_admin(&state, &headers).await?;
    let pool = db_pool(&state)?;

    let balance = balances::reset_balance(pool, &path.tenant_id).await?;

    write_audit_log(
        state.db_pool.as_ref(),
        Some(&user_id),
        "reset",
        "balances",
        Some(&path.tenant_id),
        None,
        serde_json::to_value(&balance).ok(),
    )
    .await;

    Ok(Json(balance))
}

fn db_pool(state: &AppState) -> AppResult<&sqlx::PgPool> {
    state.db_pool.as_ref().ok_or_else(|| {
        AppError::Dependency("Database is not configured. Set DATABASE_URL.".to_string())
    })
}
