use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use serde_json::{json, Value};
use sqlx::{Postgres, QueryBuilder};

use crate::{
    auth::{require_admin, require_user_id},
    error::{AppError, AppResult},
    models::Tenant,
    schemas::{clamp_limit_in_range, validate_input, ArchiveInput, CreateTenantInput, TenantPath,
        TenantsQuery},
    services::{archive, audit::write_audit_log},
    state::AppState,
};

const TENANT_COLUMNS: &str = "id::text AS id, full_name, email, phone_e164, is_archived, \
     archived_at, archive_reason, created_at";

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/tenants",
            axum::routing::get(list_tenants).post(create_tenant),
        )
        .route(
            "/tenants/{tenant_id}",
            axum::routing::get(get_tenant).delete(remove_tenant),
        )
        .route(
            "/tenants/{tenant_id}/archive",
            axum::routing::post(archive_tenant),
        )
        .route(
            "/tenants/{tenant_id}/unarchive",
            axum::routing::post(unarchive_tenant),
        )
}

async fn create_tenant(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateTenantInput>,
) -> AppResult<impl IntoResponse> {
    let user_id = require_admin(&state, &headers).await?;
    validate_input(&payload)?;
    let pool = db_pool(&state)?;

    let tenant = sqlx::query_as::<_, Tenant>(&format!(
        "INSERT INTO tenants (full_name, email, phone_e164)
         VALUES ($1, $2, $3)
         RETURNING {TENANT_COLUMNS}"
    ))
    .bind(payload.full_name.trim())
    .bind(payload.email.as_deref().map(str::trim))
    .bind(payload.phone_e164.as_deref().map(str::trim))
    .fetch_one(pool)
    .await?;

    write_audit_log(
        state.db_pool.as_ref(),
        Some(&user_id),
        "create",
        "tenants",
        Some(&tenant.id),
        None,
        serde_json::to_value(&tenant).ok(),
    )
    .await;

    Ok((axum::http::StatusCode::CREATED, Json(tenant)))
}

async fn list_tenants(
    State(state): State<AppState>,
    Query(query): Query<TenantsQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_user_id(&state, &headers).await?;
    let pool = db_pool(&state)?;

    let mut builder =
        QueryBuilder::<Postgres>::new(format!("SELECT {TENANT_COLUMNS} FROM tenants WHERE 1=1"));
    if !query.include_archived {
        builder.push(" AND is_archived = false");
    }
    builder
        .push(" ORDER BY created_at DESC LIMIT ")
        .push_bind(clamp_limit_in_range(query.limit, 1, 1000));

    let tenants = builder
        .build_query_as::<Tenant>()
        .fetch_all(pool)
        .await?;
    Ok(Json(json!({ "data": tenants })))
}

async fn get_tenant(
    State(state): State<AppState>,
    Path(path): Path<TenantPath>,
    headers: HeaderMap,
) -> AppResult<Json<Tenant>> {
    require_user_id(&state, &headers).await?;
    let pool = db_pool(&state)?;

    let tenant = sqlx::query_as::<_, Tenant>(&format!(
        "SELECT {TENANT_COLUMNS} FROM tenants WHERE id = $1::uuid"
    ))
    .bind(&path.tenant_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Tenant not found.".to_string()))?;
    Ok(Json(tenant))
}

async fn archive_tenant(
    State(state): State<AppState>,
    Path(path): Path<TenantPath>,
    headers: HeaderMap,
    payload: Option<Json<ArchiveInput>>,
) -> AppResult<Json<Tenant>> {
    let user_id = require_admin(&state, &headers).await?;
    let pool = db_pool(&state)?;

    let reason = payload.as_ref().and_then(|body| body.reason.as_deref());
    let tenant = archive::archive_tenant(pool, &path.tenant_id, &user_id, reason).await?;

    write_audit_log(
        state.db_pool.as_ref(),
        Some(&user_id),
        "archive",
        "tenants",
        Some(&tenant.id),
        None,
        serde_json::to_value(&tenant).ok(),
    )
    .await;

    Ok(Json(tenant))
}

async fn unarchive_tenant(
    State(state): State<AppState>,
    Path(path): Path<TenantPath>,
    headers: HeaderMap,
) -> AppResult<Json<Tenant>> {
    let user_id = require_admin(&state, &headers).await?;
    let pool = db_pool(&state)?;

    let tenant = archive::unarchive_tenant(pool, &path.tenant_id).await?;

    write_audit_log(
        state.db_pool.as_ref(),
        Some(&user_id),
        "unarchive",
        "tenants",
        Some(&tenant.id),
        None,
        serde_json::to_value(&tenant).ok(),
    )
    .await;

    Ok(Json(tenant))
}

async fn remove_tenant(
    State(state): State<AppState>,
    Path(path): Path<TenantPath>,
    headers: HeaderMap,
) -> AppResult<impl IntoResponse> {
    let user_id = require_admin(&state, &headers).await?;
    let pool = db_pool(&state)?;

    archive::remove_tenant(pool, &path.tenant_id).await?;

    write_audit_log(
        state.db_pool.as_ref(),
        Some(&user_id),
        "delete",
        "tenants",
        Some(&path.tenant_id),
        None,
        None,
    )
    .await;

    Ok(Json(json!({ "deleted": true })))
}

fn db_pool(state: &AppState) -> AppResult<&sqlx::PgPool> {
    state.db_pool.as_ref().ok_or_else(|| {
        AppError::Dependency("Database is not configured. Set DATABASE_URL.".to_string())
    })
}
