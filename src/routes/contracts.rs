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
    models::{Contract, ContractStatus},
    schemas::{clamp_limit_in_range, ArchiveInput, ChangeContractStatusInput, ContractPath,
        ContractsQuery, CreateContractInput},
    services::{
        archive,
        audit::write_audit_log,
        contracts::{self, CONTRACT_COLUMNS},
        notifications,
    },
    state::AppState,
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/contracts",
            axum::routing::get(list_contracts).post(create_contract),
        )
        .route(
            "/contracts/{contract_id}",
            axum::routing::get(get_contract).delete(remove_contract),
        )
        .route(
            "/contracts/{contract_id}/status",
            axum::routing::post(change_contract_status),
        )
        .route(
            "/contracts/{contract_id}/archive",
            axum::routing::post(archive_contract),
        )
        .route(
            "/contracts/{contract_id}/unarchive",
            axum::routing::post(unarchive_contract),
        )
}

async fn create_contract(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateContractInput>,
) -> AppResult<impl IntoResponse> {
    let user_id = require_admin(&state, &headers).await?;
    let pool = db_pool(&state)?;

    let contract = contracts::create_contract(pool, &payload).await?;

    write_audit_log(
        state.db_pool.as_ref(),
        Some(&user_id),
        "create",
        "contracts",
        Some(&contract.id),
        None,
        serde_json::to_value(&contract).ok(),
    )
    .await;

    notifications::notify_admins(
        &state,
        notifications::contract_created(&contract.id, &contract.tenant_id, &contract.unit_id),
    )
    .await;

    Ok((axum::http::StatusCode::CREATED, Json(contract)))
}

async fn change_contract_status(
    State(state): State<AppState>,
    Path(path): Path<ContractPath>,
    headers: HeaderMap,
    Json(payload): Json<ChangeContractStatusInput>,
) -> AppResult<Json<Value>> {
    let user_id = require_admin(&state, &headers).await?;
    let pool = db_pool(&state)?;

    let outcome = contracts::change_status(pool, &path.contract_id, payload.status.trim()).await?;

    write_audit_log(
        state.db_pool.as_ref(),
        Some(&user_id),
        "change_status",
        "contracts",
        Some(&outcome.contract.id),
        None,
        serde_json::to_value(&outcome.contract).ok(),
    )
    .await;

    Ok(Json(json!({
        "data": outcome.contract,
        "invoices_generated": outcome.invoices_generated,
    })))
}

async fn list_contracts(
    State(state): State<AppState>,
    Query(query): Query<ContractsQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_user_id(&state, &headers).await?;
    let pool = db_pool(&state)?;

    let mut builder = QueryBuilder::<Postgres>::new(format!(
        "SELECT {CONTRACT_COLUMNS} FROM contracts WHERE 1=1"
    ));
    if let Some(status) = non_empty_opt(query.status.as_deref()) {
        let status = ContractStatus::parse(&status).ok_or_else(|| {
            AppError::BadRequest(format!("Unknown contract status '{status}'."))
        })?;
        builder.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(tenant_id) = non_empty_opt(query.tenant_id.as_deref()) {
        builder.push(" AND tenant_id = ").push_bind(tenant_id).push("::uuid");
    }
    if let Some(unit_id) = non_empty_opt(query.unit_id.as_deref()) {
        builder.push(" AND unit_id = ").push_bind(unit_id).push("::uuid");
    }
    if !query.include_archived {
        builder.push(" AND is_archived = false");
    }
    builder
        .push(" ORDER BY created_at DESC LIMIT ")
        .push_bind(clamp_limit_in_range(query.limit, 1, 1000));

    let rows = builder
        .build_query_as::<Contract>()
        .fetch_all(pool)
        .await?;
    Ok(Json(json!({ "data": rows })))
}

async fn get_contract(
    State(state): State<AppState>,
    Path(path): Path<ContractPath>,
    headers: HeaderMap,
) -> AppResult<Json<Contract>> {
    require_user_id(&state, &headers).await?;
    let pool = db_pool(&state)?;

    let contract = sqlx::query_as::<_, Contract>(&format!(
        "SELECT {CONTRACT_COLUMNS} FROM contracts WHERE id = $1::uuid"
    ))
    .bind(&path.contract_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Contract not found.".to_string()))?;
    Ok(Json(contract))
}

async fn archive_contract(
    State(state): State<AppState>,
    Path(path): Path<ContractPath>,
    headers: HeaderMap,
    payload: Option<Json<ArchiveInput>>,
) -> AppResult<Json<Contract>> {
    let user_id = require_admin(&state, &headers).await?;
    let pool = db_pool(&state)?;

    let reason = payload.as_ref().and_then(|body| body.reason.as_deref());
    let contract = archive::archive_contract(pool, &path.contract_id, &user_id, reason).await?;

    write_audit_log(
        state.db_pool.as_ref(),
        Some(&user_id),
        "archive",
        "contracts",
        Some(&contract.id),
        None,
        serde_json::to_value(&contract).ok(),
    )
    .await;

    Ok(Json(contract))
}

async fn unarchive_contract(
    State(state): State<AppState>,
    Path(path): Path<ContractPath>,
    headers: HeaderMap,
) -> AppResult<Json<Contract>> {
    let user_id = require_admin(&state, &headers).await?;
    let pool = db_pool(&state)?;

    let contract = archive::unarchive_contract(pool, &path.contract_id).await?;

    write_audit_log(
        state.db_pool.as_ref(),
        Some(&user_id),
        "unarchive",
        "contracts",
        Some(&contract.id),
        None,
        serde_json::to_value(&contract).ok(),
    )
    .await;

    Ok(Json(contract))
}

async fn remove_contract(
    State(state): State<AppState>,
    Path(path): Path<ContractPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user_id = require_admin(&state, &headers).await?;
    let pool = db_pool(&state)?;

    archive::remove_contract(pool, &path.contract_id).await?;

    write_audit_log(
        state.db_pool.as_ref(),
        Some(&user_id),
        "delete",
        "contracts",
        Some(&path.contract_id),
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

fn non_empty_opt(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(ToOwned::to_owned)
}
