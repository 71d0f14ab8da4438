use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use sqlx::{Postgres, QueryBuilder, Row};

use crate::{
    auth::{require_admin, require_user_id},
    error::{AppError, AppResult},
    models::{Invoice, InvoiceStatus},
    schemas::{clamp_limit_in_range, ArchiveInput, CreateInvoiceInput, InvoicePath, InvoicesQuery},
    services::{archive, audit::write_audit_log},
    state::AppState,
};

const INVOICE_COLUMNS: &str = "id::text AS id, contract_id::text AS contract_id, due_date, \
     amount, status, is_archived, archived_at, archive_reason, created_at, updated_at";

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/invoices",
            axum::routing::get(list_invoices).post(create_invoice),
        )
        .route(
            "/invoices/{invoice_id}",
            axum::routing::get(get_invoice).delete(remove_invoice),
        )
        .route(
            "/invoices/{invoice_id}/archive",
            axum::routing::post(archive_invoice),
        )
        .route(
            "/invoices/{invoice_id}/unarchive",
            axum::routing::post(unarchive_invoice),
        )
}

/// Explicitly create one invoice outside the generated monthly schedule.
/// The (contract_id, due_date) unique key keeps the schedule free of
/// duplicates, so a second create for the same month conflicts.
async fn create_invoice(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateInvoiceInput>,
) -> AppResult<impl IntoResponse> {
    let user_id = require_admin(&state, &headers).await?;
    let pool = db_pool(&state)?;

    if payload.amount <= Decimal::ZERO {
        return Err(AppError::BadRequest(
            "amount must be a positive decimal.".to_string(),
        ));
    }

    let contract_row = sqlx::query("SELECT is_archived FROM contracts WHERE id = $1::uuid")
        .bind(&payload.contract_id)
        .fetch_optional(pool)
        .await?;
    let Some(contract_row) = contract_row else {
        return Err(AppError::NotFound("Contract not found.".to_string()));
    };
    if contract_row
        .try_get::<bool, _>("is_archived")
        .unwrap_or(false)
    {
        return Err(AppError::Conflict(
            "Contract is archived and cannot receive invoices.".to_string(),
        ));
    }

    let invoice = sqlx::query_as::<_, Invoice>(&format!(
        "INSERT INTO invoices (contract_id, due_date, amount, status)
         VALUES ($1::uuid, $2, $3, 'pending')
         ON CONFLICT (contract_id, due_date) DO NOTHING
         RETURNING {INVOICE_COLUMNS}"
    ))
    .bind(&payload.contract_id)
    .bind(payload.due_date)
    .bind(payload.amount)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| {
        AppError::Conflict(format!(
            "An invoice for {} already exists on this contract.",
            payload.due_date
        ))
    })?;

    write_audit_log(
        state.db_pool.as_ref(),
        Some(&user_id),
        "create",
        "invoices",
        Some(&invoice.id),
        None,
        serde_json::to_value(&invoice).ok(),
    )
    .await;

    Ok((axum::http::StatusCode::CREATED, Json(invoice)))
}

async fn list_invoices(
    State(state): State<AppState>,
    Query(query): Query<InvoicesQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_user_id(&state, &headers).await?;
    let pool = db_pool(&state)?;

    let mut builder = QueryBuilder::<Postgres>::new(format!(
        "SELECT {INVOICE_COLUMNS} FROM invoices WHERE 1=1"
    ));
    if let Some(contract_id) = non_empty_opt(query.contract_id.as_deref()) {
        builder
            .push(" AND contract_id = ")
            .push_bind(contract_id)
            .push("::uuid");
    }
    if let Some(status) = non_empty_opt(query.status.as_deref()) {
        let status = InvoiceStatus::parse(&status).ok_or_else(|| {
            AppError::BadRequest(format!("Unknown invoice status '{status}'."))
        })?;
        builder.push(" AND status = ").push_bind(status.as_str());
    }
    if !query.include_archived {
        builder.push(" AND is_archived = false");
    }
    builder
        .push(" ORDER BY due_date ASC LIMIT ")
        .push_bind(clamp_limit_in_range(query.limit, 1, 1000));

    let rows = builder
        .build_query_as::<Invoice>()
        .fetch_all(pool)
        .await?;
    Ok(Json(json!({ "data": rows })))
}

async fn get_invoice(
    State(state): State<AppState>,
    Path(path): Path<InvoicePath>,
    headers: HeaderMap,
) -> AppResult<Json<Invoice>> {
    require_user_id(&state, &headers).await?;
    let pool = db_pool(&state)?;

    let invoice = sqlx::query_as::<_, Invoice>(&format!(
        "SELECT {INVOICE_COLUMNS} FROM invoices WHERE id = $1::uuid"
    ))
    .bind(&path.invoice_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Invoice not found.".to_string()))?;
    Ok(Json(invoice))
}

async fn archive_invoice(
    State(state): State<AppState>,
    Path(path): Path<InvoicePath>,
    headers: HeaderMap,
    payload: Option<Json<ArchiveInput>>,
) -> AppResult<Json<Invoice>> {
    let user_id = require_admin(&state, &headers).await?;
    let pool = db_pool(&state)?;

    let reason = payload.as_ref().and_then(|body| body.reason.as_deref());
    let invoice = archive::archive_invoice(pool, &path.invoice_id, &user_id, reason).await?;

    write_audit_log(
        state.db_pool.as_ref(),
        Some(&user_id),
        "archive",
        "invoices",
        Some(&invoice.id),
        None,
        serde_json::to_value(&invoice).ok(),
    )
    .await;

    Ok(Json(invoice))
}

async fn unarchive_invoice(
    State(state): State<AppState>,
    Path(path): Path<InvoicePath>,
    headers: HeaderMap,
) -> AppResult<Json<Invoice>> {
    let user_id = require_admin(&state, &headers).await?;
    let pool = db_pool(&state)?;

    let invoice = archive::unarchive_invoice(pool, &path.invoice_id).await?;

    write_audit_log(
        state.db_pool.as_ref(),
        Some(&user_id),
        "unarchive",
        "invoices",
        Some(&invoice.id),
        None,
        serde_json::to_value(&invoice).ok(),
    )
    .await;

    Ok(Json(invoice))
}

async fn remove_invoice(
    State(state): State<AppState>,
    Path(path): Path<InvoicePath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user_id = require_admin(&state, &headers).await?;
    let pool = db_pool(&state)?;

    archive::remove_invoice(pool, &path.invoice_id).await?;

    write_audit_log(
        state.db_pool.as_ref(),
        Some(&user_id),
        "delete",
        "invoices",
        Some(&path.invoice_id),
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
