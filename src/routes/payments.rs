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
    models::{Payment, PaymentStatus},
    schemas::{clamp_limit_in_range, CreatePaymentInput, PaymentPath, PaymentsQuery},
    services::{
        audit::write_audit_log,
        notifications,
        payments::{self, PAYMENT_COLUMNS},
    },
    state::AppState,
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/payments",
            axum::routing::get(list_payments).post(create_payment),
        )
        .route("/payments/{payment_id}", axum::routing::get(get_payment))
        .route(
            "/payments/{payment_id}/confirm",
            axum::routing::post(confirm_payment),
        )
        .route(
            "/payments/{payment_id}/cancel",
            axum::routing::post(cancel_payment),
        )
}

async fn create_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreatePaymentInput>,
) -> AppResult<impl IntoResponse> {
    let user_id = require_admin(&state, &headers).await?;
    let pool = db_pool(&state)?;

    let payment = payments::create_payment(pool, &payload).await?;

    write_audit_log(
        state.db_pool.as_ref(),
        Some(&user_id),
        "create",
        "payments",
        Some(&payment.id),
        None,
        serde_json::to_value(&payment).ok(),
    )
    .await;

    notifications::notify_admins(
        &state,
        notifications::payment_received(
            &payment.id,
            &payment.invoice_id,
            &payment.amount.to_string(),
        ),
    )
    .await;

    Ok((axum::http::StatusCode::CREATED, Json(payment)))
}

async fn confirm_payment(
    State(state): State<AppState>,
    Path(path): Path<PaymentPath>,
    headers: HeaderMap,
) -> AppResult<Json<Payment>> {
    let user_id = require_admin(&state, &headers).await?;
    let pool = db_pool(&state)?;

    let payment = payments::confirm_payment(pool, &path.payment_id).await?;

    write_audit_log(
        state.db_pool.as_ref(),
        Some(&user_id),
        "confirm",
        "payments",
        Some(&payment.id),
        None,
        serde_json::to_value(&payment).ok(),
    )
    .await;

    Ok(Json(payment))
}

async fn cancel_payment(
    State(state): State<AppState>,
    Path(path): Path<PaymentPath>,
    headers: HeaderMap,
) -> AppResult<Json<Payment>> {
    let user_id = require_admin(&state, &headers).await?;
    let pool = db_pool(&state)?;

    let payment = payments::cancel_payment(pool, &path.payment_id).await?;

    write_audit_log(
        state.db_pool.as_ref(),
        Some(&user_id),
        "cancel",
        "payments",
        Some(&payment.id),
        None,
        serde_json::to_value(&payment).ok(),
    )
    .await;

    Ok(Json(payment))
}

async fn list_payments(
    State(state): State<AppState>,
    Query(query): Query<PaymentsQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_user_id(&state, &headers).await?;
    let pool = db_pool(&state)?;

    let mut builder = QueryBuilder::<Postgres>::new(format!(
        "SELECT {PAYMENT_COLUMNS} FROM payments WHERE 1=1"
    ));
    if let Some(invoice_id) = non_empty_opt(query.invoice_id.as_deref()) {
        builder
            .push(" AND invoice_id = ")
            .push_bind(invoice_id)
            .push("::uuid");
    }
    if let Some(status) = non_empty_opt(query.status.as_deref()) {
        let status = PaymentStatus::parse(&status).ok_or_else(|| {
            AppError::BadRequest(format!("Unknown payment status '{status}'."))
        })?;
        builder.push(" AND status = ").push_bind(status.as_str());
    }
    if !query.include_archived {
        builder.push(" AND is_archived = false");
    }
    builder
        .push(" ORDER BY created_at DESC LIMIT ")
        .push_bind(clamp_limit_in_range(query.limit, 1, 1000));

    let rows = builder
        .build_query_as::<Payment>()
        .fetch_all(pool)
        .await?;
    Ok(Json(json!({ "data": rows })))
}

async fn get_payment(
    State(state): State<AppState>,
    Path(path): Path<PaymentPath>,
    headers: HeaderMap,
) -> AppResult<Json<Payment>> {
    require_user_id(&state, &headers).await?;
    let pool = db_pool(&state)?;

    let payment = sqlx::query_as::<_, Payment>(&format!(
        "SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1::uuid"
    ))
    .bind(&path.payment_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Payment not found.".to_string()))?;
    Ok(Json(payment))
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
