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
    models::{Unit, UnitStatus},
    schemas::{clamp_limit_in_range, validate_input, CreateUnitInput, UnitPath, UnitsQuery,
        UpdateUnitStatusInput},
    services::audit::write_audit_log,
    state::AppState,
};

const UNIT_COLUMNS: &str = "id::text AS id, name, status, created_at, updated_at";

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route("/units", axum::routing::get(list_units).post(create_unit))
        .route("/units/{unit_id}", axum::routing::get(get_unit))
        .route(
            "/units/{unit_id}/status",
            axum::routing::patch(update_unit_status),
        )
}

async fn create_unit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateUnitInput>,
) -> AppResult<impl IntoResponse> {
    let user_id = require_admin(&state, &headers).await?;
    validate_input(&payload)?;
    let pool = db_pool(&state)?;

    let status = match payload.status.as_str() {
        "free" | "maintenance" => payload.status.as_str(),
        other => {
            return Err(AppError::BadRequest(format!(
                "Unit cannot be created as '{other}'. Occupancy is derived from contracts."
            )));
        }
    };

    let unit = sqlx::query_as::<_, Unit>(&format!(
        "INSERT INTO units (name, status) VALUES ($1, $2) RETURNING {UNIT_COLUMNS}"
    ))
    .bind(payload.name.trim())
    .bind(status)
    .fetch_one(pool)
    .await?;

    write_audit_log(
        state.db_pool.as_ref(),
        Some(&user_id),
        "create",
        "units",
        Some(&unit.id),
        None,
        serde_json::to_value(&unit).ok(),
    )
    .await;

    Ok((axum::http::StatusCode::CREATED, Json(unit)))
}

async fn list_units(
    State(state): State<AppState>,
    Query(query): Query<UnitsQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_user_id(&state, &headers).await?;
    let pool = db_pool(&state)?;

    let mut builder =
        QueryBuilder::<Postgres>::new(format!("SELECT {UNIT_COLUMNS} FROM units WHERE 1=1"));
    if let Some(status) = non_empty_opt(query.status.as_deref()) {
        builder.push(" AND status = ").push_bind(status);
    }
    builder
        .push(" ORDER BY created_at DESC LIMIT ")
        .push_bind(clamp_limit_in_range(query.limit, 1, 1000));

    let units = builder
        .build_query_as::<Unit>()
        .fetch_all(pool)
        .await?;
    Ok(Json(json!({ "data": units })))
}

async fn get_unit(
    State(state): State<AppState>,
    Path(path): Path<UnitPath>,
    headers: HeaderMap,
) -> AppResult<Json<Unit>> {
    require_user_id(&state, &headers).await?;
    let pool = db_pool(&state)?;

    let unit = fetch_unit(pool, &path.unit_id).await?;
    Ok(Json(unit))
}

/// Manual status changes only move between free and maintenance; busy is
/// owned by the contract state machine.
async fn update_unit_status(
    State(state): State<AppState>,
    Path(path): Path<UnitPath>,
    headers: HeaderMap,
    Json(payload): Json<UpdateUnitStatusInput>,
) -> AppResult<Json<Unit>> {
    let user_id = require_admin(&state, &headers).await?;
    let pool = db_pool(&state)?;

    let requested = UnitStatus::parse(payload.status.trim()).ok_or_else(|| {
        AppError::BadRequest(format!("Unknown unit status '{}'.", payload.status))
    })?;
    if requested == UnitStatus::Busy {
        return Err(AppError::BadRequest(
            "A unit cannot be marked busy directly; occupancy follows its contract.".to_string(),
        ));
    }

    let before = fetch_unit(pool, &path.unit_id).await?;
    if before.status == "busy" {
        return Err(AppError::Conflict(
            "Unit is busy under a contract and cannot be retagged.".to_string(),
        ));
    }

    let unit = sqlx::query_as::<_, Unit>(&format!(
        "UPDATE units SET status = $2, updated_at = now() WHERE id = $1::uuid
         RETURNING {UNIT_COLUMNS}"
    ))
    .bind(&path.unit_id)
    .bind(requested.as_str())
    .fetch_one(pool)
    .await?;

    write_audit_log(
        state.db_pool.as_ref(),
        Some(&user_id),
        "update_status",
        "units",
        Some(&unit.id),
        serde_json::to_value(&before).ok(),
        serde_json::to_value(&unit).ok(),
    )
    .await;

    Ok(Json(unit))
}

async fn fetch_unit(pool: &sqlx::PgPool, unit_id: &str) -> AppResult<Unit> {
    sqlx::query_as::<_, Unit>(&format!(
        "SELECT {UNIT_COLUMNS} FROM units WHERE id = $1::uuid"
    ))
    .bind(unit_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Unit not found.".to_string()))
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
