use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool, Row};

use crate::error::{AppError, AppResult};
use crate::models::Balance;

const BALANCE_COLUMNS: &str = "tenant_id::text AS tenant_id, current, updated_at";

/// Credit a tenant's running balance inside the caller's transaction.
/// The row is created lazily on first credit.
pub async fn credit_balance(
    conn: &mut PgConnection,
    tenant_id: &str,
    amount: Decimal,
) -> AppResult<Balance> {
    let balance = sqlx::query_as::<_, Balance>(&format!(
        "INSERT INTO balances (tenant_id, current)
         VALUES ($1::uuid, $2)
         ON CONFLICT (tenant_id)
         DO UPDATE SET current = balances.current + EXCLUDED.current, updated_at = now()
         RETURNING {BALANCE_COLUMNS}"
    ))
    .bind(tenant_id)
    .bind(amount)
    .fetch_one(conn)
    .await
    .map_err(|error| AppError::Dependency(format!("Failed to credit balance: {error}")))?;
    Ok(balance)
}

/// Current balance for a tenant; tenants with no confirmed payments yet
/// read as zero without materializing a row.
pub async fn get_balance(pool: &PgPool, tenant_id: &str) -> AppResult<Balance> {
    ensure_tenant_exists(pool, tenant_id).await?;

    let row = sqlx::query_as::<_, Balance>(&format!(
        "SELECT {BALANCE_COLUMNS} FROM balances WHERE tenant_id = $1::uuid"
    ))
    .bind(tenant_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.unwrap_or(Balance {
        tenant_id: tenant_id.to_string(),
        current: Decimal::ZERO,
        updated_at: Utc::now(),
    }))
}

/// Administrative reset back to zero.
pub async fn reset_balance(pool: &PgPool, tenant_id: &str) -> AppResult<Balance> {
    ensure_tenant_exists(pool, tenant_id).await?;

    let balance = sqlx::query_as::<_, Balance>(&format!(
        "INSERT INTO balances (tenant_id, current)
         VALUES ($1::uuid, 0)
         ON CONFLICT (tenant_id)
         DO UPDATE SET current = 0, updated_at = now()
         RETURNING {BALANCE_COLUMNS}"
    ))
    .bind(tenant_id)
    .fetch_one(pool)
    .await?;

    tracing::info!(tenant_id = %tenant_id, "Balance reset to zero");
    Ok(balance)
}

async fn ensure_tenant_exists(pool: &PgPool, tenant_id: &str) -> AppResult<()> {
    let row = sqlx::query("SELECT 1 AS one FROM tenants WHERE id = $1::uuid")
        .bind(tenant_id)
        .fetch_optional(pool)
        .await?;
    if row.and_then(|row| row.try_get::<i32, _>("one").ok()).is_none() {
        return Err(AppError::NotFound("Tenant not found.".to_string()));
    }
    Ok(())
}
