use rust_decimal::Decimal;
use sqlx::{PgPool, Row};

use crate::error::{AppError, AppResult};
use crate::models::{Contract, ContractStatus};
use crate::schemas::CreateContractInput;
use crate::services::invoice_schedule;

pub const CONTRACT_COLUMNS: &str = "id::text AS id, tenant_id::text AS tenant_id, \
     unit_id::text AS unit_id, start_date, end_date, amount, status, is_archived, \
     archived_at, archive_reason, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct TransitionOutcome {
    pub contract: Contract,
    pub invoices_generated: u64,
}

/// Create a draft contract and mark its unit busy, atomically.
///
/// The unit row is locked first so two concurrent creations cannot both
/// observe it free and double-book it.
pub async fn create_contract(pool: &PgPool, input: &CreateContractInput) -> AppResult<Contract> {
    if input.end_date < input.start_date {
        return Err(AppError::BadRequest(
            "end_date must be on or after start_date.".to_string(),
        ));
    }
    if input.amount <= Decimal::ZERO {
        return Err(AppError::BadRequest(
            "amount must be a positive decimal.".to_string(),
        ));
    }

    let mut tx = pool.begin().await?;

    let unit_row = sqlx::query("SELECT status FROM units WHERE id = $1::uuid FOR UPDATE")
        .bind(&input.unit_id)
        .fetch_optional(&mut *tx)
        .await?;
    let Some(unit_row) = unit_row else {
        return Err(AppError::NotFound("Unit not found.".to_string()));
    };
    let unit_status = unit_row
        .try_get::<String, _>("status")
        .unwrap_or_default();
    if unit_status != "free" {
        return Err(AppError::UnitUnavailable(format!(
            "Unit is {unit_status} and cannot be leased."
        )));
    }

    let tenant_row = sqlx::query("SELECT is_archived FROM tenants WHERE id = $1::uuid")
        .bind(&input.tenant_id)
        .fetch_optional(&mut *tx)
        .await?;
    let Some(tenant_row) = tenant_row else {
        return Err(AppError::NotFound("Tenant not found.".to_string()));
    };
    if tenant_row.try_get::<bool, _>("is_archived").unwrap_or(false) {
        return Err(AppError::Conflict(
            "Tenant is archived and cannot take a new contract.".to_string(),
        ));
    }

    let contract = sqlx::query_as::<_, Contract>(&format!(
        "INSERT INTO contracts (tenant_id, unit_id, start_date, end_date, amount, status)
         VALUES ($1::uuid, $2::uuid, $3, $4, $5, 'draft')
         RETURNING {CONTRACT_COLUMNS}"
    ))
    .bind(&input.tenant_id)
    .bind(&input.unit_id)
    .bind(input.start_date)
    .bind(input.end_date)
    .bind(input.amount)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query("UPDATE units SET status = 'busy', updated_at = now() WHERE id = $1::uuid")
        .bind(&input.unit_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    tracing::info!(
        contract_id = %contract.id,
        unit_id = %contract.unit_id,
        tenant_id = %contract.tenant_id,
        "Contract created as draft; unit marked busy"
    );
    Ok(contract)
}

/// Apply one transition from the table, with its unit side effect and
/// (on draft -> active) first-time invoice generation, in one transaction.
pub async fn change_status(
    pool: &PgPool,
    contract_id: &str,
    requested_raw: &str,
) -> AppResult<TransitionOutcome> {
    let requested = ContractStatus::parse(requested_raw).ok_or_else(|| {
        AppError::BadRequest(format!("Unknown contract status '{requested_raw}'."))
    })?;

    let mut tx = pool.begin().await?;

    let contract = sqlx::query_as::<_, Contract>(&format!(
        "SELECT {CONTRACT_COLUMNS} FROM contracts WHERE id = $1::uuid FOR UPDATE"
    ))
    .bind(contract_id)
    .fetch_optional(&mut *tx)
    .await?;
    let Some(contract) = contract else {
        return Err(AppError::NotFound("Contract not found.".to_string()));
    };
    if contract.is_archived {
        return Err(AppError::Conflict(
            "Contract is archived and cannot change status.".to_string(),
        ));
    }

    let current = ContractStatus::parse(&contract.status).ok_or_else(|| {
        AppError::Internal(format!(
            "Contract {contract_id} carries unknown status '{}'.",
            contract.status
        ))
    })?;
    if !current.can_transition(requested) {
        return Err(AppError::InvalidTransition {
            current: contract.status.clone(),
            requested: requested_raw.to_string(),
            allowed: current
                .allowed_transitions()
                .iter()
                .map(|status| status.as_str())
                .collect(),
        });
    }

    let mut invoices_generated = 0u64;
    match requested {
        ContractStatus::Active => {
            // Idempotent: the unit is usually already busy from creation.
            sqlx::query(
                "UPDATE units SET status = 'busy', updated_at = now()
                 WHERE id = $1::uuid AND status <> 'busy'",
            )
            .bind(&contract.unit_id)
            .execute(&mut *tx)
            .await?;

            let (existing,): (i64,) =
                sqlx::query_as("SELECT COUNT(*) FROM invoices WHERE contract_id = $1::uuid")
                    .bind(contract_id)
                    .fetch_one(&mut *tx)
                    .await?;
            if existing == 0 {
                invoices_generated = invoice_schedule::ensure_monthly_invoices(
                    &mut *tx,
                    contract_id,
                    contract.amount,
                    contract.start_date,
                    contract.end_date,
                )
                .await?;
            }
        }
        ContractStatus::Completed | ContractStatus::Cancelled => {
            sqlx::query("UPDATE units SET status = 'free', updated_at = now() WHERE id = $1::uuid")
                .bind(&contract.unit_id)
                .execute(&mut *tx)
                .await?;
        }
        ContractStatus::Draft => {}
    }

    let updated = sqlx::query_as::<_, Contract>(&format!(
        "UPDATE contracts SET status = $2, updated_at = now()
         WHERE id = $1::uuid
         RETURNING {CONTRACT_COLUMNS}"
    ))
    .bind(contract_id)
    .bind(requested.as_str())
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(
        contract_id = %updated.id,
        from = %contract.status,
        to = %updated.status,
        invoices_generated,
        "Contract status changed"
    );
    Ok(TransitionOutcome {
        contract: updated,
        invoices_generated,
    })
}
