//! Archive, unarchive, and hard-delete cascades.
//!
//! Archiving walks the dependent tree leaves-first (payments, invoices,
//! contracts, conversations, tenant) and stamps every reachable live row
//! with the same archived_at/archived_by/archive_reason. Unarchiving
//! reverses in the opposite order. Hard deletion is only permitted on
//! archived rows and never on anything holding a confirmed payment.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};

use crate::error::{AppError, AppResult};
use crate::models::{Contract, Invoice, Tenant};
use crate::services::contracts::CONTRACT_COLUMNS;

const TENANT_COLUMNS: &str = "id::text AS id, full_name, email, phone_e164, is_archived, \
     archived_at, archive_reason, created_at";

const INVOICE_COLUMNS: &str = "id::text AS id, contract_id::text AS contract_id, due_date, \
     amount, status, is_archived, archived_at, archive_reason, created_at, updated_at";

struct ArchiveStamp<'a> {
    archived_at: DateTime<Utc>,
    archived_by: &'a str,
    reason: Option<&'a str>,
}

pub async fn archive_tenant(
    pool: &PgPool,
    tenant_id: &str,
    actor_id: &str,
    reason: Option<&str>,
) -> AppResult<Tenant> {
    let mut tx = pool.begin().await?;

    let tenant = sqlx::query_as::<_, Tenant>(&format!(
        "SELECT {TENANT_COLUMNS} FROM tenants WHERE id = $1::uuid FOR UPDATE"
    ))
    .bind(tenant_id)
    .fetch_optional(&mut *tx)
    .await?;
    let Some(tenant) = tenant else {
        return Err(AppError::NotFound("Tenant not found.".to_string()));
    };
    if tenant.is_archived {
        return Err(AppError::Conflict("Tenant is already archived.".to_string()));
    }

    let stamp = ArchiveStamp {
        archived_at: Utc::now(),
        archived_by: actor_id,
        reason,
    };

    archive_payments_of_tenant(&mut tx, tenant_id, &stamp).await?;
    archive_invoices_of_tenant(&mut tx, tenant_id, &stamp).await?;

    sqlx::query(
        "UPDATE contracts
         SET is_archived = true, archived_at = $2, archived_by = $3::uuid,
             archive_reason = $4, updated_at = now()
         WHERE tenant_id = $1::uuid AND is_archived = false",
    )
    .bind(tenant_id)
    .bind(stamp.archived_at)
    .bind(stamp.archived_by)
    .bind(stamp.reason)
    .execute(&mut *tx)
    .await?;

    move_conversations_to_archive(&mut tx, tenant_id, &stamp).await?;

    let archived = sqlx::query_as::<_, Tenant>(&format!(
        "UPDATE tenants
         SET is_archived = true, archived_at = $2, archived_by = $3::uuid,
             archive_reason = $4, updated_at = now()
         WHERE id = $1::uuid
         RETURNING {TENANT_COLUMNS}"
    ))
    .bind(tenant_id)
    .bind(stamp.archived_at)
    .bind(stamp.archived_by)
    .bind(stamp.reason)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(tenant_id = %tenant_id, actor_id = %actor_id, "Tenant archived with cascade");
    Ok(archived)
}

pub async fn unarchive_tenant(pool: &PgPool, tenant_id: &str) -> AppResult<Tenant> {
    let mut tx = pool.begin().await?;

    let tenant = sqlx::query_as::<_, Tenant>(&format!(
        "SELECT {TENANT_COLUMNS} FROM tenants WHERE id = $1::uuid FOR UPDATE"
    ))
    .bind(tenant_id)
    .fetch_optional(&mut *tx)
    .await?;
    let Some(tenant) = tenant else {
        return Err(AppError::NotFound("Tenant not found.".to_string()));
    };
    if !tenant.is_archived {
        return Err(AppError::Conflict("Tenant is not archived.".to_string()));
    }

    let restored = sqlx::query_as::<_, Tenant>(&format!(
        "UPDATE tenants
         SET is_archived = false, archived_at = NULL, archived_by = NULL,
             archive_reason = NULL, updated_at = now()
         WHERE id = $1::uuid
         RETURNING {TENANT_COLUMNS}"
    ))
    .bind(tenant_id)
    .fetch_one(&mut *tx)
    .await?;

    restore_conversations_from_archive(&mut tx, tenant_id).await?;

    sqlx::query(
        "UPDATE contracts
         SET is_archived = false, archived_at = NULL, archived_by = NULL,
             archive_reason = NULL, updated_at = now()
         WHERE tenant_id = $1::uuid AND is_archived = true",
    )
    .bind(tenant_id)
    .execute(&mut *tx)
    .await?;

    unarchive_invoices_of_tenant(&mut tx, tenant_id).await?;
    unarchive_payments_of_tenant(&mut tx, tenant_id).await?;

    tx.commit().await?;

    tracing::info!(tenant_id = %tenant_id, "Tenant unarchived with cascade");
    Ok(restored)
}

/// Hard-delete an archived tenant and its whole financial subtree.
/// Refused while any confirmed payment exists anywhere under the tenant.
pub async fn remove_tenant(pool: &PgPool, tenant_id: &str) -> AppResult<()> {
    let mut tx = pool.begin().await?;

    let tenant = sqlx::query_as::<_, Tenant>(&format!(
        "SELECT {TENANT_COLUMNS} FROM tenants WHERE id = $1::uuid FOR UPDATE"
    ))
    .bind(tenant_id)
    .fetch_optional(&mut *tx)
    .await?;
    let Some(tenant) = tenant else {
        return Err(AppError::NotFound("Tenant not found.".to_string()));
    };
    if !tenant.is_archived {
        return Err(AppError::Conflict(
            "Tenant must be archived before deletion.".to_string(),
        ));
    }

    let (confirmed,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*)
         FROM payments p
         JOIN invoices i ON i.id = p.invoice_id
         JOIN contracts c ON c.id = i.contract_id
         WHERE c.tenant_id = $1::uuid AND p.status = 'confirmed'",
    )
    .bind(tenant_id)
    .fetch_one(&mut *tx)
    .await?;
    if confirmed > 0 {
        return Err(AppError::Conflict(
            "Tenant has confirmed payments and cannot be deleted.".to_string(),
        ));
    }

    // Free any unit still held by a draft/active contract of this tenant.
    sqlx::query(
        "UPDATE units SET status = 'free', updated_at = now()
         WHERE id IN (
             SELECT unit_id FROM contracts
             WHERE tenant_id = $1::uuid AND status IN ('draft', 'active')
         )",
    )
    .bind(tenant_id)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        "DELETE FROM payments
         WHERE invoice_id IN (
             SELECT i.id FROM invoices i
             JOIN contracts c ON c.id = i.contract_id
             WHERE c.tenant_id = $1::uuid
         )",
    )
    .bind(tenant_id)
    .execute(&mut *tx)
    .await?;
    sqlx::query(
        "DELETE FROM invoices
         WHERE contract_id IN (SELECT id FROM contracts WHERE tenant_id = $1::uuid)",
    )
    .bind(tenant_id)
    .execute(&mut *tx)
    .await?;
    sqlx::query("DELETE FROM contracts WHERE tenant_id = $1::uuid")
        .bind(tenant_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM conversation_archives WHERE tenant_id = $1::uuid")
        .bind(tenant_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM conversations WHERE tenant_id = $1::uuid")
        .bind(tenant_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM balances WHERE tenant_id = $1::uuid")
        .bind(tenant_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM tenants WHERE id = $1::uuid")
        .bind(tenant_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    tracing::info!(tenant_id = %tenant_id, "Tenant hard-deleted");
    Ok(())
}

pub async fn archive_contract(
    pool: &PgPool,
    contract_id: &str,
    actor_id: &str,
    reason: Option<&str>,
) -> AppResult<Contract> {
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
            "Contract is already archived.".to_string(),
        ));
    }

    let stamp = ArchiveStamp {
        archived_at: Utc::now(),
        archived_by: actor_id,
        reason,
    };

    sqlx::query(
        "UPDATE payments
         SET is_archived = true, archived_at = $2, archived_by = $3::uuid,
             archive_reason = $4, updated_at = now()
         WHERE is_archived = false
           AND invoice_id IN (SELECT id FROM invoices WHERE contract_id = $1::uuid)",
    )
    .bind(contract_id)
    .bind(stamp.archived_at)
    .bind(stamp.archived_by)
    .bind(stamp.reason)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        "UPDATE invoices
         SET is_archived = true, archived_at = $2, archived_by = $3::uuid,
             archive_reason = $4, updated_at = now()
         WHERE contract_id = $1::uuid AND is_archived = false",
    )
    .bind(contract_id)
    .bind(stamp.archived_at)
    .bind(stamp.archived_by)
    .bind(stamp.reason)
    .execute(&mut *tx)
    .await?;

    let archived = sqlx::query_as::<_, Contract>(&format!(
        "UPDATE contracts
         SET is_archived = true, archived_at = $2, archived_by = $3::uuid,
             archive_reason = $4, updated_at = now()
         WHERE id = $1::uuid
         RETURNING {CONTRACT_COLUMNS}"
    ))
    .bind(contract_id)
    .bind(stamp.archived_at)
    .bind(stamp.archived_by)
    .bind(stamp.reason)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(contract_id = %contract_id, "Contract archived with cascade");
    Ok(archived)
}

pub async fn unarchive_contract(pool: &PgPool, contract_id: &str) -> AppResult<Contract> {
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
    if !contract.is_archived {
        return Err(AppError::Conflict("Contract is not archived.".to_string()));
    }

    let restored = sqlx::query_as::<_, Contract>(&format!(
        "UPDATE contracts
         SET is_archived = false, archived_at = NULL, archived_by = NULL,
             archive_reason = NULL, updated_at = now()
         WHERE id = $1::uuid
         RETURNING {CONTRACT_COLUMNS}"
    ))
    .bind(contract_id)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query(
        "UPDATE invoices
         SET is_archived = false, archived_at = NULL, archived_by = NULL,
             archive_reason = NULL, updated_at = now()
         WHERE contract_id = $1::uuid AND is_archived = true",
    )
    .bind(contract_id)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        "UPDATE payments
         SET is_archived = false, archived_at = NULL, archived_by = NULL,
             archive_reason = NULL, updated_at = now()
         WHERE is_archived = true
           AND invoice_id IN (SELECT id FROM invoices WHERE contract_id = $1::uuid)",
    )
    .bind(contract_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(contract_id = %contract_id, "Contract unarchived with cascade");
    Ok(restored)
}

/// Hard-delete an archived contract, its invoices, and their non-confirmed
/// payments; frees the unit when the contract was still holding it.
pub async fn remove_contract(pool: &PgPool, contract_id: &str) -> AppResult<()> {
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
    if !contract.is_archived {
        return Err(AppError::Conflict(
            "Contract must be archived before deletion.".to_string(),
        ));
    }

    let (confirmed,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*)
         FROM payments p
         JOIN invoices i ON i.id = p.invoice_id
         WHERE i.contract_id = $1::uuid AND p.status = 'confirmed'",
    )
    .bind(contract_id)
    .fetch_one(&mut *tx)
    .await?;
    if confirmed > 0 {
        return Err(AppError::HasConfirmedPayments(
            "Contract has confirmed payments and cannot be deleted.".to_string(),
        ));
    }

    sqlx::query(
        "DELETE FROM payments
         WHERE invoice_id IN (SELECT id FROM invoices WHERE contract_id = $1::uuid)",
    )
    .bind(contract_id)
    .execute(&mut *tx)
    .await?;
    sqlx::query("DELETE FROM invoices WHERE contract_id = $1::uuid")
        .bind(contract_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM contracts WHERE id = $1::uuid")
        .bind(contract_id)
        .execute(&mut *tx)
        .await?;

    let was_occupying = crate::models::ContractStatus::parse(&contract.status)
        .map(|status| status.occupies_unit())
        .unwrap_or(false);
    if was_occupying {
        sqlx::query("UPDATE units SET status = 'free', updated_at = now() WHERE id = $1::uuid")
            .bind(&contract.unit_id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    tracing::info!(contract_id = %contract_id, "Contract hard-deleted");
    Ok(())
}

pub async fn archive_invoice(
    pool: &PgPool,
    invoice_id: &str,
    actor_id: &str,
    reason: Option<&str>,
) -> AppResult<Invoice> {
    let mut tx = pool.begin().await?;

    let invoice = sqlx::query_as::<_, Invoice>(&format!(
        "SELECT {INVOICE_COLUMNS} FROM invoices WHERE id = $1::uuid FOR UPDATE"
    ))
    .bind(invoice_id)
    .fetch_optional(&mut *tx)
    .await?;
    let Some(invoice) = invoice else {
        return Err(AppError::NotFound("Invoice not found.".to_string()));
    };
    if invoice.is_archived {
        return Err(AppError::Conflict("Invoice is already archived.".to_string()));
    }

    let stamp = ArchiveStamp {
        archived_at: Utc::now(),
        archived_by: actor_id,
        reason,
    };

    sqlx::query(
        "UPDATE payments
         SET is_archived = true, archived_at = $2, archived_by = $3::uuid,
             archive_reason = $4, updated_at = now()
         WHERE invoice_id = $1::uuid AND is_archived = false",
    )
    .bind(invoice_id)
    .bind(stamp.archived_at)
    .bind(stamp.archived_by)
    .bind(stamp.reason)
    .execute(&mut *tx)
    .await?;

    let archived = sqlx::query_as::<_, Invoice>(&format!(
        "UPDATE invoices
         SET is_archived = true, archived_at = $2, archived_by = $3::uuid,
             archive_reason = $4, updated_at = now()
         WHERE id = $1::uuid
         RETURNING {INVOICE_COLUMNS}"
    ))
    .bind(invoice_id)
    .bind(stamp.archived_at)
    .bind(stamp.archived_by)
    .bind(stamp.reason)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(invoice_id = %invoice_id, "Invoice archived with cascade");
    Ok(archived)
}

pub async fn unarchive_invoice(pool: &PgPool, invoice_id: &str) -> AppResult<Invoice> {
    let mut tx = pool.begin().await?;

    let invoice = sqlx::query_as::<_, Invoice>(&format!(
        "SELECT {INVOICE_COLUMNS} FROM invoices WHERE id = $1::uuid FOR UPDATE"
    ))
    .bind(invoice_id)
    .fetch_optional(&mut *tx)
    .await?;
    let Some(invoice) = invoice else {
        return Err(AppError::NotFound("Invoice not found.".to_string()));
    };
    if !invoice.is_archived {
        return Err(AppError::Conflict("Invoice is not archived.".to_string()));
    }

    let restored = sqlx::query_as::<_, Invoice>(&format!(
        "UPDATE invoices
         SET is_archived = false, archived_at = NULL, archived_by = NULL,
             archive_reason = NULL, updated_at = now()
         WHERE id = $1::uuid
         RETURNING {INVOICE_COLUMNS}"
    ))
    .bind(invoice_id)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query(
        "UPDATE payments
         SET is_archived = false, archived_at = NULL, archived_by = NULL,
             archive_reason = NULL, updated_at = now()
         WHERE invoice_id = $1::uuid AND is_archived = true",
    )
    .bind(invoice_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(invoice_id = %invoice_id, "Invoice unarchived");
    Ok(restored)
}

/// Hard-delete an archived invoice and its payments; refused while a
/// confirmed payment exists.
pub async fn remove_invoice(pool: &PgPool, invoice_id: &str) -> AppResult<()> {
    let mut tx = pool.begin().await?;

    let invoice = sqlx::query_as::<_, Invoice>(&format!(
        "SELECT {INVOICE_COLUMNS} FROM invoices WHERE id = $1::uuid FOR UPDATE"
    ))
    .bind(invoice_id)
    .fetch_optional(&mut *tx)
    .await?;
    let Some(invoice) = invoice else {
        return Err(AppError::NotFound("Invoice not found.".to_string()));
    };
    if !invoice.is_archived {
        return Err(AppError::Conflict(
            "Invoice must be archived before deletion.".to_string(),
        ));
    }

    let (confirmed,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM payments WHERE invoice_id = $1::uuid AND status = 'confirmed'",
    )
    .bind(invoice_id)
    .fetch_one(&mut *tx)
    .await?;
    if confirmed > 0 {
        return Err(AppError::HasConfirmedPayments(
            "Invoice has confirmed payments and cannot be deleted.".to_string(),
        ));
    }

    sqlx::query("DELETE FROM payments WHERE invoice_id = $1::uuid")
        .bind(invoice_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM invoices WHERE id = $1::uuid")
        .bind(invoice_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    tracing::info!(invoice_id = %invoice_id, "Invoice hard-deleted");
    Ok(())
}

async fn archive_payments_of_tenant(
    tx: &mut Transaction<'_, Postgres>,
    tenant_id: &str,
    stamp: &ArchiveStamp<'_>,
) -> AppResult<()> {
    sqlx::query(
        "UPDATE payments
         SET is_archived = true, archived_at = $2, archived_by = $3::uuid,
             archive_reason = $4, updated_at = now()
         WHERE is_archived = false
           AND invoice_id IN (
               SELECT i.id FROM invoices i
               JOIN contracts c ON c.id = i.contract_id
               WHERE c.tenant_id = $1::uuid
           )",
    )
    .bind(tenant_id)
    .bind(stamp.archived_at)
    .bind(stamp.archived_by)
    .bind(stamp.reason)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn archive_invoices_of_tenant(
    tx: &mut Transaction<'_, Postgres>,
    tenant_id: &str,
    stamp: &ArchiveStamp<'_>,
) -> AppResult<()> {
    sqlx::query(
        "UPDATE invoices
         SET is_archived = true, archived_at = $2, archived_by = $3::uuid,
             archive_reason = $4, updated_at = now()
         WHERE is_archived = false
           AND contract_id IN (SELECT id FROM contracts WHERE tenant_id = $1::uuid)",
    )
    .bind(tenant_id)
    .bind(stamp.archived_at)
    .bind(stamp.archived_by)
    .bind(stamp.reason)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn unarchive_invoices_of_tenant(
    tx: &mut Transaction<'_, Postgres>,
    tenant_id: &str,
) -> AppResult<()> {
    sqlx::query(
        "UPDATE invoices
         SET is_archived = false, archived_at = NULL, archived_by = NULL,
             archive_reason = NULL, updated_at = now()
         WHERE is_archived = true
           AND contract_id IN (SELECT id FROM contracts WHERE tenant_id = $1::uuid)",
    )
    .bind(tenant_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn unarchive_payments_of_tenant(
    tx: &mut Transaction<'_, Postgres>,
    tenant_id: &str,
) -> AppResult<()> {
    sqlx::query(
        "UPDATE payments
         SET is_archived = false, archived_at = NULL, archived_by = NULL,
             archive_reason = NULL, updated_at = now()
         WHERE is_archived = true
           AND invoice_id IN (
               SELECT i.id FROM invoices i
               JOIN contracts c ON c.id = i.contract_id
               WHERE c.tenant_id = $1::uuid
           )",
    )
    .bind(tenant_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Conversations belong to the chat subsystem; the cascade only moves them
/// into the archive store before their live rows go away.
async fn move_conversations_to_archive(
    tx: &mut Transaction<'_, Postgres>,
    tenant_id: &str,
    stamp: &ArchiveStamp<'_>,
) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO conversation_archives
             (id, tenant_id, subject, payload, created_at, archived_at, archived_by, archive_reason)
         SELECT id, tenant_id, subject, payload, created_at, $2, $3::uuid, $4
         FROM conversations
         WHERE tenant_id = $1::uuid
         ON CONFLICT (id) DO NOTHING",
    )
    .bind(tenant_id)
    .bind(stamp.archived_at)
    .bind(stamp.archived_by)
    .bind(stamp.reason)
    .execute(&mut **tx)
    .await?;

    sqlx::query("DELETE FROM conversations WHERE tenant_id = $1::uuid")
        .bind(tenant_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

async fn restore_conversations_from_archive(
    tx: &mut Transaction<'_, Postgres>,
    tenant_id: &str,
) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO conversations (id, tenant_id, subject, payload, created_at)
         SELECT id, tenant_id, subject, payload, created_at
         FROM conversation_archives
         WHERE tenant_id = $1::uuid
         ON CONFLICT (id) DO NOTHING",
    )
    .bind(tenant_id)
    .execute(&mut **tx)
    .await?;

    sqlx::query("DELETE FROM conversation_archives WHERE tenant_id = $1::uuid")
        .bind(tenant_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}
