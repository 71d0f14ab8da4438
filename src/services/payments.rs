use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::{PgPool, Row};

use crate::error::{AppError, AppResult};
use crate::models::{Invoice, InvoiceStatus, Payment, PaymentMethod, PaymentStatus};
use crate::schemas::CreatePaymentInput;
use crate::services::balances;

pub const PAYMENT_COLUMNS: &str = "id::text AS id, invoice_id::text AS invoice_id, method, \
     amount, status, paid_at, is_archived, archived_at, archive_reason, created_at, updated_at";

const INVOICE_COLUMNS: &str = "id::text AS id, contract_id::text AS contract_id, due_date, \
     amount, status, is_archived, archived_at, archive_reason, created_at, updated_at";

/// Record a payment against an invoice. Online payments settle
/// immediately and route through `confirm_payment`.
pub async fn create_payment(pool: &PgPool, input: &CreatePaymentInput) -> AppResult<Payment> {
    let method = PaymentMethod::parse(&input.method).ok_or_else(|| {
        AppError::BadRequest(format!(
            "Unknown payment method '{}'. Expected online or offline.",
            input.method
        ))
    })?;
    if input.amount <= Decimal::ZERO {
        return Err(AppError::BadRequest(
            "amount must be a positive decimal.".to_string(),
        ));
    }

    let invoice_row = sqlx::query("SELECT is_archived FROM invoices WHERE id = $1::uuid")
        .bind(&input.invoice_id)
        .fetch_optional(pool)
        .await?;
    let Some(invoice_row) = invoice_row else {
        return Err(AppError::NotFound("Invoice not found.".to_string()));
    };
    if invoice_row.try_get::<bool, _>("is_archived").unwrap_or(false) {
        return Err(AppError::Conflict(
            "Invoice is archived and cannot receive payments.".to_string(),
        ));
    }

    let payment = sqlx::query_as::<_, Payment>(&format!(
        "INSERT INTO payments (invoice_id, method, amount, status)
         VALUES ($1::uuid, $2, $3, 'pending')
         RETURNING {PAYMENT_COLUMNS}"
    ))
    .bind(&input.invoice_id)
    .bind(method.as_str())
    .bind(input.amount)
    .fetch_one(pool)
    .await?;

    tracing::info!(
        payment_id = %payment.id,
        invoice_id = %payment.invoice_id,
        method = %payment.method,
        amount = %payment.amount,
        "Payment recorded"
    );

    if method == PaymentMethod::Online {
        return confirm_payment(pool, &payment.id).await;
    }
    Ok(payment)
}

/// Confirm a payment: flip it to confirmed, re-aggregate the invoice's
/// confirmed total, mark the invoice paid when covered, and credit the
/// tenant balance — all in one transaction.
///
/// The payment and its invoice are both locked `FOR UPDATE`, so sibling
/// confirmations on the same invoice serialize on the aggregate instead of
/// racing it. Confirming an already-confirmed payment is a no-op, which is
/// what makes caller retries safe.
pub async fn confirm_payment(pool: &PgPool, payment_id: &str) -> AppResult<Payment> {
    let mut tx = pool.begin().await?;

    let payment = sqlx::query_as::<_, Payment>(&format!(
        "SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1::uuid FOR UPDATE"
    ))
    .bind(payment_id)
    .fetch_optional(&mut *tx)
    .await?;
    let Some(payment) = payment else {
        return Err(AppError::NotFound("Payment not found.".to_string()));
    };

    match PaymentStatus::parse(&payment.status) {
        Some(PaymentStatus::Confirmed) => {
            // Already settled; the balance was credited exactly once.
            return Ok(payment);
        }
        Some(PaymentStatus::Cancelled) => {
            return Err(AppError::PaymentCancelled(
                "Payment was cancelled and can no longer be confirmed.".to_string(),
            ));
        }
        Some(PaymentStatus::Pending) => {}
        None => {
            return Err(AppError::Internal(format!(
                "Payment {payment_id} carries unknown status '{}'.",
                payment.status
            )));
        }
    }

    let invoice = sqlx::query_as::<_, Invoice>(&format!(
        "SELECT {INVOICE_COLUMNS} FROM invoices WHERE id = $1::uuid FOR UPDATE"
    ))
    .bind(&payment.invoice_id)
    .fetch_one(&mut *tx)
    .await?;

    let (tenant_id,): (String,) =
        sqlx::query_as("SELECT tenant_id::text FROM contracts WHERE id = $1::uuid")
            .bind(&invoice.contract_id)
            .fetch_one(&mut *tx)
            .await?;

    let confirmed = sqlx::query_as::<_, Payment>(&format!(
        "UPDATE payments SET status = 'confirmed', paid_at = $2, updated_at = now()
         WHERE id = $1::uuid
         RETURNING {PAYMENT_COLUMNS}"
    ))
    .bind(payment_id)
    .bind(Utc::now())
    .fetch_one(&mut *tx)
    .await?;

    let (confirmed_total,): (Decimal,) = sqlx::query_as(
        "SELECT COALESCE(SUM(amount), 0)
         FROM payments
         WHERE invoice_id = $1::uuid AND status = 'confirmed'",
    )
    .bind(&payment.invoice_id)
    .fetch_one(&mut *tx)
    .await?;

    // Paid is terminal: set once, never reverted by later aggregates.
    let already_paid = invoice.status == InvoiceStatus::Paid.as_str();
    if confirmed_total >= invoice.amount && !already_paid {
        sqlx::query("UPDATE invoices SET status = 'paid', updated_at = now() WHERE id = $1::uuid")
            .bind(&payment.invoice_id)
            .execute(&mut *tx)
            .await?;
    }

    balances::credit_balance(&mut *tx, &tenant_id, confirmed.amount).await?;

    tx.commit().await?;

    tracing::info!(
        payment_id = %confirmed.id,
        invoice_id = %confirmed.invoice_id,
        tenant_id = %tenant_id,
        amount = %confirmed.amount,
        confirmed_total = %confirmed_total,
        invoice_covered = confirmed_total >= invoice.amount,
        "Payment confirmed"
    );
    Ok(confirmed)
}

/// Cancel a pending payment. Cancelling twice is a no-op; a confirmed
/// payment stays confirmed — there is no credit-reversal path.
pub async fn cancel_payment(pool: &PgPool, payment_id: &str) -> AppResult<Payment> {
    let mut tx = pool.begin().await?;

    let payment = sqlx::query_as::<_, Payment>(&format!(
        "SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1::uuid FOR UPDATE"
    ))
    .bind(payment_id)
    .fetch_optional(&mut *tx)
    .await?;
    let Some(payment) = payment else {
        return Err(AppError::NotFound("Payment not found.".to_string()));
    };

    match PaymentStatus::parse(&payment.status) {
        Some(PaymentStatus::Cancelled) => return Ok(payment),
        Some(PaymentStatus::Confirmed) => {
            return Err(AppError::Conflict(
                "Payment is already confirmed and cannot be cancelled.".to_string(),
            ));
        }
        _ => {}
    }

    let cancelled = sqlx::query_as::<_, Payment>(&format!(
        "UPDATE payments SET status = 'cancelled', updated_at = now()
         WHERE id = $1::uuid
         RETURNING {PAYMENT_COLUMNS}"
    ))
    .bind(payment_id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(payment_id = %cancelled.id, "Payment cancelled");
    Ok(cancelled)
}
