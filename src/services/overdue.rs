use chrono::{NaiveDate, Utc};
use sqlx::PgPool;
use tracing::{info, warn};

/// Result of one overdue sweep run.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct OverdueSweepResult {
    pub marked_overdue: u64,
    pub errors: u32,
}

/// Mark every live pending invoice past its due date as overdue.
///
/// One bulk UPDATE, safe to re-run: the second pass matches nothing, and
/// paid or archived invoices are never touched.
pub async fn run_overdue_sweep(pool: &PgPool) -> OverdueSweepResult {
    sweep_as_of(pool, Utc::now().date_naive()).await
}

pub async fn sweep_as_of(pool: &PgPool, today: NaiveDate) -> OverdueSweepResult {
    let result = sqlx::query(
        "UPDATE invoices
         SET status = 'overdue', updated_at = now()
         WHERE status = 'pending'
           AND due_date < $1
           AND is_archived = false",
    )
    .bind(today)
    .execute(pool)
    .await;

    match result {
        Ok(done) => {
            let marked_overdue = done.rows_affected();
            if marked_overdue > 0 {
                info!(marked_overdue, %today, "Overdue sweep completed");
            }
            OverdueSweepResult {
                marked_overdue,
                errors: 0,
            }
        }
        Err(error) => {
            warn!(error = %error, "Overdue sweep failed");
            OverdueSweepResult {
                marked_overdue: 0,
                errors: 1,
            }
        }
    }
}
