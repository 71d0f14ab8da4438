use serde_json::Value;
use sqlx::PgPool;

/// Best-effort audit trail. Failures are logged and swallowed so an audit
/// insert can never fail the operation it describes.
#[allow(clippy::too_many_arguments)]
pub async fn write_audit_log(
    pool: Option<&PgPool>,
    actor_user_id: Option<&str>,
    action: &str,
    entity_table: &str,
    entity_id: Option<&str>,
    before: Option<Value>,
    after: Option<Value>,
) {
    let Some(pool) = pool else {
        return;
    };

    let result = sqlx::query(
        "INSERT INTO audit_logs (actor_user_id, action, entity_table, entity_id, before, after)
         VALUES ($1::uuid, $2, $3, $4::uuid, $5, $6)",
    )
    .bind(actor_user_id)
    .bind(action)
    .bind(entity_table)
    .bind(entity_id)
    .bind(before)
    .bind(after)
    .execute(pool)
    .await;

    if let Err(error) = result {
        tracing::warn!(
            action,
            entity_table,
            error = %error,
            "Failed to write audit log entry"
        );
    }
}
