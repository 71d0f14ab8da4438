//! Admin notification dispatch.
//!
//! Strictly fire-and-forget: callers invoke this after their transaction
//! commits, and nothing here can fail the financial operation — every
//! error is logged and swallowed.

use hmac::{Hmac, Mac};
use serde_json::{json, Map, Value};
use sha2::Sha256;
use sqlx::Row;

use crate::state::AppState;

type HmacSha256 = Hmac<Sha256>;

const ADMIN_RECIPIENT_ROLES: &[&str] = &["admin", "operator"];

#[derive(Debug, Clone)]
pub struct AdminEvent {
    pub kind: String,
    pub title: String,
    pub body: String,
    pub source_table: String,
    pub source_id: String,
    pub payload: Map<String, Value>,
    /// Same key, same event: retried operations do not re-notify.
    pub dedupe_key: Option<String>,
}

pub fn contract_created(contract_id: &str, tenant_id: &str, unit_id: &str) -> AdminEvent {
    AdminEvent {
        kind: "contract.created".to_string(),
        title: "New contract".to_string(),
        body: format!("A new draft contract was created for unit {unit_id}."),
        source_table: "contracts".to_string(),
        source_id: contract_id.to_string(),
        payload: json_map(&[
            ("contract_id", contract_id),
            ("tenant_id", tenant_id),
            ("unit_id", unit_id),
        ]),
        dedupe_key: Some(format!("contract.created:{contract_id}")),
    }
}

pub fn payment_received(payment_id: &str, invoice_id: &str, amount: &str) -> AdminEvent {
    AdminEvent {
        kind: "payment.received".to_string(),
        title: "New payment".to_string(),
        body: format!("A payment of {amount} was recorded for invoice {invoice_id}."),
        source_table: "payments".to_string(),
        source_id: payment_id.to_string(),
        payload: json_map(&[
            ("payment_id", payment_id),
            ("invoice_id", invoice_id),
            ("amount", amount),
        ]),
        dedupe_key: Some(format!("payment.received:{payment_id}")),
    }
}

/// Persist the event, fan it out to admin users, and mirror it to the
/// configured webhook. Never returns an error.
pub async fn notify_admins(state: &AppState, event: AdminEvent) {
    let Some(pool) = state.db_pool.as_ref() else {
        return;
    };

    let inserted = sqlx::query(
        "INSERT INTO notification_events
             (event_type, title, body, source_table, source_id, payload, dedupe_key)
         VALUES ($1, $2, $3, $4, $5::uuid, $6, $7)
         ON CONFLICT (dedupe_key) DO NOTHING
         RETURNING id::text AS id",
    )
    .bind(&event.kind)
    .bind(&event.title)
    .bind(&event.body)
    .bind(&event.source_table)
    .bind(&event.source_id)
    .bind(Value::Object(event.payload.clone()))
    .bind(&event.dedupe_key)
    .fetch_optional(pool)
    .await;

    let event_id = match inserted {
        Ok(Some(row)) => row.try_get::<String, _>("id").unwrap_or_default(),
        Ok(None) => {
            // Dedupe hit: this event was already emitted on a prior attempt.
            return;
        }
        Err(error) => {
            tracing::warn!(kind = %event.kind, error = %error, "Failed to record notification event");
            return;
        }
    };

    let recipients = sqlx::query(
        "SELECT id::text AS id FROM app_users WHERE role = ANY($1) LIMIT 50",
    )
    .bind(
        ADMIN_RECIPIENT_ROLES
            .iter()
            .map(|role| role.to_string())
            .collect::<Vec<_>>(),
    )
    .fetch_all(pool)
    .await
    .unwrap_or_default();

    for recipient in recipients {
        let Ok(recipient_user_id) = recipient.try_get::<String, _>("id") else {
            continue;
        };
        let _ = sqlx::query(
            "INSERT INTO user_notifications (event_id, recipient_user_id)
             VALUES ($1::uuid, $2::uuid)
             ON CONFLICT (event_id, recipient_user_id) DO NOTHING",
        )
        .bind(&event_id)
        .bind(&recipient_user_id)
        .execute(pool)
        .await
        .map_err(|error| {
            tracing::warn!(error = %error, "Failed to fan out notification");
        });
    }

    dispatch_webhook(state, &event).await;
}

/// Delete read notifications and orphaned events past the retention window.
pub async fn run_notification_retention(
    pool: &sqlx::PgPool,
    retention_days: i64,
) -> (u64, u64) {
    let cutoff = chrono::Utc::now() - chrono::Duration::days(retention_days.max(1));

    let notifications_deleted = sqlx::query(
        "DELETE FROM user_notifications WHERE read_at IS NOT NULL AND created_at < $1",
    )
    .bind(cutoff)
    .execute(pool)
    .await
    .map(|done| done.rows_affected())
    .unwrap_or(0);

    let events_deleted = sqlx::query(
        "DELETE FROM notification_events ne
         WHERE ne.created_at < $1
           AND NOT EXISTS (SELECT 1 FROM user_notifications un WHERE un.event_id = ne.id)",
    )
    .bind(cutoff)
    .execute(pool)
    .await
    .map(|done| done.rows_affected())
    .unwrap_or(0);

    (notifications_deleted, events_deleted)
}

async fn dispatch_webhook(state: &AppState, event: &AdminEvent) {
    let Some(url) = state.config.notify_webhook_url.as_deref() else {
        return;
    };

    let body = json!({
        "kind": event.kind,
        "title": event.title,
        "body": event.body,
        "source_table": event.source_table,
        "source_id": event.source_id,
        "payload": Value::Object(event.payload.clone()),
        "link": format!(
            "{}/admin/{}/{}",
            state.config.app_public_url, event.source_table, event.source_id
        ),
    });
    let raw = body.to_string();

    let mut request = state
        .http_client
        .post(url)
        .header("content-type", "application/json");
    if let Some(secret) = state.config.notify_webhook_secret.as_deref() {
        request = request.header("x-arrenda-signature", sign_payload(secret, &raw));
    }

    if let Err(error) = request.body(raw).send().await {
        tracing::warn!(kind = %event.kind, error = %error, "Notification webhook dispatch failed");
    }
}

fn sign_payload(secret: &str, payload: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(payload.as_bytes());
    hex_encode(&mac.finalize().into_bytes())
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}

fn json_map(pairs: &[(&str, &str)]) -> Map<String, Value> {
    let mut map = Map::new();
    for (key, value) in pairs {
        map.insert((*key).to_string(), Value::String((*value).to_string()));
    }
    map
}

#[cfg(test)]
mod tests {
    use super::{hex_encode, sign_payload};

    #[test]
    fn hex_encodes_lowercase() {
        assert_eq!(hex_encode(&[0x00, 0xff, 0x0a]), "00ff0a");
    }

    #[test]
    fn signature_is_stable_for_same_input() {
        let first = sign_payload("secret", r#"{"kind":"payment.received"}"#);
        let second = sign_payload("secret", r#"{"kind":"payment.received"}"#);
        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
        assert_ne!(first, sign_payload("other-secret", r#"{"kind":"payment.received"}"#));
    }
}
