use axum::http::HeaderMap;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use sqlx::Row;

use crate::error::AppError;
use crate::state::AppState;

/// Roles allowed to mutate financial records. Authorization policy itself
/// lives outside this service; this is only the boundary check.
const ADMIN_ROLES: &[&str] = &["admin", "operator"];

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    #[allow(dead_code)]
    exp: usize,
}

/// Resolve the calling user id from the Authorization header.
///
/// Outside production, the `x-user-id` override header is honored when
/// DEV_AUTH_OVERRIDES_ENABLED is set, so local tooling can skip token
/// minting.
pub async fn require_user_id(state: &AppState, headers: &HeaderMap) -> Result<String, AppError> {
    if state.config.auth_dev_overrides_enabled() {
        if let Some(user_id) = header_value(headers, "x-user-id") {
            return Ok(user_id);
        }
    }

    let token = bearer_token(headers).ok_or_else(|| {
        AppError::Unauthorized("Unauthorized: missing bearer token.".to_string())
    })?;

    let secret = state.config.auth_jwt_secret.as_deref().ok_or_else(|| {
        AppError::Dependency("AUTH_JWT_SECRET is not configured.".to_string())
    })?;

    let decoded = decode::<Claims>(
        &token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map_err(|error| AppError::Unauthorized(format!("Unauthorized: invalid token ({error})")))?;

    let user_id = decoded.claims.sub.trim().to_string();
    if user_id.is_empty() {
        return Err(AppError::Unauthorized(
            "Unauthorized: token has no subject.".to_string(),
        ));
    }
    Ok(user_id)
}

/// Resolve the caller and require an admin/operator role.
pub async fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<String, AppError> {
    let user_id = require_user_id(state, headers).await?;
    let role = lookup_role(state, &user_id).await?;

    if ADMIN_ROLES.contains(&role.as_str()) {
        return Ok(user_id);
    }
    Err(AppError::Forbidden(format!(
        "Forbidden: role '{role}' is not allowed for this action."
    )))
}

async fn lookup_role(state: &AppState, user_id: &str) -> Result<String, AppError> {
    if let Some(role) = state.role_cache.get(user_id).await {
        return Ok(role);
    }

    let pool = state.db_pool.as_ref().ok_or_else(|| {
        AppError::Dependency("Database is not configured. Set DATABASE_URL.".to_string())
    })?;

    let row = sqlx::query("SELECT role FROM app_users WHERE id = $1::uuid LIMIT 1")
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .map_err(|error| AppError::Dependency(format!("Role lookup failed: {error}")))?;

    let role = row
        .and_then(|row| row.try_get::<String, _>("role").ok())
        .ok_or_else(|| AppError::Forbidden("Forbidden: unknown user.".to_string()))?;

    state
        .role_cache
        .insert(user_id.to_string(), role.clone())
        .await;
    Ok(role)
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get("authorization")?.to_str().ok()?.trim();
    let token = raw.strip_prefix("Bearer ").or_else(|| raw.strip_prefix("bearer "))?;
    let token = token.trim();
    if token.is_empty() {
        return None;
    }
    Some(token.to_string())
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
}

#[cfg(test)]
mod tests {
    use super::bearer_token;
    use axum::http::HeaderMap;

    #[test]
    fn extracts_bearer_token() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer abc.def.ghi".parse().unwrap());
        assert_eq!(bearer_token(&headers).as_deref(), Some("abc.def.ghi"));
    }

    #[test]
    fn rejects_missing_or_blank_token() {
        let mut headers = HeaderMap::new();
        assert!(bearer_token(&headers).is_none());
        headers.insert("authorization", "Bearer ".parse().unwrap());
        assert!(bearer_token(&headers).is_none());
        headers.insert("authorization", "Basic foo".parse().unwrap());
        assert!(bearer_token(&headers).is_none());
    }
}
