use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::state::AppState;

/// Reject requests whose Host header is not in TRUSTED_HOSTS.
/// A `*` entry disables the check (useful behind a trusted proxy).
pub async fn enforce_trusted_hosts(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let trusted = &state.config.trusted_hosts;
    if trusted.iter().any(|host| host.trim() == "*") {
        return next.run(request).await;
    }

    let host = request
        .headers()
        .get(axum::http::header::HOST)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.split(':').next().unwrap_or("").trim().to_string())
        .unwrap_or_default();

    if host.is_empty() || !trusted.iter().any(|allowed| allowed.eq_ignore_ascii_case(&host)) {
        tracing::warn!(host = %host, "Rejected request from untrusted host");
        return (StatusCode::BAD_REQUEST, "Invalid host header").into_response();
    }

    next.run(request).await
}
