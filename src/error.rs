use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("Invalid status transition: {current} -> {requested}. Allowed: {}.", format_allowed(.allowed))]
    InvalidTransition {
        current: String,
        requested: String,
        allowed: Vec<&'static str>,
    },
    #[error("{0}")]
    UnitUnavailable(String),
    #[error("{0}")]
    PaymentCancelled(String),
    #[error("{0}")]
    HasConfirmedPayments(String),
    #[error("{0}")]
    UnprocessableEntity(String),
    #[error("{0}")]
    Dependency(String),
    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_)
            | AppError::InvalidTransition { .. }
            | AppError::UnitUnavailable(_)
            | AppError::PaymentCancelled(_)
            | AppError::HasConfirmedPayments(_) => StatusCode::CONFLICT,
            AppError::UnprocessableEntity(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Dependency(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(status = %status, detail = %self, "Request failed");
        }
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(error: sqlx::Error) -> Self {
        match error {
            sqlx::Error::RowNotFound => AppError::NotFound("Record not found.".to_string()),
            other => AppError::Dependency(format!("Database request failed: {other}")),
        }
    }
}

fn format_allowed(allowed: &[&'static str]) -> String {
    if allowed.is_empty() {
        return "none".to_string();
    }
    allowed.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_transition_names_allowed_states() {
        let error = AppError::InvalidTransition {
            current: "draft".to_string(),
            requested: "completed".to_string(),
            allowed: vec!["active", "cancelled"],
        };
        assert_eq!(
            error.to_string(),
            "Invalid status transition: draft -> completed. Allowed: active, cancelled."
        );
        assert_eq!(error.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn terminal_transition_reads_none() {
        let error = AppError::InvalidTransition {
            current: "completed".to_string(),
            requested: "active".to_string(),
            allowed: vec![],
        };
        assert!(error.to_string().ends_with("Allowed: none."));
    }
}
