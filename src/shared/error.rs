use axum::{response::IntoResponse, Json};
use log::error;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Allocation failed: {0}")]
    Allocation(String),
    #[error("Database error: {0}")]
    Storage(String),
}

impl ServiceError {
    pub fn validation(mut violations: Vec<String>) -> Self {
        if violations.is_empty() {
            violations.push("invalid request".to_string());
        }
        Self::Validation(violations)
    }

    pub fn not_found(entity: &str, id: impl std::fmt::Display) -> Self {
        Self::NotFound(format!("{entity} {id} not found"))
    }
}

impl From<diesel::result::Error> for ServiceError {
    fn from(e: diesel::result::Error) -> Self {
        match e {
            diesel::result::Error::NotFound => Self::NotFound("record not found".to_string()),
            other => Self::Storage(other.to_string()),
        }
    }
}

impl From<r2d2::Error> for ServiceError {
    fn from(e: r2d2::Error) -> Self {
        Self::Storage(format!("connection pool: {e}"))
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;
        let (status, message) = match &self {
            Self::Validation(violations) => (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({
                    "error": self.to_string(),
                    "violations": violations,
                })),
            ),
            Self::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({ "error": msg })),
            ),
            Self::Forbidden(msg) => (
                StatusCode::FORBIDDEN,
                Json(serde_json::json!({ "error": msg })),
            ),
            Self::Allocation(msg) => {
                // High write contention exhausted the id retry budget.
                error!("identifier allocation failed: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(serde_json::json!({ "error": "Failed to allocate identifier" })),
                )
            }
            Self::Storage(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": format!("Database error: {msg}") })),
            ),
        };
        (status, message).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_message_lists_every_violation() {
        let err = ServiceError::validation(vec![
            "title is required".to_string(),
            "amount must be positive".to_string(),
        ]);
        let msg = err.to_string();
        assert!(msg.contains("title is required"));
        assert!(msg.contains("amount must be positive"));
    }

    #[test]
    fn empty_violation_list_still_carries_a_message() {
        let err = ServiceError::validation(Vec::new());
        assert!(err.to_string().contains("invalid request"));
    }

    #[test]
    fn diesel_not_found_maps_to_not_found() {
        let err = ServiceError::from(diesel::result::Error::NotFound);
        assert!(matches!(err, ServiceError::NotFound(_)));
    }
}
