//! API Request/Response Types

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::models::errors::AppError;

/// Error body: `{"error": "<message>"}`
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// An [`AppError`] on its way out as an HTTP response
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub error: AppError,
}

impl ApiError {
    /// Keep the error but force the response status
    pub fn with_status(status: StatusCode, error: AppError) -> Self {
        Self { status, error }
    }
}

impl From<AppError> for ApiError {
    fn from(error: AppError) -> Self {
        let status = StatusCode::from_u16(error.code.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self { status, error }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            warn!(code = self.error.code_str(), "⚠️ {}", self.error.message);
        }
        let body = ErrorBody {
            error: self.error.message,
        };
        (self.status, Json(body)).into_response()
    }
}

// ============================================
// Health Check
// ============================================

#[derive(Debug, Serialize)]
pub struct HealthData {
    pub status: &'static str,
}

// ============================================
// Add Task
// ============================================

/// Raw query parameters; parsed by the handler so bad input maps to the JSON error body
#[derive(Debug, Default, PartialEq, Eq)]
pub struct AddTaskQuery {
    pub x: Option<String>,
    pub y: Option<String>,
}

impl AddTaskQuery {
    /// Collect `x` / `y` from decoded query pairs; a repeated key keeps its last value
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        pairs
            .into_iter()
            .fold(Self::default(), |mut query, (key, value)| {
                match key.as_str() {
                    "x" => query.x = Some(value),
                    "y" => query.y = Some(value),
                    _ => {}
                }
                query
            })
    }
}

#[derive(Debug, Serialize)]
pub struct AddTaskData {
    pub task_id: String,
    pub queued: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(raw: &[(&str, &str)]) -> Vec<(String, String)> {
        raw.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_add_query_last_value_wins() {
        let query = AddTaskQuery::from_pairs(pairs(&[("x", "1"), ("y", "7"), ("x", "5"), ("z", "9")]));
        assert_eq!(query.x.as_deref(), Some("5"));
        assert_eq!(query.y.as_deref(), Some("7"));
    }

    #[test]
    fn test_add_query_missing_keys() {
        assert_eq!(AddTaskQuery::from_pairs(Vec::new()), AddTaskQuery::default());
    }
}
