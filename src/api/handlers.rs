//! API Request Handlers

use axum::{
    extract::{rejection::QueryRejection, Json, Path, Query, State},
    http::StatusCode,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;
use uuid::Uuid;

use super::types::*;
use crate::core::registry::delay_add;
use crate::models::config::Settings;
use crate::models::errors::AppError;
use crate::models::types::TaskRecord;
use crate::providers::Broker;
use crate::utils::ints::parse_int;

/// Shared application state
pub struct AppState {
    pub settings: Arc<Settings>,
    pub broker: Arc<dyn Broker>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(settings: Arc<Settings>, broker: Arc<dyn Broker>) -> Self {
        Self {
            settings,
            broker,
            start_time: Instant::now(),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

// ============================================
// Health Check
// ============================================

pub async fn health_check() -> Json<HealthData> {
    Json(HealthData { status: "ok" })
}

// ============================================
// Add Task
// ============================================

/// `GET /api/common/add/?x=&y=` queues `common.add(x, y)`.
/// Every failure, parsing or dispatch, is reported as 400.
pub async fn add_task(
    State(state): State<Arc<AppState>>,
    query: Result<Query<Vec<(String, String)>>, QueryRejection>,
) -> Result<Json<AddTaskData>, ApiError> {
    let bad_request = |error: AppError| ApiError::with_status(StatusCode::BAD_REQUEST, error);

    let Query(pairs) = query.map_err(|e| bad_request(AppError::bad_request(e.body_text())))?;
    let query = AddTaskQuery::from_pairs(pairs);
    let x = parse_int(query.x.as_deref().unwrap_or("1")).map_err(bad_request)?;
    let y = parse_int(query.y.as_deref().unwrap_or("2")).map_err(bad_request)?;

    let task_id = delay_add(
        state.broker.as_ref(),
        &state.settings.tasks.default_queue,
        x,
        y,
    )
    .await
    .map_err(bad_request)?;

    info!(task_id = %task_id, x, y, "📥 Queued common.add");

    Ok(Json(AddTaskData {
        task_id: task_id.to_string(),
        queued: true,
    }))
}

// ============================================
// Task Status
// ============================================

pub async fn task_status(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskRecord>, ApiError> {
    let task_id = Uuid::parse_str(&task_id)
        .map_err(|_| AppError::bad_request(format!("'{}' is not a valid task id", task_id)))?;

    let record = state.broker.get_result(task_id).await?;
    Ok(Json(record))
}

// ============================================
// Fallback
// ============================================

pub async fn not_found() -> ApiError {
    AppError::not_found().into()
}
