//! API Middleware (Host validation, Logging)

use axum::{
    extract::{Request, State},
    http::header::HOST,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use super::handlers::AppState;
use super::types::ApiError;
use crate::models::errors::AppError;
use crate::utils::hosts::is_allowed_host;

/// Reject requests whose Host header is not in ALLOWED_HOSTS
pub async fn allowed_hosts_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let host = request
        .headers()
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| request.uri().authority().map(|a| a.as_str()))
        .unwrap_or("")
        .to_string();

    let settings = &state.settings;
    if !is_allowed_host(&host, &settings.allowed_hosts, settings.debug) {
        warn!(host = %host, "🚫 Disallowed host");
        return ApiError::from(AppError::disallowed_host(&host)).into_response();
    }

    next.run(request).await
}

/// Request logging middleware
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let uri = request.uri().clone();

    let response = next.run(request).await;

    let latency = start.elapsed();
    let status = response.status();

    info!(
        method = %method,
        uri = %uri,
        status = %status.as_u16(),
        latency_ms = %latency.as_millis(),
        "Request completed"
    );

    response
}
