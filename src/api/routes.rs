//! API Route Configuration

use axum::{middleware, routing::get, Router};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{self, AppState};
use super::middleware::{allowed_hosts_middleware, logging_middleware};
use crate::models::config::Settings;
use crate::models::errors::AppResult;

/// Bind the configured HOST / PORT. HOST may be an IPv4 or IPv6 literal or a hostname.
pub async fn bind_listener(settings: &Settings) -> AppResult<TcpListener> {
    Ok(TcpListener::bind((settings.host.as_str(), settings.port)).await?)
}

/// Create the API router with all routes and middleware
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = if state.settings.cors_allow_all_origins {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        CorsLayer::new()
    };

    // /api/common/
    let common = Router::new()
        .route("/add/", get(handlers::add_task))
        .route("/tasks/:task_id/", get(handlers::task_status));

    Router::new()
        .route("/api/health/", get(handlers::health_check))
        .nest("/api/common", common)
        .fallback(handlers::not_found)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            allowed_hosts_middleware,
        ))
        .with_state(state)
        // Middleware (order matters - bottom runs first)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(middleware::from_fn(logging_middleware))
}
