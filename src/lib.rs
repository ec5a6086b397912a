//! taskhub
//!
//! HTTP gateway that queues background tasks on a Redis-backed task queue,
//! plus the worker that executes them:
//! - `GET /api/health/` liveness probe
//! - `GET /api/common/add/` queues `common.add(x, y)`
//! - `GET /api/common/tasks/{id}/` reads the task outcome

pub mod api;
pub mod core;
pub mod models;
pub mod providers;
pub mod utils;

pub use api::{bind_listener, create_router, AppState};
pub use crate::core::{TaskRegistry, Worker, WorkerConfig, WorkerStats};
pub use models::{AppError, AppResult, ErrorCode, Settings, TaskMessage, TaskRecord, TaskState};
pub use providers::{Broker, MemoryBroker, RedisBroker};

use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber; `RUST_LOG` overrides the settings default
pub fn init_logging(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.default_log_filter()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
