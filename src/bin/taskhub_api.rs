//! taskhub API server
//!
//! Usage:
//!   cargo run --bin taskhub_api
//!
//! Environment:
//!   HOST / PORT        - Bind address (default: 0.0.0.0:8000)
//!   ALLOWED_HOSTS      - Comma-separated Host patterns (default: *)
//!   CELERY_BROKER_URL  - Broker; memory:// runs an in-process worker
//!   RUST_LOG           - Log filter (default: debug when DEBUG=True, else info)

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use taskhub::models::config::masked_url;
use taskhub::providers;
use taskhub::{
    bind_listener, create_router, init_logging, AppState, Settings, TaskRegistry, Worker, WorkerConfig,
};

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let settings = Arc::new(Settings::from_env()?);
    init_logging(&settings);

    if settings.debug {
        warn!("⚠️ DEBUG is on; do not run this configuration in production");
    }
    info!("🗄️ Database: {}", settings.database.masked_url());
    info!("🧊 Cache: {}", masked_url(&settings.cache.default_location));

    let broker = providers::connect(&settings.tasks).await?;

    // memory:// has no separate worker process and no native result expiry
    let background = if settings.tasks.is_memory() {
        let cleanup = providers::start_cleanup_task(broker.clone(), Duration::from_secs(60));
        info!("🧹 Background result cleanup task started");

        let worker = Worker::new(
            broker.clone(),
            TaskRegistry::with_builtin_tasks(),
            WorkerConfig::from(&settings.tasks),
        );
        info!("🧠 Eager mode: running an in-process worker");
        let eager = tokio::spawn(async move {
            if let Err(e) = worker.run(std::future::pending::<()>()).await {
                warn!("⚠️ In-process worker stopped: {}", e);
            }
        });
        vec![cleanup, eager]
    } else {
        Vec::new()
    };

    let state = Arc::new(AppState::new(settings.clone(), broker));
    let app = create_router(state.clone());

    let listener = bind_listener(&settings).await?;

    info!("🚀 taskhub API starting on http://{}", listener.local_addr()?);
    info!("Endpoints:");
    info!("  GET /api/health/               - Health check");
    info!("  GET /api/common/add/?x=&y=     - Queue common.add(x, y)");
    info!("  GET /api/common/tasks/{{id}}/    - Task status");
    info!("Press Ctrl+C for graceful shutdown");

    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("⚠️ Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    info!("🛑 Shutdown signal received, cleaning up...");
    for handle in background {
        handle.abort();
    }
    info!("   Uptime: {}s", state.uptime_seconds());
    info!("👋 taskhub API shutdown complete");

    Ok(())
}
