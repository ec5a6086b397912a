//! taskhub worker
//!
//! Consumes the task queue and runs registered tasks.
//!
//! Usage:
//!   cargo run --bin taskhub
//!
//! Environment:
//!   CELERY_BROKER_URL          - Broker (default: REDIS_URL or redis://127.0.0.1:6379/0)
//!   CELERY_RESULT_BACKEND      - Result backend (default: REDIS_URL or redis://127.0.0.1:6379/1)
//!   CELERY_WORKER_CONCURRENCY  - Parallel tasks (default: CPU count)
//!   CELERY_WORKER_NAME         - Node name, unique per running worker (default: celery@$HOSTNAME)
//!   RUST_LOG                   - Log filter (default: debug when DEBUG=True, else info)

use eyre::Result;
use std::time::Duration;
use tracing::{info, warn};

use taskhub::models::config::masked_url;
use taskhub::providers;
use taskhub::{init_logging, Settings, TaskRegistry, Worker, WorkerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::from_env()?;
    init_logging(&settings);

    if settings.tasks.is_memory() {
        warn!("⚠️ memory:// broker is process-local; run the API in eager mode instead");
    }

    info!("🚀 taskhub worker {} starting", settings.tasks.worker_name);
    info!("   Broker:  {}", masked_url(&settings.tasks.broker_url));
    info!("   Results: {}", masked_url(&settings.tasks.result_backend));
    info!(
        "   Limits:  soft {}s / hard {}s, acks_late: {}",
        settings.tasks.soft_time_limit.as_secs(),
        settings.tasks.time_limit.as_secs(),
        settings.tasks.acks_late
    );

    let broker = providers::connect(&settings.tasks).await?;
    let worker = Worker::new(
        broker,
        TaskRegistry::with_builtin_tasks(),
        WorkerConfig::from(&settings.tasks),
    );

    let stats_printer = worker.spawn_stats_printer(Duration::from_secs(60));

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("⚠️ Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("🛑 Shutdown signal received, finishing in-flight tasks...");
    };

    worker.run(shutdown).await?;
    stats_printer.abort();

    let stats = worker.get_stats();
    info!("📊 Final Statistics:");
    info!("   Received:    {}", stats.received);
    info!("   Succeeded:   {}", stats.succeeded);
    info!("   Failed:      {}", stats.failed);
    info!("   Rejected:    {}", stats.rejected);
    info!("   Avg Runtime: {:.2}ms", stats.avg_runtime_ms);
    info!("👋 taskhub worker shutdown complete");

    Ok(())
}
