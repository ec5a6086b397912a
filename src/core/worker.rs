//! Task worker
//! Reserves messages from the broker, runs the registered task and stores the outcome

use serde_json::Value;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::registry::TaskRegistry;
use crate::models::config::TaskQueueSettings;
use crate::models::errors::{AppError, AppResult};
use crate::models::types::{TaskMessage, TaskRecord, TaskState};
use crate::providers::{Broker, Delivery};

/// Pause after a failed reserve before trying the broker again
const BROKER_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Runtime knobs for a worker
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub queue: String,
    /// Node name that owns this worker's unacked list
    pub consumer: String,
    /// Messages held at once (concurrency * prefetch multiplier)
    pub max_in_flight: usize,
    pub time_limit: Duration,
    pub soft_time_limit: Duration,
    pub result_expires: Duration,
    /// How long one reserve call blocks
    pub poll_timeout: Duration,
}

impl From<&TaskQueueSettings> for WorkerConfig {
    fn from(settings: &TaskQueueSettings) -> Self {
        Self {
            queue: settings.default_queue.clone(),
            consumer: settings.worker_name.clone(),
            max_in_flight: settings.max_in_flight(),
            time_limit: settings.time_limit,
            soft_time_limit: settings.soft_time_limit,
            result_expires: settings.result_expires,
            poll_timeout: Duration::from_secs(1),
        }
    }
}

/// Thread-safe statistics
#[derive(Default)]
struct WorkerCounters {
    received: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    rejected: AtomicU64,
    total_runtime_ms: AtomicU64,
}

/// Snapshot of worker statistics
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorkerStats {
    pub received: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// Malformed messages dropped without running
    pub rejected: u64,
    pub avg_runtime_ms: f64,
}

pub struct Worker {
    broker: Arc<dyn Broker>,
    registry: Arc<TaskRegistry>,
    config: WorkerConfig,
    stats: Arc<WorkerCounters>,
}

impl Worker {
    pub fn new(broker: Arc<dyn Broker>, registry: TaskRegistry, config: WorkerConfig) -> Self {
        Self {
            broker,
            registry: Arc::new(registry),
            config,
            stats: Arc::new(WorkerCounters::default()),
        }
    }

    /// Consume the queue until `shutdown` resolves, then drain in-flight tasks
    pub async fn run<S>(&self, shutdown: S) -> AppResult<()>
    where
        S: Future<Output = ()>,
    {
        let restored = self
            .broker
            .restore_unacked(&self.config.queue, &self.config.consumer)
            .await?;
        if restored > 0 {
            info!(
                "♻️ Restored {} unacknowledged message(s) left by {} to {}",
                restored, self.config.consumer, self.config.queue
            );
        }

        info!(
            "👷 {} consuming '{}' via {} broker (slots: {}, tasks: {:?})",
            self.config.consumer,
            self.config.queue,
            self.broker.name(),
            self.config.max_in_flight,
            self.registry.names()
        );

        let semaphore = Arc::new(Semaphore::new(self.config.max_in_flight));
        let mut in_flight = JoinSet::new();
        let mut fatal = None;
        tokio::pin!(shutdown);

        loop {
            let permit = tokio::select! {
                _ = &mut shutdown => break,
                permit = semaphore.clone().acquire_owned() => {
                    permit.map_err(|_| AppError::internal("worker semaphore closed"))?
                }
            };

            let reserved = tokio::select! {
                _ = &mut shutdown => break,
                reserved = self.broker.reserve(
                    &self.config.queue,
                    &self.config.consumer,
                    self.config.poll_timeout,
                ) => reserved,
            };

            match reserved {
                Ok(Some(delivery)) => {
                    let broker = self.broker.clone();
                    let registry = self.registry.clone();
                    let config = self.config.clone();
                    let stats = self.stats.clone();
                    in_flight.spawn(async move {
                        let _permit = permit;
                        process_delivery(broker.as_ref(), &registry, &config, &stats, delivery).await;
                    });
                }
                Ok(None) => {}
                Err(e) if e.code.is_retryable() => {
                    warn!("⚠️ Reserve failed [{}]: {}, retrying", e.code_str(), e.message);
                    tokio::time::sleep(BROKER_RETRY_DELAY).await;
                }
                Err(e) => {
                    error!("❌ Reserve failed [{}]: {}, stopping", e.code_str(), e.message);
                    fatal = Some(e);
                    break;
                }
            }

            while in_flight.try_join_next().is_some() {}
        }

        if !in_flight.is_empty() {
            info!("⏳ Waiting for {} in-flight task(s)...", in_flight.len());
        }
        while in_flight.join_next().await.is_some() {}

        match fatal {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Reserve and process a single message, if one arrives within the poll timeout
    pub async fn run_once(&self) -> AppResult<Option<TaskRecord>> {
        let Some(delivery) = self
            .broker
            .reserve(&self.config.queue, &self.config.consumer, self.config.poll_timeout)
            .await?
        else {
            return Ok(None);
        };
        Ok(process_delivery(self.broker.as_ref(), &self.registry, &self.config, &self.stats, delivery).await)
    }

    /// Log statistics every `every` until the returned handle is aborted
    pub fn spawn_stats_printer(&self, every: Duration) -> tokio::task::JoinHandle<()> {
        let stats = self.stats.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.tick().await;
            loop {
                interval.tick().await;
                let s = snapshot(&stats);
                info!(
                    "📊 Stats | Received: {} | Succeeded: {} | Failed: {} | Rejected: {} | Avg Runtime: {:.2}ms",
                    s.received, s.succeeded, s.failed, s.rejected, s.avg_runtime_ms
                );
            }
        })
    }

    /// Get current statistics
    pub fn get_stats(&self) -> WorkerStats {
        snapshot(&self.stats)
    }
}

fn snapshot(stats: &WorkerCounters) -> WorkerStats {
    let succeeded = stats.succeeded.load(Ordering::Relaxed);
    let failed = stats.failed.load(Ordering::Relaxed);
    let finished = succeeded + failed;
    let total_runtime = stats.total_runtime_ms.load(Ordering::Relaxed);

    WorkerStats {
        received: stats.received.load(Ordering::Relaxed),
        succeeded,
        failed,
        rejected: stats.rejected.load(Ordering::Relaxed),
        avg_runtime_ms: if finished > 0 {
            total_runtime as f64 / finished as f64
        } else {
            0.0
        },
    }
}

/// Run one delivery to completion and ack it. Returns the stored record,
/// or `None` when the payload could not be decoded.
async fn process_delivery(
    broker: &dyn Broker,
    registry: &TaskRegistry,
    config: &WorkerConfig,
    stats: &WorkerCounters,
    delivery: Delivery,
) -> Option<TaskRecord> {
    stats.received.fetch_add(1, Ordering::Relaxed);

    let message: TaskMessage = match serde_json::from_str(&delivery.raw) {
        Ok(message) => message,
        Err(e) => {
            error!("❌ Dropping malformed message on {}: {}", delivery.queue, e);
            stats.rejected.fetch_add(1, Ordering::Relaxed);
            ack(broker, &delivery).await;
            return None;
        }
    };

    let start = Instant::now();
    info!(task_id = %message.id, task = %message.task, "▶️ Task received");

    if let Err(e) = broker
        .store_result(&TaskRecord::started(message.id), config.result_expires)
        .await
    {
        warn!(task_id = %message.id, "⚠️ Could not mark task started: {}", e);
    }

    let record = match execute(registry, config, &message).await {
        Ok(value) => {
            stats.succeeded.fetch_add(1, Ordering::Relaxed);
            TaskRecord::success(message.id, value)
        }
        Err(e) => {
            stats.failed.fetch_add(1, Ordering::Relaxed);
            error!(task_id = %message.id, task = %message.task, code = e.code_str(), "❌ Task failed: {}", e.message);
            TaskRecord::failure(message.id, e.message)
        }
    };

    let runtime = start.elapsed();
    stats
        .total_runtime_ms
        .fetch_add(runtime.as_millis() as u64, Ordering::Relaxed);

    if record.status == TaskState::Success {
        info!(
            task_id = %message.id,
            task = %message.task,
            runtime_ms = %runtime.as_millis(),
            "✅ Task succeeded: {}",
            record.result.as_ref().unwrap_or(&serde_json::Value::Null)
        );
    }

    if let Err(e) = broker.store_result(&record, config.result_expires).await {
        error!(task_id = %message.id, "❌ Could not store result: {}", e);
    }
    ack(broker, &delivery).await;

    Some(record)
}

async fn ack(broker: &dyn Broker, delivery: &Delivery) {
    if let Err(e) = broker.ack(delivery).await {
        warn!("⚠️ Ack failed on {}: {}", delivery.queue, e);
    }
}

/// Run the handler under the soft and hard time limits
async fn execute(registry: &TaskRegistry, config: &WorkerConfig, message: &TaskMessage) -> AppResult<Value> {
    let handler = registry
        .get(&message.task)
        .ok_or_else(|| AppError::unregistered_task(&message.task))?;

    let task = handler(message.args.clone(), message.kwargs.clone());
    let soft = tokio::time::sleep(config.soft_time_limit);
    let hard = tokio::time::sleep(config.time_limit);
    tokio::pin!(task, soft, hard);

    let mut soft_exceeded = false;
    loop {
        tokio::select! {
            out = &mut task => return out,
            _ = &mut soft, if !soft_exceeded => {
                soft_exceeded = true;
                warn!(
                    task_id = %message.id,
                    task = %message.task,
                    "⏰ Soft time limit ({}s) exceeded",
                    config.soft_time_limit.as_secs()
                );
            }
            _ = &mut hard => {
                debug!(task_id = %message.id, "Aborting task at hard time limit");
                return Err(AppError::time_limit_exceeded(config.time_limit.as_secs()));
            }
        }
    }
}
