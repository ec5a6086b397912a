//! Broker abstraction
//!
//! A broker moves serialized [`TaskMessage`]s from producers to workers and
//! keeps task outcomes for later lookup. Delivery is acks-late: a reserved
//! message stays parked under the reserving consumer until it is acked.
//! A restarted consumer hands its own parked messages out again through
//! [`Broker::restore_unacked`]; other consumers' reservations are left alone.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::config::{masked_url, TaskQueueSettings};
use crate::models::errors::AppResult;
use crate::models::types::{TaskMessage, TaskRecord};

use super::memory::MemoryBroker;
use super::redis_broker::RedisBroker;

/// A message handed to a worker, not yet acknowledged
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub queue: String,
    /// Consumer whose unacked list holds the message
    pub consumer: String,
    /// Payload exactly as stored; used to ack
    pub raw: String,
}

#[async_trait]
pub trait Broker: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Append a message to the queue
    async fn publish(&self, queue: &str, message: &TaskMessage) -> AppResult<()>;

    /// Take the oldest message and park it under `consumer`, waiting up to `timeout`
    async fn reserve(&self, queue: &str, consumer: &str, timeout: Duration) -> AppResult<Option<Delivery>>;

    /// Forget a reserved message after it was processed
    async fn ack(&self, delivery: &Delivery) -> AppResult<()>;

    /// Put the messages `consumer` reserved but never acked back on the queue
    async fn restore_unacked(&self, queue: &str, consumer: &str) -> AppResult<usize>;

    /// Persist a task outcome for `ttl`
    async fn store_result(&self, record: &TaskRecord, ttl: Duration) -> AppResult<()>;

    /// Look up a task outcome; unknown ids are PENDING
    async fn get_result(&self, task_id: Uuid) -> AppResult<TaskRecord>;

    /// Drop expired task outcomes. Backends with native expiry have nothing to do.
    async fn purge_expired(&self) -> AppResult<usize> {
        Ok(0)
    }
}

/// Connect to the broker selected by the settings
pub async fn connect(settings: &TaskQueueSettings) -> AppResult<Arc<dyn Broker>> {
    if settings.is_memory() {
        info!("🧠 Using in-process broker (memory://)");
        return Ok(Arc::new(MemoryBroker::new()));
    }

    let broker = RedisBroker::connect(&settings.broker_url, &settings.result_backend).await?;
    info!(
        "✅ Connected to broker {} (results: {})",
        masked_url(&settings.broker_url),
        masked_url(&settings.result_backend)
    );
    Ok(Arc::new(broker))
}

/// Periodically purge expired results until the returned handle is aborted
pub fn start_cleanup_task(broker: Arc<dyn Broker>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            if let Err(e) = broker.purge_expired().await {
                warn!("⚠️ Result cleanup failed on {} broker: {}", broker.name(), e);
            }
        }
    })
}
