//! In-process broker
//!
//! Same delivery contract as the Redis broker, scoped to one process.
//! Used for development (`CELERY_BROKER_URL=memory://`) and in tests.

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tracing::{debug, info};
use uuid::Uuid;

use super::broker::{Broker, Delivery};
use crate::models::errors::AppResult;
use crate::models::types::{TaskMessage, TaskRecord};

struct StoredResult {
    record: TaskRecord,
    expires_at: Instant,
}

impl StoredResult {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

fn parked_key(queue: &str, consumer: &str) -> String {
    format!("{}:{}", queue, consumer)
}

#[derive(Default)]
pub struct MemoryBroker {
    queues: DashMap<String, VecDeque<String>>,
    /// Keyed by `<queue>:<consumer>`
    unacked: DashMap<String, Vec<String>>,
    results: DashMap<Uuid, StoredResult>,
    notify: Notify,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages waiting in `queue`
    pub fn queue_len(&self, queue: &str) -> usize {
        self.queues.get(queue).map(|q| q.len()).unwrap_or(0)
    }

    /// Messages `consumer` reserved from `queue` and has not acked yet
    pub fn unacked_len(&self, queue: &str, consumer: &str) -> usize {
        self.unacked
            .get(&parked_key(queue, consumer))
            .map(|q| q.len())
            .unwrap_or(0)
    }

    /// Stored results, expired or not
    pub fn results_len(&self) -> usize {
        self.results.len()
    }

    /// Remove every expired result
    pub fn cleanup_expired(&self) -> usize {
        let before = self.results.len();
        self.results.retain(|_, entry| !entry.is_expired());
        let removed = before.saturating_sub(self.results.len());
        if removed > 0 {
            info!("🧹 RESULT CLEANUP: {} expired results removed", removed);
        }
        removed
    }

    fn pop(&self, queue: &str, consumer: &str) -> Option<String> {
        let raw = self.queues.get_mut(queue)?.pop_front()?;
        self.unacked
            .entry(parked_key(queue, consumer))
            .or_default()
            .push(raw.clone());
        Some(raw)
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn publish(&self, queue: &str, message: &TaskMessage) -> AppResult<()> {
        let raw = serde_json::to_string(message)?;
        self.queues
            .entry(queue.to_string())
            .or_default()
            .push_back(raw);
        self.notify.notify_one();
        debug!(task_id = %message.id, task = %message.task, "📤 Published to memory queue {}", queue);
        Ok(())
    }

    async fn reserve(&self, queue: &str, consumer: &str, timeout: Duration) -> AppResult<Option<Delivery>> {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            if let Some(raw) = self.pop(queue, consumer) {
                return Ok(Some(Delivery {
                    queue: queue.to_string(),
                    consumer: consumer.to_string(),
                    raw,
                }));
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() || tokio::time::timeout(remaining, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn ack(&self, delivery: &Delivery) -> AppResult<()> {
        if let Some(mut parked) = self.unacked.get_mut(&parked_key(&delivery.queue, &delivery.consumer)) {
            if let Some(pos) = parked.iter().position(|raw| raw == &delivery.raw) {
                parked.remove(pos);
            }
        }
        Ok(())
    }

    async fn restore_unacked(&self, queue: &str, consumer: &str) -> AppResult<usize> {
        let parked = match self.unacked.get_mut(&parked_key(queue, consumer)) {
            Some(mut parked) => std::mem::take(&mut *parked),
            None => return Ok(0),
        };
        let restored = parked.len();
        if restored > 0 {
            let mut pending = self.queues.entry(queue.to_string()).or_default();
            // Oldest reservation goes to the front
            for raw in parked.into_iter().rev() {
                pending.push_front(raw);
            }
            drop(pending);
            self.notify.notify_one();
        }
        Ok(restored)
    }

    async fn store_result(&self, record: &TaskRecord, ttl: Duration) -> AppResult<()> {
        self.results.insert(
            record.task_id,
            StoredResult {
                record: record.clone(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn get_result(&self, task_id: Uuid) -> AppResult<TaskRecord> {
        if let Some(entry) = self.results.get(&task_id) {
            if !entry.is_expired() {
                return Ok(entry.record.clone());
            }
            drop(entry); // Release read lock
            self.results.remove(&task_id);
        }
        Ok(TaskRecord::pending(task_id))
    }

    async fn purge_expired(&self) -> AppResult<usize> {
        Ok(self.cleanup_expired())
    }
}
