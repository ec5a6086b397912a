//! Redis broker and result backend
//!
//! Layout:
//! - `taskhub:queue:<name>`   pending messages (LPUSH in, BRPOPLPUSH out)
//! - `taskhub:unacked:<name>:<consumer>` messages one consumer reserved and has not acked
//! - `taskhub-task-meta-<id>` task outcome, expires after `result_expires`

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::debug;
use uuid::Uuid;

use super::broker::{Broker, Delivery};
use crate::models::errors::AppResult;
use crate::models::types::{TaskMessage, TaskRecord};

pub fn queue_key(queue: &str) -> String {
    format!("taskhub:queue:{}", queue)
}

pub fn unacked_key(queue: &str, consumer: &str) -> String {
    format!("taskhub:unacked:{}:{}", queue, consumer)
}

pub fn result_key(task_id: Uuid) -> String {
    format!("taskhub-task-meta-{}", task_id)
}

pub struct RedisBroker {
    client: redis::Client,
    /// Producer / ack connection
    broker: ConnectionManager,
    /// Result backend connection (may be a different Redis database)
    backend: ConnectionManager,
    /// Dedicated connection for blocking pops, opened on first reserve
    blocking: OnceCell<ConnectionManager>,
}

impl RedisBroker {
    pub async fn connect(broker_url: &str, result_backend: &str) -> AppResult<Self> {
        let client = redis::Client::open(broker_url)?;
        let broker = ConnectionManager::new(client.clone()).await?;

        let backend = if result_backend == broker_url {
            broker.clone()
        } else {
            ConnectionManager::new(redis::Client::open(result_backend)?).await?
        };

        Ok(Self {
            client,
            broker,
            backend,
            blocking: OnceCell::new(),
        })
    }

    async fn blocking(&self) -> AppResult<ConnectionManager> {
        let conn = self
            .blocking
            .get_or_try_init(|| ConnectionManager::new(self.client.clone()))
            .await?;
        Ok(conn.clone())
    }
}

#[async_trait]
impl Broker for RedisBroker {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn publish(&self, queue: &str, message: &TaskMessage) -> AppResult<()> {
        let raw = serde_json::to_string(message)?;
        let mut conn = self.broker.clone();
        let _: i64 = conn.lpush(queue_key(queue), raw).await?;
        debug!(task_id = %message.id, task = %message.task, "📤 Published to {}", queue_key(queue));
        Ok(())
    }

    async fn reserve(&self, queue: &str, consumer: &str, timeout: Duration) -> AppResult<Option<Delivery>> {
        let mut conn = self.blocking().await?;
        // BRPOPLPUSH takes whole seconds; 0 would block forever
        let timeout_secs = timeout.as_secs().max(1);
        let raw: Option<String> = redis::cmd("BRPOPLPUSH")
            .arg(queue_key(queue))
            .arg(unacked_key(queue, consumer))
            .arg(timeout_secs)
            .query_async(&mut conn)
            .await?;

        Ok(raw.map(|raw| Delivery {
            queue: queue.to_string(),
            consumer: consumer.to_string(),
            raw,
        }))
    }

    async fn ack(&self, delivery: &Delivery) -> AppResult<()> {
        let mut conn = self.broker.clone();
        let _: i64 = conn
            .lrem(unacked_key(&delivery.queue, &delivery.consumer), 1, &delivery.raw)
            .await?;
        Ok(())
    }

    async fn restore_unacked(&self, queue: &str, consumer: &str) -> AppResult<usize> {
        let mut conn = self.broker.clone();
        let mut restored = 0;
        loop {
            // Newest reservation leaves first and lands at the consumer end,
            // so the oldest one ends up being reserved first again
            let moved: Option<String> = redis::cmd("LMOVE")
                .arg(unacked_key(queue, consumer))
                .arg(queue_key(queue))
                .arg("LEFT")
                .arg("RIGHT")
                .query_async(&mut conn)
                .await?;
            if moved.is_none() {
                break;
            }
            restored += 1;
        }
        Ok(restored)
    }

    async fn store_result(&self, record: &TaskRecord, ttl: Duration) -> AppResult<()> {
        let raw = serde_json::to_string(record)?;
        let mut conn = self.backend.clone();
        let _: () = redis::cmd("SET")
            .arg(result_key(record.task_id))
            .arg(raw)
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn get_result(&self, task_id: Uuid) -> AppResult<TaskRecord> {
        let mut conn = self.backend.clone();
        let raw: Option<String> = conn.get(result_key(task_id)).await?;
        match raw {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(TaskRecord::pending(task_id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        assert_eq!(queue_key("celery"), "taskhub:queue:celery");
        assert_eq!(
            unacked_key("celery", "celery@host-a"),
            "taskhub:unacked:celery:celery@host-a"
        );
        let id = Uuid::parse_str("6f1c1d2e-8d8b-4a53-9d7c-2a0f8f2f6a10").unwrap();
        assert_eq!(
            result_key(id),
            "taskhub-task-meta-6f1c1d2e-8d8b-4a53-9d7c-2a0f8f2f6a10"
        );
    }
}
