//! Redis broker integration tests
//!
//! Exercises the list and key protocol against a live Redis.
//! Run with: TASKHUB_TEST_REDIS=redis://127.0.0.1:6379/15 cargo test --test redis_broker_test -- --nocapture
//!
//! Environment Variables:
//! - TASKHUB_TEST_REDIS: Redis URL to use. Tests are skipped when unset.

use eyre::Result;
use redis::AsyncCommands;
use serde_json::json;
use std::time::Duration;
use uuid::Uuid;

use taskhub::providers::redis_broker::{queue_key, result_key, unacked_key};
use taskhub::{Broker, RedisBroker, TaskMessage, TaskRecord, TaskState};

const NODE: &str = "celery@test";

fn redis_url() -> Option<String> {
    match std::env::var("TASKHUB_TEST_REDIS") {
        Ok(url) if !url.is_empty() => Some(url),
        _ => {
            println!("⏭️ TASKHUB_TEST_REDIS not set, skipping Redis test");
            None
        }
    }
}

/// Fresh queue name so runs never see each other's messages
fn unique_queue() -> String {
    format!("test-{}", Uuid::new_v4())
}

async fn raw_conn(url: &str) -> Result<redis::aio::MultiplexedConnection> {
    Ok(redis::Client::open(url)?.get_multiplexed_async_connection().await?)
}

async fn cleanup(url: &str, queue: &str, consumers: &[&str]) -> Result<()> {
    let mut conn = raw_conn(url).await?;
    let mut keys = vec![queue_key(queue)];
    keys.extend(consumers.iter().map(|c| unacked_key(queue, c)));
    let _: i64 = conn.del(keys).await?;
    Ok(())
}

async fn publish_n(broker: &RedisBroker, queue: &str, n: usize) -> Result<Vec<TaskMessage>> {
    let mut messages = Vec::new();
    for i in 0..n {
        let message = TaskMessage::new("common.add", vec![json!(i), json!(i)]);
        broker.publish(queue, &message).await?;
        messages.push(message);
    }
    Ok(messages)
}

fn decode(raw: &str) -> TaskMessage {
    serde_json::from_str(raw).unwrap()
}

#[tokio::test]
async fn test_redis_fifo_delivery() -> Result<()> {
    let Some(url) = redis_url() else { return Ok(()) };
    let broker = RedisBroker::connect(&url, &url).await?;
    let queue = unique_queue();

    let sent = publish_n(&broker, &queue, 2).await?;
    let first = broker.reserve(&queue, NODE, Duration::from_secs(1)).await?.unwrap();
    let second = broker.reserve(&queue, NODE, Duration::from_secs(1)).await?.unwrap();
    assert_eq!(decode(&first.raw).id, sent[0].id);
    assert_eq!(decode(&second.raw).id, sent[1].id);

    let mut conn = raw_conn(&url).await?;
    let parked: i64 = conn.llen(unacked_key(&queue, NODE)).await?;
    assert_eq!(parked, 2);

    cleanup(&url, &queue, &[NODE]).await
}

#[tokio::test]
async fn test_redis_reserve_times_out_on_empty_queue() -> Result<()> {
    let Some(url) = redis_url() else { return Ok(()) };
    let broker = RedisBroker::connect(&url, &url).await?;
    let queue = unique_queue();

    let got = broker.reserve(&queue, NODE, Duration::from_secs(1)).await?;
    assert!(got.is_none());
    Ok(())
}

#[tokio::test]
async fn test_redis_ack_removes_parked_message() -> Result<()> {
    let Some(url) = redis_url() else { return Ok(()) };
    let broker = RedisBroker::connect(&url, &url).await?;
    let queue = unique_queue();

    publish_n(&broker, &queue, 2).await?;
    let a = broker.reserve(&queue, NODE, Duration::from_secs(1)).await?.unwrap();
    let b = broker.reserve(&queue, NODE, Duration::from_secs(1)).await?.unwrap();
    broker.ack(&a).await?;

    let mut conn = raw_conn(&url).await?;
    let parked: Vec<String> = conn.lrange(unacked_key(&queue, NODE), 0, -1).await?;
    assert_eq!(parked, vec![b.raw.clone()]);

    cleanup(&url, &queue, &[NODE]).await
}

#[tokio::test]
async fn test_redis_restore_puts_oldest_reservation_first() -> Result<()> {
    let Some(url) = redis_url() else { return Ok(()) };
    let broker = RedisBroker::connect(&url, &url).await?;
    let queue = unique_queue();

    let sent = publish_n(&broker, &queue, 3).await?;
    broker.reserve(&queue, NODE, Duration::from_secs(1)).await?.unwrap();
    broker.reserve(&queue, NODE, Duration::from_secs(1)).await?.unwrap();

    assert_eq!(broker.restore_unacked(&queue, NODE).await?, 2);

    let mut conn = raw_conn(&url).await?;
    let parked: i64 = conn.llen(unacked_key(&queue, NODE)).await?;
    assert_eq!(parked, 0);

    // Redelivered in the original order, ahead of the untouched message
    for expected in &sent {
        let delivery = broker.reserve(&queue, NODE, Duration::from_secs(1)).await?.unwrap();
        assert_eq!(decode(&delivery.raw).id, expected.id);
    }

    cleanup(&url, &queue, &[NODE]).await
}

#[tokio::test]
async fn test_redis_restore_leaves_other_consumers_alone() -> Result<()> {
    let Some(url) = redis_url() else { return Ok(()) };
    let broker = RedisBroker::connect(&url, &url).await?;
    let queue = unique_queue();

    publish_n(&broker, &queue, 2).await?;
    broker.reserve(&queue, "celery@a", Duration::from_secs(1)).await?.unwrap();
    broker.reserve(&queue, "celery@b", Duration::from_secs(1)).await?.unwrap();

    assert_eq!(broker.restore_unacked(&queue, "celery@a").await?, 1);

    let mut conn = raw_conn(&url).await?;
    let still_parked: i64 = conn.llen(unacked_key(&queue, "celery@b")).await?;
    let pending: i64 = conn.llen(queue_key(&queue)).await?;
    assert_eq!(still_parked, 1);
    assert_eq!(pending, 1);

    cleanup(&url, &queue, &["celery@a", "celery@b"]).await
}

#[tokio::test]
async fn test_redis_results_expire() -> Result<()> {
    let Some(url) = redis_url() else { return Ok(()) };
    let broker = RedisBroker::connect(&url, &url).await?;
    let id = Uuid::new_v4();

    broker
        .store_result(&TaskRecord::success(id, json!(3)), Duration::from_secs(60))
        .await?;
    let stored = broker.get_result(id).await?;
    assert_eq!(stored.status, TaskState::Success);
    assert_eq!(stored.result, Some(json!(3)));

    let mut conn = raw_conn(&url).await?;
    let ttl: i64 = conn.ttl(result_key(id)).await?;
    assert!(ttl > 0 && ttl <= 60, "ttl {}", ttl);

    broker
        .store_result(&TaskRecord::success(id, json!(3)), Duration::from_secs(1))
        .await?;
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(broker.get_result(id).await?.status, TaskState::Pending);
    Ok(())
}

#[tokio::test]
async fn test_redis_unknown_task_is_pending() -> Result<()> {
    let Some(url) = redis_url() else { return Ok(()) };
    let broker = RedisBroker::connect(&url, &url).await?;

    let id = Uuid::new_v4();
    let record = broker.get_result(id).await?;
    assert_eq!(record.status, TaskState::Pending);
    assert_eq!(record.task_id, id);
    Ok(())
}
