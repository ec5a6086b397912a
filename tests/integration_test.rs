//! Integration tests for the HTTP API
//!
//! Drives the full router (middleware included) against the in-process broker.

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use uuid::Uuid;

use taskhub::providers::Delivery;
use taskhub::{
    bind_listener, create_router, AppError, AppResult, AppState, Broker, MemoryBroker, Settings, TaskMessage,
    TaskRecord, TaskRegistry, Worker, WorkerConfig,
};

fn settings(vars: &[(&str, &str)]) -> Arc<Settings> {
    let map: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    Arc::new(Settings::from_lookup(|key| map.get(key).cloned()).unwrap())
}

fn app_with(settings: Arc<Settings>, broker: Arc<dyn Broker>) -> Router {
    create_router(Arc::new(AppState::new(settings, broker)))
}

async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
    get_with_host(app, uri, "testserver").await
}

async fn get_with_host(app: Router, uri: &str, host: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .uri(uri)
        .header(header::HOST, host)
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

/// Broker whose every call fails as if Redis were down
struct DownBroker;

#[async_trait]
impl Broker for DownBroker {
    fn name(&self) -> &'static str {
        "down"
    }
    async fn publish(&self, _queue: &str, _message: &TaskMessage) -> AppResult<()> {
        Err(AppError::broker_unavailable("Connection refused (os error 111)"))
    }
    async fn reserve(&self, _queue: &str, _consumer: &str, _timeout: Duration) -> AppResult<Option<Delivery>> {
        Err(AppError::broker_unavailable("Connection refused (os error 111)"))
    }
    async fn ack(&self, _delivery: &Delivery) -> AppResult<()> {
        Err(AppError::broker_unavailable("Connection refused (os error 111)"))
    }
    async fn restore_unacked(&self, _queue: &str, _consumer: &str) -> AppResult<usize> {
        Err(AppError::broker_unavailable("Connection refused (os error 111)"))
    }
    async fn store_result(&self, _record: &TaskRecord, _ttl: Duration) -> AppResult<()> {
        Err(AppError::broker_unavailable("Connection refused (os error 111)"))
    }
    async fn get_result(&self, _task_id: Uuid) -> AppResult<TaskRecord> {
        Err(AppError::broker_unavailable("Connection refused (os error 111)"))
    }
}

// ============================================
// Health
// ============================================

#[tokio::test]
async fn test_health_returns_ok() {
    let app = app_with(settings(&[]), Arc::new(MemoryBroker::new()));
    let (status, body) = get(app, "/api/health/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::json!({"status": "ok"}));
}

#[tokio::test]
async fn test_health_ignores_broker_state() {
    let app = app_with(settings(&[]), Arc::new(DownBroker));
    let (status, body) = get(app, "/api/health/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

// ============================================
// Add task
// ============================================

#[tokio::test]
async fn test_add_defaults_queue_one_plus_two() {
    let broker = Arc::new(MemoryBroker::new());
    let app = app_with(settings(&[]), broker.clone());

    let (status, body) = get(app, "/api/common/add/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["queued"], true);
    let task_id = body["task_id"].as_str().unwrap();
    assert!(!task_id.is_empty());
    assert!(Uuid::parse_str(task_id).is_ok());

    let delivery = broker.reserve("celery", "celery@test", Duration::ZERO).await.unwrap().unwrap();
    let message: TaskMessage = serde_json::from_str(&delivery.raw).unwrap();
    assert_eq!(message.id.to_string(), task_id);
    assert_eq!(message.task, "common.add");
    assert_eq!(message.args, vec![serde_json::json!(1), serde_json::json!(2)]);
}

#[tokio::test]
async fn test_add_uses_query_values() {
    let broker = Arc::new(MemoryBroker::new());
    let app = app_with(settings(&[]), broker.clone());

    let (status, _) = get(app, "/api/common/add/?x=-4&y=%2010%20").await;
    assert_eq!(status, StatusCode::OK);

    let delivery = broker.reserve("celery", "celery@test", Duration::ZERO).await.unwrap().unwrap();
    let message: TaskMessage = serde_json::from_str(&delivery.raw).unwrap();
    assert_eq!(message.args, vec![serde_json::json!(-4), serde_json::json!(10)]);
}

#[tokio::test]
async fn test_add_repeated_parameter_uses_last_value() {
    let broker = Arc::new(MemoryBroker::new());
    let app = app_with(settings(&[]), broker.clone());

    let (status, _) = get(app, "/api/common/add/?x=1&x=5&y=3").await;
    assert_eq!(status, StatusCode::OK);

    let delivery = broker.reserve("celery", "celery@test", Duration::ZERO).await.unwrap().unwrap();
    let message: TaskMessage = serde_json::from_str(&delivery.raw).unwrap();
    assert_eq!(message.args, vec![serde_json::json!(5), serde_json::json!(3)]);
}

#[tokio::test]
async fn test_add_rejects_non_numeric() {
    for uri in [
        "/api/common/add/?x=abc",
        "/api/common/add/?y=1.5",
        "/api/common/add/?x=",
    ] {
        let broker = Arc::new(MemoryBroker::new());
        let app = app_with(settings(&[]), broker.clone());
        let (status, body) = get(app, uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
        assert!(body["error"].is_string(), "{}", uri);
        assert_eq!(broker.queue_len("celery"), 0);
    }
}

#[tokio::test]
async fn test_add_error_message() {
    let app = app_with(settings(&[]), Arc::new(MemoryBroker::new()));
    let (_, body) = get(app, "/api/common/add/?x=abc").await;
    assert_eq!(body["error"], "invalid literal for int() with base 10: 'abc'");

    let app = app_with(settings(&[]), Arc::new(MemoryBroker::new()));
    let (_, body) = get(app, "/api/common/add/?x=a%27b").await;
    assert_eq!(body["error"], "invalid literal for int() with base 10: \"a'b\"");
}

#[tokio::test]
async fn test_add_dispatch_failure_is_bad_request() {
    let app = app_with(settings(&[]), Arc::new(DownBroker));
    let (status, body) = get(app, "/api/common/add/").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Connection refused (os error 111)");
}

#[tokio::test]
async fn test_add_uses_configured_queue() {
    let broker = Arc::new(MemoryBroker::new());
    let app = app_with(settings(&[("CELERY_DEFAULT_QUEUE", "math")]), broker.clone());
    let (status, _) = get(app, "/api/common/add/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(broker.queue_len("math"), 1);
    assert_eq!(broker.queue_len("celery"), 0);
}

// ============================================
// Task status
// ============================================

#[tokio::test]
async fn test_task_status_round_trip_through_worker() {
    let settings = settings(&[]);
    let broker = Arc::new(MemoryBroker::new());
    let app = app_with(settings.clone(), broker.clone());

    let (_, body) = get(app.clone(), "/api/common/add/?x=20&y=22").await;
    let task_id = body["task_id"].as_str().unwrap().to_string();
    let status_uri = format!("/api/common/tasks/{}/", task_id);

    let (status, pending) = get(app.clone(), &status_uri).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(pending["status"], "PENDING");

    let mut config = WorkerConfig::from(&settings.tasks);
    config.poll_timeout = Duration::from_millis(50);
    let worker = Worker::new(broker.clone(), TaskRegistry::with_builtin_tasks(), config);
    worker.run_once().await.unwrap();

    let (status, done) = get(app, &status_uri).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(done["status"], "SUCCESS");
    assert_eq!(done["result"], 42);
    assert_eq!(done["task_id"], task_id.as_str());
}

#[tokio::test]
async fn test_task_status_rejects_malformed_id() {
    let app = app_with(settings(&[]), Arc::new(MemoryBroker::new()));
    let (status, body) = get(app, "/api/common/tasks/not-a-uuid/").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_task_status_backend_down_is_unavailable() {
    let app = app_with(settings(&[]), Arc::new(DownBroker));
    let uri = format!("/api/common/tasks/{}/", Uuid::new_v4());
    let (status, body) = get(app, &uri).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["error"].is_string());
}

// ============================================
// Routing & hosts
// ============================================

#[tokio::test]
async fn test_unknown_route_is_json_404() {
    let app = app_with(settings(&[]), Arc::new(MemoryBroker::new()));
    let (status, body) = get(app, "/api/nope/").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Not found");
}

#[tokio::test]
async fn test_disallowed_host_is_rejected() {
    let settings = settings(&[("ALLOWED_HOSTS", "api.example.com,.example.org")]);
    let broker: Arc<dyn Broker> = Arc::new(MemoryBroker::new());

    let app = app_with(settings.clone(), broker.clone());
    let (status, body) = get_with_host(app, "/api/health/", "evil.test").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid HTTP_HOST header: 'evil.test'");

    let app = app_with(settings.clone(), broker.clone());
    let (status, _) = get_with_host(app, "/api/health/", "api.example.com:8000").await;
    assert_eq!(status, StatusCode::OK);

    let app = app_with(settings, broker);
    let (status, _) = get_with_host(app, "/api/health/", "www.example.org").await;
    assert_eq!(status, StatusCode::OK);
}

// ============================================
// Listener
// ============================================

#[tokio::test]
async fn test_bind_accepts_hostnames_and_ip_literals() {
    for host in ["localhost", "127.0.0.1"] {
        let settings = settings(&[("HOST", host), ("PORT", "0")]);
        let listener = bind_listener(&settings).await.unwrap();
        let addr = listener.local_addr().unwrap();
        assert!(addr.ip().is_loopback(), "{}", host);
        assert_ne!(addr.port(), 0);
    }
}
