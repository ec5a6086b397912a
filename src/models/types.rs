//! Task queue wire types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// A task invocation as it travels through the broker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskMessage {
    pub id: Uuid,
    /// Registered task name, e.g. `common.add`
    pub task: String,
    #[serde(default)]
    pub args: Vec<Value>,
    #[serde(default)]
    pub kwargs: Map<String, Value>,
    #[serde(default)]
    pub retries: u32,
    pub queued_at: DateTime<Utc>,
}

impl TaskMessage {
    /// New message with a fresh task id
    pub fn new(task: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            id: Uuid::new_v4(),
            task: task.into(),
            args,
            kwargs: Map::new(),
            retries: 0,
            queued_at: Utc::now(),
        }
    }
}

/// Lifecycle of a task as seen by the result backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskState {
    /// Unknown to the backend: queued, or never existed
    Pending,
    Started,
    Success,
    Failure,
}

/// Stored outcome of a task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: Uuid,
    pub status: TaskState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_done: Option<DateTime<Utc>>,
}

impl TaskRecord {
    pub fn pending(task_id: Uuid) -> Self {
        Self {
            task_id,
            status: TaskState::Pending,
            result: None,
            error: None,
            date_done: None,
        }
    }

    pub fn started(task_id: Uuid) -> Self {
        Self {
            status: TaskState::Started,
            ..Self::pending(task_id)
        }
    }

    pub fn success(task_id: Uuid, result: Value) -> Self {
        Self {
            task_id,
            status: TaskState::Success,
            result: Some(result),
            error: None,
            date_done: Some(Utc::now()),
        }
    }

    pub fn failure(task_id: Uuid, error: impl Into<String>) -> Self {
        Self {
            task_id,
            status: TaskState::Failure,
            result: None,
            error: Some(error.into()),
            date_done: Some(Utc::now()),
        }
    }
}
