//! Task registry and producer helpers
//!
//! Tasks are async functions taking positional and keyword JSON arguments.
//! The registry maps task names to handlers; producers only need the name.

use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::errors::{AppError, AppResult};
use crate::models::types::TaskMessage;
use crate::providers::Broker;

/// Name of the built-in addition task
pub const ADD_TASK: &str = "common.add";

pub type TaskFuture = Pin<Box<dyn Future<Output = AppResult<Value>> + Send>>;
pub type TaskHandler = Arc<dyn Fn(Vec<Value>, Map<String, Value>) -> TaskFuture + Send + Sync>;

#[derive(Clone, Default)]
pub struct TaskRegistry {
    handlers: HashMap<String, TaskHandler>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every task this crate ships
    pub fn with_builtin_tasks() -> Self {
        let mut registry = Self::new();
        registry.register(ADD_TASK, add);
        registry
    }

    pub fn register<F, Fut>(&mut self, name: impl Into<String>, handler: F)
    where
        F: Fn(Vec<Value>, Map<String, Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = AppResult<Value>> + Send + 'static,
    {
        let boxed: TaskHandler = Arc::new(
            move |args: Vec<Value>, kwargs: Map<String, Value>| -> TaskFuture {
                Box::pin(handler(args, kwargs))
            },
        );
        self.handlers.insert(name.into(), boxed);
    }

    pub fn get(&self, name: &str) -> Option<TaskHandler> {
        self.handlers.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

// ============================================
// Built-in tasks
// ============================================

/// `common.add(x, y)` -> `x + y`
pub async fn add(args: Vec<Value>, kwargs: Map<String, Value>) -> AppResult<Value> {
    let given = args.len() + kwargs.len();
    if given != 2 {
        return Err(AppError::invalid_arguments(format!(
            "add() takes exactly 2 arguments ({} given)",
            given
        )));
    }

    let x = int_arg(&args, &kwargs, 0, "x")?;
    let y = int_arg(&args, &kwargs, 1, "y")?;
    let sum = x
        .checked_add(y)
        .ok_or_else(|| AppError::task_failed("integer overflow in add()"))?;
    Ok(json!(sum))
}

fn int_arg(args: &[Value], kwargs: &Map<String, Value>, pos: usize, name: &str) -> AppResult<i64> {
    let value = args
        .get(pos)
        .or_else(|| kwargs.get(name))
        .ok_or_else(|| AppError::invalid_arguments(format!("add() missing argument '{}'", name)))?;
    value
        .as_i64()
        .ok_or_else(|| AppError::invalid_arguments(format!("add() argument '{}' must be an integer, got {}", name, value)))
}

// ============================================
// Producer side
// ============================================

/// Queue `task` with positional `args`; returns the new task id
pub async fn send_task(
    broker: &dyn Broker,
    queue: &str,
    task: &str,
    args: Vec<Value>,
) -> AppResult<Uuid> {
    let message = TaskMessage::new(task, args);
    broker.publish(queue, &message).await?;
    Ok(message.id)
}

/// Queue `common.add(x, y)`
pub async fn delay_add(broker: &dyn Broker, queue: &str, x: i64, y: i64) -> AppResult<Uuid> {
    send_task(broker, queue, ADD_TASK, vec![json!(x), json!(y)]).await
}
