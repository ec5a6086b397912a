//! Settings for the API server and the worker
//!
//! Every value is read from the environment with a development default,
//! so a bare `cargo run` talks to a local Redis and MySQL.

use std::time::Duration;

use super::errors::{AppError, AppResult};

const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379/0";
const DEFAULT_REDIS_DB1_URL: &str = "redis://127.0.0.1:6379/1";

/// Broker URL that selects the in-process broker
pub const MEMORY_BROKER_URL: &str = "memory://";

/// MySQL connection settings
#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub name: String,
    pub user: String,
    pub password: String,
    pub host: String,
    pub port: u16,
    pub charset: &'static str,
    pub init_command: &'static str,
    /// Persistent connection lifetime
    pub conn_max_age: Duration,
}

impl DatabaseSettings {
    /// Connection URL (contains the password)
    pub fn url(&self) -> String {
        format!(
            "mysql://{}:{}@{}:{}/{}?charset={}",
            self.user, self.password, self.host, self.port, self.name, self.charset
        )
    }

    /// Connection URL safe for logs
    pub fn masked_url(&self) -> String {
        masked_url(&self.url())
    }
}

/// Redis cache locations
#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub default_location: String,
    pub session_location: String,
}

/// Task queue settings
#[derive(Debug, Clone)]
pub struct TaskQueueSettings {
    pub broker_url: String,
    pub result_backend: String,
    pub default_queue: String,
    /// Ack after execution instead of on receipt
    pub acks_late: bool,
    pub time_limit: Duration,
    pub soft_time_limit: Duration,
    pub prefetch_multiplier: usize,
    pub concurrency: usize,
    pub result_expires: Duration,
    /// Node name; owns its own unacked list, so it must be unique per running worker
    pub worker_name: String,
}

impl TaskQueueSettings {
    /// Whether the in-process broker is selected
    pub fn is_memory(&self) -> bool {
        self.broker_url == MEMORY_BROKER_URL
    }

    /// Maximum number of messages a worker holds at once
    pub fn max_in_flight(&self) -> usize {
        (self.concurrency * self.prefetch_multiplier).max(1)
    }
}

/// Application settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub secret_key: String,
    pub debug: bool,
    pub allowed_hosts: Vec<String>,
    pub database: DatabaseSettings,
    pub cache: CacheSettings,
    pub tasks: TaskQueueSettings,
    pub cors_allow_all_origins: bool,
    pub language_code: &'static str,
    pub time_zone: &'static str,
    pub host: String,
    pub port: u16,
}

impl Settings {
    /// Load settings from the process environment
    pub fn from_env() -> AppResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let redis_url = lookup("REDIS_URL");

        let allowed_hosts = var("ALLOWED_HOSTS", "*")
            .split(',')
            .map(|h| h.trim().to_lowercase())
            .filter(|h| !h.is_empty())
            .collect();

        let database = DatabaseSettings {
            name: var("DB_NAME", "appdb"),
            user: var("DB_USER", "appuser"),
            password: var("DB_PASSWORD", "apppass"),
            host: var("DB_HOST", "127.0.0.1"),
            port: parse_var(&lookup, "DB_PORT", 3306)?,
            charset: "utf8mb4",
            init_command: "SET sql_mode='STRICT_TRANS_TABLES'",
            conn_max_age: Duration::from_secs(60),
        };

        let cache = CacheSettings {
            default_location: redis_url.clone().unwrap_or_else(|| DEFAULT_REDIS_URL.to_string()),
            session_location: lookup("REDIS_SESSION_URL")
                .or_else(|| redis_url.clone())
                .unwrap_or_else(|| DEFAULT_REDIS_DB1_URL.to_string()),
        };

        let default_concurrency = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        let tasks = TaskQueueSettings {
            broker_url: lookup("CELERY_BROKER_URL")
                .or_else(|| redis_url.clone())
                .unwrap_or_else(|| DEFAULT_REDIS_URL.to_string()),
            result_backend: lookup("CELERY_RESULT_BACKEND")
                .or_else(|| redis_url.clone())
                .unwrap_or_else(|| DEFAULT_REDIS_DB1_URL.to_string()),
            default_queue: var("CELERY_DEFAULT_QUEUE", "celery"),
            acks_late: true,
            time_limit: Duration::from_secs(parse_var(&lookup, "CELERY_TASK_TIME_LIMIT", 30 * 60)?),
            soft_time_limit: Duration::from_secs(parse_var(
                &lookup,
                "CELERY_TASK_SOFT_TIME_LIMIT",
                25 * 60,
            )?),
            prefetch_multiplier: parse_var(&lookup, "CELERY_WORKER_PREFETCH_MULTIPLIER", 1)?,
            concurrency: parse_var(&lookup, "CELERY_WORKER_CONCURRENCY", default_concurrency)?,
            result_expires: Duration::from_secs(parse_var(&lookup, "CELERY_RESULT_EXPIRES", 86_400)?),
            worker_name: lookup("CELERY_WORKER_NAME").unwrap_or_else(|| {
                format!("celery@{}", lookup("HOSTNAME").unwrap_or_else(|| "localhost".to_string()))
            }),
        };

        Ok(Self {
            secret_key: var("SECRET_KEY", "dev-secret-key"),
            // Only the exact string "True" enables debug
            debug: var("DEBUG", "True") == "True",
            allowed_hosts,
            database,
            cache,
            tasks,
            cors_allow_all_origins: true,
            language_code: "zh-hans",
            time_zone: "Asia/Shanghai",
            host: var("HOST", "0.0.0.0"),
            port: parse_var(&lookup, "PORT", 8000)?,
        })
    }

    /// Default log filter when RUST_LOG is unset
    pub fn default_log_filter(&self) -> &'static str {
        if self.debug {
            "debug"
        } else {
            "info"
        }
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> AppResult<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AppError::invalid_config(key, &raw)),
        None => Ok(default),
    }
}

/// Hide the password component of a connection URL
pub fn masked_url(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    let Some((userinfo, host)) = rest.rsplit_once('@') else {
        return url.to_string();
    };
    match userinfo.split_once(':') {
        Some((user, _)) => format!("{}://{}:***HIDDEN***@{}", scheme, user, host),
        None => format!("{}://***HIDDEN***@{}", scheme, host),
    }
}
