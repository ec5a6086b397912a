//! Centralized Error Handling Module
//!
//! Every failure carries a unique error code so log lines can be grepped
//! and alerted on without parsing free-form messages.
//!
//! Error codes follow pattern: CATEGORY_SPECIFIC_ERROR
//! - API_xxx: HTTP request errors
//! - BROKER_xxx: broker / result backend errors
//! - TASK_xxx: task execution errors
//! - CFG_xxx: configuration errors

use std::fmt;

/// Application-wide error type
#[derive(Debug)]
pub struct AppError {
    /// Unique error code for logging/monitoring
    pub code: ErrorCode,
    /// Human-readable message
    pub message: String,
    /// Optional underlying error
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AppError {
    /// Create a new AppError
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Create AppError with source error
    pub fn with_source(
        code: ErrorCode,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Get error code as string (for logging)
    pub fn code_str(&self) -> &'static str {
        self.code.as_str()
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Unique error codes for monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // ============================================
    // API Errors
    // ============================================
    /// Invalid request (bad query parameter, malformed id)
    ApiBadRequest,
    /// Host header not in ALLOWED_HOSTS
    ApiDisallowedHost,
    /// Route not found
    ApiNotFound,
    /// Internal server error
    ApiInternalError,

    // ============================================
    // Broker Errors
    // ============================================
    /// Broker or result backend unreachable
    BrokerUnavailable,
    /// Broker returned something we could not decode
    BrokerProtocol,

    // ============================================
    // Task Errors
    // ============================================
    /// No handler registered under the task name
    TaskUnregistered,
    /// Task arguments did not match the handler signature
    TaskInvalidArguments,
    /// Task handler returned an error
    TaskFailed,
    /// Task exceeded its hard time limit
    TaskTimeLimit,

    // ============================================
    // Configuration Errors
    // ============================================
    /// Invalid configuration value
    ConfigInvalidValue,

    // ============================================
    // Generic Errors
    // ============================================
    /// Unknown error
    Unknown,
}

impl ErrorCode {
    /// Get string representation of error code
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ApiBadRequest => "API_BAD_REQUEST",
            Self::ApiDisallowedHost => "API_DISALLOWED_HOST",
            Self::ApiNotFound => "API_NOT_FOUND",
            Self::ApiInternalError => "API_INTERNAL_ERROR",

            Self::BrokerUnavailable => "BROKER_UNAVAILABLE",
            Self::BrokerProtocol => "BROKER_PROTOCOL",

            Self::TaskUnregistered => "TASK_UNREGISTERED",
            Self::TaskInvalidArguments => "TASK_INVALID_ARGUMENTS",
            Self::TaskFailed => "TASK_FAILED",
            Self::TaskTimeLimit => "TASK_TIME_LIMIT",

            Self::ConfigInvalidValue => "CFG_INVALID_VALUE",

            Self::Unknown => "UNKNOWN_ERROR",
        }
    }

    /// Get HTTP status code for API responses
    pub fn http_status(&self) -> u16 {
        match self {
            Self::ApiBadRequest | Self::ApiDisallowedHost | Self::ConfigInvalidValue => 400,
            Self::ApiNotFound => 404,
            Self::BrokerUnavailable => 503,
            _ => 500,
        }
    }

    /// Check if error is transient (worth retrying the broker call)
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::BrokerUnavailable)
    }
}

// ============================================
// Convenience constructors
// ============================================

impl AppError {
    /// API bad request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ApiBadRequest, msg)
    }

    /// Host header rejected
    pub fn disallowed_host(host: &str) -> Self {
        Self::new(
            ErrorCode::ApiDisallowedHost,
            format!("Invalid HTTP_HOST header: '{}'", host),
        )
    }

    /// Route not found
    pub fn not_found() -> Self {
        Self::new(ErrorCode::ApiNotFound, "Not found")
    }

    /// API internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ApiInternalError, msg)
    }

    /// Broker unreachable
    pub fn broker_unavailable(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::BrokerUnavailable, msg)
    }

    /// Task name has no registered handler
    pub fn unregistered_task(name: &str) -> Self {
        Self::new(
            ErrorCode::TaskUnregistered,
            format!("Received unregistered task of type '{}'", name),
        )
    }

    /// Task arguments rejected by the handler
    pub fn invalid_arguments(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::TaskInvalidArguments, msg)
    }

    /// Task handler failure
    pub fn task_failed(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::TaskFailed, msg)
    }

    /// Hard time limit exceeded
    pub fn time_limit_exceeded(limit_secs: u64) -> Self {
        Self::new(
            ErrorCode::TaskTimeLimit,
            format!("TimeLimitExceeded({})", limit_secs),
        )
    }

    /// Invalid configuration value
    pub fn invalid_config(key: &str, value: &str) -> Self {
        Self::new(
            ErrorCode::ConfigInvalidValue,
            format!("Invalid value for {}: '{}'", key, value),
        )
    }
}

// ============================================
// Result type alias
// ============================================

/// Application Result type
pub type AppResult<T> = Result<T, AppError>;

// ============================================
// Conversion from common error types
// ============================================

impl From<eyre::Report> for AppError {
    fn from(err: eyre::Report) -> Self {
        Self::new(ErrorCode::Unknown, err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::with_source(ErrorCode::Unknown, "IO error", err)
    }
}

impl From<redis::RedisError> for AppError {
    fn from(err: redis::RedisError) -> Self {
        let transient = err.is_connection_refusal()
            || err.is_connection_dropped()
            || err.is_timeout()
            || err.is_io_error()
            || matches!(err.kind(), redis::ErrorKind::BusyLoadingError | redis::ErrorKind::TryAgain);
        if transient {
            Self::with_source(ErrorCode::BrokerUnavailable, format!("Broker unavailable: {}", err), err)
        } else {
            Self::with_source(ErrorCode::BrokerProtocol, format!("Broker error: {}", err), err)
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::with_source(ErrorCode::BrokerProtocol, "JSON parse error", err)
    }
}
