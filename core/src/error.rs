//! Failure taxonomy for command dispatch.
//!
//! Every failure the dispatcher can produce is a [`DispatchError`]. Each
//! variant maps to a stable [`ErrorCode`] and a fixed retryability, and
//! converts into the uniform [`CommandResult`] shape returned to callers.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use thiserror::Error;

use crate::rate_limit::{LimitType, RateLimitError};
use crate::result::CommandResult;

/// Stable machine-readable identifier for a failure kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NotFound,
    RateLimited,
    ValidationFailed,
    ExecutionFailed,
    Temporary,
    TimedOut,
    Unknown,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "NOT_FOUND",
            Self::RateLimited => "RATE_LIMITED",
            Self::ValidationFailed => "VALIDATION_FAILED",
            Self::ExecutionFailed => "EXECUTION_FAILED",
            Self::Temporary => "TEMPORARY",
            Self::TimedOut => "TIMED_OUT",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified dispatch failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// No command or alias matched. Carries ranked suggestions.
    #[error("unknown command '{command}'")]
    NotFound {
        command: String,
        suggestions: Vec<String>,
    },

    /// Admission control rejected the execution.
    #[error("rate limit exceeded for '{command}' (per {limit_type}), retry after {retry_after_ms}ms")]
    RateLimited {
        command: String,
        retry_after_ms: u64,
        limit_type: LimitType,
    },

    /// Arguments or flags were invalid. Lists every problem found.
    #[error("invalid arguments for '{command}': {}", errors.join("; "))]
    ValidationFailed {
        command: String,
        errors: Vec<String>,
    },

    /// The handler failed with a non-transient error.
    #[error("command '{command}' failed: {message}")]
    ExecutionFailed { command: String, message: String },

    /// The handler failed with a transient error.
    #[error("command '{command}' failed temporarily: {message}")]
    Temporary { command: String, message: String },

    /// The caller's deadline passed before the handler finished.
    #[error("command '{command}' timed out after {timeout_ms}ms")]
    TimedOut { command: String, timeout_ms: u64 },

    /// The handler failed in a way that could not be classified.
    #[error("command '{command}' failed unexpectedly: {message}")]
    Unknown { command: String, message: String },
}

impl DispatchError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound { .. } => ErrorCode::NotFound,
            Self::RateLimited { .. } => ErrorCode::RateLimited,
            Self::ValidationFailed { .. } => ErrorCode::ValidationFailed,
            Self::ExecutionFailed { .. } => ErrorCode::ExecutionFailed,
            Self::Temporary { .. } => ErrorCode::Temporary,
            Self::TimedOut { .. } => ErrorCode::TimedOut,
            Self::Unknown { .. } => ErrorCode::Unknown,
        }
    }

    /// Name the caller invoked.
    pub fn command(&self) -> &str {
        match self {
            Self::NotFound { command, .. }
            | Self::RateLimited { command, .. }
            | Self::ValidationFailed { command, .. }
            | Self::ExecutionFailed { command, .. }
            | Self::Temporary { command, .. }
            | Self::TimedOut { command, .. }
            | Self::Unknown { command, .. } => command,
        }
    }

    /// Whether repeating the same call unchanged might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::Temporary { .. } | Self::TimedOut { .. }
        )
    }

    /// Human guidance for recovering from the failure.
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::NotFound { suggestions, .. } if !suggestions.is_empty() => {
                Some(format!("did you mean: {}?", suggestions.join(", ")))
            }
            Self::NotFound { .. } => Some("run 'help' to list available commands".to_string()),
            Self::RateLimited { retry_after_ms, .. } => {
                Some(format!("wait {retry_after_ms}ms before retrying"))
            }
            Self::ValidationFailed { command, .. } => {
                Some(format!("run 'help {command}' to see expected arguments"))
            }
            Self::Temporary { .. } => Some("retry the command".to_string()),
            Self::TimedOut { .. } => Some("retry with a longer timeout".to_string()),
            Self::ExecutionFailed { .. } | Self::Unknown { .. } => None,
        }
    }

    /// Structured failure payload: `code`, `retryable`, `suggestion` and
    /// the variant's own fields in camelCase.
    pub fn data(&self) -> Value {
        let mut data = Map::new();
        data.insert("code".into(), json!(self.code()));
        data.insert("retryable".into(), json!(self.is_retryable()));
        if let Some(suggestion) = self.suggestion() {
            data.insert("suggestion".into(), json!(suggestion));
        }

        match self {
            Self::NotFound { suggestions, .. } if !suggestions.is_empty() => {
                data.insert("suggestions".into(), json!(suggestions));
            }
            Self::RateLimited {
                retry_after_ms,
                limit_type,
                ..
            } => {
                data.insert("retryAfterMs".into(), json!(retry_after_ms));
                data.insert("limitType".into(), json!(limit_type));
            }
            Self::ValidationFailed { errors, .. } => {
                data.insert("errors".into(), json!(errors));
            }
            Self::TimedOut { timeout_ms, .. } => {
                data.insert("timeoutMs".into(), json!(timeout_ms));
            }
            _ => {}
        }

        Value::Object(data)
    }

    /// Converts into the uniform failure result.
    pub fn to_result(&self) -> CommandResult {
        CommandResult {
            success: false,
            data: Some(self.data()),
            message: None,
            error: Some(self.to_string()),
        }
    }
}

impl From<RateLimitError> for DispatchError {
    fn from(err: RateLimitError) -> Self {
        Self::RateLimited {
            command: err.command,
            retry_after_ms: err.retry_after_ms,
            limit_type: err.limit_type,
        }
    }
}

impl From<DispatchError> for CommandResult {
    fn from(err: DispatchError) -> Self {
        err.to_result()
    }
}
