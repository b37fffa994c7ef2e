//! The uniform outcome of a command execution.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome returned by every execution, successful or not.
///
/// Handlers build successful results with the constructors below; failures
/// are produced by the dispatcher from a
/// [`DispatchError`](crate::DispatchError).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommandResult {
    /// Success with no payload.
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    pub fn ok_with_data(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            ..Self::default()
        }
    }

    pub fn ok_message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            ..Self::default()
        }
    }

    /// Failure reported by the handler itself, without a classified code.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// `data.code` of a classified failure, if present.
    pub fn error_code(&self) -> Option<&str> {
        self.data.as_ref()?.get("code")?.as_str()
    }
}
