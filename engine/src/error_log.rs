//! Process-wide log of classified dispatch failures.
//!
//! Entries are only ever appended; resolution marks an entry but never
//! removes it. Only [`ErrorLogger::clear_error_log`] deletes entries.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};
use command_dispatch_core::{DispatchError, ErrorCode};
use parking_lot::Mutex;
use serde::Serialize;

static GLOBAL_ERROR_LOG: OnceLock<Arc<ErrorLogger>> = OnceLock::new();

/// The invocation a failure belongs to.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ErrorContext {
    /// Name or alias the caller used
    pub command: String,
    pub cwd: Option<PathBuf>,
    pub args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorLogEntry {
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub code: ErrorCode,
    pub message: String,
    pub retryable: bool,
    pub context: ErrorContext,
    pub resolved: bool,
    pub resolution: Option<String>,
}

/// Append-only failure log.
#[derive(Debug, Default)]
pub struct ErrorLogger {
    entries: Mutex<Vec<ErrorLogEntry>>,
    next_id: AtomicU64,
}

impl ErrorLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide logger shared by registries that do not get their
    /// own.
    pub fn global() -> Arc<ErrorLogger> {
        Arc::clone(GLOBAL_ERROR_LOG.get_or_init(|| Arc::new(ErrorLogger::new())))
    }

    /// Appends a failure and returns its id.
    pub fn log(&self, error: &DispatchError, context: ErrorContext) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let entry = ErrorLogEntry {
            id,
            timestamp: Utc::now(),
            code: error.code(),
            message: error.to_string(),
            retryable: error.is_retryable(),
            context,
            resolved: false,
            resolution: None,
        };
        self.entries.lock().push(entry);
        id
    }

    /// Snapshot of every entry, oldest first.
    pub fn entries(&self) -> Vec<ErrorLogEntry> {
        self.entries.lock().clone()
    }

    pub fn unresolved(&self) -> Vec<ErrorLogEntry> {
        self.entries
            .lock()
            .iter()
            .filter(|e| !e.resolved)
            .cloned()
            .collect()
    }

    /// Marks an entry resolved. Returns `false` for unknown ids.
    pub fn mark_resolved(&self, id: u64, resolution: Option<&str>) -> bool {
        let mut entries = self.entries.lock();
        match entries.iter_mut().find(|e| e.id == id) {
            Some(entry) => {
                entry.resolved = true;
                entry.resolution = resolution.map(String::from);
                true
            }
            None => false,
        }
    }

    pub fn count_by_code(&self) -> BTreeMap<ErrorCode, usize> {
        let mut counts = BTreeMap::new();
        for entry in self.entries.lock().iter() {
            *counts.entry(entry.code).or_insert(0) += 1;
        }
        counts
    }

    pub fn clear_error_log(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn not_found(name: &str) -> DispatchError {
        DispatchError::NotFound {
            command: name.to_string(),
            suggestions: Vec::new(),
        }
    }

    #[test]
    fn test_log_and_resolve() {
        let log = ErrorLogger::new();
        let first = log.log(&not_found("a"), ErrorContext::default());
        let second = log.log(
            &DispatchError::TimedOut {
                command: "b".into(),
                timeout_ms: 10,
            },
            ErrorContext {
                command: "b".into(),
                cwd: Some("/tmp".into()),
                args: vec!["x".into()],
            },
        );
        assert!(second > first);

        assert!(log.mark_resolved(first, Some("typo")));
        assert!(!log.mark_resolved(999, None));

        let unresolved = log.unresolved();
        assert_eq!(unresolved.len(), 1);
        assert_eq!(unresolved[0].code, ErrorCode::TimedOut);
        assert!(unresolved[0].retryable);
        assert_eq!(unresolved[0].context.args, vec!["x"]);

        // Resolved entries stay in the log
        assert_eq!(log.len(), 2);
        assert_eq!(log.entries()[0].resolution.as_deref(), Some("typo"));
    }

    #[test]
    fn test_count_by_code_and_clear() {
        let log = ErrorLogger::new();
        log.log(&not_found("a"), ErrorContext::default());
        log.log(&not_found("b"), ErrorContext::default());
        log.log(
            &DispatchError::Unknown {
                command: "c".into(),
                message: "?".into(),
            },
            ErrorContext::default(),
        );

        let counts = log.count_by_code();
        assert_eq!(counts[&ErrorCode::NotFound], 2);
        assert_eq!(counts[&ErrorCode::Unknown], 1);

        log.clear_error_log();
        assert!(log.is_empty());
    }

    #[test]
    fn test_global_is_shared() {
        assert!(Arc::ptr_eq(&ErrorLogger::global(), &ErrorLogger::global()));
    }
}
