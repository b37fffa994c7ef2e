//! Collision records between registrations.
//!
//! Whenever a registration's name or alias collides with an existing
//! command, a [`ConflictRecord`] is appended to a bounded
//! [`ConflictHistory`]. Whether the newcomer wins is decided by
//! [`would_overwrite`].

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use command_dispatch_core::Priority;
use serde::{Deserialize, Serialize};

/// Which index the collision happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictKind {
    /// Full command name
    Name,
    /// Alias, in short or namespaced form
    Alias,
}

/// Immutable fact about one collision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictRecord {
    pub identifier: String,
    #[serde(rename = "type")]
    pub kind: ConflictKind,
    /// Full name of the command already holding the identifier
    pub existing_command: String,
    /// Full name of the command being registered
    pub new_command: String,
    pub existing_priority: Priority,
    pub new_priority: Priority,
    pub would_overwrite: bool,
    pub timestamp: DateTime<Utc>,
}

/// Every collision a candidate registration would cause.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictReport {
    pub has_conflict: bool,
    pub conflicts: Vec<ConflictRecord>,
}

impl ConflictReport {
    /// True when the candidate wins every collision.
    pub fn resolvable(&self) -> bool {
        self.conflicts.iter().all(|c| c.would_overwrite)
    }
}

/// Options for a single registration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegisterOptions {
    /// Replace colliding commands regardless of priority.
    pub overwrite: bool,
    /// Do not log collisions at warn level. They are still recorded.
    pub silent: bool,
}

impl RegisterOptions {
    pub fn overwrite() -> Self {
        Self {
            overwrite: true,
            silent: false,
        }
    }

    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }
}

/// A newcomer replaces an existing holder only from a strictly higher tier,
/// or when overwrite is forced.
pub fn would_overwrite(existing: Priority, new: Priority, options: &RegisterOptions) -> bool {
    new > existing || options.overwrite
}

/// Append-only conflict audit trail, bounded to the most recent records.
#[derive(Debug, Clone)]
pub struct ConflictHistory {
    records: VecDeque<ConflictRecord>,
    limit: usize,
}

impl ConflictHistory {
    /// Creates a history keeping at most `limit` records (at least one).
    pub fn new(limit: usize) -> Self {
        Self {
            records: VecDeque::new(),
            limit: limit.max(1),
        }
    }

    /// Appends a record, evicting the oldest when full.
    pub fn push(&mut self, record: ConflictRecord) {
        while self.records.len() >= self.limit {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConflictRecord> {
        self.records.iter()
    }

    /// Records oldest first.
    pub fn to_vec(&self) -> Vec<ConflictRecord> {
        self.records.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Changes the bound, evicting the oldest records if needed.
    pub fn set_limit(&mut self, limit: usize) {
        self.limit = limit.max(1);
        while self.records.len() > self.limit {
            self.records.pop_front();
        }
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Pretty-printed JSON array of every retained record.
    pub fn export_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.records)
    }
}

impl Default for ConflictHistory {
    fn default() -> Self {
        Self::new(command_dispatch_config::DEFAULT_CONFLICT_HISTORY_LIMIT)
    }
}
