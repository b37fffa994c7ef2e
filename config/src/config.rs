//! Engine configuration document.
//!
//! # Example YAML
//!
//! ```yaml
//! version: "1.0"
//! rate_limit:
//!   enabled: true
//!   max_commands_per_second: 10
//!   max_commands_per_minute: 100
//! whitelist:
//!   - help
//! command_limits:
//!   deploy:
//!     max_per_minute: 2
//! fuzzy:
//!   max_distance: 3
//!   max_suggestions: 3
//! default_timeout_ms: 30000
//! conflict_history_limit: 1000
//! ```

use std::collections::BTreeMap;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::time::Duration;

use command_dispatch_core::{CommandRateLimit, FuzzyOptions, RateLimitConfig};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Format version written by [`DispatchConfig::default`].
pub const CONFIG_VERSION: &str = "1.0";

/// Default deadline applied by timed executions.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Default number of conflict records retained.
pub const DEFAULT_CONFLICT_HISTORY_LIMIT: usize = 1000;

/// Top-level engine configuration.
///
/// # Examples
///
/// ```
/// use command_dispatch_config::DispatchConfig;
///
/// let config = DispatchConfig::from_yaml_str("whitelist: [help]").unwrap();
/// assert_eq!(config.whitelist, vec!["help"]);
/// assert_eq!(config.rate_limit.max_commands_per_second, 10);
/// assert_eq!(config.conflict_history_limit, 1000);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Configuration format version (e.g., `"1.0"`).
    pub version: String,
    /// Global token-bucket limits.
    pub rate_limit: RateLimitConfig,
    /// Commands exempt from rate limiting, by full name.
    pub whitelist: Vec<String>,
    /// Per-command sliding-window limits, by full name.
    pub command_limits: BTreeMap<String, CommandRateLimit>,
    /// Fuzzy suggestion tuning.
    pub fuzzy: FuzzyOptions,
    /// Deadline for timed executions; `None` disables the default timeout.
    pub default_timeout_ms: Option<u64>,
    /// Maximum number of conflict records retained.
    pub conflict_history_limit: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION.to_string(),
            rate_limit: RateLimitConfig::default(),
            whitelist: Vec::new(),
            command_limits: BTreeMap::new(),
            fuzzy: FuzzyOptions::default(),
            default_timeout_ms: Some(DEFAULT_TIMEOUT_MS),
            conflict_history_limit: DEFAULT_CONFLICT_HISTORY_LIMIT,
        }
    }
}

impl DispatchConfig {
    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`Io`](ConfigError::Io) if the file cannot be read, or
    /// [`Yaml`](ConfigError::Yaml) if parsing fails.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let reader = BufReader::new(file);
        let config = serde_yaml::from_reader(reader)?;
        Ok(config)
    }

    /// Saves the configuration as YAML.
    ///
    /// # Errors
    ///
    /// Returns [`Io`](ConfigError::Io) if the file cannot be written, or
    /// [`Yaml`](ConfigError::Yaml) if serialization fails.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = BufWriter::new(file);
        serde_yaml::to_writer(writer, self)?;
        Ok(())
    }

    /// Parses configuration from a YAML string.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        // An empty document deserializes as unit, not as an empty map
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Serializes the configuration to a YAML string.
    pub fn to_yaml_string(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Default deadline as a [`Duration`].
    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout_ms.map(Duration::from_millis)
    }

    /// Checks that every value is usable.
    ///
    /// # Errors
    ///
    /// Returns [`Invalid`](ConfigError::Invalid) listing every problem
    /// found.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        if self.version.trim().is_empty() {
            problems.push("version must not be empty".to_string());
        }
        if self.rate_limit.enabled {
            if self.rate_limit.max_commands_per_second == 0 {
                problems.push("rate_limit.max_commands_per_second must be positive".to_string());
            }
            if self.rate_limit.max_commands_per_minute == 0 {
                problems.push("rate_limit.max_commands_per_minute must be positive".to_string());
            }
        }
        if self.whitelist.iter().any(|name| name.trim().is_empty()) {
            problems.push("whitelist entries must not be empty".to_string());
        }
        for (name, limit) in &self.command_limits {
            if limit.max_per_second.is_none() && limit.max_per_minute.is_none() {
                problems.push(format!("command_limits.{name} sets no limit"));
            }
            if limit.max_per_second == Some(0) || limit.max_per_minute == Some(0) {
                problems.push(format!("command_limits.{name} limits must be positive"));
            }
        }
        if self.fuzzy.max_suggestions == 0 {
            problems.push("fuzzy.max_suggestions must be positive".to_string());
        }
        if self.default_timeout_ms == Some(0) {
            problems.push("default_timeout_ms must be positive".to_string());
        }
        if self.conflict_history_limit == 0 {
            problems.push("conflict_history_limit must be positive".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems.join("; ")))
        }
    }
}
