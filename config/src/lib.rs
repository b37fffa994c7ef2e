//! Configuration for the command dispatch engine.
//!
//! A [`DispatchConfig`] is loaded from YAML and describes the initial
//! admission-control state (global limits, whitelist, per-command limits),
//! fuzzy matching tuning, the default execution timeout and the conflict
//! history bound. Every field has a default, so an empty document is a valid
//! configuration.
//!
//! # Quick start
//!
//! ```no_run
//! use command_dispatch_config::DispatchConfig;
//!
//! let config = DispatchConfig::load("dispatch.yml").unwrap();
//! config.validate().unwrap();
//! println!("{} commands/s", config.rate_limit.max_commands_per_second);
//! ```

mod config;
mod error;

pub use config::{CONFIG_VERSION, DEFAULT_CONFLICT_HISTORY_LIMIT, DEFAULT_TIMEOUT_MS, DispatchConfig};
pub use error::{ConfigError, Result};
