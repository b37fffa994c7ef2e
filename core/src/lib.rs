//! Core types and pure algorithms for command dispatch.
//!
//! This crate holds everything about dispatching a command that does not
//! need a runtime:
//!
//! - [`CommandInfo`], [`ArgSpec`], [`FlagSpec`] and [`Priority`] describe a
//!   command declaratively.
//! - [`validate_args`] checks positional arguments against their specs and
//!   produces typed [`ParsedArgs`], reporting every problem in one pass.
//! - [`tokenize`], [`parse_flags`] and [`validate_flags`] split a command
//!   line and interpret its options.
//! - [`find_similar_commands`] ranks "did you mean" suggestions.
//! - [`RateLimiter`] decides whether an execution is admitted.
//! - [`DispatchError`] and [`CommandResult`] are the failure taxonomy and
//!   the uniform outcome returned to callers.
//! - [`render_help`] and [`render_command_list`] derive help text.
//!
//! # Example
//!
//! ```
//! use command_dispatch_core::*;
//!
//! let specs = vec![
//!     ArgSpec::required("service", ArgType::String),
//!     ArgSpec::optional("replicas", ArgType::Number).with_default(1),
//! ];
//! let flags = vec![FlagSpec::switch(Some("-f"), Some("--force"))];
//!
//! let tokens = tokenize("web -f").unwrap();
//! let parsed = parse_flags(&tokens, &flags);
//! assert!(parsed.is_set("force"));
//!
//! let validation = validate_args(&specs, &parsed.positionals);
//! assert!(validation.valid);
//! assert_eq!(validation.parsed.get_f64("replicas"), Some(1.0));
//! ```

mod error;
mod flags;
mod fuzzy;
mod help;
mod rate_limit;
mod result;
mod types;
mod validate;

pub use error::{DispatchError, ErrorCode};
pub use flags::{FlagError, FlagValue, ParsedFlags, parse_flags, tokenize, validate_flags};
pub use fuzzy::{Candidate, FuzzyOptions, PREFIX_DISTANCE, Suggestion, find_similar_commands};
pub use help::{render_command_list, render_help, usage_line};
pub use rate_limit::{
    CommandRateLimit, HISTORY_RETENTION, LimitType, RateLimitConfig, RateLimitError,
    RateLimitStatus, RateLimiter,
};
pub use result::CommandResult;
pub use types::*;
pub use validate::{
    ArgError, ArgValidation, FALSY_TOKENS, ParsedArgs, TRUTHY_TOKENS, coerce, parse_bool,
    validate_args,
};
