//! Command registry and rate-limited async dispatcher.
//!
//! [`CommandRegistry`] holds commands from several priority tiers, resolves
//! name and alias collisions by priority, and executes commands through a
//! fixed pipeline: resolution (with "did you mean" suggestions on a miss),
//! admission control, flag and argument validation, handler execution with
//! an optional deadline, and failure classification. Every outcome is a
//! [`CommandResult`]; failures are also appended to an [`ErrorLogger`].
//!
//! # Quick start
//!
//! ```no_run
//! use command_dispatch::{Command, CommandRegistry, CommandResult};
//! use command_dispatch_core::{ArgSpec, ArgType};
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut registry = CommandRegistry::new();
//!     registry.register(
//!         Command::new("greet", |ctx| async move {
//!             let who = ctx.parsed_args.get_str("name").unwrap_or("world").to_string();
//!             Ok(CommandResult::ok_message(format!("hello {who}")))
//!         })
//!         .with_arg(ArgSpec::optional("name", ArgType::String)),
//!     );
//!
//!     let result = registry.execute_line("greet ada", ".").await;
//!     assert_eq!(result.message.as_deref(), Some("hello ada"));
//! }
//! ```

mod command;
mod conflict;
mod dispatcher;
mod error_log;
mod registry;

pub use command::{
    Command, CommandContext, CommandHandler, DEFAULT_CATEGORY, ExecutionContext, FnHandler,
    Progress, ProgressCallback,
};
pub use command_dispatch_core::{CommandResult, DispatchError, ErrorCode};
pub use conflict::{
    ConflictHistory, ConflictKind, ConflictRecord, ConflictReport, RegisterOptions,
    would_overwrite,
};
pub use dispatcher::classify;
pub use error_log::{ErrorContext, ErrorLogEntry, ErrorLogger};
pub use registry::{CommandRegistry, ErrorHandler};
pub use tokio_util::sync::CancellationToken;
