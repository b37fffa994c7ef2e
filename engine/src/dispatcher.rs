//! Command execution.
//!
//! Every execution runs the same pipeline: resolve the name, parse flags,
//! check admission, validate flags and arguments, spend rate budget, run the
//! handler, and classify any failure. Nothing escapes as an error or a
//! panic; every outcome is a [`CommandResult`].
//!
//! Admission is checked before validation so an exhausted caller is turned
//! away cheaply, but budget is only spent once the request is valid. Both
//! happen under one limiter lock so concurrent executions cannot race
//! between the check and the spend.

use std::any::Any;
use std::io;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use command_dispatch_core::{
    CommandResult, DispatchError, RateLimitError, parse_flags, tokenize, validate_args,
    validate_flags,
};
use futures::FutureExt;
use tracing::debug;

use crate::command::{CommandContext, CommandHandler, ExecutionContext};
use crate::error_log::ErrorContext;
use crate::registry::{CommandRegistry, clock_now};

/// Lowercase fragments that mark an error message as transient.
const TRANSIENT_MARKERS: &[&str] = &[
    "timeout",
    "timed out",
    "network",
    "connection",
    "econnreset",
    "eagain",
    "temporarily",
    "unavailable",
    "lock",
    "busy",
    "rate limit",
    "try again",
];

struct Prepared {
    handler: Arc<dyn CommandHandler>,
    ctx: CommandContext,
}

impl CommandRegistry {
    /// Executes a command by name, alias or short name.
    ///
    /// Handler errors are classified and panics become
    /// [`DispatchError::Unknown`]. Every failure is logged before it is
    /// returned.
    ///
    /// # Examples
    ///
    /// ```
    /// use command_dispatch::{Command, CommandRegistry, CommandResult, ExecutionContext};
    ///
    /// # tokio_test_block(async {
    /// let mut registry = CommandRegistry::new();
    /// registry.register(Command::new("ping", |_| async { Ok(CommandResult::ok_message("pong")) }));
    ///
    /// let result = registry.execute("ping", ExecutionContext::new(".")).await;
    /// assert_eq!(result.message.as_deref(), Some("pong"));
    ///
    /// let missing = registry.execute("pign", ExecutionContext::new(".")).await;
    /// assert_eq!(missing.error_code(), Some("NOT_FOUND"));
    /// # });
    /// # fn tokio_test_block(f: impl std::future::Future<Output = ()>) {
    /// #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
    /// # }
    /// ```
    pub async fn execute(&self, name: &str, ctx: ExecutionContext) -> CommandResult {
        let error_ctx = error_context(name, &ctx);
        let Prepared { handler, ctx } = match self.prepare(name, ctx) {
            Ok(prepared) => prepared,
            Err(err) => return self.fail(err, &error_ctx),
        };

        let command = ctx.command.clone();
        debug!(command = %command, invoked_as = name, "executing command");

        match AssertUnwindSafe(handler.run(ctx)).catch_unwind().await {
            Ok(Ok(result)) => result,
            Ok(Err(err)) => self.fail(classify(&command, err), &error_ctx),
            Err(panic) => {
                let err = DispatchError::Unknown {
                    command,
                    message: panic_message(panic.as_ref()),
                };
                self.fail(err, &error_ctx)
            }
        }
    }

    /// Executes a command, giving up after `timeout`.
    ///
    /// On timeout the handler's cancellation token is cancelled and a
    /// [`DispatchError::TimedOut`] is returned at once. The handler is not
    /// aborted; it keeps running until it observes cancellation or finishes.
    pub async fn execute_with_timeout(
        &self,
        name: &str,
        ctx: ExecutionContext,
        timeout: Duration,
    ) -> CommandResult {
        let error_ctx = error_context(name, &ctx);
        let Prepared { handler, ctx } = match self.prepare(name, ctx) {
            Ok(prepared) => prepared,
            Err(err) => return self.fail(err, &error_ctx),
        };

        let command = ctx.command.clone();
        let cancel = ctx.cancel.clone();
        debug!(command = %command, timeout_ms = timeout.as_millis() as u64, "executing command with deadline");

        let mut task = tokio::spawn(async move { handler.run(ctx).await });

        tokio::select! {
            joined = &mut task => match joined {
                Ok(Ok(result)) => result,
                Ok(Err(err)) => self.fail(classify(&command, err), &error_ctx),
                Err(join_err) => {
                    let message = if join_err.is_panic() {
                        panic_message(join_err.into_panic().as_ref())
                    } else {
                        join_err.to_string()
                    };
                    self.fail(DispatchError::Unknown { command, message }, &error_ctx)
                }
            },
            _ = tokio::time::sleep(timeout) => {
                cancel.cancel();
                // Dropping the handle detaches the task
                drop(task);
                let err = DispatchError::TimedOut {
                    command,
                    timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                };
                self.fail(err, &error_ctx)
            }
        }
    }

    /// Tokenizes a command line and executes it, applying the default
    /// timeout when one is configured.
    pub async fn execute_line(&self, line: &str, cwd: impl Into<PathBuf>) -> CommandResult {
        self.run_line(line, cwd.into(), self.default_timeout).await
    }

    /// Tokenizes a command line and executes it with an explicit deadline,
    /// ignoring the configured default.
    pub async fn execute_line_with_timeout(
        &self,
        line: &str,
        cwd: impl Into<PathBuf>,
        timeout: Duration,
    ) -> CommandResult {
        self.run_line(line, cwd.into(), Some(timeout)).await
    }

    async fn run_line(&self, line: &str, cwd: PathBuf, timeout: Option<Duration>) -> CommandResult {
        let tokens = match tokenize(line) {
            Ok(tokens) => tokens,
            Err(err) => {
                let error_ctx = ErrorContext {
                    command: line.trim().to_string(),
                    cwd: Some(cwd),
                    args: Vec::new(),
                };
                let err = DispatchError::ValidationFailed {
                    command: line.trim().to_string(),
                    errors: vec![err.to_string()],
                };
                return self.fail(err, &error_ctx);
            }
        };

        let Some((name, args)) = tokens.split_first() else {
            let error_ctx = ErrorContext {
                command: String::new(),
                cwd: Some(cwd),
                args: Vec::new(),
            };
            let err = DispatchError::ValidationFailed {
                command: String::new(),
                errors: vec!["empty command line".to_string()],
            };
            return self.fail(err, &error_ctx);
        };

        let ctx = ExecutionContext::new(cwd).with_args(args.iter().cloned());
        match timeout {
            Some(timeout) => self.execute_with_timeout(name, ctx, timeout).await,
            None => self.execute(name, ctx).await,
        }
    }

    /// Resolves, admits and validates an invocation, spending rate budget
    /// only if it is valid.
    fn prepare(&self, name: &str, exec: ExecutionContext) -> Result<Prepared, DispatchError> {
        let Some(command) = self.get(name) else {
            let suggestions = self
                .find_similar_commands(name)
                .into_iter()
                .map(|s| s.name)
                .collect();
            return Err(DispatchError::NotFound {
                command: name.to_string(),
                suggestions,
            });
        };

        let full = command.full_name();
        let flags = parse_flags(&exec.args, &command.flags);

        let mut limiter = self.limiter.lock();
        let now = clock_now();
        limiter.check(&full, now)?;

        let mut errors: Vec<String> = validate_flags(&flags, &command.flags)
            .iter()
            .map(ToString::to_string)
            .collect();
        let validation = validate_args(&command.args, &flags.positionals);
        errors.extend(validation.messages());
        if !errors.is_empty() {
            return Err(DispatchError::ValidationFailed {
                command: full,
                errors,
            });
        }

        limiter.consume(&full, now);
        drop(limiter);

        let ctx = CommandContext::new(full, name.to_string(), exec, flags, validation.parsed);
        Ok(Prepared {
            handler: command.handler(),
            ctx,
        })
    }

    /// Logs a failure, notifies the error handler and converts it.
    fn fail(&self, err: DispatchError, ctx: &ErrorContext) -> CommandResult {
        debug!(
            command = %err.command(),
            code = %err.code(),
            retryable = err.is_retryable(),
            error = %err,
            "command failed"
        );
        self.error_log.log(&err, ctx.clone());

        if let Some(handler) = &self.error_handler {
            match std::panic::catch_unwind(AssertUnwindSafe(|| handler(&err, ctx))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!(error = %e, "error handler failed"),
                Err(panic) => debug!(panic = %panic_message(panic.as_ref()), "error handler panicked"),
            }
        }

        err.to_result()
    }
}

/// Maps a handler error onto the failure taxonomy.
///
/// Structured errors pass through unchanged. Otherwise transient I/O kinds
/// and messages mentioning a transient condition become
/// [`DispatchError::Temporary`]; everything else is
/// [`DispatchError::ExecutionFailed`].
pub fn classify(command: &str, err: anyhow::Error) -> DispatchError {
    if let Some(structured) = err.downcast_ref::<DispatchError>() {
        return structured.clone();
    }
    if let Some(limited) = err.downcast_ref::<RateLimitError>() {
        return limited.clone().into();
    }

    let message = format!("{err:#}");
    let transient_io = err
        .chain()
        .filter_map(|cause| cause.downcast_ref::<io::Error>())
        .any(|io_err| is_transient_io(io_err.kind()));
    let lowered = message.to_lowercase();
    let transient_text = TRANSIENT_MARKERS.iter().any(|m| lowered.contains(m));

    if transient_io || transient_text {
        DispatchError::Temporary {
            command: command.to_string(),
            message,
        }
    } else {
        DispatchError::ExecutionFailed {
            command: command.to_string(),
            message,
        }
    }
}

fn is_transient_io(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::TimedOut
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
    )
}

fn error_context(name: &str, ctx: &ExecutionContext) -> ErrorContext {
    ErrorContext {
        command: name.to_string(),
        cwd: Some(ctx.cwd.clone()),
        args: ctx.args.clone(),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}
