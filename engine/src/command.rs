//! Executable command records and the context handed to handlers.

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use command_dispatch_core::{
    ArgSpec, CommandInfo, CommandResult, FlagSpec, ParsedArgs, ParsedFlags, Priority,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

/// Default category for commands that do not declare one.
pub const DEFAULT_CATEGORY: &str = "general";

/// A progress update reported by a running handler.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Progress {
    pub current: u64,
    pub total: Option<u64>,
    pub message: Option<String>,
}

/// Receives progress updates from handlers.
pub type ProgressCallback = Arc<dyn Fn(Progress) + Send + Sync>;

/// What a caller supplies when executing a command.
#[derive(Clone, Default)]
pub struct ExecutionContext {
    /// Working directory the command runs against
    pub cwd: PathBuf,
    /// Raw argument tokens, flags included
    pub args: Vec<String>,
    /// Caller-side cancellation, propagated to the handler
    pub cancel: Option<CancellationToken>,
    pub progress: Option<ProgressCallback>,
}

impl ExecutionContext {
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self {
            cwd: cwd.into(),
            ..Self::default()
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(Progress) + Send + Sync + 'static,
    {
        self.progress = Some(Arc::new(callback));
        self
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("cwd", &self.cwd)
            .field("args", &self.args)
            .field("cancel", &self.cancel)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

/// Everything a handler receives for one invocation.
#[derive(Clone)]
pub struct CommandContext {
    /// Full name of the resolved command
    pub command: String,
    /// Name or alias the caller used
    pub invoked_as: String,
    pub cwd: PathBuf,
    /// Raw argument tokens as supplied
    pub args: Vec<String>,
    pub flags: ParsedFlags,
    /// Typed positional arguments
    pub parsed_args: ParsedArgs,
    /// Cancelled when the caller cancels or gives up waiting
    pub cancel: CancellationToken,
    progress: Option<ProgressCallback>,
}

impl CommandContext {
    pub(crate) fn new(
        command: String,
        invoked_as: String,
        exec: ExecutionContext,
        flags: ParsedFlags,
        parsed_args: ParsedArgs,
    ) -> Self {
        Self {
            command,
            invoked_as,
            cwd: exec.cwd,
            args: exec.args,
            flags,
            parsed_args,
            cancel: exec
                .cancel
                .map(|token| token.child_token())
                .unwrap_or_default(),
            progress: exec.progress,
        }
    }

    /// Positional tokens after flag parsing.
    pub fn positionals(&self) -> &[String] {
        &self.flags.positionals
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Forwards a progress update to the caller, if it asked for them.
    pub fn report_progress(&self, current: u64, total: Option<u64>, message: Option<&str>) {
        if let Some(callback) = &self.progress {
            callback(Progress {
                current,
                total,
                message: message.map(String::from),
            });
        }
    }
}

impl fmt::Debug for CommandContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandContext")
            .field("command", &self.command)
            .field("invoked_as", &self.invoked_as)
            .field("cwd", &self.cwd)
            .field("args", &self.args)
            .field("flags", &self.flags)
            .field("parsed_args", &self.parsed_args)
            .finish_non_exhaustive()
    }
}

/// The executable half of a command.
///
/// Errors returned here are classified by the dispatcher; return a
/// [`DispatchError`](command_dispatch_core::DispatchError) to pick the kind
/// explicitly.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn run(&self, ctx: CommandContext) -> anyhow::Result<CommandResult>;
}

/// Adapts an async closure into a [`CommandHandler`].
pub struct FnHandler<F, Fut> {
    func: F,
    _marker: PhantomData<fn() -> Fut>,
}

impl<F, Fut> FnHandler<F, Fut> {
    pub fn new(func: F) -> Self {
        Self {
            func,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<F, Fut> CommandHandler for FnHandler<F, Fut>
where
    F: Fn(CommandContext) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<CommandResult>> + Send + 'static,
{
    async fn run(&self, ctx: CommandContext) -> anyhow::Result<CommandResult> {
        (self.func)(ctx).await
    }
}

/// A registered capability: metadata plus handler.
///
/// # Examples
///
/// ```
/// use command_dispatch::{Command, CommandResult};
/// use command_dispatch_core::{ArgSpec, ArgType, Priority};
///
/// let cmd = Command::new("deploy", |ctx| async move {
///     let service = ctx.parsed_args.get_str("service").unwrap_or_default().to_string();
///     Ok(CommandResult::ok_message(format!("deployed {service}")))
/// })
/// .with_namespace("ops")
/// .with_alias("ship")
/// .with_priority(Priority::Builtin)
/// .with_arg(ArgSpec::required("service", ArgType::String));
///
/// assert_eq!(cmd.full_name(), "ops.deploy");
/// ```
#[derive(Clone)]
pub struct Command {
    /// Name, unique within its namespace
    pub name: String,
    pub description: Option<String>,
    pub usage: Option<String>,
    pub aliases: Vec<String>,
    /// Dotted prefix
    pub namespace: Option<String>,
    pub category: String,
    pub priority: Priority,
    /// Excluded from listings, completion and suggestions
    pub hidden: bool,
    pub args: Vec<ArgSpec>,
    pub flags: Vec<FlagSpec>,
    handler: Arc<dyn CommandHandler>,
}

impl Command {
    /// Creates a command from an async closure.
    pub fn new<F, Fut>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(CommandContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<CommandResult>> + Send + 'static,
    {
        Self::with_handler(name, Arc::new(FnHandler::new(handler)))
    }

    /// Creates a command from a handler object.
    pub fn with_handler(name: impl Into<String>, handler: Arc<dyn CommandHandler>) -> Self {
        Self {
            name: name.into(),
            description: None,
            usage: None,
            aliases: Vec::new(),
            namespace: None,
            category: DEFAULT_CATEGORY.to_string(),
            priority: Priority::default(),
            hidden: false,
            args: Vec::new(),
            flags: Vec::new(),
            handler,
        }
    }

    pub fn with_description(mut self, desc: &str) -> Self {
        self.description = Some(desc.to_string());
        self
    }

    pub fn with_usage(mut self, usage: &str) -> Self {
        self.usage = Some(usage.to_string());
        self
    }

    pub fn with_alias(mut self, alias: &str) -> Self {
        self.aliases.push(alias.to_string());
        self
    }

    pub fn with_namespace(mut self, namespace: &str) -> Self {
        self.namespace = Some(namespace.to_string());
        self
    }

    pub fn with_category(mut self, category: &str) -> Self {
        self.category = category.to_string();
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn with_arg(mut self, arg: ArgSpec) -> Self {
        self.args.push(arg);
        self
    }

    pub fn with_flag(mut self, flag: FlagSpec) -> Self {
        self.flags.push(flag);
        self
    }

    /// `namespace.name`, or the bare name when there is no namespace.
    pub fn full_name(&self) -> String {
        qualify(self.namespace.as_deref(), &self.name)
    }

    pub fn handler(&self) -> Arc<dyn CommandHandler> {
        Arc::clone(&self.handler)
    }

    /// Metadata view, keyed by full name.
    pub fn info(&self) -> CommandInfo {
        CommandInfo {
            name: self.full_name(),
            description: self.description.clone(),
            usage: self.usage.clone(),
            aliases: self.aliases.clone(),
            namespace: self.namespace.clone(),
            category: self.category.clone(),
            priority: self.priority,
            hidden: self.hidden,
            args: self.args.clone(),
            flags: self.flags.clone(),
        }
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.full_name())
            .field("aliases", &self.aliases)
            .field("priority", &self.priority)
            .field("hidden", &self.hidden)
            .finish_non_exhaustive()
    }
}

pub(crate) fn qualify(namespace: Option<&str>, name: &str) -> String {
    match namespace {
        Some(ns) if !ns.is_empty() => format!("{ns}.{name}"),
        _ => name.to_string(),
    }
}
