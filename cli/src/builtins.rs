//! Commands every `dispatch` registry starts with.

use std::time::Duration;

use command_dispatch::{Command, CommandRegistry, CommandResult, RegisterOptions};
use command_dispatch_core::{ArgSpec, ArgType, Priority};
use serde_json::json;
use tracing::debug;

/// Registers the built-in commands at [`Priority::Builtin`].
pub fn register_builtins(registry: &mut CommandRegistry) {
    let builtins = [ping(), echo(), sum(), sleep(), cwd(), time()];
    let total = builtins.len();
    let mut registered = 0;
    for cmd in builtins {
        if registry.register_with(cmd, RegisterOptions::default().silent()) {
            registered += 1;
        }
    }
    debug!(registered, total, "registered builtin commands");
}

fn ping() -> Command {
    Command::new("ping", |_| async { Ok(CommandResult::ok_message("pong")) })
        .with_description("Check that dispatch works")
        .with_priority(Priority::Builtin)
}

fn echo() -> Command {
    Command::new("echo", |ctx| async move {
        Ok(CommandResult::ok_message(ctx.positionals().join(" ")))
    })
    .with_description("Print the arguments")
    .with_usage("echo [words...]")
    .with_priority(Priority::Builtin)
}

fn sum() -> Command {
    Command::new("sum", |ctx| async move {
        let a = ctx.parsed_args.get_f64("a").unwrap_or_default();
        let b = ctx.parsed_args.get_f64("b").unwrap_or_default();
        let total = a + b;
        Ok(CommandResult::ok_with_data(json!({ "sum": total })).with_message(total.to_string()))
    })
    .with_description("Add two numbers")
    .with_category("math")
    .with_alias("add")
    .with_priority(Priority::Builtin)
    .with_arg(ArgSpec::required("a", ArgType::Number).with_description("First addend"))
    .with_arg(ArgSpec::required("b", ArgType::Number).with_description("Second addend"))
}

fn sleep() -> Command {
    Command::new("sleep", |ctx| async move {
        let ms = ctx.parsed_args.get_f64("ms").unwrap_or_default();
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(ms as u64)) => {
                Ok(CommandResult::ok_message(format!("slept {ms}ms")))
            }
            _ = ctx.cancel.cancelled() => {
                Ok(CommandResult::failure("sleep cancelled"))
            }
        }
    })
    .with_description("Wait for a number of milliseconds")
    .with_priority(Priority::Builtin)
    .with_arg(
        ArgSpec::required("ms", ArgType::Number)
            .with_description("Milliseconds to wait")
            .with_check(|v| match v.as_f64() {
                Some(ms) if ms >= 0.0 => Ok(()),
                _ => Err("must not be negative".to_string()),
            }),
    )
}

fn cwd() -> Command {
    Command::new("cwd", |ctx| async move {
        Ok(CommandResult::ok_message(ctx.cwd.display().to_string()))
    })
    .with_description("Print the working directory")
    .with_namespace("sys")
    .with_category("system")
    .with_alias("pwd")
    .with_priority(Priority::Builtin)
}

fn time() -> Command {
    Command::new("time", |_| async {
        Ok(CommandResult::ok_message(chrono::Utc::now().to_rfc3339()))
    })
    .with_description("Print the current UTC time")
    .with_namespace("sys")
    .with_category("system")
    .with_priority(Priority::Builtin)
}
