use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use command_dispatch::{
    CancellationToken, Command, CommandRegistry, CommandResult, DispatchError, ErrorCode,
    ErrorLogger, ExecutionContext, RegisterOptions,
};
use command_dispatch_core::{
    ArgSpec, ArgType, CommandRateLimit, FlagSpec, Priority, RateLimitConfig,
};
use parking_lot::Mutex;
use serde_json::json;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn registry() -> (CommandRegistry, Arc<ErrorLogger>) {
    let log = Arc::new(ErrorLogger::new());
    let registry = CommandRegistry::new().with_error_logger(Arc::clone(&log));
    (registry, log)
}

fn replying(name: &str, reply: &'static str) -> Command {
    Command::new(name, move |_| async move { Ok(CommandResult::ok_message(reply)) })
}

fn ctx() -> ExecutionContext {
    ExecutionContext::new("/work")
}

fn ctx_args(args: &[&str]) -> ExecutionContext {
    ctx().with_args(args.iter().copied())
}

fn per_second(limit: u32) -> RateLimitConfig {
    RateLimitConfig {
        enabled: true,
        max_commands_per_second: limit,
        max_commands_per_minute: 1000,
    }
}

// ---------------------------------------------------------------------------
// Registration and priority
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_conflict_overwrite_scenario() {
    let (mut reg, _) = registry();
    assert!(reg.register(replying("reset", "builtin").with_priority(Priority::Builtin)));
    assert!(!reg.register(replying("reset", "plugin").with_priority(Priority::Plugin)));

    let result = reg.execute("reset", ctx()).await;
    assert!(result.success);
    assert_eq!(result.message.as_deref(), Some("builtin"));

    let history = reg.conflict_history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].identifier, "reset");
    assert!(!history[0].would_overwrite);
}

#[tokio::test]
async fn test_priority_invariant_for_every_tier_pair() {
    let tiers = [Priority::Plugin, Priority::User, Priority::Builtin];
    for first in tiers {
        for second in tiers {
            if first == second {
                continue;
            }
            let (mut reg, _) = registry();
            assert!(reg.register(replying("cmd", "first").with_priority(first)));
            let accepted = reg.register(replying("cmd", "second").with_priority(second));

            let winner = reg.execute("cmd", ctx()).await;
            if second > first {
                assert!(accepted, "{second} should replace {first}");
                assert_eq!(winner.message.as_deref(), Some("second"));
            } else {
                assert!(!accepted, "{second} should not replace {first}");
                assert_eq!(winner.message.as_deref(), Some("first"));
            }
            assert_eq!(reg.len(), 1);
        }
    }
}

#[tokio::test]
async fn test_forced_overwrite_replaces_higher_tier() {
    let (mut reg, _) = registry();
    reg.register(replying("reset", "builtin").with_priority(Priority::Builtin));
    assert!(reg.register_with(
        replying("reset", "plugin").with_priority(Priority::Plugin),
        RegisterOptions::overwrite()
    ));
    let result = reg.execute("reset", ctx()).await;
    assert_eq!(result.message.as_deref(), Some("plugin"));
}

#[tokio::test]
async fn test_alias_and_namespace_dispatch() {
    let (mut reg, _) = registry();
    reg.register(
        Command::new("cwd", |ctx| async move {
            Ok(CommandResult::ok_message(format!(
                "{} via {}",
                ctx.cwd.display(),
                ctx.invoked_as
            )))
        })
        .with_namespace("sys")
        .with_alias("pwd"),
    );

    for name in ["sys.cwd", "cwd", "pwd", "sys.pwd"] {
        let result = reg.execute(name, ctx()).await;
        assert_eq!(result.message, Some(format!("/work via {name}")));
    }
}

#[tokio::test]
async fn test_namespaced_short_name_never_displaces_bare_command() {
    let (mut reg, _) = registry();
    assert!(reg.register(replying("list", "bare").with_priority(Priority::Plugin)));
    assert!(reg.register(
        replying("list", "namespaced")
            .with_namespace("ns")
            .with_priority(Priority::Builtin)
    ));

    assert!(reg.conflict_history().is_empty());
    assert_eq!(reg.len(), 2);
    assert_eq!(reg.resolve("list"), Some("list"));

    let bare = reg.execute("list", ctx()).await;
    assert_eq!(bare.message.as_deref(), Some("bare"));
    let namespaced = reg.execute("ns.list", ctx()).await;
    assert_eq!(namespaced.message.as_deref(), Some("namespaced"));
}

// ---------------------------------------------------------------------------
// Not found
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_unknown_command_suggests_closest() {
    let (mut reg, log) = registry();
    reg.register(replying("deploy", "ok"));
    reg.register(replying("status", "ok"));

    let result = reg.execute("deploi", ctx()).await;
    assert!(!result.success);
    assert_eq!(result.error_code(), Some("NOT_FOUND"));

    let data = result.data.unwrap();
    assert_eq!(data["retryable"], false);
    assert!(
        data["suggestions"]
            .as_array()
            .unwrap()
            .contains(&json!("deploy"))
    );

    let entries = log.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].code, ErrorCode::NotFound);
    assert_eq!(entries[0].context.command, "deploi");
}

#[tokio::test]
async fn test_unknown_command_without_candidates() {
    let (reg, _) = registry();
    let result = reg.execute("anything", ctx()).await;
    let data = result.data.unwrap();
    assert_eq!(data["code"], "NOT_FOUND");
    assert!(data.get("suggestions").is_none());
}

// ---------------------------------------------------------------------------
// Admission control
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_rate_limit_then_recovery() {
    let (mut reg, _) = registry();
    reg.register(replying("ping", "pong"));
    reg.set_rate_limit(per_second(2));

    assert!(reg.execute("ping", ctx()).await.success);
    assert!(reg.execute("ping", ctx()).await.success);

    let limited = reg.execute("ping", ctx()).await;
    assert_eq!(limited.error_code(), Some("RATE_LIMITED"));
    let data = limited.data.unwrap();
    assert_eq!(data["retryable"], true);
    assert_eq!(data["limitType"], "second");
    let retry_after = data["retryAfterMs"].as_u64().unwrap();
    assert!(retry_after > 0 && retry_after <= 1000);

    tokio::time::advance(Duration::from_millis(retry_after + 1)).await;
    assert!(reg.execute("ping", ctx()).await.success);
}

#[tokio::test(start_paused = true)]
async fn test_whitelisted_command_is_never_limited() {
    let (mut reg, _) = registry();
    reg.register(replying("ping", "pong"));
    reg.register(replying("help", "usage"));
    reg.set_rate_limit(per_second(1));
    reg.add_to_whitelist(["help"]);

    assert!(reg.execute("ping", ctx()).await.success);
    assert!(!reg.execute("ping", ctx()).await.success);
    for _ in 0..20 {
        assert!(reg.execute("help", ctx()).await.success);
    }
}

#[tokio::test(start_paused = true)]
async fn test_invalid_request_spends_no_budget() {
    let (mut reg, _) = registry();
    reg.register(replying("copy", "copied").with_arg(ArgSpec::required("src", ArgType::Path)));
    reg.set_rate_limit(per_second(1));

    let invalid = reg.execute("copy", ctx()).await;
    assert_eq!(invalid.error_code(), Some("VALIDATION_FAILED"));
    assert_eq!(reg.rate_limit_status().tokens_per_second, 1);

    assert!(reg.execute("copy", ctx_args(&["a.txt"])).await.success);

    // Exhausted callers are rejected before validation runs
    let rejected = reg.execute("copy", ctx()).await;
    assert_eq!(rejected.error_code(), Some("RATE_LIMITED"));
}

#[tokio::test(start_paused = true)]
async fn test_per_command_limit_through_alias() {
    let (mut reg, _) = registry();
    reg.register(replying("deploy", "shipped").with_alias("ship"));
    reg.register(replying("status", "green"));
    reg.set_command_rate_limit(
        "ship",
        CommandRateLimit {
            max_per_second: None,
            max_per_minute: Some(1),
        },
    );

    assert!(reg.execute("ship", ctx()).await.success);
    let limited = reg.execute("deploy", ctx()).await;
    let data = limited.data.unwrap();
    assert_eq!(data["code"], "RATE_LIMITED");
    assert_eq!(data["limitType"], "minute");
    assert!(reg.execute("status", ctx()).await.success);

    tokio::time::advance(Duration::from_secs(60)).await;
    assert!(reg.execute("deploy", ctx()).await.success);
}

#[tokio::test]
async fn test_disabled_limiter_admits_everything() {
    let (mut reg, _) = registry();
    reg.register(replying("ping", "pong"));
    reg.set_rate_limit(per_second(1));
    reg.set_rate_limit_enabled(false);

    for _ in 0..10 {
        assert!(reg.execute("ping", ctx()).await.success);
    }
    assert_eq!(reg.rate_limit_status().recent_commands, 0);
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_validation_reports_every_missing_argument() {
    let (mut reg, log) = registry();
    reg.register(
        replying("connect", "ok")
            .with_arg(ArgSpec::required("host", ArgType::String))
            .with_arg(ArgSpec::required("port", ArgType::Number))
            .with_arg(ArgSpec::required("user", ArgType::String)),
    );

    let result = reg.execute("connect", ctx_args(&["db.local"])).await;
    let data = result.data.unwrap();
    assert_eq!(data["code"], "VALIDATION_FAILED");
    assert_eq!(data["retryable"], false);

    let errors = data["errors"].as_array().unwrap();
    assert_eq!(errors.len(), 2);
    assert!(errors[0].as_str().unwrap().contains("port"));
    assert!(errors[1].as_str().unwrap().contains("user"));
    assert_eq!(log.entries()[0].context.args, vec!["db.local"]);
}

#[tokio::test]
async fn test_flag_and_argument_errors_combined() {
    let (mut reg, _) = registry();
    reg.register(
        replying("scale", "ok")
            .with_arg(ArgSpec::required("replicas", ArgType::Number))
            .with_flag(FlagSpec::switch(Some("-f"), Some("--force"))),
    );

    let result = reg.execute("scale", ctx_args(&["--bogus", "many"])).await;
    let data = result.data.unwrap();
    let errors = data["errors"].as_array().unwrap();
    assert_eq!(errors.len(), 2);
}

#[tokio::test]
async fn test_handler_receives_typed_values() {
    let (mut reg, _) = registry();
    reg.register(
        Command::new("deploy", |ctx| async move {
            Ok(CommandResult::ok_with_data(json!({
                "service": ctx.parsed_args.get_str("service"),
                "replicas": ctx.parsed_args.get_f64("replicas"),
                "force": ctx.flags.is_set("force"),
                "region": ctx.flags.value("region"),
            })))
        })
        .with_arg(ArgSpec::required("service", ArgType::String))
        .with_arg(ArgSpec::optional("replicas", ArgType::Number).with_default(1))
        .with_flag(FlagSpec::switch(Some("-f"), Some("--force")))
        .with_flag(FlagSpec::with_value(None, Some("--region"), ArgType::String).with_default("eu")),
    );

    let result = reg.execute_line("deploy web -f 3", "/srv").await;
    assert_eq!(
        result.data.unwrap(),
        json!({"service": "web", "replicas": 3.0, "force": true, "region": "eu"})
    );
}

// ---------------------------------------------------------------------------
// Execution failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_handler_errors_are_classified() {
    let (mut reg, log) = registry();
    reg.register(Command::new("flaky", |_| async {
        Err(anyhow::anyhow!("connection reset by peer"))
    }));
    reg.register(Command::new("broken", |_| async {
        Err(anyhow::anyhow!("config file is malformed"))
    }));
    reg.register(Command::new("strict", |ctx| async move {
        Err(DispatchError::ValidationFailed {
            command: ctx.command,
            errors: vec!["target is read-only".into()],
        }
        .into())
    }));

    let flaky = reg.execute("flaky", ctx()).await.data.unwrap();
    assert_eq!(flaky["code"], "TEMPORARY");
    assert_eq!(flaky["retryable"], true);

    let broken = reg.execute("broken", ctx()).await.data.unwrap();
    assert_eq!(broken["code"], "EXECUTION_FAILED");
    assert_eq!(broken["retryable"], false);

    let strict = reg.execute("strict", ctx()).await.data.unwrap();
    assert_eq!(strict["code"], "VALIDATION_FAILED");
    assert_eq!(strict["errors"], json!(["target is read-only"]));

    let counts = log.count_by_code();
    assert_eq!(counts[&ErrorCode::Temporary], 1);
    assert_eq!(counts[&ErrorCode::ExecutionFailed], 1);
    assert_eq!(counts[&ErrorCode::ValidationFailed], 1);
}

#[tokio::test]
async fn test_panicking_handler_is_contained() {
    let (mut reg, _) = registry();
    reg.register(Command::new("explode", |_| async {
        if true {
            panic!("kaboom");
        }
        Ok(CommandResult::ok())
    }));

    let result = reg.execute("explode", ctx()).await;
    assert_eq!(result.error_code(), Some("UNKNOWN"));
    assert!(result.error.unwrap().contains("kaboom"));

    let timed = reg
        .execute_with_timeout("explode", ctx(), Duration::from_secs(5))
        .await;
    assert_eq!(timed.error_code(), Some("UNKNOWN"));
}

#[tokio::test]
async fn test_error_handler_is_best_effort() {
    let (mut reg, log) = registry();
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    reg.set_error_handler(move |err, ctx| {
        let n = counter.fetch_add(1, Ordering::SeqCst);
        assert_eq!(ctx.command, err.command());
        match n {
            0 => Err(anyhow::anyhow!("observer unavailable")),
            _ => panic!("observer crashed"),
        }
    });

    let first = reg.execute("nope", ctx()).await;
    let second = reg.execute("nada", ctx()).await;
    assert_eq!(first.error_code(), Some("NOT_FOUND"));
    assert_eq!(second.error_code(), Some("NOT_FOUND"));
    assert_eq!(seen.load(Ordering::SeqCst), 2);
    assert_eq!(log.len(), 2);

    // Resolution marks entries without removing them
    let id = log.entries()[0].id;
    assert!(log.mark_resolved(id, Some("typo")));
    assert_eq!(log.unresolved().len(), 1);
    assert_eq!(log.len(), 2);
}

// ---------------------------------------------------------------------------
// Timeouts and cancellation
// ---------------------------------------------------------------------------

fn sleeper(cancelled: Arc<Mutex<Option<tokio::sync::oneshot::Sender<()>>>>) -> Command {
    Command::new("sleep", move |ctx| {
        let cancelled = Arc::clone(&cancelled);
        async move {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(10)) => {
                    Ok(CommandResult::ok_message("slept"))
                }
                _ = ctx.cancel.cancelled() => {
                    if let Some(tx) = cancelled.lock().take() {
                        let _ = tx.send(());
                    }
                    Ok(CommandResult::failure("cancelled"))
                }
            }
        }
    })
}

#[tokio::test(start_paused = true)]
async fn test_timeout_signals_cancellation() {
    let (mut reg, log) = registry();
    let (tx, rx) = tokio::sync::oneshot::channel();
    reg.register(sleeper(Arc::new(Mutex::new(Some(tx)))));

    let result = reg
        .execute_with_timeout("sleep", ctx(), Duration::from_millis(50))
        .await;
    assert_eq!(result.error_code(), Some("TIMED_OUT"));
    let data = result.data.unwrap();
    assert_eq!(data["retryable"], true);
    assert_eq!(data["timeoutMs"], 50);

    // The detached handler observes cancellation cooperatively
    rx.await.unwrap();
    assert_eq!(log.entries()[0].code, ErrorCode::TimedOut);
}

#[tokio::test(start_paused = true)]
async fn test_fast_handler_beats_deadline() {
    let (mut reg, _) = registry();
    reg.register(replying("ping", "pong"));
    let result = reg
        .execute_with_timeout("ping", ctx(), Duration::from_millis(50))
        .await;
    assert_eq!(result.message.as_deref(), Some("pong"));
}

#[tokio::test(start_paused = true)]
async fn test_caller_cancellation_reaches_handler() {
    let (mut reg, _) = registry();
    let (tx, rx) = tokio::sync::oneshot::channel();
    reg.register(sleeper(Arc::new(Mutex::new(Some(tx)))));

    let token = CancellationToken::new();
    token.cancel();
    let result = reg.execute("sleep", ctx().with_cancel(token)).await;
    assert_eq!(result.error.as_deref(), Some("cancelled"));
    rx.await.unwrap();
}

#[tokio::test]
async fn test_progress_reaches_caller() {
    let (mut reg, _) = registry();
    reg.register(Command::new("index", |ctx| async move {
        for i in 1..=3 {
            ctx.report_progress(i, Some(3), None);
        }
        Ok(CommandResult::ok())
    }));

    let updates = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&updates);
    let exec = ctx().with_progress(move |p| sink.lock().push(p.current));
    assert!(reg.execute("index", exec).await.success);
    assert_eq!(*updates.lock(), vec![1, 2, 3]);
}

// ---------------------------------------------------------------------------
// Command lines
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_execute_line_tokenizes_quotes() {
    let (mut reg, _) = registry();
    reg.register(Command::new("echo", |ctx| async move {
        Ok(CommandResult::ok_message(ctx.positionals().join("|")))
    }));

    let result = reg.execute_line(r#"echo "hello world" again"#, ".").await;
    assert_eq!(result.message.as_deref(), Some("hello world|again"));
}

#[tokio::test]
async fn test_execute_line_rejects_bad_input() {
    let (reg, log) = registry();

    let empty = reg.execute_line("   ", ".").await;
    assert_eq!(empty.error_code(), Some("VALIDATION_FAILED"));

    let unbalanced = reg.execute_line("echo \"oops", ".").await;
    assert_eq!(unbalanced.error_code(), Some("VALIDATION_FAILED"));
    assert_eq!(log.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_execute_line_applies_default_timeout() {
    let (mut reg, _) = registry();
    let (tx, _rx) = tokio::sync::oneshot::channel();
    reg.register(sleeper(Arc::new(Mutex::new(Some(tx)))));
    reg.set_default_timeout(Some(Duration::from_millis(20)));

    let result = reg.execute_line("sleep", ".").await;
    assert_eq!(result.error_code(), Some("TIMED_OUT"));
}

#[tokio::test(start_paused = true)]
async fn test_execute_line_with_explicit_timeout() {
    let (mut reg, log) = registry();
    let (tx, _rx) = tokio::sync::oneshot::channel();
    reg.register(sleeper(Arc::new(Mutex::new(Some(tx)))));

    let result = reg
        .execute_line_with_timeout("sleep", ".", Duration::from_millis(20))
        .await;
    assert_eq!(result.error_code(), Some("TIMED_OUT"));

    let unbalanced = reg
        .execute_line_with_timeout("sleep \"", ".", Duration::from_millis(20))
        .await;
    assert_eq!(unbalanced.error_code(), Some("VALIDATION_FAILED"));
    assert_eq!(log.len(), 2);
}

// ---------------------------------------------------------------------------
// Concurrency
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_executions_respect_budget() {
    let (mut reg, _) = registry();
    reg.register(replying("ping", "pong"));
    reg.set_rate_limit(RateLimitConfig {
        enabled: true,
        max_commands_per_second: 1000,
        max_commands_per_minute: 5,
    });
    let reg = Arc::new(reg);

    let mut handles = Vec::new();
    for _ in 0..20 {
        let reg = Arc::clone(&reg);
        handles.push(tokio::spawn(async move {
            reg.execute("ping", ExecutionContext::new("/")).await.success
        }));
    }

    let mut admitted = 0;
    for handle in handles {
        if handle.await.unwrap() {
            admitted += 1;
        }
    }
    assert_eq!(admitted, 5);
}
