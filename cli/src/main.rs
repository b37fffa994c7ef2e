use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use command_dispatch::{CommandRegistry, CommandResult};
use command_dispatch_config::DispatchConfig;
use tracing_subscriber::EnvFilter;

mod builtins;

#[derive(Debug, Parser)]
#[command(name = "dispatch")]
#[command(about = "Run commands through a rate-limited dispatcher", version)]
#[command(disable_help_subcommand = true)]
struct Cli {
    /// YAML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Log dispatcher activity to stderr.
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Execute a command line.
    Run(RunArgs),
    /// List available commands.
    List(ListArgs),
    /// Show help for one command, or the command overview.
    Help(HelpArgs),
    /// Complete a partial command name.
    Complete(CompleteArgs),
    /// Show rate-limit status.
    Status,
    /// Write a default configuration file.
    ConfigInit(ConfigInitArgs),
}

#[derive(Debug, Args)]
struct RunArgs {
    /// Deadline in milliseconds (overrides the configured default).
    #[arg(long)]
    timeout_ms: Option<u64>,
    /// Execute the line this many times in a row.
    #[arg(long, default_value_t = 1)]
    repeat: u32,
    /// Print results as JSON.
    #[arg(long)]
    json: bool,
    /// Command line, as one quoted string or as separate words.
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    line: Vec<String>,
}

#[derive(Debug, Args)]
struct ListArgs {
    /// Only list commands in this category.
    #[arg(long)]
    category: Option<String>,
    /// Print as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
struct HelpArgs {
    /// Command name or alias.
    command: Option<String>,
}

#[derive(Debug, Args)]
struct CompleteArgs {
    /// Partial command name.
    partial: String,
}

#[derive(Debug, Args)]
struct ConfigInitArgs {
    /// Output path.
    path: PathBuf,
    /// Overwrite an existing file.
    #[arg(long)]
    force: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = cli.config.as_ref();
    let result = match cli.command {
        Command::Run(args) => match build_registry(config) {
            Ok(registry) => run_run(&registry, args).await,
            Err(err) => Err(err),
        },
        Command::List(args) => build_registry(config).and_then(|r| run_list(&r, args)),
        Command::Help(args) => build_registry(config).and_then(|r| run_help(&r, args)),
        Command::Complete(args) => build_registry(config).and_then(|r| run_complete(&r, args)),
        Command::Status => build_registry(config).and_then(|r| run_status(&r)),
        Command::ConfigInit(args) => run_config_init(args),
    };

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn build_registry(config_path: Option<&PathBuf>) -> Result<CommandRegistry, String> {
    let config = match config_path {
        Some(path) => {
            let config = DispatchConfig::load(path)
                .map_err(|e| format!("failed to load {}: {e}", path.display()))?;
            config.validate().map_err(|e| e.to_string())?;
            config
        }
        None => DispatchConfig::default(),
    };

    let mut registry = CommandRegistry::from_config(&config);
    builtins::register_builtins(&mut registry);
    Ok(registry)
}

async fn run_run(registry: &CommandRegistry, args: RunArgs) -> Result<(), String> {
    let line = match args.line.as_slice() {
        [single] => single.clone(),
        words => shell_words::join(words),
    };
    let cwd = std::env::current_dir().map_err(|e| e.to_string())?;

    let mut failures = 0;
    for _ in 0..args.repeat.max(1) {
        let result = match args.timeout_ms {
            Some(ms) => {
                registry
                    .execute_line_with_timeout(&line, cwd.clone(), Duration::from_millis(ms))
                    .await
            }
            None => registry.execute_line(&line, cwd.clone()).await,
        };
        if !result.success {
            failures += 1;
        }
        print_result(&result, args.json)?;
    }

    if failures > 0 {
        Err(format!("{failures} execution(s) failed"))
    } else {
        Ok(())
    }
}

fn print_result(result: &CommandResult, json: bool) -> Result<(), String> {
    if json {
        let text = serde_json::to_string_pretty(result).map_err(|e| e.to_string())?;
        println!("{text}");
        return Ok(());
    }

    if result.success {
        match (&result.message, &result.data) {
            (Some(message), _) => println!("{message}"),
            (None, Some(data)) => println!("{data}"),
            (None, None) => {}
        }
        return Ok(());
    }

    let code = result.error_code().unwrap_or("FAILED");
    let error = result.error.as_deref().unwrap_or("command failed");
    println!("[{code}] {error}");

    let data = result.data.as_ref();
    if let Some(errors) = data.and_then(|d| d["errors"].as_array()) {
        for e in errors.iter().filter_map(|e| e.as_str()) {
            println!("  - {e}");
        }
    }
    if let Some(suggestion) = data.and_then(|d| d["suggestion"].as_str()) {
        println!("hint: {suggestion}");
    }
    Ok(())
}

fn run_list(registry: &CommandRegistry, args: ListArgs) -> Result<(), String> {
    let commands = match &args.category {
        Some(category) => registry.commands_in_category(category),
        None => registry.list(),
    };

    if args.json {
        let text = serde_json::to_string_pretty(&commands).map_err(|e| e.to_string())?;
        println!("{text}");
        return Ok(());
    }

    if commands.is_empty() {
        return Err(match args.category {
            Some(category) => format!("no commands in category '{category}'"),
            None => "no commands registered".to_string(),
        });
    }
    print!("{}", command_dispatch_core::render_command_list(&commands));
    Ok(())
}

fn run_help(registry: &CommandRegistry, args: HelpArgs) -> Result<(), String> {
    let Some(name) = args.command else {
        print!("{}", registry.help_overview());
        return Ok(());
    };

    match registry.help(&name) {
        Some(text) => {
            print!("{text}");
            Ok(())
        }
        None => {
            let suggestions: Vec<String> = registry
                .find_similar_commands(&name)
                .into_iter()
                .map(|s| s.name)
                .collect();
            if suggestions.is_empty() {
                Err(format!("unknown command '{name}'"))
            } else {
                Err(format!(
                    "unknown command '{name}' (did you mean: {}?)",
                    suggestions.join(", ")
                ))
            }
        }
    }
}

fn run_complete(registry: &CommandRegistry, args: CompleteArgs) -> Result<(), String> {
    for name in registry.autocomplete(&args.partial) {
        println!("{name}");
    }
    Ok(())
}

fn run_status(registry: &CommandRegistry) -> Result<(), String> {
    let status = registry.rate_limit_status();
    let text = serde_json::to_string_pretty(&status).map_err(|e| e.to_string())?;
    println!("{text}");
    Ok(())
}

fn run_config_init(args: ConfigInitArgs) -> Result<(), String> {
    if args.path.exists() && !args.force {
        return Err(format!(
            "{} already exists (use --force to overwrite)",
            args.path.display()
        ));
    }
    DispatchConfig::default()
        .save(&args.path)
        .map_err(|e| e.to_string())?;
    println!("Wrote default configuration to {}", args.path.display());
    Ok(())
}
