mod commands;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use commands::LimitPreset;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_appender::non_blocking::WorkerGuard;

#[derive(Parser)]
#[command(name = "coderun")]
#[command(about = "Run Python, JavaScript and C++ source files under time and output limits")]
#[command(version)]
pub struct Cli {
    /// Verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Also write logs to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compile (if needed) and run a source file, streaming its output
    Run {
        /// Source file to execute
        file: PathBuf,

        /// Language id or alias (inferred from the extension by default)
        #[arg(short, long)]
        language: Option<String>,

        /// Feed this file to the program's stdin
        #[arg(long, conflicts_with = "input")]
        stdin: Option<PathBuf>,

        /// Feed this text to the program's stdin
        #[arg(long)]
        input: Option<String>,

        /// Start from a named limit set
        #[arg(long, value_enum)]
        limits: Option<LimitPreset>,

        /// Wall-clock limit for the run stage, in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Combined stdout+stderr bytes allowed before the program is killed
        #[arg(long)]
        max_output: Option<usize>,

        /// TOML config file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Print one JSON object with output and result instead of streaming
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// List supported languages
    Languages {
        /// TOML config file (for toolchain overrides)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Print as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let _guard = init_tracing(cli.verbose, cli.log_file.as_deref())?;

    match cli.command {
        Commands::Run {
            file,
            language,
            stdin,
            input,
            limits,
            timeout_ms,
            max_output,
            config,
            json,
        } => {
            let status = commands::execute_run(commands::RunOptions {
                file,
                language,
                stdin_file: stdin,
                input,
                preset: limits,
                timeout_ms,
                max_output,
                config,
                json,
            })
            .await?;
            Ok(ExitCode::from(commands::exit_code(status)))
        }
        Commands::Languages { config, json } => {
            commands::list_languages(config.as_deref(), json)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Console logging on stderr, plus an optional plain-text log file
fn init_tracing(verbose: bool, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let log_level = if verbose { "debug" } else { "warn" };

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .with_context(|| format!("Invalid log file path: {}", path.display()))?;
            let file_appender = tracing_appender::rolling::never(dir, name);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(true),
        )
        .with(file_layer)
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(format!(
                    "coderun={},coderun_sandbox={}",
                    log_level, log_level
                ))
            }),
        )
        .init();

    Ok(guard)
}
