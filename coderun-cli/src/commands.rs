//! CLI command implementations
//!
//! Thin glue between the argument parser and the execution engine: config
//! loading and overrides, language inference, streaming output to the
//! terminal, and mapping the terminal status to a process exit code.

use anyhow::{anyhow, Context, Result};
use coderun_sandbox::{
    ExecutionRequest, ExecutionStatus, FnSink, Language, LanguageRegistry, ResourceLimits,
    SandboxConfig, SandboxService,
};
use serde_json::json;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Exit code reported for a run that hit its time limit (same as timeout(1))
pub const TIMEOUT_EXIT_CODE: u8 = 124;

/// Named limit sets selectable with `--limits`
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LimitPreset {
    Strict,
    Permissive,
}

impl LimitPreset {
    fn limits(self) -> ResourceLimits {
        match self {
            LimitPreset::Strict => ResourceLimits::strict(),
            LimitPreset::Permissive => ResourceLimits::permissive(),
        }
    }
}

/// Options for `coderun run`
#[derive(Debug, Default)]
pub struct RunOptions {
    pub file: PathBuf,
    pub language: Option<String>,
    pub stdin_file: Option<PathBuf>,
    pub input: Option<String>,
    pub preset: Option<LimitPreset>,
    pub timeout_ms: Option<u64>,
    pub max_output: Option<usize>,
    pub config: Option<PathBuf>,
    pub json: bool,
}

/// Load the config file if one was given, otherwise the defaults
pub fn load_config(path: Option<&Path>) -> Result<SandboxConfig> {
    match path {
        Some(path) => SandboxConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Ok(SandboxConfig::default()),
    }
}

/// Command-line limits win over the config file; explicit values win over a preset
pub fn apply_overrides(
    mut config: SandboxConfig,
    preset: Option<LimitPreset>,
    timeout_ms: Option<u64>,
    max_output: Option<usize>,
) -> SandboxConfig {
    if let Some(preset) = preset {
        config.limits = preset.limits();
    }
    if let Some(ms) = timeout_ms {
        config.limits = config.limits.with_timeout(Duration::from_millis(ms));
    }
    if let Some(bytes) = max_output {
        config.limits = config.limits.with_max_output_bytes(bytes);
    }
    config
}

/// Explicit `-l` wins; otherwise the file extension decides
pub fn infer_language(file: &Path, explicit: Option<&str>) -> Result<String> {
    if let Some(language) = explicit {
        return Ok(language.to_string());
    }
    file.extension()
        .and_then(|ext| ext.to_str())
        .and_then(Language::from_extension)
        .map(|language| language.id().to_string())
        .ok_or_else(|| {
            anyhow!(
                "Cannot infer language from {}; pass --language",
                file.display()
            )
        })
}

pub fn exit_code(status: ExecutionStatus) -> u8 {
    match status {
        ExecutionStatus::Completed => 0,
        ExecutionStatus::Error => 1,
        ExecutionStatus::Timeout => TIMEOUT_EXIT_CODE,
    }
}

async fn read_stdin(options: &RunOptions) -> Result<String> {
    match (&options.stdin_file, &options.input) {
        (Some(path), _) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read stdin file {}", path.display())),
        (None, Some(text)) => Ok(text.clone()),
        (None, None) => Ok(String::new()),
    }
}

/// Execute `coderun run`, returning the terminal status
pub async fn execute_run(options: RunOptions) -> Result<ExecutionStatus> {
    let config = apply_overrides(
        load_config(options.config.as_deref())?,
        options.preset,
        options.timeout_ms,
        options.max_output,
    );
    let service = SandboxService::from_config(&config)?;

    let language = infer_language(&options.file, options.language.as_deref())?;
    let code = tokio::fs::read_to_string(&options.file)
        .await
        .with_context(|| format!("Failed to read {}", options.file.display()))?;
    let request = ExecutionRequest::new(language, code).with_stdin(read_stdin(&options).await?);

    info!(
        file = %options.file.display(),
        language = %request.language,
        "Running file"
    );

    if options.json {
        let transcript = service.execute_stream(request).await.collect().await?;
        println!("{}", serde_json::to_string_pretty(&transcript)?);
        return Ok(transcript.result.status);
    }

    let sink = FnSink::new(
        |chunk: &str| {
            let mut out = std::io::stdout().lock();
            let _ = out.write_all(chunk.as_bytes());
            let _ = out.flush();
        },
        |chunk: &str| {
            let mut err = std::io::stderr().lock();
            let _ = err.write_all(chunk.as_bytes());
            let _ = err.flush();
        },
    );
    let result = service.execute(&request, &sink).await;
    debug!(status = %result.status, "Execution returned");

    eprintln!("\n[{}] {:.2}ms", result.status, result.execution_time);
    Ok(result.status)
}

/// Execute `coderun languages`
pub fn list_languages(config: Option<&Path>, as_json: bool) -> Result<()> {
    let config = load_config(config)?;
    let registry = LanguageRegistry::new(&config.toolchain);

    if as_json {
        let entries: Vec<_> = registry
            .profiles()
            .map(|profile| {
                json!({
                    "id": profile.language.id(),
                    "name": profile.display_name,
                    "extension": profile.extension,
                    "toolchain": profile.toolchain_program(),
                    "compiled": profile.has_compile_stage(),
                    "hello": profile.default_code,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    println!("{:<12} {:<12} {:<6} {}", "ID", "NAME", "EXT", "TOOLCHAIN");
    for profile in registry.profiles() {
        println!(
            "{:<12} {:<12} {:<6} {}{}",
            profile.language.id(),
            profile.display_name,
            profile.extension,
            profile.toolchain_program().unwrap_or("-"),
            if profile.has_compile_stage() {
                " (compiled)"
            } else {
                ""
            }
        );
    }
    Ok(())
}
