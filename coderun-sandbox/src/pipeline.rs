//! Execution pipeline: workspace → optional compile → run → cleanup

use crate::config::SandboxConfig;
use crate::error::ExecResult;
use crate::language::{LanguageProfile, LanguageRegistry};
use crate::limits::ResourceLimits;
use crate::sink::{ErrorChannel, OutputSink};
use crate::supervisor::{ProcessSupervisor, StageLimits};
use crate::types::{ExecutionRequest, ExecutionResult, StageOutcome};
use crate::workspace::Workspace;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn, Instrument};

/// Executes requests and reports a terminal result.
///
/// Implementations never fail: every problem is streamed to the sink's error
/// channel and folded into the returned [`ExecutionResult`].
#[async_trait]
pub trait Executor: Send + Sync {
    /// Run one request, reporting each pipeline state to `observer`
    async fn execute_observed(
        &self,
        request: &ExecutionRequest,
        sink: &dyn OutputSink,
        observer: &(dyn Fn(PipelineState) + Send + Sync),
    ) -> ExecutionResult;

    async fn execute(&self, request: &ExecutionRequest, sink: &dyn OutputSink) -> ExecutionResult {
        self.execute_observed(request, sink, &|_: PipelineState| {})
            .await
    }

    /// Name for logs
    fn name(&self) -> &str;
}

/// Per-request pipeline states. Each is entered at most once, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PipelineState {
    Pending,
    Compiling,
    Running,
    Terminated,
}

/// Process-backed executor
#[derive(Debug, Clone)]
pub struct CodeExecutor {
    registry: Arc<LanguageRegistry>,
    workspace_root: PathBuf,
    limits: ResourceLimits,
}

impl CodeExecutor {
    pub fn new(config: &SandboxConfig) -> Self {
        Self::with_registry(
            Arc::new(LanguageRegistry::new(&config.toolchain)),
            config.workspace_root.clone(),
            config.limits.clone(),
        )
    }

    pub fn with_registry(
        registry: Arc<LanguageRegistry>,
        workspace_root: impl Into<PathBuf>,
        limits: ResourceLimits,
    ) -> Self {
        Self {
            registry,
            workspace_root: workspace_root.into(),
            limits,
        }
    }

    async fn run_observed(
        &self,
        request: &ExecutionRequest,
        sink: &dyn OutputSink,
        observer: &(dyn Fn(PipelineState) + Send + Sync),
    ) -> ExecutionResult {
        let mut started = None;
        let result = match self.run_pipeline(request, sink, observer, &mut started).await {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "Execution failed before completion");
                sink.on_error(&format!("Execution error: {}", e));
                ExecutionResult::error(started.map(elapsed_ms).unwrap_or(0.0))
            }
        };
        observer(PipelineState::Terminated);

        info!(
            status = %result.status,
            success = result.success,
            execution_time_ms = result.execution_time,
            "Execution finished"
        );
        result
    }

    async fn run_pipeline(
        &self,
        request: &ExecutionRequest,
        sink: &dyn OutputSink,
        observer: &(dyn Fn(PipelineState) + Send + Sync),
        started: &mut Option<Instant>,
    ) -> ExecResult<ExecutionResult> {
        observer(PipelineState::Pending);
        let profile = self.registry.resolve(&request.language)?;

        let workspace = Workspace::acquire(&self.workspace_root, profile).await?;
        // Release runs on every path below; a panic or cancellation falls back
        // to the workspace's Drop.
        let result = self
            .run_in_workspace(&workspace, profile, request, sink, observer, started)
            .await;
        workspace.release().await;

        result
    }

    async fn run_in_workspace(
        &self,
        workspace: &Workspace,
        profile: &LanguageProfile,
        request: &ExecutionRequest,
        sink: &dyn OutputSink,
        observer: &(dyn Fn(PipelineState) + Send + Sync),
        started: &mut Option<Instant>,
    ) -> ExecResult<ExecutionResult> {
        workspace.write_source(&request.code).await?;
        let start = *started.insert(Instant::now());

        if let Some(compile) = profile.compile_command(workspace) {
            observer(PipelineState::Compiling);
            debug!(command = %compile, "Compiling");

            let compiler = ProcessSupervisor::new(StageLimits::compile(&self.limits));
            let outcome = compiler.run(&compile, "", &ErrorChannel(sink)).await;
            if !outcome.succeeded() {
                if outcome.timed_out() {
                    warn!(
                        timeout_ms = self.limits.compile_timeout.as_millis() as u64,
                        "Compilation timed out"
                    );
                } else {
                    debug!(exit_code = ?outcome.exit_code, "Compilation failed");
                }
                return Ok(ExecutionResult::error(elapsed_ms(start)));
            }
        }

        let run = profile.run_command(workspace)?;
        observer(PipelineState::Running);
        debug!(command = %run, stdin_len = request.stdin.len(), "Running");

        let runner = ProcessSupervisor::new(StageLimits::run(&self.limits));
        let outcome = runner.run(&run, &request.stdin, sink).await;

        Ok(result_from_run(&outcome, elapsed_ms(start)))
    }
}

#[async_trait]
impl Executor for CodeExecutor {
    async fn execute_observed(
        &self,
        request: &ExecutionRequest,
        sink: &dyn OutputSink,
        observer: &(dyn Fn(PipelineState) + Send + Sync),
    ) -> ExecutionResult {
        let span = tracing::info_span!(
            "execution",
            executor = self.name(),
            language = %request.language,
            code_len = request.code.len(),
        );
        self.run_observed(request, sink, observer)
            .instrument(span)
            .await
    }

    fn name(&self) -> &str {
        "process"
    }
}

/// Map the run stage's outcome to the terminal result. Timeout wins over
/// the generic error status.
fn result_from_run(outcome: &StageOutcome, execution_time: f64) -> ExecutionResult {
    if outcome.timed_out() {
        ExecutionResult::timeout(execution_time)
    } else if outcome.succeeded() {
        ExecutionResult::completed(execution_time)
    } else {
        ExecutionResult::error(execution_time)
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}
