//! Coderun Sandbox - code execution engine
//!
//! Turns a (language, source, stdin) request into a supervised child process
//! (or a compile-then-run pipeline), streams stdout/stderr to the caller as it
//! is produced, enforces wall-clock and output-size limits, and reports one
//! terminal status per request.
//!
//! This is process supervision, not OS-level isolation: the code runs with the
//! engine's own privileges and is bounded only in time and output.

mod config;
mod error;
mod execution;
mod language;
mod limits;
mod pipeline;
mod service;
mod sink;
mod supervisor;
mod types;
mod workspace;

pub use config::{SandboxConfig, ToolchainConfig, DEFAULT_WORKSPACE_DIR};
pub use error::{ExecError, ExecResult};
pub use execution::{ExecutionId, ExecutionPhase, ExecutionRecord};
pub use language::{Language, LanguageProfile, LanguageRegistry};
pub use limits::{ResourceLimits, DEFAULT_MAX_OUTPUT_BYTES, DEFAULT_TIMEOUT};
pub use pipeline::{CodeExecutor, Executor, PipelineState};
pub use service::{ExecutionEvent, ExecutionStream, SandboxService, Transcript};
pub use sink::{FnSink, NullSink, OutputSink};
pub use supervisor::{ProcessSupervisor, StageLimits};
pub use types::{
    ExecutionRequest, ExecutionResult, ExecutionStatus, StageCommand, StageOutcome, Termination,
};
pub use workspace::Workspace;

/// Re-export common error types
pub type Result<T> = anyhow::Result<T>;
