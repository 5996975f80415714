//! Core types for code execution

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Request to execute a piece of source code
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    /// Language identifier (`python`, `javascript`, `cpp`)
    pub language: String,

    /// The source code to execute
    pub code: String,

    /// Standard input handed to the run stage
    #[serde(default)]
    pub stdin: String,
}

impl ExecutionRequest {
    /// Create a request with empty stdin
    pub fn new(language: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            code: code.into(),
            stdin: String::new(),
        }
    }

    /// Set standard input
    pub fn with_stdin(mut self, stdin: impl Into<String>) -> Self {
        self.stdin = stdin.into();
        self
    }
}

/// Terminal status of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Completed,
    Timeout,
    Error,
}

impl ExecutionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Timeout => "timeout",
            ExecutionStatus::Error => "error",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one request. Output is never buffered here; it has already been
/// streamed through the sink by the time this exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub success: bool,
    pub status: ExecutionStatus,
    /// Elapsed wall-clock time in milliseconds
    pub execution_time: f64,
}

impl ExecutionResult {
    pub fn completed(execution_time: f64) -> Self {
        Self {
            success: true,
            status: ExecutionStatus::Completed,
            execution_time,
        }
    }

    pub fn error(execution_time: f64) -> Self {
        Self {
            success: false,
            status: ExecutionStatus::Error,
            execution_time,
        }
    }

    pub fn timeout(execution_time: f64) -> Self {
        Self {
            success: false,
            status: ExecutionStatus::Timeout,
            execution_time,
        }
    }
}

/// Why the supervisor killed a process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    TimedOut,
    OutputLimitExceeded,
}

/// Outcome of one supervised process (compile or run stage)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageOutcome {
    /// Exit code if the process exited on its own
    pub exit_code: Option<i32>,

    /// Set when the supervisor killed the process
    pub termination: Option<Termination>,

    /// Bytes counted against the output cap
    pub output_bytes: usize,
}

impl StageOutcome {
    /// Outcome for a process that never started
    pub fn spawn_failed() -> Self {
        Self::default()
    }

    pub fn timed_out(&self) -> bool {
        self.termination == Some(Termination::TimedOut)
    }

    pub fn output_limit_exceeded(&self) -> bool {
        self.termination == Some(Termination::OutputLimitExceeded)
    }

    /// Exit code zero and not killed by the supervisor
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0) && self.termination.is_none()
    }
}

/// A program plus arguments, ready to spawn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl StageCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}

impl fmt::Display for StageCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}
