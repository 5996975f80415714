use std::path::PathBuf;
use thiserror::Error;

/// Failures that stop a request before or between stages.
///
/// Compile failures, runtime failures, timeouts and output-limit kills are
/// not errors here: they are stage outcomes and end up in the terminal
/// [`ExecutionStatus`](crate::ExecutionStatus).
#[derive(Error, Debug)]
pub enum ExecError {
    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("Workspace I/O error on {}: {source}", path.display())]
    WorkspaceIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl ExecError {
    pub(crate) fn workspace(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ExecError::WorkspaceIo {
            path: path.into(),
            source,
        }
    }
}

pub type ExecResult<T> = Result<T, ExecError>;
