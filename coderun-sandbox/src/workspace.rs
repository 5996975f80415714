//! Per-request scratch files
//!
//! Every request gets a uniquely named source file (and, for compiled
//! languages, a uniquely named artifact) under one shared root directory.
//! Nothing outlives the request: [`Workspace::release`] deletes the files,
//! and a workspace dropped without release (panic, cancelled task) does the
//! same cleanup synchronously in `Drop`.

use crate::error::{ExecError, ExecResult};
use crate::language::LanguageProfile;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// Extension given to compiled artifacts
const ARTIFACT_EXTENSION: &str = "out";

/// Exclusively owned scratch files for one request
#[derive(Debug)]
pub struct Workspace {
    id: Uuid,
    source_file: PathBuf,
    artifact_file: Option<PathBuf>,
    released: bool,
}

impl Workspace {
    /// Ensure `root` exists and derive collision-free paths for `profile`.
    ///
    /// Only the root directory is touched on disk; concurrent callers racing
    /// to create it are fine.
    pub async fn acquire(root: &Path, profile: &LanguageProfile) -> ExecResult<Self> {
        match tokio::fs::create_dir_all(root).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists && root.is_dir() => {}
            Err(e) => return Err(ExecError::workspace(root, e)),
        }

        let id = Uuid::new_v4();
        let source_file = root.join(format!("{}{}", id.simple(), profile.extension));
        let artifact_file = profile
            .has_compile_stage()
            .then(|| root.join(format!("{}.{}", id.simple(), ARTIFACT_EXTENSION)));

        debug!(
            workspace_id = %id,
            source = %source_file.display(),
            "Workspace acquired"
        );

        Ok(Self {
            id,
            source_file,
            artifact_file,
            released: false,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn source_file(&self) -> &Path {
        &self.source_file
    }

    pub fn artifact_file(&self) -> Option<&Path> {
        self.artifact_file.as_deref()
    }

    /// Every path this workspace may have produced
    pub fn paths(&self) -> Vec<PathBuf> {
        std::iter::once(self.source_file.clone())
            .chain(self.artifact_file.clone())
            .collect()
    }

    /// Write the request's code to the source file, replacing any content
    pub async fn write_source(&self, code: &str) -> ExecResult<()> {
        tokio::fs::write(&self.source_file, code)
            .await
            .map_err(|e| ExecError::workspace(&self.source_file, e))
    }

    /// Delete every artifact. Failures are logged, never returned.
    pub async fn release(mut self) {
        self.released = true;
        for path in self.paths() {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!(
                    workspace_id = %self.id,
                    path = %path.display(),
                    error = %e,
                    "Failed to remove workspace file"
                ),
            }
        }
        debug!(workspace_id = %self.id, "Workspace released");
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        for path in self.paths() {
            if let Err(e) = std::fs::remove_file(&path) {
                if e.kind() != ErrorKind::NotFound {
                    warn!(
                        workspace_id = %self.id,
                        path = %path.display(),
                        error = %e,
                        "Failed to remove workspace file on drop"
                    );
                }
            }
        }
        debug!(workspace_id = %self.id, "Workspace dropped without release; cleaned up");
    }
}
