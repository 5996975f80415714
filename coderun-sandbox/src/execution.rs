//! Execution identifiers and tracking records

use crate::pipeline::PipelineState;
use crate::types::ExecutionResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique execution identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecutionId(pub uuid::Uuid);

impl ExecutionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for ExecutionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a tracked execution currently is
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionPhase {
    /// Waiting for a concurrency permit
    Queued,
    Pending,
    Compiling,
    Running,
    Finished,
}

impl From<PipelineState> for ExecutionPhase {
    fn from(state: PipelineState) -> Self {
        match state {
            PipelineState::Pending => ExecutionPhase::Pending,
            PipelineState::Compiling => ExecutionPhase::Compiling,
            PipelineState::Running => ExecutionPhase::Running,
            PipelineState::Terminated => ExecutionPhase::Finished,
        }
    }
}

/// Snapshot of one execution, kept by the service until cleaned up
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: ExecutionId,
    pub language: String,
    pub phase: ExecutionPhase,
    pub submitted_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub result: Option<ExecutionResult>,
}

impl ExecutionRecord {
    pub fn new(id: ExecutionId, language: impl Into<String>) -> Self {
        Self {
            id,
            language: language.into(),
            phase: ExecutionPhase::Queued,
            submitted_at: Utc::now(),
            finished_at: None,
            result: None,
        }
    }

    /// Record a phase change; ignored once the result is in
    pub fn advance(&mut self, phase: ExecutionPhase) {
        if self.is_finished() {
            return;
        }
        self.phase = phase;
    }

    pub fn finish(&mut self, result: ExecutionResult) {
        self.phase = ExecutionPhase::Finished;
        self.finished_at = Some(Utc::now());
        self.result = Some(result);
    }

    pub fn is_finished(&self) -> bool {
        self.phase == ExecutionPhase::Finished && self.result.is_some()
    }
}
