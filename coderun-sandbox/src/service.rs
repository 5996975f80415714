//! Sandbox service - main entry point
//!
//! Wraps an [`Executor`] with execution tracking, an optional bound on
//! concurrent executions, and a channel-based streaming front door for
//! transports that want events rather than callbacks.

use crate::config::SandboxConfig;
use crate::error::ExecResult;
use crate::execution::{ExecutionId, ExecutionRecord};
use crate::pipeline::{CodeExecutor, Executor, PipelineState};
use crate::sink::OutputSink;
use crate::types::{ExecutionRequest, ExecutionResult};
use crate::Result;
use anyhow::anyhow;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{mpsc, OwnedSemaphorePermit, RwLock, Semaphore};
use tracing::{debug, error, info, warn, Instrument};

type Record = Arc<Mutex<ExecutionRecord>>;

/// One message on an execution stream. `Finished` is always last.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ExecutionEvent {
    Output { content: String },
    Error { content: String },
    Finished { result: ExecutionResult },
}

/// Receiving end of a streamed execution
pub struct ExecutionStream {
    pub id: ExecutionId,
    events: mpsc::UnboundedReceiver<ExecutionEvent>,
}

/// Everything an execution produced, gathered from its stream
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transcript {
    pub stdout: String,
    pub stderr: String,
    pub result: ExecutionResult,
}

impl ExecutionStream {
    /// Next event, or `None` once the stream is exhausted
    pub async fn next(&mut self) -> Option<ExecutionEvent> {
        self.events.recv().await
    }

    /// Drain the stream into a [`Transcript`]
    pub async fn collect(mut self) -> Result<Transcript> {
        let mut stdout = String::new();
        let mut stderr = String::new();
        while let Some(event) = self.next().await {
            match event {
                ExecutionEvent::Output { content } => stdout.push_str(&content),
                ExecutionEvent::Error { content } => stderr.push_str(&content),
                ExecutionEvent::Finished { result } => {
                    return Ok(Transcript {
                        stdout,
                        stderr,
                        result,
                    })
                }
            }
        }
        Err(anyhow!("execution {} ended without a result", self.id))
    }
}

/// Forwards chunks into an execution stream
struct ChannelSink {
    tx: mpsc::UnboundedSender<ExecutionEvent>,
}

impl OutputSink for ChannelSink {
    fn on_output(&self, chunk: &str) {
        let _ = self.tx.send(ExecutionEvent::Output {
            content: chunk.to_string(),
        });
    }

    fn on_error(&self, chunk: &str) {
        let _ = self.tx.send(ExecutionEvent::Error {
            content: chunk.to_string(),
        });
    }
}

/// Code execution service
///
/// Every execution stays in the records map after it finishes, so a
/// long-lived service should call [`SandboxService::cleanup_finished`]
/// periodically.
#[derive(Clone)]
pub struct SandboxService {
    executor: Arc<dyn Executor>,
    permits: Option<Arc<Semaphore>>,
    executions: Arc<RwLock<HashMap<ExecutionId, Record>>>,
}

impl SandboxService {
    /// Create a service around the given executor, with no concurrency bound
    pub fn new(executor: impl Executor + 'static) -> Self {
        Self {
            executor: Arc::new(executor),
            permits: None,
            executions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Build the process-backed service described by `config`
    pub fn from_config(config: &SandboxConfig) -> ExecResult<Self> {
        config.validate()?;
        let service = Self::new(CodeExecutor::new(config));
        Ok(match config.max_concurrent_executions {
            Some(limit) => service.with_max_concurrency(limit),
            None => service,
        })
    }

    /// Allow at most `limit` executions to run at once; the rest queue
    pub fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.permits = Some(Arc::new(Semaphore::new(limit.max(1))));
        self
    }

    /// Get the executor name
    pub fn executor_name(&self) -> &str {
        self.executor.name()
    }

    /// Execute a request, streaming output into `sink`.
    ///
    /// A panicking executor yields an `error` result, as with
    /// [`SandboxService::execute_stream`].
    pub async fn execute(
        &self,
        request: &ExecutionRequest,
        sink: &dyn OutputSink,
    ) -> ExecutionResult {
        let id = ExecutionId::new();
        let record = self.track(id, &request.language).await;
        let span = tracing::info_span!("request", execution_id = %id);
        let run = run_tracked(
            self.executor.as_ref(),
            self.permits.clone(),
            &record,
            request,
            sink,
        );
        let outcome = AssertUnwindSafe(run)
            .catch_unwind()
            .instrument(span.clone())
            .await;
        match outcome {
            Ok(result) => result,
            Err(payload) => {
                let _enter = span.enter();
                fail_execution(&record, sink, &panic_message(payload.as_ref()))
            }
        }
    }

    /// Execute a request in the background and return its event stream
    pub async fn execute_stream(&self, request: ExecutionRequest) -> ExecutionStream {
        let id = ExecutionId::new();
        let record = self.track(id, &request.language).await;
        let (tx, rx) = mpsc::unbounded_channel();

        let executor = Arc::clone(&self.executor);
        let permits = self.permits.clone();
        let span = tracing::info_span!("request", execution_id = %id);
        tokio::spawn(
            async move {
                let sink = Arc::new(ChannelSink { tx: tx.clone() });
                let task_sink = Arc::clone(&sink);
                let task_record = Arc::clone(&record);
                let run = tokio::spawn(
                    async move {
                        run_tracked(
                            executor.as_ref(),
                            permits,
                            &task_record,
                            &request,
                            task_sink.as_ref(),
                        )
                        .await
                    }
                    .in_current_span(),
                );

                let result = match run.await {
                    Ok(result) => result,
                    Err(e) => fail_execution(&record, sink.as_ref(), &e.to_string()),
                };
                let _ = tx.send(ExecutionEvent::Finished { result });
            }
            .instrument(span),
        );

        ExecutionStream { id, events: rx }
    }

    /// Get execution record by ID
    pub async fn get_execution(&self, id: ExecutionId) -> Option<ExecutionRecord> {
        let executions = self.executions.read().await;
        let record = executions.get(&id)?.clone();
        drop(executions);
        let snapshot = lock(&record).clone();
        Some(snapshot)
    }

    /// List all tracked executions
    pub async fn list_executions(&self) -> Vec<ExecutionRecord> {
        let executions = self.executions.read().await;
        executions.values().map(|record| lock(record).clone()).collect()
    }

    /// Forget finished executions, returning how many were removed
    pub async fn cleanup_finished(&self) -> usize {
        let mut executions = self.executions.write().await;
        let before = executions.len();
        executions.retain(|_, record| !lock(record).is_finished());
        before - executions.len()
    }

    async fn track(&self, id: ExecutionId, language: &str) -> Record {
        let record = Arc::new(Mutex::new(ExecutionRecord::new(id, language)));
        self.executions
            .write()
            .await
            .insert(id, Arc::clone(&record));
        record
    }
}

async fn run_tracked(
    executor: &dyn Executor,
    permits: Option<Arc<Semaphore>>,
    record: &Record,
    request: &ExecutionRequest,
    sink: &dyn OutputSink,
) -> ExecutionResult {
    let _permit = acquire_permit(permits).await;
    info!(
        executor = executor.name(),
        language = %request.language,
        code_len = request.code.len(),
        stdin_len = request.stdin.len(),
        "Executing code"
    );

    let observer = |state: PipelineState| lock(record).advance(state.into());
    let result = executor.execute_observed(request, sink, &observer).await;
    lock(record).finish(result.clone());
    result
}

/// Settle an execution whose executor died without producing a result
fn fail_execution(record: &Record, sink: &dyn OutputSink, detail: &str) -> ExecutionResult {
    error!(error = %detail, "Execution task failed");
    sink.on_error(&format!("Execution error: {}", detail));
    let result = ExecutionResult::error(0.0);
    lock(record).finish(result.clone());
    result
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("executor panicked: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("executor panicked: {}", message)
    } else {
        "executor panicked".to_string()
    }
}

async fn acquire_permit(permits: Option<Arc<Semaphore>>) -> Option<OwnedSemaphorePermit> {
    let permits = permits?;
    if permits.available_permits() == 0 {
        debug!("Waiting for an execution slot");
    }
    match permits.acquire_owned().await {
        Ok(permit) => Some(permit),
        Err(e) => {
            warn!(error = %e, "Execution semaphore closed; running unbounded");
            None
        }
    }
}

fn lock(record: &Record) -> std::sync::MutexGuard<'_, ExecutionRecord> {
    record.lock().unwrap_or_else(PoisonError::into_inner)
}

impl std::fmt::Debug for SandboxService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SandboxService")
            .field("executor", &self.executor.name())
            .field(
                "max_concurrency",
                &self.permits.as_ref().map(|_| "bounded").unwrap_or("unbounded"),
            )
            .finish()
    }
}
