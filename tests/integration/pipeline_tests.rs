//! Pipeline scenarios over the shell-substituted toolchain

use crate::common::{
    quick_limits, setup_test_logging, shell_compiler_source, shell_config, RecordingSink,
    TestRoot,
};
use assert_matches::assert_matches;
use coderun_sandbox::{
    CodeExecutor, ExecutionRequest, ExecutionStatus, Executor, NullSink, PipelineState,
    ResourceLimits,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn executor(root: &TestRoot, limits: ResourceLimits) -> CodeExecutor {
    CodeExecutor::new(&shell_config(&root.path).with_limits(limits))
}

#[tokio::test]
async fn test_hello_world_completes() {
    setup_test_logging();
    let root = TestRoot::new();
    let executor = executor(&root, quick_limits());
    let sink = RecordingSink::new();

    let request = ExecutionRequest::new("python", "echo 'Hello, World!'");
    let result = executor.execute(&request, &sink).await;

    assert_eq!(result.status, ExecutionStatus::Completed);
    assert!(result.success);
    assert!(result.execution_time >= 0.0);
    assert_eq!(sink.stdout(), "Hello, World!\n");
    assert_eq!(sink.stderr(), "");
    assert!(root.leftovers().is_empty());
}

#[tokio::test]
async fn test_stdin_is_delivered_and_closed() {
    let root = TestRoot::new();
    let executor = executor(&root, quick_limits());
    let sink = RecordingSink::new();

    // `cat` only finishes if stdin reaches end-of-file
    let request = ExecutionRequest::new(
        "python",
        "read line; echo \"$line\" | tr '[:lower:]' '[:upper:]'; cat",
    )
    .with_stdin("hello\nrest\n");
    let result = executor.execute(&request, &sink).await;

    assert_eq!(result.status, ExecutionStatus::Completed);
    assert_eq!(sink.stdout(), "HELLO\nrest\n");
}

#[tokio::test]
async fn test_infinite_loop_times_out() {
    let root = TestRoot::new();
    let executor = executor(&root, quick_limits());
    let sink = RecordingSink::new();

    let request = ExecutionRequest::new("javascript", "echo started; while :; do :; done");
    let result = executor.execute(&request, &sink).await;

    assert_eq!(result.status, ExecutionStatus::Timeout);
    assert!(!result.success);
    assert!(result.execution_time >= 500.0);
    assert!(result.execution_time < 5_000.0);
    assert_eq!(sink.stdout(), "started\n");
    assert!(sink
        .stderr()
        .ends_with("\nExecution timed out (500ms limit)"));
    assert!(root.leftovers().is_empty());
}

#[tokio::test]
async fn test_oversized_output_is_cut_off() {
    let root = TestRoot::new();
    let executor = executor(&root, quick_limits());
    let sink = RecordingSink::new();

    let request = ExecutionRequest::new("python", "yes 0123456789abcdef");
    let result = executor.execute(&request, &sink).await;

    assert_eq!(result.status, ExecutionStatus::Error);
    assert!(sink.stdout().len() <= 4 * 1024);
    assert!(sink
        .stderr()
        .ends_with("\nOutput size limit exceeded (4KB)"));
    assert!(root.leftovers().is_empty());
}

#[tokio::test]
async fn test_nonzero_exit_is_error_with_output_kept() {
    let root = TestRoot::new();
    let executor = executor(&root, quick_limits());
    let sink = RecordingSink::new();

    let request = ExecutionRequest::new("python", "echo partial; echo boom >&2; exit 3");
    let result = executor.execute(&request, &sink).await;

    assert_eq!(result.status, ExecutionStatus::Error);
    assert_eq!(sink.stdout(), "partial\n");
    assert_eq!(sink.stderr(), "boom\n");
}

#[tokio::test]
async fn test_compile_error_skips_run() {
    let root = TestRoot::new();
    let executor = executor(&root, quick_limits());
    let sink = RecordingSink::new();
    let states = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&states);

    let request = ExecutionRequest::new(
        "cpp",
        "echo \"main.cpp:1: error: expected ';' before '}'\" >&2; exit 1",
    );
    let result = executor
        .execute_observed(&request, &sink, &move |state: PipelineState| {
            seen.lock().unwrap().push(state)
        })
        .await;

    assert_eq!(result.status, ExecutionStatus::Error);
    assert_eq!(sink.stdout(), "");
    assert!(sink.stderr().contains("error: expected ';'"));
    assert_eq!(
        *states.lock().unwrap(),
        vec![
            PipelineState::Pending,
            PipelineState::Compiling,
            PipelineState::Terminated
        ]
    );
    assert!(root.leftovers().is_empty());
}

#[tokio::test]
async fn test_compiler_stdout_goes_to_error_channel() {
    let root = TestRoot::new();
    let executor = executor(&root, quick_limits());
    let sink = RecordingSink::new();

    let request = ExecutionRequest::new("cpp", "echo 'warning: unused variable'; exit 1");
    let result = executor.execute(&request, &sink).await;

    assert_eq!(result.status, ExecutionStatus::Error);
    assert_eq!(sink.stdout(), "");
    assert_eq!(sink.stderr(), "warning: unused variable\n");
}

#[tokio::test]
async fn test_compile_then_run_removes_artifact() {
    let root = TestRoot::new();
    let executor = executor(&root, quick_limits());
    let sink = RecordingSink::new();

    let request = ExecutionRequest::new("c++", shell_compiler_source("compiled-ok"));
    let result = executor.execute(&request, &sink).await;

    assert_eq!(result.status, ExecutionStatus::Completed);
    assert_eq!(sink.stdout(), "compiled-ok\n");
    assert!(root.leftovers().is_empty());
}

#[tokio::test]
async fn test_unsupported_language() {
    let root = TestRoot::new();
    let executor = executor(&root, quick_limits());
    let sink = RecordingSink::new();

    let result = executor
        .execute(&ExecutionRequest::new("cobol", "DISPLAY 'HI'."), &sink)
        .await;

    assert_eq!(result.status, ExecutionStatus::Error);
    assert_eq!(result.execution_time, 0.0);
    assert_eq!(sink.stderr(), "Execution error: Unsupported language: cobol");
    // Nothing was written for an unresolved language
    assert!(root.leftovers().is_empty());
}

#[tokio::test]
async fn test_missing_interpreter_is_error() {
    let root = TestRoot::new();
    let mut config = shell_config(&root.path).with_limits(quick_limits());
    config.toolchain.python = "/nonexistent/python3".to_string();
    let executor = CodeExecutor::new(&config);
    let sink = RecordingSink::new();

    let result = executor
        .execute(&ExecutionRequest::new("python", "print(1)"), &sink)
        .await;

    assert_eq!(result.status, ExecutionStatus::Error);
    assert!(sink.stderr().starts_with("Process error:"));
    assert!(root.leftovers().is_empty());
}

#[tokio::test]
async fn test_same_request_twice_is_independent() {
    let root = TestRoot::new();
    let executor = executor(&root, quick_limits());
    let request = ExecutionRequest::new("python", "echo same; echo also >&2");

    let first = RecordingSink::new();
    let second = RecordingSink::new();
    let a = executor.execute(&request, &first).await;
    let b = executor.execute(&request, &second).await;

    assert_eq!(a.status, ExecutionStatus::Completed);
    assert_eq!(a.status, b.status);
    assert_eq!(first.stdout(), second.stdout());
    assert_eq!(first.stderr(), second.stderr());
    assert!(root.leftovers().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_do_not_interfere() {
    let root = TestRoot::new();
    let executor = Arc::new(executor(&root, quick_limits()));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let executor = Arc::clone(&executor);
            tokio::spawn(async move {
                let sink = RecordingSink::new();
                let code = format!("sleep 0.1; echo task-{}", i);
                let result = executor
                    .execute(&ExecutionRequest::new("python", code), &sink)
                    .await;
                (i, result, sink.stdout())
            })
        })
        .collect();

    for handle in handles {
        let (i, result, stdout) = handle.await.unwrap();
        assert_matches!(result.status, ExecutionStatus::Completed);
        assert_eq!(stdout, format!("task-{}\n", i));
    }
    assert!(root.leftovers().is_empty());
}

#[tokio::test]
async fn test_nothing_emitted_after_timeout() {
    let root = TestRoot::new();
    let limits = quick_limits().with_timeout(Duration::from_millis(300));
    let executor = executor(&root, limits);
    let sink = RecordingSink::new();

    let request = ExecutionRequest::new("python", "sleep 1; echo too-late");
    let result = executor.execute(&request, &sink).await;
    let chunks_at_return = sink.chunk_count();

    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert_eq!(result.status, ExecutionStatus::Timeout);
    assert_eq!(sink.chunk_count(), chunks_at_return);
    assert!(!sink.stdout().contains("too-late"));
}

#[tokio::test]
async fn test_every_outcome_leaves_root_empty() {
    let root = TestRoot::new();
    let limits = quick_limits()
        .with_timeout(Duration::from_millis(200))
        .with_compile_timeout(Duration::from_millis(300));
    let executor = executor(&root, limits);

    let requests = [
        ExecutionRequest::new("python", "echo ok"),
        ExecutionRequest::new("python", "exit 1"),
        ExecutionRequest::new("python", "while :; do :; done"),
        ExecutionRequest::new("python", "yes"),
        ExecutionRequest::new("cpp", "exit 1"),
        ExecutionRequest::new("cpp", shell_compiler_source("fine")),
        ExecutionRequest::new("cpp", "while :; do :; done"),
    ];
    let mut statuses = Vec::new();
    for request in &requests {
        statuses.push(executor.execute(request, &NullSink).await.status);
    }

    assert_eq!(
        statuses,
        vec![
            ExecutionStatus::Completed,
            ExecutionStatus::Error,
            ExecutionStatus::Timeout,
            ExecutionStatus::Error,
            ExecutionStatus::Error,
            ExecutionStatus::Completed,
            // A compile-stage timeout is reported as an error
            ExecutionStatus::Error,
        ]
    );
    assert!(root.leftovers().is_empty());
}
