//! SandboxService over the process executor

use crate::common::{quick_limits, setup_test_logging, shell_config, TestRoot};
use coderun_sandbox::{
    ExecutionEvent, ExecutionPhase, ExecutionRequest, ExecutionStatus, FnSink, SandboxService,
    Transcript,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[tokio::test]
async fn test_stream_orders_output_before_result() {
    setup_test_logging();
    let root = TestRoot::new();
    let service =
        SandboxService::from_config(&shell_config(&root.path).with_limits(quick_limits()))
            .unwrap();

    let request = ExecutionRequest::new("python", "for i in 1 2 3; do echo line-$i; done");
    let mut stream = service.execute_stream(request).await;

    let mut events = Vec::new();
    while let Some(event) = stream.next().await {
        events.push(event);
    }

    let last = events.last().unwrap();
    assert!(matches!(
        last,
        ExecutionEvent::Finished { result } if result.status == ExecutionStatus::Completed
    ));
    let stdout: String = events
        .iter()
        .filter_map(|e| match e {
            ExecutionEvent::Output { content } => Some(content.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(stdout, "line-1\nline-2\nline-3\n");
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, ExecutionEvent::Finished { .. }))
            .count(),
        1
    );
}

#[tokio::test]
async fn test_timeout_through_stream() {
    let root = TestRoot::new();
    let service =
        SandboxService::from_config(&shell_config(&root.path).with_limits(quick_limits()))
            .unwrap();

    let transcript = service
        .execute_stream(ExecutionRequest::new("python", "while :; do :; done"))
        .await
        .collect()
        .await
        .unwrap();

    assert_eq!(transcript.result.status, ExecutionStatus::Timeout);
    assert_eq!(transcript.stdout, "");
    assert_eq!(transcript.stderr, "\nExecution timed out (500ms limit)");
}

#[tokio::test]
async fn test_records_follow_execution() {
    let root = TestRoot::new();
    let service =
        SandboxService::from_config(&shell_config(&root.path).with_limits(quick_limits()))
            .unwrap();

    let stream = service
        .execute_stream(ExecutionRequest::new("python", "echo hi"))
        .await;
    let id = stream.id;
    let transcript = stream.collect().await.unwrap();

    let record = service.get_execution(id).await.unwrap();
    assert_eq!(record.phase, ExecutionPhase::Finished);
    assert_eq!(record.language, "python");
    assert_eq!(record.result, Some(transcript.result));
    assert!(record.finished_at.unwrap() >= record.submitted_at);

    assert_eq!(service.cleanup_finished().await, 1);
    assert!(service.get_execution(id).await.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrency_limit_from_config() {
    let root = TestRoot::new();
    let mut config = shell_config(&root.path).with_limits(quick_limits());
    config.max_concurrent_executions = Some(1);
    let service = SandboxService::from_config(&config).unwrap();

    let started = Instant::now();
    for transcript in run_sleepers(&service, 3).await {
        assert_eq!(transcript.result.status, ExecutionStatus::Completed);
    }
    // Three 200ms programs one at a time
    assert!(started.elapsed().as_millis() >= 600);
    assert!(root.leftovers().is_empty());
}

async fn run_sleepers(service: &SandboxService, n: usize) -> Vec<Transcript> {
    let mut streams = Vec::with_capacity(n);
    for _ in 0..n {
        streams.push(
            service
                .execute_stream(ExecutionRequest::new("python", "sleep 0.2; echo done"))
                .await,
        );
    }
    let mut transcripts = Vec::with_capacity(n);
    for stream in streams {
        transcripts.push(stream.collect().await.unwrap());
    }
    transcripts
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let root = TestRoot::new();
    let mut config = shell_config(&root.path);
    config.limits.max_output_bytes = 0;
    tokio_test::assert_err!(SandboxService::from_config(&config));

    config.limits.max_output_bytes = 1;
    tokio_test::assert_ok!(SandboxService::from_config(&config));
}

#[tokio::test]
async fn test_callback_execute_counts_chunks() {
    let root = TestRoot::new();
    let service =
        SandboxService::from_config(&shell_config(&root.path).with_limits(quick_limits()))
            .unwrap();
    let out_bytes = Arc::new(AtomicUsize::new(0));
    let err_bytes = Arc::new(AtomicUsize::new(0));
    let (o, e) = (Arc::clone(&out_bytes), Arc::clone(&err_bytes));
    let sink = FnSink::new(
        move |chunk: &str| {
            o.fetch_add(chunk.len(), Ordering::SeqCst);
        },
        move |chunk: &str| {
            e.fetch_add(chunk.len(), Ordering::SeqCst);
        },
    );

    let result = service
        .execute(
            &ExecutionRequest::new("python", "printf abc; printf de >&2"),
            &sink,
        )
        .await;

    assert_eq!(result.status, ExecutionStatus::Completed);
    assert_eq!(out_bytes.load(Ordering::SeqCst), 3);
    assert_eq!(err_bytes.load(Ordering::SeqCst), 2);
    assert_eq!(service.list_executions().await.len(), 1);
}
