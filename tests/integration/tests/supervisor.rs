//! End-to-end execution tests: staging, screening, supervision, and cleanup.
//!
//! Scripts run under `/bin/sh` so the tests do not depend on a Python install.
#![cfg(unix)]

use futures::StreamExt;
use scriptrun_integration_tests::{entry_count, sh_config};
use scriptrun_sandbox::{
    ExecutionSupervisor, ExecutionUpdate, ScriptJob, StreamKind, TerminationReason,
};
use std::time::Duration;
use tempfile::TempDir;

#[tokio::test]
async fn test_staged_job_runs_and_is_removed() {
    let uploads = TempDir::new().unwrap();
    let supervisor = ExecutionSupervisor::new(sh_config(uploads.path())).unwrap();

    let job = ScriptJob::stage(&supervisor.config().uploads, "hello.sh", b"echo hello\n")
        .await
        .unwrap();
    assert_eq!(entry_count(uploads.path()), 1);

    let result = supervisor.execute_aggregated(job).await;

    assert_eq!(result.termination_reason, TerminationReason::Completed);
    assert_eq!(result.stdout, "hello\n");
    assert!(result.cleanup_error.is_none());
    assert_eq!(entry_count(uploads.path()), 0);
}

#[tokio::test]
async fn test_staging_rejects_disallowed_extension() {
    let uploads = TempDir::new().unwrap();
    let config = sh_config(uploads.path());

    let err = ScriptJob::stage(&config.uploads, "notes.txt", b"echo hi\n")
        .await
        .unwrap_err();

    assert!(err.to_string().contains(".sh"));
    assert_eq!(entry_count(uploads.path()), 0);
}

#[tokio::test]
async fn test_streaming_wire_form() {
    let uploads = TempDir::new().unwrap();
    let supervisor = ExecutionSupervisor::new(sh_config(uploads.path())).unwrap();
    let job = ScriptJob::stage(
        &supervisor.config().uploads,
        "wire.sh",
        b"echo out\necho err >&2\n",
    )
    .await
    .unwrap();

    let updates: Vec<ExecutionUpdate> = supervisor.execute_streaming(job).collect().await;
    let wire: Vec<serde_json::Value> = updates
        .iter()
        .map(|update| serde_json::to_value(update).unwrap())
        .collect();

    let (last, output) = wire.split_last().unwrap();
    assert_eq!(output.len(), 2);
    for message in output {
        assert_eq!(message["type"], "output");
        assert!(message["stream"] == "stdout" || message["stream"] == "stderr");
        assert!(message["text"].is_string());
        assert!(message["sequence"].is_u64());
    }
    assert_eq!(last["type"], "finished");
    assert_eq!(last["termination_reason"], "completed");
    assert_eq!(last["exit_code"], 0);
    assert_eq!(last["stdout"], "out\n");
    assert_eq!(last["stderr"], "err\n");

    // Every message stands alone and deserializes back
    let decoded: ExecutionUpdate = serde_json::from_value(last.clone()).unwrap();
    assert!(decoded.is_finished());
}

#[tokio::test]
async fn test_concurrent_jobs_are_isolated() {
    let uploads = TempDir::new().unwrap();
    let supervisor = ExecutionSupervisor::new(sh_config(uploads.path())).unwrap();
    let uploads_config = supervisor.config().uploads.clone();

    // Both scripts write the same relative file; each must see only its own
    let script = |tag: &str| format!("echo {tag} > shared.txt\nsleep 0.2\ncat shared.txt\n");
    let first = ScriptJob::stage(&uploads_config, "job.sh", script("first").as_bytes())
        .await
        .unwrap();
    let second = ScriptJob::stage(&uploads_config, "job.sh", script("second").as_bytes())
        .await
        .unwrap();
    assert_ne!(first.path(), second.path());

    let (a, b) = tokio::join!(
        supervisor.execute_aggregated(first),
        supervisor.execute_aggregated(second)
    );

    assert_eq!(a.stdout, "first\n");
    assert_eq!(b.stdout, "second\n");
    assert_ne!(a.job_id, b.job_id);
    assert_eq!(entry_count(uploads.path()), 0);
}

#[tokio::test]
async fn test_timeout_then_cleanup() {
    let uploads = TempDir::new().unwrap();
    let supervisor = ExecutionSupervisor::new(sh_config(uploads.path())).unwrap();
    let job = ScriptJob::stage(
        &supervisor.config().uploads,
        "slow.sh",
        b"echo started\nsleep 10\n",
    )
    .await
    .unwrap()
    .with_timeout(Duration::from_millis(400));

    let result = supervisor.execute_aggregated(job).await;

    assert_eq!(result.termination_reason, TerminationReason::TimedOut);
    assert_eq!(result.stdout, "started\n");
    assert!(result.elapsed() < Duration::from_secs(5));
    assert_eq!(entry_count(uploads.path()), 0);
}

#[tokio::test]
async fn test_background_grandchild_does_not_hold_job_open() {
    let uploads = TempDir::new().unwrap();
    let supervisor = ExecutionSupervisor::new(sh_config(uploads.path())).unwrap();
    let job = ScriptJob::stage(
        &supervisor.config().uploads,
        "bg.sh",
        b"sleep 30 &\necho spawned\nsleep 30\n",
    )
    .await
    .unwrap()
    .with_timeout(Duration::from_millis(400));

    let started = std::time::Instant::now();
    let result = supervisor.execute_aggregated(job).await;

    assert_eq!(result.termination_reason, TerminationReason::TimedOut);
    assert_eq!(result.stdout, "spawned\n");
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn test_background_work_does_not_outlive_completed_job() {
    let uploads = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();
    let marker = scratch.path().join("late");
    let supervisor = ExecutionSupervisor::new(sh_config(uploads.path())).unwrap();
    let script = format!(
        "(sleep 2; touch {}) >/dev/null 2>&1 &\necho done\n",
        marker.display()
    );
    let job = ScriptJob::stage(&supervisor.config().uploads, "detach.sh", script.as_bytes())
        .await
        .unwrap()
        .with_timeout(Duration::from_secs(5));

    let result = supervisor.execute_aggregated(job).await;

    assert_eq!(result.termination_reason, TerminationReason::Completed);
    assert_eq!(result.exit_code, Some(0));
    assert_eq!(result.stdout, "done\n");

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(!marker.exists(), "detached work kept running after the job finished");
}

#[tokio::test]
async fn test_rejected_job_streams_only_result() {
    let uploads = TempDir::new().unwrap();
    let supervisor = ExecutionSupervisor::new(sh_config(uploads.path())).unwrap();
    let job = ScriptJob::stage(
        &supervisor.config().uploads,
        "bad.sh",
        b"echo hi\n# EVAL(1)\n",
    )
    .await
    .unwrap();

    let updates: Vec<ExecutionUpdate> = supervisor.execute_streaming(job).collect().await;

    assert_eq!(updates.len(), 1);
    match &updates[0] {
        ExecutionUpdate::Finished(result) => {
            assert_eq!(result.termination_reason, TerminationReason::ScreenRejected);
            assert_eq!(result.matched_pattern.as_deref(), Some("eval("));
            assert_eq!(
                result.error_message().as_deref(),
                Some("Dangerous code detected: eval(")
            );
        }
        other => panic!("expected a result, got {:?}", other),
    }
    assert_eq!(entry_count(uploads.path()), 0);
}

#[tokio::test]
async fn test_output_cap_marks_truncation_once() {
    let uploads = TempDir::new().unwrap();
    let mut config = sh_config(uploads.path());
    config.execution.max_output_bytes = 64;
    let supervisor = ExecutionSupervisor::new(config).unwrap();
    let job = ScriptJob::stage(
        &supervisor.config().uploads,
        "loud.sh",
        b"i=0\nwhile [ $i -lt 200 ]; do echo line$i; i=$((i+1)); done\necho done >&2\n",
    )
    .await
    .unwrap();

    let updates: Vec<ExecutionUpdate> = supervisor.execute_streaming(job).collect().await;
    let markers = updates
        .iter()
        .filter(|u| match u {
            ExecutionUpdate::Output(e) => {
                e.stream == StreamKind::Stdout && e.text == scriptrun_sandbox::output::TRUNCATION_MARKER
            }
            _ => false,
        })
        .count();
    assert_eq!(markers, 1);

    match updates.last().unwrap() {
        ExecutionUpdate::Finished(result) => {
            assert_eq!(result.termination_reason, TerminationReason::Completed);
            assert!(result.truncated);
            assert_eq!(result.stderr, "done\n");
            assert!(result.stdout.ends_with(scriptrun_sandbox::output::TRUNCATION_MARKER));
        }
        other => panic!("expected a result, got {:?}", other),
    }
}
