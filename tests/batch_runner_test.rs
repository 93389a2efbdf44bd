//! End-to-end batched runs: init, checkpoint, resume and pre-flight checks.

mod common;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use testweaver::domain::errors::{RunnerError, SchedulerError};
use testweaver::domain::models::{BatchConfig, Config};
use testweaver::infrastructure::store::StateLayout;
use testweaver::services::{BatchRunner, RunMode};

use common::{history_manager, report_with_gaps, temp_dir, MockEngine};

fn runner(root: &Path, engine: Arc<MockEngine>) -> BatchRunner {
    let config = Config::default();
    let history = history_manager(root, &config);
    BatchRunner::new(root, config, history, engine)
}

fn batch_config(batch_size: usize) -> BatchConfig {
    BatchConfig {
        batch_size,
        max_concurrent: 2,
        timeout_secs: 5,
        ..BatchConfig::default()
    }
}

#[tokio::test]
async fn test_full_run_processes_every_batch() {
    let dir = temp_dir();
    let engine = Arc::new(MockEngine::new());
    let runner = runner(dir.path(), engine.clone());
    let (tx, _rx) = mpsc::unbounded_channel();

    let summary = runner
        .run(Some(report_with_gaps(5)), RunMode::Fresh, batch_config(2), None, &tx)
        .await
        .unwrap();

    assert_eq!(summary.batches.len(), 3);
    assert!(summary.progress.is_complete());
    assert_eq!(summary.completed_tasks(), 5);
    assert_eq!(summary.exit_code(), 0);
    assert_eq!(engine.generate_calls(), 5);
    assert!((summary.cost() - 0.05).abs() < 1e-9);
    assert!((summary.progress.actual_cost_so_far - 0.05).abs() < 1e-9);

    let layout = StateLayout::for_project(dir.path(), ".testweaver");
    assert!(layout.usage_log().is_file());
    let history = history_manager(dir.path(), &Config::default());
    let entries = history.list_entries(None).unwrap();
    assert_eq!(entries.iter().filter(|e| e.operation == "batch").count(), 3);
}

#[tokio::test]
async fn test_interrupted_run_resumes_where_it_stopped() {
    let dir = temp_dir();
    let engine = Arc::new(MockEngine::new());
    let (tx, _rx) = mpsc::unbounded_channel();

    let first = runner(dir.path(), engine.clone())
        .run(Some(report_with_gaps(5)), RunMode::Fresh, batch_config(2), Some(1), &tx)
        .await
        .unwrap();
    assert_eq!(first.batches.len(), 1);
    assert_eq!(first.progress.completed_batches, 1);
    assert_eq!(first.exit_code(), 1);

    // The report is optional on resume: the pinned copy is used.
    let second = runner(dir.path(), engine.clone())
        .run(None, RunMode::Resume, batch_config(10), None, &tx)
        .await
        .unwrap();
    assert_eq!(second.batches.len(), 2);
    assert_eq!(second.batches[0].batch_index, 1);
    assert!(second.progress.is_complete());
    assert_eq!(second.progress.config.batch_size, 2);
    assert_eq!(engine.generate_calls(), 5);
}

#[tokio::test]
async fn test_fresh_run_over_existing_state_conflicts() {
    let dir = temp_dir();
    let engine = Arc::new(MockEngine::new());
    let (tx, _rx) = mpsc::unbounded_channel();
    let runner = runner(dir.path(), engine.clone());

    runner
        .run(Some(report_with_gaps(4)), RunMode::Fresh, batch_config(2), Some(1), &tx)
        .await
        .unwrap();

    let conflict = runner
        .run(Some(report_with_gaps(4)), RunMode::Fresh, batch_config(2), None, &tx)
        .await;
    assert!(matches!(
        conflict,
        Err(RunnerError::Scheduler(SchedulerError::StateExists(_)))
    ));

    let clean = runner
        .run(Some(report_with_gaps(4)), RunMode::Clean, batch_config(4), None, &tx)
        .await
        .unwrap();
    assert_eq!(clean.progress.total_batches, 1);
    assert!(clean.progress.is_complete());
}

#[tokio::test]
async fn test_resume_without_state_is_fatal() {
    let dir = temp_dir();
    let (tx, _rx) = mpsc::unbounded_channel();
    let result = runner(dir.path(), Arc::new(MockEngine::new()))
        .run(None, RunMode::Resume, batch_config(2), None, &tx)
        .await;
    let err = result.err().unwrap();
    assert!(matches!(err, RunnerError::Scheduler(SchedulerError::NoState)));
    assert!(err.to_string().contains("Remove --resume flag"));
}

#[tokio::test]
async fn test_fresh_run_needs_a_report() {
    let dir = temp_dir();
    let (tx, _rx) = mpsc::unbounded_channel();
    let result = runner(dir.path(), Arc::new(MockEngine::new()))
        .run(None, RunMode::Fresh, batch_config(2), None, &tx)
        .await;
    assert!(matches!(result, Err(RunnerError::MissingReport)));
}

#[tokio::test]
async fn test_unavailable_engine_leaves_no_state() {
    let dir = temp_dir();
    let (tx, _rx) = mpsc::unbounded_channel();
    let runner = runner(dir.path(), Arc::new(MockEngine::new().unavailable()));

    let result = runner
        .run(Some(report_with_gaps(3)), RunMode::Fresh, batch_config(2), None, &tx)
        .await;
    assert!(matches!(result, Err(RunnerError::Orchestrator(_))));
    assert!(runner.scheduler().load_batch_state(dir.path()).unwrap().is_none());
}

#[tokio::test]
async fn test_batch_over_cost_limit_runs_nothing() {
    let dir = temp_dir();
    let engine = Arc::new(MockEngine::new());
    let (tx, _rx) = mpsc::unbounded_channel();
    let config = BatchConfig {
        cost_limit: Some(0.08),
        ..batch_config(2)
    };

    // two tasks at $0.05 each: $0.10 per batch
    let result = runner(dir.path(), engine.clone())
        .run(Some(report_with_gaps(4)), RunMode::Fresh, config, None, &tx)
        .await;
    assert!(matches!(
        result,
        Err(RunnerError::Scheduler(SchedulerError::CostLimitExceeded { batch_index: 0, .. }))
    ));
    assert_eq!(engine.generate_calls(), 0);
}

#[tokio::test]
async fn test_failed_tasks_make_the_run_unsuccessful() {
    let dir = temp_dir();
    let engine = Arc::new(
        MockEngine::new()
            .with_delay(Duration::from_millis(5))
            .failing_on_source("src/module_001.py"),
    );
    let (tx, _rx) = mpsc::unbounded_channel();

    let summary = runner(dir.path(), engine)
        .run(Some(report_with_gaps(3)), RunMode::Fresh, batch_config(3), None, &tx)
        .await
        .unwrap();
    assert!(summary.progress.is_complete());
    assert_eq!(summary.failed_tasks(), 1);
    assert_eq!(summary.completed_tasks(), 2);
    assert_eq!(summary.exit_code(), 1);
}
