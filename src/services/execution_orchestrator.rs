//! Bounded-concurrency execution of AI generation tasks.
//!
//! A batch is drained from a work queue into a `JoinSet` holding at most
//! `max_concurrent` tasks; each finished task makes room for the next one.
//! Every task gets its own timeout and at most one fallback retry, and its
//! failure never affects siblings.

use std::collections::{HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use tokio::task::{Id, JoinError, JoinSet};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::domain::errors::{EngineError, OrchestratorError};
use crate::domain::models::test_layout::test_path_for;
use crate::domain::models::{AiTask, AttemptRecord, Batch, BatchConfig, TaskResult, TaskStatus};
use crate::domain::ports::{GenerationEngine, GenerationRequest};
use crate::infrastructure::engine::TestWriter;

/// Runtime settings for one orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub project_root: PathBuf,
    pub model: String,
    pub fallback_model: Option<String>,
    pub max_concurrent: usize,
    pub timeout: Duration,
    pub framework: Option<String>,
}

impl OrchestratorSettings {
    pub fn from_batch_config(config: &BatchConfig, project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            model: config.model.clone(),
            fallback_model: config.fallback_model.clone(),
            max_concurrent: config.max_concurrent,
            timeout: config.timeout(),
            framework: None,
        }
    }

    #[must_use]
    pub fn with_framework(mut self, framework: Option<String>) -> Self {
        self.framework = framework;
        self
    }

    /// Model used for the retry after a failed first attempt.
    pub fn retry_model(&self) -> &str {
        self.fallback_model.as_deref().unwrap_or(&self.model)
    }
}

/// Progress notifications. Each task emits `Started` and then exactly one
/// of `Completed` or `Failed`.
#[derive(Debug, Clone)]
pub enum TaskEvent {
    Started { task_id: Uuid, source_file: PathBuf },
    Completed { result: TaskResult },
    Failed { result: TaskResult, error: String },
}

/// Cumulative statistics across every batch this orchestrator processed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStats {
    pub total_tokens_used: u64,
    pub total_cost: f64,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub completed: usize,
    pub failed: usize,
    pub fallback_successes: usize,
}

impl ExecutionStats {
    fn record(&mut self, result: &TaskResult) {
        self.total_tokens_used += result.tokens_used;
        self.total_cost += result.total_cost;
        if result.succeeded() {
            self.completed += 1;
            if result.used_fallback {
                self.fallback_successes += 1;
            }
        } else {
            self.failed += 1;
        }
    }
}

/// Decrements the active counter when a task ends, even by panic.
struct ActiveGuard(Arc<AtomicUsize>);

impl ActiveGuard {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct ExecutionOrchestrator {
    engine: Arc<dyn GenerationEngine>,
    settings: OrchestratorSettings,
    writer: TestWriter,
    active: Arc<AtomicUsize>,
    stats: Mutex<ExecutionStats>,
}

impl ExecutionOrchestrator {
    /// Check the engine once and build an orchestrator around it.
    pub async fn initialize(
        engine: Arc<dyn GenerationEngine>,
        settings: OrchestratorSettings,
    ) -> Result<Self, OrchestratorError> {
        if settings.max_concurrent == 0 {
            return Err(OrchestratorError::InvalidConcurrency(settings.max_concurrent));
        }
        engine
            .check_available()
            .await
            .map_err(|e| OrchestratorError::EngineUnavailable(e.to_string()))?;
        info!(
            engine = engine.name(),
            model = %settings.model,
            max_concurrent = settings.max_concurrent,
            "execution orchestrator ready"
        );
        Ok(Self {
            writer: TestWriter::new(settings.project_root.clone()),
            engine,
            settings,
            active: Arc::new(AtomicUsize::new(0)),
            stats: Mutex::new(ExecutionStats::default()),
        })
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Tasks currently running.
    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub async fn stats(&self) -> ExecutionStats {
        self.stats.lock().await.clone()
    }

    pub async fn process_batch(&self, batch: &Batch) -> Vec<TaskResult> {
        let (tx, _rx) = mpsc::unbounded_channel();
        self.process_batch_with_events(batch, &tx).await
    }

    /// Run every task of `batch` and return once all of them are terminal.
    /// Results are in completion order.
    #[instrument(skip(self, batch, events), fields(batch_index = batch.index, tasks = batch.len()))]
    pub async fn process_batch_with_events(
        &self,
        batch: &Batch,
        events: &mpsc::UnboundedSender<TaskEvent>,
    ) -> Vec<TaskResult> {
        {
            let mut stats = self.stats.lock().await;
            stats.start_time.get_or_insert_with(Utc::now);
        }

        let mut queue: VecDeque<AiTask> = batch.tasks.iter().cloned().collect();
        let mut running = JoinSet::new();
        let mut in_flight: HashMap<Id, AiTask> = HashMap::with_capacity(self.settings.max_concurrent);
        let mut results = Vec::with_capacity(batch.len());

        loop {
            while running.len() < self.settings.max_concurrent {
                let Some(task) = queue.pop_front() else { break };
                let handle = running.spawn(self.spawn_task(task.clone(), events.clone()));
                in_flight.insert(handle.id(), task);
            }

            let Some(joined) = running.join_next_with_id().await else { break };
            let Some(result) = settle(joined, &mut in_flight) else { continue };

            self.stats.lock().await.record(&result);
            let event = if result.succeeded() {
                TaskEvent::Completed {
                    result: result.clone(),
                }
            } else {
                TaskEvent::Failed {
                    error: result.error.clone().unwrap_or_default(),
                    result: result.clone(),
                }
            };
            // A dropped receiver only means nobody is watching.
            let _ = events.send(event);
            results.push(result);
        }

        self.stats.lock().await.end_time = Some(Utc::now());
        let completed = results.iter().filter(|r| r.succeeded()).count();
        info!(
            completed,
            failed = results.len() - completed,
            "batch processed"
        );
        results
    }

    fn spawn_task(
        &self,
        task: AiTask,
        events: mpsc::UnboundedSender<TaskEvent>,
    ) -> impl std::future::Future<Output = TaskResult> + Send + 'static {
        let runner = TaskRunner {
            engine: Arc::clone(&self.engine),
            settings: self.settings.clone(),
            writer: self.writer.clone(),
        };
        let active = Arc::clone(&self.active);
        async move {
            let _guard = ActiveGuard::enter(&active);
            let _ = events.send(TaskEvent::Started {
                task_id: task.id,
                source_file: task.source_file.clone(),
            });
            let fallback = task.clone();
            AssertUnwindSafe(runner.run(task))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| failed_result(&fallback, Vec::new(), "generation task panicked"))
        }
    }

    /// Human-readable summary of everything processed so far.
    pub async fn generate_report(&self) -> String {
        let stats = self.stats().await;
        let duration = match (stats.start_time, stats.end_time) {
            (Some(start), Some(end)) => format!("{:.1}s", (end - start).num_milliseconds() as f64 / 1000.0),
            _ => "n/a".to_string(),
        };
        [
            "AI generation report".to_string(),
            format!("Completed:          {}", stats.completed),
            format!("Failed:             {}", stats.failed),
            format!("Fallback successes: {}", stats.fallback_successes),
            format!("Tokens used:        {}", stats.total_tokens_used),
            format!("Total cost:         ${:.4}", stats.total_cost),
            format!("Duration:           {duration}"),
        ]
        .join("\n")
    }
}

struct TaskRunner {
    engine: Arc<dyn GenerationEngine>,
    settings: OrchestratorSettings,
    writer: TestWriter,
}

struct AttemptOutcome {
    record: AttemptRecord,
    test_file: Option<PathBuf>,
}

impl TaskRunner {
    async fn run(self, task: AiTask) -> TaskResult {
        let first = self.attempt(&task, &self.settings.model).await;
        if first.record.succeeded {
            return finished(&task, vec![first.record], first.test_file, false);
        }

        let retry_model = self.settings.retry_model().to_string();
        warn!(
            source = %task.source_file.display(),
            error = first.record.error.as_deref().unwrap_or_default(),
            retry_model = %retry_model,
            "first attempt failed, retrying"
        );
        let second = self.attempt(&task, &retry_model).await;
        let succeeded = second.record.succeeded;
        let attempts = vec![first.record, second.record];
        if succeeded {
            finished(&task, attempts, second.test_file, true)
        } else {
            let error = attempts
                .last()
                .and_then(|a| a.error.clone())
                .unwrap_or_else(|| "generation failed".to_string());
            failed_result(&task, attempts, &error)
        }
    }

    async fn attempt(&self, task: &AiTask, model: &str) -> AttemptOutcome {
        let started = Instant::now();
        let test_file = test_path_for(&task.source_file);
        let request = GenerationRequest {
            task_id: task.id,
            project_root: self.settings.project_root.clone(),
            source_file: task.source_file.clone(),
            test_file: test_file.clone(),
            model: model.to_string(),
            framework: self.settings.framework.clone(),
        };

        let outcome = match tokio::time::timeout(self.settings.timeout, self.engine.generate(request)).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::Timeout(self.settings.timeout.as_secs())),
        };
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let output = match outcome {
            Ok(output) => output,
            Err(e) => {
                debug!(source = %task.source_file.display(), model, error = %e, "attempt failed");
                return AttemptOutcome {
                    record: AttemptRecord {
                        model: model.to_string(),
                        succeeded: false,
                        cost: e.reported_cost().unwrap_or(0.0),
                        tokens: 0,
                        duration_ms,
                        error: Some(e.to_string()),
                    },
                    test_file: None,
                };
            }
        };

        let cost = output.cost_usd.unwrap_or(task.estimated_cost);
        let tokens = output.usage.map_or(task.estimated_tokens, |u| u.total());
        let written = match output.content.as_deref() {
            Some(content) => self.writer.write(&test_file, content).await.map(|_| Some(test_file.clone())),
            None => Ok(self
                .settings
                .project_root
                .join(&test_file)
                .is_file()
                .then(|| test_file.clone())),
        };

        match written {
            Ok(test_file) => AttemptOutcome {
                record: AttemptRecord {
                    model: model.to_string(),
                    succeeded: true,
                    cost,
                    tokens,
                    duration_ms,
                    error: None,
                },
                test_file,
            },
            Err(e) => AttemptOutcome {
                record: AttemptRecord {
                    model: model.to_string(),
                    succeeded: false,
                    cost,
                    tokens,
                    duration_ms,
                    error: Some(e.to_string()),
                },
                test_file: None,
            },
        }
    }
}

fn totals(attempts: &[AttemptRecord]) -> (f64, u64) {
    (
        attempts.iter().map(|a| a.cost).sum(),
        attempts.iter().map(|a| a.tokens).sum(),
    )
}

fn finished(
    task: &AiTask,
    attempts: Vec<AttemptRecord>,
    test_file: Option<PathBuf>,
    used_fallback: bool,
) -> TaskResult {
    let (total_cost, tokens_used) = totals(&attempts);
    TaskResult {
        task_id: task.id,
        source_file: task.source_file.clone(),
        status: TaskStatus::Completed,
        attempts,
        used_fallback,
        test_file,
        total_cost,
        tokens_used,
        error: None,
    }
}

/// Result of a joined task. A task that never returned (cancelled) is
/// reported as failed; `None` only for an id this batch did not spawn.
fn settle(joined: Result<(Id, TaskResult), JoinError>, in_flight: &mut HashMap<Id, AiTask>) -> Option<TaskResult> {
    match joined {
        Ok((id, result)) => {
            in_flight.remove(&id);
            Some(result)
        }
        Err(e) => {
            error!(error = %e, "generation task aborted");
            let task = in_flight.remove(&e.id())?;
            Some(failed_result(&task, Vec::new(), &format!("generation task aborted: {e}")))
        }
    }
}

fn failed_result(task: &AiTask, attempts: Vec<AttemptRecord>, error: &str) -> TaskResult {
    let (total_cost, tokens_used) = totals(&attempts);
    TaskResult {
        task_id: task.id,
        source_file: task.source_file.clone(),
        status: TaskStatus::Failed,
        used_fallback: attempts.len() > 1,
        attempts,
        test_file: None,
        total_cost,
        tokens_used,
        error: Some(error.to_string()),
    }
}
