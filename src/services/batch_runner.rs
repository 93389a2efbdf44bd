//! Drives a batched generation run: one batch at a time, checkpointing
//! after each.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{info, instrument, warn};

use crate::domain::errors::{RunnerError, SchedulerError};
use crate::domain::models::{BatchConfig, BatchProgress, BatchResult, Config, GapReport};
use crate::domain::ports::GenerationEngine;
use crate::services::batch_scheduler::BatchScheduler;
use crate::services::cost_estimator::CostEstimator;
use crate::services::execution_orchestrator::{ExecutionOrchestrator, OrchestratorSettings, TaskEvent};
use crate::services::history_manager::HistoryManager;

/// How to treat existing batch state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunMode {
    /// Start a new run; existing state is a conflict.
    #[default]
    Fresh,
    /// Continue the existing run.
    Resume,
    /// Discard existing state, then start a new run.
    Clean,
}

impl RunMode {
    pub const fn from_flags(resume: bool, clean: bool) -> Self {
        if clean {
            Self::Clean
        } else if resume {
            Self::Resume
        } else {
            Self::Fresh
        }
    }
}

/// A run whose state is loaded and whose engine has been checked.
pub struct PreparedRun {
    pub progress: BatchProgress,
    pub report: GapReport,
    orchestrator: ExecutionOrchestrator,
}

impl PreparedRun {
    pub fn orchestrator(&self) -> &ExecutionOrchestrator {
        &self.orchestrator
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub project_path: PathBuf,
    pub batches: Vec<BatchResult>,
    pub progress: BatchProgress,
}

impl RunSummary {
    pub fn failed_tasks(&self) -> usize {
        self.batches.iter().map(|b| b.stats.failed).sum()
    }

    pub fn completed_tasks(&self) -> usize {
        self.batches.iter().map(|b| b.stats.completed).sum()
    }

    pub fn cost(&self) -> f64 {
        self.batches.iter().map(|b| b.stats.total_cost).sum()
    }

    /// 0 when every batch ran and every task succeeded, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        i32::from(!self.progress.is_complete() || self.failed_tasks() > 0)
    }
}

pub struct BatchRunner {
    root: PathBuf,
    config: Config,
    scheduler: BatchScheduler,
    estimator: CostEstimator,
    history: HistoryManager,
    engine: Arc<dyn GenerationEngine>,
}

impl BatchRunner {
    pub fn new(
        root: impl Into<PathBuf>,
        config: Config,
        history: HistoryManager,
        engine: Arc<dyn GenerationEngine>,
    ) -> Self {
        Self {
            root: root.into(),
            scheduler: BatchScheduler::from_config(&config),
            estimator: CostEstimator::from_config(&config),
            config,
            history,
            engine,
        }
    }

    pub fn scheduler(&self) -> &BatchScheduler {
        &self.scheduler
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Load or create batch state and check the engine. The engine is
    /// checked before a new run is persisted, so a missing engine leaves
    /// no state behind.
    #[instrument(skip(self, report), fields(root = %self.root.display()))]
    pub async fn prepare(
        &self,
        report: Option<GapReport>,
        mode: RunMode,
        batch_config: BatchConfig,
    ) -> Result<PreparedRun, RunnerError> {
        if mode == RunMode::Clean {
            self.scheduler.cleanup_batch_state(&self.root)?;
        }

        if mode == RunMode::Resume {
            let progress = self.scheduler.require_batch_state(&self.root)?;
            let report = match self.scheduler.load_pinned_report(&self.root)? {
                Some(report) => report,
                None => report.ok_or(SchedulerError::NoState)?,
            };
            let orchestrator = self.orchestrator_for(&progress.config).await?;
            info!(
                completed = progress.completed_batches,
                total = progress.total_batches,
                "resuming batch run"
            );
            return Ok(PreparedRun {
                progress,
                report,
                orchestrator,
            });
        }

        let report = report.ok_or(RunnerError::MissingReport)?;
        let benefit = self
            .scheduler
            .validate_batching_benefit(&report, batch_config.batch_size);
        if !benefit.beneficial {
            info!(reason = %benefit.reason, "batching offers little benefit");
        }
        if self.scheduler.load_batch_state(&self.root)?.is_some() {
            return Err(SchedulerError::StateExists(self.scheduler.progress_path(&self.root)).into());
        }
        let orchestrator = self.orchestrator_for(&batch_config).await?;
        let progress = self
            .scheduler
            .initialize_batch_state(&self.root, &report, &batch_config)?;
        Ok(PreparedRun {
            progress,
            report,
            orchestrator,
        })
    }

    async fn orchestrator_for(&self, config: &BatchConfig) -> Result<ExecutionOrchestrator, RunnerError> {
        let settings = OrchestratorSettings::from_batch_config(config, self.root.clone())
            .with_framework(self.config.ai.framework.clone());
        Ok(ExecutionOrchestrator::initialize(Arc::clone(&self.engine), settings).await?)
    }

    /// Run the next batch, if any. A batch over the cost limit is an error
    /// and nothing of it runs.
    pub async fn run_next_batch(
        &self,
        run: &mut PreparedRun,
        events: &mpsc::UnboundedSender<TaskEvent>,
    ) -> Result<Option<BatchResult>, RunnerError> {
        let Some(batch) = self.scheduler.get_next_batch(&self.root, &run.report)? else {
            return Ok(None);
        };
        BatchScheduler::ensure_within_cost_limit(&batch, &run.progress.config)?;

        info!(
            batch = batch.index + 1,
            total = run.progress.total_batches,
            tasks = batch.len(),
            estimated_cost = batch.estimated_cost,
            "starting batch"
        );
        let started = Instant::now();
        let results = run.orchestrator.process_batch_with_events(&batch, events).await;
        let result = BatchResult::from_task_results(batch.index, results, started.elapsed());

        run.progress = self.scheduler.update_batch_state(&self.root, &result)?;

        self.estimator.track_usage(
            &self.root,
            &run.progress.config.model,
            result.stats.total_tokens,
            result.stats.total_cost,
        );
        self.history.record_best_effort(
            "batch",
            format!(
                "Batch {}/{}: {} completed, {} failed",
                batch.index + 1,
                run.progress.total_batches,
                result.stats.completed,
                result.stats.failed
            ),
            json!({ "batch_index": batch.index, "stats": result.stats }),
        );
        if result.stats.failed > 0 {
            warn!(
                batch = batch.index + 1,
                failed = result.stats.failed,
                "batch finished with failed tasks"
            );
        }
        Ok(Some(result))
    }

    /// Run up to `max_batches` batches (all remaining when `None`).
    pub async fn run(
        &self,
        report: Option<GapReport>,
        mode: RunMode,
        batch_config: BatchConfig,
        max_batches: Option<usize>,
        events: &mpsc::UnboundedSender<TaskEvent>,
    ) -> Result<RunSummary, RunnerError> {
        let mut run = self.prepare(report, mode, batch_config).await?;
        let mut batches = Vec::new();
        while max_batches.map_or(true, |max| batches.len() < max) {
            match self.run_next_batch(&mut run, events).await? {
                Some(result) => batches.push(result),
                None => break,
            }
        }
        Ok(RunSummary {
            project_path: self.root.clone(),
            batches,
            progress: run.progress,
        })
    }
}
