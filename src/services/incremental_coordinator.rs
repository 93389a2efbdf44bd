//! Incremental test generation scoped to changed files.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use tracing::{debug, info, instrument, warn};

use crate::domain::errors::IncrementalError;
use crate::domain::models::test_layout::{find_existing_test, is_test_file, test_path_for};
use crate::domain::models::{
    AiTask, Batch, BatchConfig, BatchResult, ChangeKind, Config, FileChange, IncrementalOptions,
    IncrementalRecommendation, IncrementalUpdate, TaskStatus,
};
use crate::domain::ports::{GenerationEngine, StructuralAnalyzer};
use crate::infrastructure::scanner::ProjectScanner;
use crate::services::change_detector::ChangeDetector;
use crate::services::cost_estimator::CostEstimator;
use crate::services::execution_orchestrator::{ExecutionOrchestrator, OrchestratorSettings};
use crate::services::gap_analyzer::GapAnalyzer;
use crate::services::history_manager::HistoryManager;
use crate::services::task_preparer::TaskPreparer;

const NOT_A_REPOSITORY: &str = "Not a git repository; run a full analysis";

/// Changed files sorted into what each one means for its tests.
#[derive(Debug, Default)]
struct Classification {
    changed_files: Vec<PathBuf>,
    new_tests: Vec<PathBuf>,
    updated_tests: Vec<PathBuf>,
    deleted_tests: Vec<PathBuf>,
    skipped_files: Vec<PathBuf>,
    to_generate: Vec<PathBuf>,
}

pub struct IncrementalCoordinator {
    root: PathBuf,
    config: Config,
    detector: ChangeDetector,
    scanner: ProjectScanner,
    analyzer: Arc<dyn StructuralAnalyzer>,
    engine: Arc<dyn GenerationEngine>,
    history: HistoryManager,
}

impl IncrementalCoordinator {
    pub fn new(
        root: impl Into<PathBuf>,
        config: Config,
        detector: ChangeDetector,
        analyzer: Arc<dyn StructuralAnalyzer>,
        engine: Arc<dyn GenerationEngine>,
        history: HistoryManager,
    ) -> Self {
        Self {
            root: root.into(),
            scanner: ProjectScanner::new(config.analysis.extensions.clone()),
            config,
            detector,
            analyzer,
            engine,
            history,
        }
    }

    /// Whether an incremental run is appropriate, or a full one is needed.
    pub async fn should_use_incremental(&self) -> Result<IncrementalRecommendation, IncrementalError> {
        let full = |reason: &str, changed_files: usize, tracked_files: usize| IncrementalRecommendation {
            use_incremental: false,
            reason: reason.to_string(),
            changed_files,
            tracked_files,
        };

        if !self.detector.is_git_repository().await {
            return Ok(full(NOT_A_REPOSITORY, 0, 0));
        }
        let Some(state) = self.detector.load_state() else {
            return Ok(full("No previous incremental run recorded; run a full analysis first", 0, 0));
        };

        let changed = self
            .without_state_dir(self.detector.detect_changes(Some(&state), false).await?)
            .len();
        let tracked = self.detector.tracked_file_count().await?;
        let ratio = changed as f64 / tracked.max(1) as f64;
        let max_ratio = self.config.incremental.max_change_ratio;
        if ratio > max_ratio {
            return Ok(full(
                &format!(
                    "{changed} of {tracked} files changed ({:.0}%), above the {:.0}% limit; run a full analysis",
                    ratio * 100.0,
                    max_ratio * 100.0
                ),
                changed,
                tracked,
            ));
        }
        Ok(IncrementalRecommendation {
            use_incremental: true,
            reason: format!("{changed} of {tracked} files changed"),
            changed_files: changed,
            tracked_files: tracked,
        })
    }

    /// Our own state files are never source changes.
    fn without_state_dir(&self, mut changes: Vec<FileChange>) -> Vec<FileChange> {
        let state_dir = Path::new(&self.config.batching.state_dir);
        changes.retain(|c| !c.path.starts_with(state_dir));
        changes
    }

    fn classify(&self, changes: Vec<FileChange>) -> Classification {
        let mut c = Classification::default();
        for change in changes {
            let path = change.path;
            c.changed_files.push(path.clone());
            if is_test_file(&path) || !self.scanner.is_source_file(&path) {
                c.skipped_files.push(path);
                continue;
            }
            let existing = find_existing_test(&self.root, &path);
            match (change.kind, existing) {
                (ChangeKind::Added, _) | (ChangeKind::Modified, None) => {
                    c.new_tests.push(test_path_for(&path));
                    c.to_generate.push(path);
                }
                (ChangeKind::Modified, Some(test)) => {
                    c.updated_tests.push(test);
                    c.to_generate.push(path);
                }
                (ChangeKind::Deleted, Some(test)) => c.deleted_tests.push(test),
                (ChangeKind::Deleted, None) => {}
            }
        }
        c
    }

    /// Regenerate tests for the files changed since the last recorded run.
    ///
    /// A dry run reports what would happen without touching the filesystem
    /// or the engine.
    #[instrument(skip(self), fields(root = %self.root.display()))]
    pub async fn generate_incremental(
        &self,
        options: &IncrementalOptions,
    ) -> Result<IncrementalUpdate, IncrementalError> {
        let clock = Instant::now();
        if !self.detector.is_git_repository().await {
            warn!("not a git repository, incremental run skipped");
            return Ok(IncrementalUpdate::full_run_required(NOT_A_REPOSITORY));
        }
        let state = self.detector.load_state();
        let changes = self
            .detector
            .detect_changes(state.as_ref(), options.force_regenerate)
            .await?;
        let c = self.classify(self.without_state_dir(changes));
        debug!(
            changed = c.changed_files.len(),
            to_generate = c.to_generate.len(),
            "classified changes"
        );

        let analysis = self.analyzer.analyze_files(&self.root, &c.to_generate)?;
        let report = GapAnalyzer::from_config(&self.config)?.analyze(&analysis);
        let mut tasks = TaskPreparer::from_config(&self.config).prepare_tasks(&report).tasks;

        // Sources still owed a test; they stay out of the manifest so the
        // next run offers them again.
        let mut unfinished: HashSet<PathBuf> = HashSet::new();
        let cost_limit = options.cost_limit.or(self.config.ai.cost_limit);
        if let Some(limit) = cost_limit {
            let optimization = CostEstimator::from_config(&self.config).optimize_for_budget(&report, limit);
            let included: HashSet<&Path> = optimization.included().map(|a| a.source_file.as_path()).collect();
            let (kept, excluded): (Vec<AiTask>, Vec<AiTask>) = tasks
                .into_iter()
                .partition(|t| included.contains(t.source_file.as_path()));
            if !options.skip_ai {
                unfinished.extend(excluded.into_iter().map(|t| t.source_file));
            }
            tasks = kept;
        }
        let cost_estimate: f64 = tasks.iter().map(|t| t.estimated_cost).sum();

        let mut update = IncrementalUpdate {
            changed_files: c.changed_files,
            new_tests: c.new_tests,
            updated_tests: c.updated_tests,
            deleted_tests: c.deleted_tests,
            skipped_files: c.skipped_files,
            total_time_ms: 0,
            cost_estimate,
            generation: None,
            dry_run: options.dry_run,
            full_run_reason: None,
        };

        if options.dry_run {
            update.total_time_ms = elapsed_ms(clock.elapsed());
            info!(changed = update.changed_files.len(), cost_estimate, "dry run complete");
            return Ok(update);
        }

        for test in &update.deleted_tests {
            let target = self.root.join(test);
            match std::fs::remove_file(&target) {
                Ok(()) => info!(path = %test.display(), "removed orphaned test"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(source) => return Err(IncrementalError::RemoveTest { path: target, source }),
            }
        }

        let mut generated = Vec::new();
        if !options.skip_ai && !tasks.is_empty() {
            let result = self.run_generation(tasks, options.max_concurrency).await?;
            for task in &result.task_results {
                if task.status == TaskStatus::Completed {
                    generated.extend(task.test_file.clone());
                } else {
                    unfinished.insert(task.source_file.clone());
                }
            }
            update.generation = Some(result.stats);
        }

        let mut handled: Vec<PathBuf> = update
            .changed_files
            .iter()
            .filter(|p| !unfinished.contains(*p))
            .cloned()
            .collect();
        handled.extend(generated);
        handled.extend(update.deleted_tests.iter().cloned());
        if !unfinished.is_empty() {
            info!(pending = unfinished.len(), "files left for the next incremental run");
        }

        let next = self.detector.next_state(state, &handled).await?;
        self.detector.save_state(&next)?;

        update.total_time_ms = elapsed_ms(clock.elapsed());
        self.history.record_best_effort(
            "incremental",
            format!(
                "{} changed, {} new, {} updated, {} deleted",
                update.changed_files.len(),
                update.new_tests.len(),
                update.updated_tests.len(),
                update.deleted_tests.len()
            ),
            json!({
                "cost_estimate": update.cost_estimate,
                "skip_ai": options.skip_ai,
                "generation": update.generation,
            }),
        );
        info!(
            changed = update.changed_files.len(),
            time_ms = update.total_time_ms,
            "incremental run complete"
        );
        Ok(update)
    }

    async fn run_generation(
        &self,
        tasks: Vec<AiTask>,
        max_concurrency: Option<usize>,
    ) -> Result<BatchResult, IncrementalError> {
        let batch_config = BatchConfig::from_config(&self.config);
        let mut settings = OrchestratorSettings::from_batch_config(&batch_config, self.root.clone())
            .with_framework(self.config.ai.framework.clone());
        if let Some(max) = max_concurrency {
            settings.max_concurrent = max;
        }

        let orchestrator = ExecutionOrchestrator::initialize(Arc::clone(&self.engine), settings).await?;
        let started = Instant::now();
        let batch = Batch::new(0, tasks);
        let results = orchestrator.process_batch(&batch).await;
        let result = BatchResult::from_task_results(0, results, started.elapsed());

        CostEstimator::from_config(&self.config).track_usage(
            &self.root,
            &batch_config.model,
            result.stats.total_tokens,
            result.stats.total_cost,
        );
        Ok(result)
    }
}

fn elapsed_ms(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}
