//! Durable batch scheduling.
//!
//! One scheduling run per project path. The progress file is the source of
//! truth and doubles as the run lock: it is created exclusively and only ever
//! replaced atomically. Batches themselves are never stored; they are
//! recomputed from the gap report pinned next to the progress file, which is
//! why task ordering must stay deterministic.

use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use crate::domain::errors::{SchedulerError, SchedulerResult, StoreError};
use crate::domain::models::{
    AiTask, Batch, BatchConfig, BatchPhase, BatchProgress, BatchResult, BatchingBenefit, Config,
    GapReport, BATCH_STATE_SCHEMA_VERSION, MAX_BATCH_SIZE,
};
use crate::infrastructure::store::{
    create_json_exclusive, read_json, remove_if_exists, write_json_atomic, StateLayout,
};
use crate::services::task_preparer::TaskPreparer;

/// Split tasks into consecutive batches of `batch_size`. The last batch
/// holds the remainder.
pub fn partition(tasks: Vec<AiTask>, batch_size: usize) -> Vec<Batch> {
    if batch_size == 0 {
        return Vec::new();
    }
    tasks
        .chunks(batch_size)
        .enumerate()
        .map(|(index, chunk)| Batch::new(index, chunk.to_vec()))
        .collect()
}

#[derive(Debug, Clone)]
pub struct BatchScheduler {
    state_dir: String,
    benefit_ratio: f64,
}

impl BatchScheduler {
    pub fn new(state_dir: impl Into<String>, benefit_ratio: f64) -> Self {
        Self {
            state_dir: state_dir.into(),
            benefit_ratio,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.batching.state_dir.clone(), config.batching.benefit_ratio)
    }

    fn layout(&self, project: &Path) -> StateLayout {
        StateLayout::for_project(project, &self.state_dir)
    }

    pub fn progress_path(&self, project: &Path) -> PathBuf {
        self.layout(project).batch_progress(project)
    }

    fn report_path(&self, project: &Path) -> PathBuf {
        self.layout(project).batch_report(project)
    }

    /// Batching pays off only when there are at least `batch_size * ratio` gaps.
    pub fn validate_batching_benefit(&self, report: &GapReport, batch_size: usize) -> BatchingBenefit {
        let gaps = report.gaps.len();
        if batch_size == 0 || batch_size > MAX_BATCH_SIZE {
            return BatchingBenefit {
                beneficial: false,
                reason: format!("Invalid batch size {batch_size}"),
            };
        }
        let threshold = batch_size as f64 * self.benefit_ratio;
        if gaps as f64 >= threshold {
            BatchingBenefit {
                beneficial: true,
                reason: format!(
                    "{gaps} gaps across {} batches of {batch_size}",
                    gaps.div_ceil(batch_size)
                ),
            }
        } else {
            BatchingBenefit {
                beneficial: false,
                reason: format!(
                    "Only {gaps} gaps; batching needs at least {threshold:.0} for batch size {batch_size}"
                ),
            }
        }
    }

    /// Start a new scheduling run. Fails if one already exists for the project.
    #[instrument(skip(self, report, config), fields(project = %project.display(), batch_size = config.batch_size))]
    pub fn initialize_batch_state(
        &self,
        project: &Path,
        report: &GapReport,
        config: &BatchConfig,
    ) -> SchedulerResult<BatchProgress> {
        if config.batch_size == 0 || config.batch_size > MAX_BATCH_SIZE {
            return Err(SchedulerError::InvalidBatchSize(config.batch_size));
        }

        let progress_path = self.progress_path(project);

        let tasks = TaskPreparer::new(config.min_complexity).prepare_tasks(report);
        let now = Utc::now();
        let progress = BatchProgress {
            schema_version: BATCH_STATE_SCHEMA_VERSION,
            project_path: project.to_path_buf(),
            total_batches: tasks.len().div_ceil(config.batch_size),
            completed_batches: 0,
            next_batch_index: 0,
            actual_cost_so_far: 0.0,
            total_tasks: tasks.len(),
            config: config.clone(),
            created_at: now,
            updated_at: now,
        };

        // The progress file is the lock: only its creator may pin the report.
        match create_json_exclusive(&progress_path, &progress) {
            Ok(()) => {}
            Err(StoreError::Io { source, .. }) if source.kind() == io::ErrorKind::AlreadyExists => {
                return Err(SchedulerError::StateExists(progress_path));
            }
            Err(e) => return Err(e.into()),
        }
        if let Err(e) = write_json_atomic(&self.report_path(project), report) {
            if let Err(cleanup) = remove_if_exists(&progress_path) {
                warn!(error = %cleanup, "failed to release batch state after report write failure");
            }
            return Err(e.into());
        }

        info!(
            total_batches = progress.total_batches,
            total_tasks = progress.total_tasks,
            "batch state initialized"
        );
        Ok(progress)
    }

    /// Current progress, if a run exists. A file that does not parse is
    /// reported as corrupted rather than replaced.
    pub fn load_batch_state(&self, project: &Path) -> SchedulerResult<Option<BatchProgress>> {
        let path = self.progress_path(project);
        let progress: Option<BatchProgress> = match read_json(&path) {
            Ok(progress) => progress,
            Err(StoreError::Parse { path, reason }) => {
                return Err(SchedulerError::CorruptState { path, reason });
            }
            Err(e) => return Err(e.into()),
        };
        progress.map(|p| migrate(p, &path)).transpose()
    }

    /// Progress for a resumed run; absence is an error.
    pub fn require_batch_state(&self, project: &Path) -> SchedulerResult<BatchProgress> {
        self.load_batch_state(project)?.ok_or(SchedulerError::NoState)
    }

    /// The gap report pinned when the run was initialized.
    pub fn load_pinned_report(&self, project: &Path) -> SchedulerResult<Option<GapReport>> {
        match read_json(&self.report_path(project)) {
            Ok(report) => Ok(report),
            Err(StoreError::Parse { path, reason }) => Err(SchedulerError::CorruptState { path, reason }),
            Err(e) => Err(e.into()),
        }
    }

    /// The next batch to run, or `None` once every batch is completed.
    pub fn get_next_batch(&self, project: &Path, report: &GapReport) -> SchedulerResult<Option<Batch>> {
        let progress = self.require_batch_state(project)?;
        if progress.next_batch_index >= progress.total_batches {
            return Ok(None);
        }

        let tasks = TaskPreparer::new(progress.config.min_complexity).prepare_tasks(report);
        let batch_count = tasks.len().div_ceil(progress.config.batch_size.max(1));
        let tasks_differ = progress.total_tasks > 0 && tasks.len() != progress.total_tasks;
        if tasks_differ || batch_count != progress.total_batches {
            return Err(SchedulerError::ReportMismatch {
                expected: progress.total_tasks,
                actual: tasks.len(),
            });
        }

        let batch = partition(tasks.tasks, progress.config.batch_size)
            .into_iter()
            .nth(progress.next_batch_index);
        debug!(
            index = progress.next_batch_index,
            size = batch.as_ref().map_or(0, Batch::len),
            "next batch"
        );
        Ok(batch)
    }

    /// Pre-flight check; a batch over the limit is never partially run.
    pub fn ensure_within_cost_limit(batch: &Batch, config: &BatchConfig) -> SchedulerResult<()> {
        match config.cost_limit {
            Some(limit) if batch.estimated_cost > limit => Err(SchedulerError::CostLimitExceeded {
                batch_index: batch.index,
                estimated: batch.estimated_cost,
                limit,
            }),
            _ => Ok(()),
        }
    }

    /// Record a finished batch. Each batch index is applied exactly once and
    /// in order.
    #[instrument(skip(self, result), fields(project = %project.display(), batch_index = result.batch_index))]
    pub fn update_batch_state(&self, project: &Path, result: &BatchResult) -> SchedulerResult<BatchProgress> {
        let mut progress = self.require_batch_state(project)?;
        if progress.is_complete() {
            return Err(SchedulerError::AlreadyComplete(progress.total_batches));
        }
        if result.batch_index != progress.next_batch_index {
            return Err(SchedulerError::OutOfOrder {
                expected: progress.next_batch_index,
                got: result.batch_index,
            });
        }

        progress.completed_batches += 1;
        progress.next_batch_index = progress.completed_batches;
        progress.actual_cost_so_far += result.stats.total_cost;
        progress.updated_at = Utc::now();
        write_json_atomic(&self.progress_path(project), &progress)?;

        info!(
            completed = progress.completed_batches,
            total = progress.total_batches,
            cost_so_far = progress.actual_cost_so_far,
            "batch state updated"
        );
        Ok(progress)
    }

    /// Remove the run's state. Returns whether a run existed.
    pub fn cleanup_batch_state(&self, project: &Path) -> SchedulerResult<bool> {
        let existed = remove_if_exists(&self.progress_path(project))?;
        remove_if_exists(&self.report_path(project))?;
        if existed {
            info!(project = %project.display(), "batch state removed");
        }
        Ok(existed)
    }

    pub fn phase(&self, project: &Path) -> SchedulerResult<BatchPhase> {
        Ok(self
            .load_batch_state(project)?
            .map_or(BatchPhase::Uninitialized, |p| p.phase()))
    }

    pub fn get_progress_report(&self, project: &Path) -> SchedulerResult<Option<String>> {
        Ok(self.load_batch_state(project)?.map(|p| render_progress(&p)))
    }
}

fn migrate(mut progress: BatchProgress, path: &Path) -> SchedulerResult<BatchProgress> {
    if progress.schema_version > BATCH_STATE_SCHEMA_VERSION {
        return Err(SchedulerError::UnsupportedSchema {
            found: progress.schema_version,
            supported: BATCH_STATE_SCHEMA_VERSION,
        });
    }
    if progress.schema_version < BATCH_STATE_SCHEMA_VERSION {
        warn!(
            path = %path.display(),
            from = progress.schema_version,
            to = BATCH_STATE_SCHEMA_VERSION,
            "upgrading batch state"
        );
        progress.schema_version = BATCH_STATE_SCHEMA_VERSION;
        progress.next_batch_index = progress.completed_batches;
    }
    Ok(progress)
}

fn render_progress(progress: &BatchProgress) -> String {
    let percent = if progress.total_batches == 0 {
        100.0
    } else {
        progress.completed_batches as f64 / progress.total_batches as f64 * 100.0
    };
    let mut lines = vec![
        format!(
            "Batch progress: {}/{} batches completed ({percent:.1}%)",
            progress.completed_batches, progress.total_batches
        ),
        format!("Tasks: {} in batches of {}", progress.total_tasks, progress.config.batch_size),
        format!("Cost so far: ${:.4}", progress.actual_cost_so_far),
    ];
    if progress.is_complete() {
        lines.push("All batches completed".to_string());
    } else {
        lines.push(format!(
            "Next batch: {} ({} remaining)",
            progress.next_batch_index + 1,
            progress.remaining_batches()
        ));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{
        Assessment, BatchStats, Gap, GapSummary, GapType, ReportTiming,
    };
    use std::time::Duration;
    use tempfile::TempDir;

    fn report(n: usize) -> GapReport {
        let gaps: Vec<_> = (0..n)
            .map(|i| Gap {
                source_file: PathBuf::from(format!("src/file_{i:03}.py")),
                complexity_score: 5.0,
                current_coverage: 0.0,
                gap_type: GapType::Untested,
                estimated_tokens: 1000,
                estimated_cost: 0.10,
            })
            .collect();
        GapReport {
            summary: GapSummary {
                total_files: n,
                files_needing_logical_tests: n,
                total_gaps: n,
                overall_assessment: Assessment::Poor,
            },
            estimated_cost: 0.10 * n as f64,
            gaps,
            timing: ReportTiming {
                started_at: Utc::now(),
                duration_ms: 0,
            },
            model: "sonnet".to_string(),
        }
    }

    fn config(batch_size: usize) -> BatchConfig {
        BatchConfig {
            batch_size,
            min_complexity: 0.0,
            ..BatchConfig::default()
        }
    }

    fn result(index: usize, cost: f64) -> BatchResult {
        let mut r = BatchResult::from_task_results(index, Vec::new(), Duration::from_millis(5));
        r.stats = BatchStats {
            total_cost: cost,
            ..r.stats
        };
        r
    }

    fn scheduler() -> BatchScheduler {
        BatchScheduler::new(".testweaver", 1.5)
    }

    #[test]
    fn test_partition_remainder() {
        let tasks = TaskPreparer::new(0.0).prepare_tasks(&report(25)).tasks;
        let sizes: Vec<_> = partition(tasks, 10).iter().map(Batch::len).collect();
        assert_eq!(sizes, vec![10, 10, 5]);
        assert!(partition(Vec::new(), 10).is_empty());
    }

    #[test]
    fn test_batching_benefit() {
        let s = scheduler();
        assert!(s.validate_batching_benefit(&report(15), 10).beneficial);
        let not = s.validate_batching_benefit(&report(14), 10);
        assert!(!not.beneficial);
        assert!(not.reason.contains("14"));
        assert!(!s.validate_batching_benefit(&report(50), 0).beneficial);
    }

    #[test]
    fn test_initialize_rejects_bad_batch_size() {
        let dir = TempDir::new().unwrap();
        for size in [0, MAX_BATCH_SIZE + 1] {
            let err = scheduler()
                .initialize_batch_state(dir.path(), &report(5), &config(size))
                .unwrap_err();
            assert!(matches!(err, SchedulerError::InvalidBatchSize(_)));
        }
        assert_eq!(scheduler().phase(dir.path()).unwrap(), BatchPhase::Uninitialized);
    }

    #[test]
    fn test_initialize_twice_conflicts() {
        let dir = TempDir::new().unwrap();
        let s = scheduler();
        s.initialize_batch_state(dir.path(), &report(5), &config(2)).unwrap();
        let err = s
            .initialize_batch_state(dir.path(), &report(5), &config(2))
            .unwrap_err();
        assert!(matches!(err, SchedulerError::StateExists(_)));
        assert!(err.to_string().contains("--resume"));
    }

    #[test]
    fn test_losing_initialization_keeps_the_pinned_report() {
        let dir = TempDir::new().unwrap();
        let s = scheduler();
        s.initialize_batch_state(dir.path(), &report(5), &config(2)).unwrap();

        let err = s
            .initialize_batch_state(dir.path(), &report(9), &config(2))
            .unwrap_err();
        assert!(matches!(err, SchedulerError::StateExists(_)));

        let pinned = s.load_pinned_report(dir.path()).unwrap().unwrap();
        assert_eq!(pinned.gaps.len(), 5);
        assert_eq!(s.require_batch_state(dir.path()).unwrap().total_tasks, 5);
    }

    #[test]
    fn test_full_lifecycle() {
        let dir = TempDir::new().unwrap();
        let s = scheduler();
        let r = report(5);

        let progress = s.initialize_batch_state(dir.path(), &r, &config(2)).unwrap();
        assert_eq!(progress.total_batches, 3);
        assert_eq!(s.phase(dir.path()).unwrap(), BatchPhase::Initialized);

        let first = s.get_next_batch(dir.path(), &r).unwrap().unwrap();
        assert_eq!(first.index, 0);
        s.update_batch_state(dir.path(), &result(0, 0.2)).unwrap();
        assert_eq!(s.phase(dir.path()).unwrap(), BatchPhase::InProgress);

        // replaying the same batch is rejected
        let err = s.update_batch_state(dir.path(), &result(0, 0.2)).unwrap_err();
        assert!(matches!(err, SchedulerError::OutOfOrder { expected: 1, got: 0 }));

        s.update_batch_state(dir.path(), &result(1, 0.2)).unwrap();
        let last = s.get_next_batch(dir.path(), &r).unwrap().unwrap();
        assert_eq!(last.len(), 1);
        let done = s.update_batch_state(dir.path(), &result(2, 0.1)).unwrap();
        assert!((done.actual_cost_so_far - 0.5).abs() < 1e-9);

        assert_eq!(s.phase(dir.path()).unwrap(), BatchPhase::Completed);
        assert!(s.get_next_batch(dir.path(), &r).unwrap().is_none());
        assert!(matches!(
            s.update_batch_state(dir.path(), &result(3, 0.0)),
            Err(SchedulerError::AlreadyComplete(3))
        ));

        let text = s.get_progress_report(dir.path()).unwrap().unwrap();
        assert!(text.contains("3/3"));

        assert!(s.cleanup_batch_state(dir.path()).unwrap());
        assert!(!s.cleanup_batch_state(dir.path()).unwrap());
        assert!(s.get_progress_report(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_report_mismatch_rejected() {
        let dir = TempDir::new().unwrap();
        let s = scheduler();
        s.initialize_batch_state(dir.path(), &report(5), &config(2)).unwrap();
        let err = s.get_next_batch(dir.path(), &report(9)).unwrap_err();
        assert!(matches!(err, SchedulerError::ReportMismatch { expected: 5, actual: 9 }));
    }

    #[test]
    fn test_pinned_report_roundtrip() {
        let dir = TempDir::new().unwrap();
        let s = scheduler();
        s.initialize_batch_state(dir.path(), &report(4), &config(2)).unwrap();
        let pinned = s.load_pinned_report(dir.path()).unwrap().unwrap();
        assert_eq!(pinned.gaps.len(), 4);
    }

    #[test]
    fn test_corrupt_state_is_reported() {
        let dir = TempDir::new().unwrap();
        let s = scheduler();
        let path = s.progress_path(dir.path());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{ not json").unwrap();

        let err = s.load_batch_state(dir.path()).unwrap_err();
        assert!(matches!(err, SchedulerError::CorruptState { .. }));
        // the corrupted file is left in place
        assert!(path.exists());
    }

    #[test]
    fn test_legacy_state_is_migrated_and_newer_rejected() {
        let dir = TempDir::new().unwrap();
        let s = scheduler();
        let path = s.progress_path(dir.path());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();

        let legacy = serde_json::json!({
            "total_batches": 3,
            "completed_batches": 1,
            "next_batch_index": 1,
            "actual_cost_so_far": 0.4,
            "config": config(10),
        });
        std::fs::write(&path, legacy.to_string()).unwrap();
        let progress = s.require_batch_state(dir.path()).unwrap();
        assert_eq!(progress.schema_version, BATCH_STATE_SCHEMA_VERSION);
        assert_eq!(progress.completed_batches, 1);

        let mut future = legacy;
        future["schema_version"] = serde_json::json!(BATCH_STATE_SCHEMA_VERSION + 1);
        std::fs::write(&path, future.to_string()).unwrap();
        assert!(matches!(
            s.load_batch_state(dir.path()),
            Err(SchedulerError::UnsupportedSchema { .. })
        ));
    }

    #[test]
    fn test_cost_limit_preflight() {
        let tasks = TaskPreparer::new(0.0).prepare_tasks(&report(3)).tasks;
        let batch = Batch::new(0, tasks);
        let limited = BatchConfig {
            cost_limit: Some(0.25),
            ..config(3)
        };
        assert!(matches!(
            BatchScheduler::ensure_within_cost_limit(&batch, &limited),
            Err(SchedulerError::CostLimitExceeded { batch_index: 0, .. })
        ));
        assert!(BatchScheduler::ensure_within_cost_limit(&batch, &config(3)).is_ok());
    }
}
