//! Turns gaps into AI generation tasks.

use std::fmt::Write as _;
use std::io;
use std::path::Path;

use tracing::debug;

use crate::domain::errors::StoreError;
use crate::domain::models::{AiTask, Config, GapReport, TaskBatch};
use crate::infrastructure::store::{read_json, write_json_atomic};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TaskPreparer {
    min_complexity: f64,
    max_tasks: Option<usize>,
}

impl TaskPreparer {
    pub const fn new(min_complexity: f64) -> Self {
        Self {
            min_complexity,
            max_tasks: None,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.analysis.min_complexity_for_ai)
    }

    #[must_use]
    pub const fn with_max_tasks(mut self, max_tasks: Option<usize>) -> Self {
        self.max_tasks = max_tasks;
        self
    }

    /// Pending tasks for every gap at or above the minimum complexity, in
    /// report order.
    pub fn prepare_tasks(&self, report: &GapReport) -> TaskBatch {
        let eligible = report
            .gaps
            .iter()
            .filter(|g| g.complexity_score >= self.min_complexity)
            .map(AiTask::from_gap);
        let tasks: Vec<_> = match self.max_tasks {
            Some(max) => eligible.take(max).collect(),
            None => eligible.collect(),
        };
        debug!(
            gaps = report.gaps.len(),
            tasks = tasks.len(),
            min_complexity = self.min_complexity,
            "prepared tasks"
        );
        TaskBatch::new(tasks)
    }

    pub fn generate_summary(batch: &TaskBatch) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "AI generation tasks: {}", batch.len());
        let _ = writeln!(out, "Estimated tokens:    {}", batch.total_estimated_tokens);
        let _ = writeln!(out, "Estimated cost:      ${:.4}", batch.total_estimated_cost);
        if batch.is_empty() {
            return out;
        }
        let avg = batch.tasks.iter().map(|t| t.complexity_score).sum::<f64>() / batch.len() as f64;
        let _ = writeln!(out, "Average complexity:  {avg:.1}");
        for task in batch.tasks.iter().take(5) {
            let _ = writeln!(
                out,
                "  - {} (complexity {:.1}, ${:.4})",
                task.source_file.display(),
                task.complexity_score,
                task.estimated_cost
            );
        }
        if batch.len() > 5 {
            let _ = writeln!(out, "  ... and {} more", batch.len() - 5);
        }
        out
    }

    pub fn save_batch(batch: &TaskBatch, path: &Path) -> Result<(), StoreError> {
        write_json_atomic(path, batch)
    }

    pub fn load_batch(path: &Path) -> Result<TaskBatch, StoreError> {
        read_json(path)?.ok_or_else(|| StoreError::Io {
            path: path.to_path_buf(),
            source: io::Error::new(io::ErrorKind::NotFound, "task batch file not found"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{
        Assessment, Gap, GapSummary, GapType, ReportTiming, TaskStatus,
    };
    use chrono::Utc;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn report(scores: &[f64]) -> GapReport {
        let gaps: Vec<_> = scores
            .iter()
            .enumerate()
            .map(|(i, &score)| Gap {
                source_file: PathBuf::from(format!("src/mod_{i}.py")),
                complexity_score: score,
                current_coverage: 0.0,
                gap_type: GapType::Untested,
                estimated_tokens: 100,
                estimated_cost: 0.01,
            })
            .collect();
        GapReport {
            summary: GapSummary {
                total_files: gaps.len(),
                files_needing_logical_tests: gaps.len(),
                total_gaps: gaps.len(),
                overall_assessment: Assessment::Good,
            },
            estimated_cost: 0.01 * gaps.len() as f64,
            gaps,
            timing: ReportTiming {
                started_at: Utc::now(),
                duration_ms: 1,
            },
            model: "sonnet".to_string(),
        }
    }

    #[test]
    fn test_prepare_filters_low_complexity() {
        let batch = TaskPreparer::new(4.0).prepare_tasks(&report(&[6.0, 3.5, 4.0, 9.0]));
        assert_eq!(batch.len(), 3);
        assert!(batch.tasks.iter().all(|t| t.status == TaskStatus::Pending));
        assert_eq!(batch.total_estimated_tokens, 300);
        assert!((batch.total_estimated_cost - 0.03).abs() < 1e-9);
    }

    #[test]
    fn test_prepare_respects_max_tasks() {
        let batch = TaskPreparer::new(0.0)
            .with_max_tasks(Some(2))
            .prepare_tasks(&report(&[5.0, 5.0, 5.0]));
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.tasks[0].source_file, PathBuf::from("src/mod_0.py"));
    }

    #[test]
    fn test_task_ids_stable_across_preparations() {
        let r = report(&[5.0, 6.0]);
        let a = TaskPreparer::new(0.0).prepare_tasks(&r);
        let b = TaskPreparer::new(0.0).prepare_tasks(&r);
        assert_eq!(a.tasks[0].id, b.tasks[0].id);
        assert_ne!(a.tasks[0].id, a.tasks[1].id);
    }

    #[test]
    fn test_summary_mentions_counts() {
        let batch = TaskPreparer::new(0.0).prepare_tasks(&report(&[5.0; 7]));
        let summary = TaskPreparer::generate_summary(&batch);
        assert!(summary.contains("AI generation tasks: 7"));
        assert!(summary.contains("... and 2 more"));
    }

    #[test]
    fn test_save_and_load_batch() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("batch.json");
        let batch = TaskPreparer::new(0.0).prepare_tasks(&report(&[5.0, 7.0]));

        TaskPreparer::save_batch(&batch, &path).unwrap();
        let loaded = TaskPreparer::load_batch(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.tasks[1].id, batch.tasks[1].id);

        assert!(TaskPreparer::load_batch(&dir.path().join("missing.json")).is_err());
    }
}
