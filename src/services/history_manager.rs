//! Operation history and coverage baselines.
//!
//! History is an append-only JSON-lines log. Baselines are one JSON document
//! each, created exclusively and never rewritten.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{Duration, Utc};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::domain::errors::{HistoryError, StoreError};
use crate::domain::models::{Baseline, BaselineComparison, BaselineSnapshot, HistoryEntry};
use crate::domain::ports::StructuralAnalyzer;
use crate::infrastructure::scanner::ProjectScanner;
use crate::infrastructure::store::{
    append_json_line, create_json_exclusive, read_json, read_json_lines, rewrite_json_lines,
    StateLayout,
};
use crate::services::gap_analyzer::GapAnalyzer;

pub struct HistoryManager {
    root: PathBuf,
    layout: StateLayout,
    scanner: ProjectScanner,
    analyzer: GapAnalyzer,
}

impl HistoryManager {
    pub fn new(root: impl Into<PathBuf>, layout: StateLayout, scanner: ProjectScanner, analyzer: GapAnalyzer) -> Self {
        Self {
            root: root.into(),
            layout,
            scanner,
            analyzer,
        }
    }

    pub fn record_entry(
        &self,
        operation: &str,
        summary: impl Into<String>,
        details: serde_json::Value,
    ) -> Result<HistoryEntry, HistoryError> {
        let entry = HistoryEntry {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            operation: operation.to_string(),
            summary: summary.into(),
            details,
        };
        append_json_line(&self.layout.history_log(), &entry)?;
        debug!(operation, id = %entry.id, "history entry recorded");
        Ok(entry)
    }

    /// Record an entry, logging instead of failing.
    pub fn record_best_effort(&self, operation: &str, summary: impl Into<String>, details: serde_json::Value) {
        if let Err(e) = self.record_entry(operation, summary, details) {
            warn!(operation, error = %e, "failed to record history");
        }
    }

    /// Entries, newest first.
    pub fn list_entries(&self, limit: Option<usize>) -> Result<Vec<HistoryEntry>, HistoryError> {
        let mut entries: Vec<HistoryEntry> = read_json_lines(&self.layout.history_log())?;
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        if let Some(limit) = limit {
            entries.truncate(limit);
        }
        Ok(entries)
    }

    /// Current project state as a snapshot.
    pub fn snapshot(&self) -> Result<BaselineSnapshot, HistoryError> {
        let inventory = self.scanner.inventory(&self.root)?;
        let analysis = self.scanner.analyze_project(&self.root)?;
        let files_with_tests = analysis.files.iter().filter(|f| f.has_existing_tests).count();
        let source_files = inventory.source_files.len();
        let coverage_percent = if source_files == 0 {
            0.0
        } else {
            files_with_tests as f64 / source_files as f64 * 100.0
        };
        Ok(BaselineSnapshot {
            source_files,
            test_files: inventory.test_files.len(),
            files_with_tests,
            coverage_percent,
            gap_count: self.analyzer.analyze(&analysis).gaps.len(),
        })
    }

    #[instrument(skip(self))]
    pub fn create_baseline(&self, description: &str) -> Result<Baseline, HistoryError> {
        let timestamp = Utc::now();
        let suffix = Uuid::new_v4().simple().to_string();
        let baseline = Baseline {
            id: format!("{}-{}", timestamp.format("%Y%m%d-%H%M%S"), &suffix[..8]),
            description: description.to_string(),
            timestamp,
            snapshot: self.snapshot()?,
        };
        create_json_exclusive(&self.baseline_path(&baseline.id), &baseline)?;
        info!(id = %baseline.id, gaps = baseline.snapshot.gap_count, "baseline created");
        Ok(baseline)
    }

    fn baseline_path(&self, id: &str) -> PathBuf {
        self.layout.baselines_dir().join(format!("{id}.json"))
    }

    /// Baselines, oldest first.
    pub fn list_baselines(&self) -> Result<Vec<Baseline>, HistoryError> {
        let dir = self.layout.baselines_dir();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(StoreError::Io { path: dir, source }.into()),
        };

        let mut baselines = Vec::new();
        for entry in entries {
            let path = entry.map_err(|source| StoreError::Io {
                path: dir.clone(),
                source,
            })?
            .path();
            if path.extension().is_some_and(|e| e == "json") {
                match read_json::<Baseline>(&path) {
                    Ok(Some(baseline)) => baselines.push(baseline),
                    Ok(None) => {}
                    Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable baseline"),
                }
            }
        }
        baselines.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Ok(baselines)
    }

    pub fn get_baseline(&self, id: &str) -> Result<Baseline, HistoryError> {
        read_json(&self.baseline_path(id))?.ok_or_else(|| HistoryError::BaselineNotFound(id.to_string()))
    }

    /// Compare the current project to a baseline. Nothing is written.
    pub fn compare_with_baseline(&self, id: &str) -> Result<BaselineComparison, HistoryError> {
        let baseline = self.get_baseline(id)?;
        let current = self.snapshot()?;
        Ok(compare(baseline, current))
    }

    /// Drop history entries older than `days`. Baselines are kept.
    pub fn cleanup(&self, days: u32) -> Result<usize, HistoryError> {
        let path = self.layout.history_log();
        if !path.exists() {
            return Ok(0);
        }
        // A window reaching before the earliest representable date keeps everything.
        let Some(cutoff) = Duration::try_days(i64::from(days)).and_then(|d| Utc::now().checked_sub_signed(d))
        else {
            debug!(days, "cleanup window exceeds the calendar, nothing to remove");
            return Ok(0);
        };
        let entries: Vec<HistoryEntry> = read_json_lines(&path)?;
        let before = entries.len();
        let kept: Vec<_> = entries.into_iter().filter(|e| e.timestamp >= cutoff).collect();
        let removed = before - kept.len();
        if removed > 0 {
            rewrite_json_lines(&path, &kept)?;
        }
        info!(removed, kept = kept.len(), days, "history cleaned up");
        Ok(removed)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn delta(current: usize, baseline: usize) -> i64 {
    i64::try_from(current).unwrap_or(i64::MAX) - i64::try_from(baseline).unwrap_or(i64::MAX)
}

fn compare(baseline: Baseline, current: BaselineSnapshot) -> BaselineComparison {
    let before = &baseline.snapshot;
    let source_files_delta = delta(current.source_files, before.source_files);
    let test_files_delta = delta(current.test_files, before.test_files);
    let files_with_tests_delta = delta(current.files_with_tests, before.files_with_tests);
    let gap_count_delta = delta(current.gap_count, before.gap_count);
    let coverage_delta = current.coverage_percent - before.coverage_percent;

    let mut recommendations = Vec::new();
    if gap_count_delta > 0 {
        recommendations.push(format!(
            "{gap_count_delta} new gaps since the baseline; run `testweaver incremental` to cover them"
        ));
    }
    if coverage_delta < 0.0 {
        recommendations.push(format!("Test coverage dropped by {:.1} points", -coverage_delta));
    }
    if source_files_delta > 0 && test_files_delta <= 0 {
        recommendations.push(format!("{source_files_delta} source files were added without tests"));
    }
    if recommendations.is_empty() {
        recommendations.push("Test coverage is stable or improved since the baseline".to_string());
    }

    BaselineComparison {
        baseline,
        current,
        source_files_delta,
        test_files_delta,
        files_with_tests_delta,
        gap_count_delta,
        coverage_delta,
        recommendations,
    }
}
