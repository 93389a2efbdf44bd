use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Append-only log record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct HistoryEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    /// Operation name, e.g. `generate`, `incremental`, `baseline`
    pub operation: String,
    pub summary: String,
    #[serde(default)]
    pub details: serde_json::Value,
}

/// Test and coverage counts at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BaselineSnapshot {
    pub source_files: usize,
    pub test_files: usize,
    pub files_with_tests: usize,
    /// Share of source files that have a test file, `0.0..=100.0`
    pub coverage_percent: f64,
    pub gap_count: usize,
}

/// Named immutable checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Baseline {
    pub id: String,
    pub description: String,
    pub timestamp: DateTime<Utc>,
    pub snapshot: BaselineSnapshot,
}

/// Read-only diff between a baseline and the current project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BaselineComparison {
    pub baseline: Baseline,
    pub current: BaselineSnapshot,
    pub source_files_delta: i64,
    pub test_files_delta: i64,
    pub files_with_tests_delta: i64,
    pub gap_count_delta: i64,
    pub coverage_delta: f64,
    pub recommendations: Vec<String>,
}
