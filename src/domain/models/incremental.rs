use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::batch::BatchStats;

/// Kind of change reported for a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
}

/// A file changed since the reference point. Renames are split into a
/// deletion of the old path and an addition of the new one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct FileChange {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

impl FileChange {
    pub fn new(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

/// Options for one incremental pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct IncrementalOptions {
    /// Reprocess every reported change even if its content hash is unchanged
    pub force_regenerate: bool,
    /// Classify and estimate, but do not invoke the AI engine
    pub skip_ai: bool,
    /// Classify only: no engine invocation, no file writes
    pub dry_run: bool,
    pub max_concurrency: Option<usize>,
    pub cost_limit: Option<f64>,
}

/// Recorded reference point for the next incremental pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct IncrementalState {
    #[serde(default)]
    pub schema_version: u32,
    pub last_commit: Option<String>,
    /// sha256 of each processed source file, keyed by project-relative path
    pub file_hashes: BTreeMap<PathBuf, String>,
    /// Deletions a previous run already acted on
    #[serde(default)]
    pub deleted_files: BTreeSet<PathBuf>,
    pub recorded_at: Option<DateTime<Utc>>,
}

/// Whether an incremental pass is advisable right now.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct IncrementalRecommendation {
    pub use_incremental: bool,
    pub reason: String,
    pub changed_files: usize,
    pub tracked_files: usize,
}

/// Aggregate outcome of one incremental pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct IncrementalUpdate {
    pub changed_files: Vec<PathBuf>,
    pub new_tests: Vec<PathBuf>,
    pub updated_tests: Vec<PathBuf>,
    pub deleted_tests: Vec<PathBuf>,
    pub skipped_files: Vec<PathBuf>,
    pub total_time_ms: u64,
    pub cost_estimate: f64,
    /// Present when the AI engine actually ran
    #[serde(default)]
    pub generation: Option<BatchStats>,
    #[serde(default)]
    pub dry_run: bool,
    /// Set when the incremental pass could not run and a full run is needed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_run_reason: Option<String>,
}

impl IncrementalUpdate {
    /// An update that did nothing because a full run is needed instead.
    pub fn full_run_required(reason: impl Into<String>) -> Self {
        Self {
            full_run_reason: Some(reason.into()),
            ..Self::default()
        }
    }

    pub fn is_noop(&self) -> bool {
        self.changed_files.is_empty()
            && self.new_tests.is_empty()
            && self.updated_tests.is_empty()
            && self.deleted_tests.is_empty()
    }
}
