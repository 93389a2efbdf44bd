//! Durable state layout under the project's state directory.

pub mod json_store;

use std::path::{Path, PathBuf};

pub use json_store::{
    append_json_line, create_json_exclusive, project_key, read_json, read_json_lines,
    remove_if_exists, rewrite_json_lines, write_json_atomic,
};

/// Resolves where each persisted artifact lives for one state directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateLayout {
    root: PathBuf,
}

impl StateLayout {
    /// Layout rooted at an explicit state directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Layout for a project: `<project>/<state_dir>` unless `state_dir` is absolute.
    pub fn for_project(project: &Path, state_dir: &str) -> Self {
        let dir = Path::new(state_dir);
        if dir.is_absolute() {
            Self::new(dir)
        } else {
            Self::new(project.join(dir))
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Batch progress file, keyed by project path.
    pub fn batch_progress(&self, project: &Path) -> PathBuf {
        self.root
            .join(format!("batch-progress-{}.json", project_key(project)))
    }

    /// Gap report pinned for the duration of a scheduling run.
    pub fn batch_report(&self, project: &Path) -> PathBuf {
        self.root
            .join(format!("batch-report-{}.json", project_key(project)))
    }

    /// Default location of a saved task batch.
    pub fn task_batch(&self) -> PathBuf {
        self.root.join("task-batch.json")
    }

    /// Default location of the last gap report.
    pub fn gap_report(&self) -> PathBuf {
        self.root.join("gap-report.json")
    }

    pub fn usage_log(&self) -> PathBuf {
        self.root.join("usage.jsonl")
    }

    pub fn history_log(&self) -> PathBuf {
        self.root.join("history.jsonl")
    }

    pub fn baselines_dir(&self) -> PathBuf {
        self.root.join("baselines")
    }

    pub fn incremental_state(&self) -> PathBuf {
        self.root.join("incremental-state.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_state_dir_is_under_project() {
        let layout = StateLayout::for_project(Path::new("/work/app"), ".testweaver");
        assert_eq!(layout.root(), Path::new("/work/app/.testweaver"));
        assert_eq!(layout.history_log(), PathBuf::from("/work/app/.testweaver/history.jsonl"));
    }

    #[test]
    fn test_absolute_state_dir_is_kept() {
        let layout = StateLayout::for_project(Path::new("/work/app"), "/var/lib/testweaver");
        assert_eq!(layout.root(), Path::new("/var/lib/testweaver"));
    }

    #[test]
    fn test_batch_paths_are_deterministic() {
        let layout = StateLayout::new("/state");
        let a = layout.batch_progress(Path::new("/nonexistent/project"));
        let b = layout.batch_progress(Path::new("/nonexistent/project"));
        let other = layout.batch_progress(Path::new("/nonexistent/other"));
        assert_eq!(a, b);
        assert_ne!(a, other);
    }
}
