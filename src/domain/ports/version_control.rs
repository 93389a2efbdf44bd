use std::path::PathBuf;

use async_trait::async_trait;

use crate::domain::errors::IncrementalError;
use crate::domain::models::FileChange;

/// Version-control collaborator used for change detection.
///
/// Paths are relative to the repository working tree.
#[async_trait]
pub trait VersionControl: Send + Sync {
    /// Whether the project is inside a working tree. Never fails: a missing
    /// binary simply means "no".
    async fn is_repository(&self) -> bool;

    /// Current HEAD commit, `None` for a repository without commits.
    async fn head_commit(&self) -> Result<Option<String>, IncrementalError>;

    /// Files changed between `since` (or HEAD when `None`) and the working
    /// tree, including untracked files.
    async fn changed_files(&self, since: Option<&str>) -> Result<Vec<FileChange>, IncrementalError>;

    /// All tracked files.
    async fn tracked_files(&self) -> Result<Vec<PathBuf>, IncrementalError>;
}
