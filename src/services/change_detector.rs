//! Change detection for incremental runs.
//!
//! Version control supplies candidate changes since the last recorded
//! commit; a content hash manifest then drops every candidate that is
//! byte-identical to what the previous run already handled.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::{debug, instrument, warn};

use crate::domain::errors::IncrementalError;
use crate::domain::models::{ChangeKind, FileChange, IncrementalState};
use crate::domain::ports::VersionControl;
use crate::infrastructure::store::{read_json, write_json_atomic};

pub const INCREMENTAL_STATE_SCHEMA_VERSION: u32 = 1;

/// Hex sha256 of a file's content, or `None` if it does not exist.
pub fn hash_file(path: &Path) -> Result<Option<String>, IncrementalError> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(format!("{:x}", Sha256::digest(&bytes)))),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(IncrementalError::Hash {
            path: path.to_path_buf(),
            source,
        }),
    }
}

pub struct ChangeDetector {
    root: PathBuf,
    vcs: Arc<dyn VersionControl>,
    state_path: PathBuf,
}

impl ChangeDetector {
    pub fn new(root: impl Into<PathBuf>, vcs: Arc<dyn VersionControl>, state_path: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            vcs,
            state_path: state_path.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn is_git_repository(&self) -> bool {
        self.vcs.is_repository().await
    }

    pub async fn tracked_file_count(&self) -> Result<usize, IncrementalError> {
        Ok(self.vcs.tracked_files().await?.len())
    }

    /// State recorded by the previous non-dry run. An unreadable file is
    /// treated as absent, which forces a full run.
    pub fn load_state(&self) -> Option<IncrementalState> {
        match read_json(&self.state_path) {
            Ok(state) => state,
            Err(e) => {
                warn!(error = %e, "ignoring unreadable incremental state");
                None
            }
        }
    }

    pub fn save_state(&self, state: &IncrementalState) -> Result<(), IncrementalError> {
        write_json_atomic(&self.state_path, state)?;
        Ok(())
    }

    /// Changes since the recorded commit. Unless `force` is set, files whose
    /// content matches the recorded manifest are dropped.
    #[instrument(skip(self, state), fields(root = %self.root.display()))]
    pub async fn detect_changes(
        &self,
        state: Option<&IncrementalState>,
        force: bool,
    ) -> Result<Vec<FileChange>, IncrementalError> {
        let since = state.and_then(|s| s.last_commit.as_deref());
        let candidates = self.vcs.changed_files(since).await?;
        let Some(state) = state.filter(|_| !force) else {
            return Ok(candidates);
        };

        let mut changes = Vec::with_capacity(candidates.len());
        for change in candidates {
            let recorded = state.file_hashes.get(&change.path);
            let unchanged = match change.kind {
                ChangeKind::Deleted => {
                    state.deleted_files.contains(&change.path) && !self.root.join(&change.path).exists()
                }
                ChangeKind::Added | ChangeKind::Modified => {
                    let current = hash_file(&self.root.join(&change.path))?;
                    current.is_some() && current.as_ref() == recorded
                }
            };
            if unchanged {
                debug!(path = %change.path.display(), "already handled");
            } else {
                changes.push(change);
            }
        }
        Ok(changes)
    }

    /// Fold handled paths into the manifest and stamp it with the current
    /// head commit. Handled paths that no longer exist become deletion
    /// tombstones.
    pub async fn next_state(
        &self,
        previous: Option<IncrementalState>,
        handled: &[PathBuf],
    ) -> Result<IncrementalState, IncrementalError> {
        let (mut file_hashes, mut deleted_files): (BTreeMap<PathBuf, String>, BTreeSet<PathBuf>) =
            previous.map(|s| (s.file_hashes, s.deleted_files)).unwrap_or_default();
        for path in handled {
            match hash_file(&self.root.join(path))? {
                Some(hash) => {
                    deleted_files.remove(path);
                    file_hashes.insert(path.clone(), hash);
                }
                None => {
                    file_hashes.remove(path);
                    deleted_files.insert(path.clone());
                }
            }
        }
        Ok(IncrementalState {
            schema_version: INCREMENTAL_STATE_SCHEMA_VERSION,
            last_commit: self.vcs.head_commit().await?,
            file_hashes,
            deleted_files,
            recorded_at: Some(Utc::now()),
        })
    }
}
