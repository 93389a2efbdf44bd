//! Git adapter for change detection.
//!
//! All invocations are `git -C <root> ...` argument vectors; paths come back
//! relative to the project root thanks to `--relative` / `ls-files` defaults.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, instrument};

use crate::domain::errors::IncrementalError;
use crate::domain::models::{ChangeKind, FileChange};
use crate::domain::ports::VersionControl;

/// Version control backed by the `git` binary
#[derive(Debug, Clone)]
pub struct GitCli {
    root: PathBuf,
    git_path: String,
}

impl GitCli {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            git_path: "git".to_string(),
        }
    }

    #[must_use]
    pub fn with_git_path(mut self, git_path: impl Into<String>) -> Self {
        self.git_path = git_path.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn run_git(&self, args: &[&str]) -> Result<String, IncrementalError> {
        let output = Command::new(&self.git_path)
            .arg("-C")
            .arg(&self.root)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| IncrementalError::VersionControl(format!("failed to run git: {e}")))?;

        if !output.status.success() {
            return Err(IncrementalError::VersionControl(format!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Parse `git diff --name-status` output. Renames and copies become a
/// deletion (renames only) plus an addition.
pub fn parse_name_status(output: &str) -> Vec<FileChange> {
    let mut changes = Vec::new();
    for line in output.lines() {
        let mut fields = line.split('\t');
        let Some(status) = fields.next().filter(|s| !s.is_empty()) else {
            continue;
        };
        let paths: Vec<&str> = fields.collect();
        match status.chars().next() {
            Some('A') => {
                if let Some(path) = paths.first() {
                    changes.push(FileChange::new(*path, ChangeKind::Added));
                }
            }
            Some('D') => {
                if let Some(path) = paths.first() {
                    changes.push(FileChange::new(*path, ChangeKind::Deleted));
                }
            }
            Some('R') => {
                if let [old, new] = paths.as_slice() {
                    changes.push(FileChange::new(*old, ChangeKind::Deleted));
                    changes.push(FileChange::new(*new, ChangeKind::Added));
                }
            }
            Some('C') => {
                if let Some(new) = paths.get(1) {
                    changes.push(FileChange::new(*new, ChangeKind::Added));
                }
            }
            Some('M' | 'T') => {
                if let Some(path) = paths.first() {
                    changes.push(FileChange::new(*path, ChangeKind::Modified));
                }
            }
            _ => debug!(line, "ignoring unrecognized name-status line"),
        }
    }
    changes
}

fn non_empty_lines(output: &str) -> impl Iterator<Item = &str> {
    output.lines().map(str::trim).filter(|l| !l.is_empty())
}

#[async_trait]
impl VersionControl for GitCli {
    async fn is_repository(&self) -> bool {
        matches!(
            self.run_git(&["rev-parse", "--is-inside-work-tree"]).await,
            Ok(out) if out.trim() == "true"
        )
    }

    async fn head_commit(&self) -> Result<Option<String>, IncrementalError> {
        match self.run_git(&["rev-parse", "--verify", "--quiet", "HEAD"]).await {
            Ok(out) => Ok(Some(out.trim().to_string()).filter(|s| !s.is_empty())),
            Err(_) => Ok(None),
        }
    }

    #[instrument(skip(self), fields(root = %self.root.display()))]
    async fn changed_files(&self, since: Option<&str>) -> Result<Vec<FileChange>, IncrementalError> {
        let mut changes = if self.head_commit().await?.is_some() {
            let base = since.unwrap_or("HEAD");
            let diff = self
                .run_git(&["diff", "--name-status", "--relative", "-M", base, "--"])
                .await?;
            parse_name_status(&diff)
        } else {
            // No commits yet: everything staged counts as added.
            let cached = self.run_git(&["ls-files", "--cached"]).await?;
            non_empty_lines(&cached)
                .map(|p| FileChange::new(p, ChangeKind::Added))
                .collect()
        };

        let untracked = self
            .run_git(&["ls-files", "--others", "--exclude-standard"])
            .await?;
        changes.extend(non_empty_lines(&untracked).map(|p| FileChange::new(p, ChangeKind::Added)));

        let mut seen = HashSet::new();
        changes.retain(|c| seen.insert(c.clone()));
        debug!(count = changes.len(), "collected changed files");
        Ok(changes)
    }

    async fn tracked_files(&self) -> Result<Vec<PathBuf>, IncrementalError> {
        let out = self.run_git(&["ls-files"]).await?;
        Ok(non_empty_lines(&out).map(PathBuf::from).collect())
    }
}
