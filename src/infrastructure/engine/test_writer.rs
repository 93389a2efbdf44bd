use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::debug;

use crate::domain::errors::EngineError;

/// Writes generated test content into the project tree.
#[derive(Debug, Clone)]
pub struct TestWriter {
    project_root: PathBuf,
}

impl TestWriter {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
        }
    }

    /// Write `content` to `test_file` (relative to the project root),
    /// creating parent directories. Returns the absolute path written.
    pub async fn write(&self, test_file: &Path, content: &str) -> Result<PathBuf, EngineError> {
        let target = self.project_root.join(test_file);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| EngineError::Io(format!("failed to create {}: {e}", parent.display())))?;
        }
        fs::write(&target, content)
            .await
            .map_err(|e| EngineError::Io(format!("failed to write {}: {e}", target.display())))?;
        debug!(path = %target.display(), bytes = content.len(), "wrote generated test");
        Ok(target)
    }
}
