use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::gap::Gap;

/// Lifecycle of one AI generation task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// One source file scheduled for AI test generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AiTask {
    pub id: Uuid,
    pub source_file: PathBuf,
    pub complexity_score: f64,
    pub estimated_cost: f64,
    pub estimated_tokens: u64,
    pub status: TaskStatus,
}

impl AiTask {
    /// Build a pending task from a gap.
    ///
    /// The id is derived from the source path so that recomputing tasks from
    /// the same report yields the same ids across resumes.
    pub fn from_gap(gap: &Gap) -> Self {
        let id = Uuid::new_v5(&Uuid::NAMESPACE_URL, gap.source_file.to_string_lossy().as_bytes());
        Self {
            id,
            source_file: gap.source_file.clone(),
            complexity_score: gap.complexity_score,
            estimated_cost: gap.estimated_cost,
            estimated_tokens: gap.estimated_tokens,
            status: TaskStatus::Pending,
        }
    }
}

/// Tasks prepared for submission, before partitioning into batches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TaskBatch {
    pub tasks: Vec<AiTask>,
    pub total_estimated_cost: f64,
    #[serde(default)]
    pub total_estimated_tokens: u64,
    pub created_at: DateTime<Utc>,
}

impl TaskBatch {
    pub fn new(tasks: Vec<AiTask>) -> Self {
        let total_estimated_cost = tasks.iter().map(|t| t.estimated_cost).sum();
        let total_estimated_tokens = tasks.iter().map(|t| t.estimated_tokens).sum();
        Self {
            tasks,
            total_estimated_cost,
            total_estimated_tokens,
            created_at: Utc::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
