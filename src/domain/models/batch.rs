//! Batch scheduling and execution models.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::config::Config;
use super::task::{AiTask, TaskStatus};

/// Largest accepted batch size.
pub const MAX_BATCH_SIZE: usize = 100;

/// Current on-disk schema of [`BatchProgress`].
pub const BATCH_STATE_SCHEMA_VERSION: u32 = 1;

/// Parameters of one scheduling run. Never changes once the run is initialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BatchConfig {
    pub batch_size: usize,
    pub model: String,
    #[serde(default)]
    pub fallback_model: Option<String>,
    pub max_concurrent: usize,
    pub timeout_secs: u64,
    pub min_complexity: f64,
    #[serde(default)]
    pub cost_limit: Option<f64>,
}

impl BatchConfig {
    /// Derive a batch config from the resolved application configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            batch_size: config.batching.batch_size,
            model: config.ai.model.clone(),
            fallback_model: config.ai.fallback_model.clone(),
            max_concurrent: config.ai.max_concurrent,
            timeout_secs: config.ai.timeout_secs,
            min_complexity: config.analysis.min_complexity_for_ai,
            cost_limit: config.ai.cost_limit,
        }
    }

    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// One partition of the prepared tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Batch {
    pub index: usize,
    pub tasks: Vec<AiTask>,
    pub estimated_cost: f64,
    pub estimated_tokens: u64,
}

impl Batch {
    pub fn new(index: usize, tasks: Vec<AiTask>) -> Self {
        let estimated_cost = tasks.iter().map(|t| t.estimated_cost).sum();
        let estimated_tokens = tasks.iter().map(|t| t.estimated_tokens).sum();
        Self {
            index,
            tasks,
            estimated_cost,
            estimated_tokens,
        }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// Durable progress of an in-flight scheduling run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BatchProgress {
    /// Missing in files written before versioning; those migrate from 0.
    #[serde(default)]
    pub schema_version: u32,
    #[serde(default)]
    pub project_path: PathBuf,
    pub total_batches: usize,
    pub completed_batches: usize,
    pub next_batch_index: usize,
    pub actual_cost_so_far: f64,
    #[serde(default)]
    pub total_tasks: usize,
    pub config: BatchConfig,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl BatchProgress {
    pub const fn is_complete(&self) -> bool {
        self.completed_batches >= self.total_batches
    }

    pub const fn remaining_batches(&self) -> usize {
        self.total_batches.saturating_sub(self.completed_batches)
    }

    pub fn phase(&self) -> BatchPhase {
        if self.is_complete() {
            BatchPhase::Completed
        } else if self.completed_batches == 0 {
            BatchPhase::Initialized
        } else {
            BatchPhase::InProgress
        }
    }
}

/// Scheduler state per project path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchPhase {
    Uninitialized,
    Initialized,
    InProgress,
    Completed,
}

impl fmt::Display for BatchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Uninitialized => "uninitialized",
            Self::Initialized => "initialized",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        };
        write!(f, "{s}")
    }
}

/// Verdict of [`crate::services::BatchScheduler::validate_batching_benefit`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchingBenefit {
    pub beneficial: bool,
    pub reason: String,
}

/// One engine invocation within a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AttemptRecord {
    pub model: String,
    pub succeeded: bool,
    pub cost: f64,
    pub tokens: u64,
    pub duration_ms: u64,
    #[serde(default)]
    pub error: Option<String>,
}

/// Terminal outcome of one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TaskResult {
    pub task_id: Uuid,
    pub source_file: PathBuf,
    pub status: TaskStatus,
    pub attempts: Vec<AttemptRecord>,
    /// True when the task only succeeded on the fallback model
    pub used_fallback: bool,
    #[serde(default)]
    pub test_file: Option<PathBuf>,
    /// Cost of every attempt, successful or not
    pub total_cost: f64,
    pub tokens_used: u64,
    #[serde(default)]
    pub error: Option<String>,
}

impl TaskResult {
    pub fn succeeded(&self) -> bool {
        self.status == TaskStatus::Completed
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BatchStats {
    pub completed: usize,
    pub failed: usize,
    /// Tasks that needed the fallback retry (successful or not)
    pub retried: usize,
    pub total_cost: f64,
    pub total_tokens: u64,
    pub duration_ms: u64,
}

/// Output of one executed batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BatchResult {
    pub batch_index: usize,
    pub stats: BatchStats,
    pub task_results: Vec<TaskResult>,
}

impl BatchResult {
    /// Aggregate terminal task results into a batch result.
    pub fn from_task_results(batch_index: usize, task_results: Vec<TaskResult>, duration: Duration) -> Self {
        let mut stats = BatchStats {
            duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
            ..BatchStats::default()
        };
        for result in &task_results {
            match result.status {
                TaskStatus::Completed => stats.completed += 1,
                _ => stats.failed += 1,
            }
            if result.attempts.len() > 1 {
                stats.retried += 1;
            }
            stats.total_cost += result.total_cost;
            stats.total_tokens += result.tokens_used;
        }
        Self {
            batch_index,
            stats,
            task_results,
        }
    }
}
