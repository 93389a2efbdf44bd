//! Domain errors for the testweaver core.
//!
//! Each layer has its own enum so callers can tell fatal preconditions apart
//! from recoverable task failures without string matching.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while turning structural analysis into a gap report.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Invalid complexity threshold: {0}. Must be a non-negative number")]
    InvalidThreshold(f64),

    #[error("Project directory not found: {}", .0.display())]
    ProjectNotFound(PathBuf),

    #[error("Failed to read gap report {}: {reason}", .path.display())]
    ReportUnreadable { path: PathBuf, reason: String },

    #[error("Failed to write gap report {}: {reason}", .path.display())]
    ReportUnwritable { path: PathBuf, reason: String },

    #[error("Structural analysis failed: {0}")]
    Structural(String),
}

/// Errors from the durable JSON store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {}: {reason}", .path.display())]
    Parse { path: PathBuf, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from the batch scheduler state machine.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Invalid batch size: {0}. Must be between 1 and 100")]
    InvalidBatchSize(usize),

    #[error(
        "Batch state already exists at {}. Use --resume to continue or --clean to start over",
        .0.display()
    )]
    StateExists(PathBuf),

    #[error("No previous batch state found. Remove --resume flag to start fresh.")]
    NoState,

    #[error("Batch state at {} is corrupted: {reason}. Inspect it or use --clean to discard it", .path.display())]
    CorruptState { path: PathBuf, reason: String },

    #[error("Batch state schema version {found} is newer than supported version {supported}")]
    UnsupportedSchema { found: u32, supported: u32 },

    #[error(
        "Batch {batch_index} estimated cost ${estimated:.4} exceeds cost limit ${limit:.4}. \
         Raise --cost-limit or lower --batch-size"
    )]
    CostLimitExceeded {
        batch_index: usize,
        estimated: f64,
        limit: f64,
    },

    #[error(
        "Gap report does not match batch state: state expects {expected} tasks, report yields {actual}. \
         Use --clean to start over"
    )]
    ReportMismatch { expected: usize, actual: usize },

    #[error("Batch result for index {got} cannot be applied; next expected batch is {expected}")]
    OutOfOrder { expected: usize, got: usize },

    #[error("All {0} batches are already completed")]
    AlreadyComplete(usize),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failure of one invocation of the external generation engine.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error("Engine binary unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to spawn engine: {0}")]
    Spawn(String),

    #[error("Engine timed out after {0}s")]
    Timeout(u64),

    #[error("Engine exited with status {code:?}: {stderr}")]
    NonZeroExit {
        code: Option<i32>,
        stderr: String,
        cost_usd: Option<f64>,
    },

    #[error("Engine produced malformed output: {0}")]
    MalformedOutput(String),

    #[error("Engine I/O error: {0}")]
    Io(String),
}

impl EngineError {
    /// Cost reported by the engine for a failed attempt, if any.
    pub const fn reported_cost(&self) -> Option<f64> {
        match self {
            Self::NonZeroExit { cost_usd, .. } => *cost_usd,
            _ => None,
        }
    }
}

/// Fatal orchestrator errors. Per-task failures never surface here.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("AI generation engine is not available: {0}. Install it or set ai.engine_command")]
    EngineUnavailable(String),

    #[error("Invalid max_concurrent: {0}. Must be at least 1")]
    InvalidConcurrency(usize),
}

/// Errors from change detection and incremental coordination.
#[derive(Debug, Error)]
pub enum IncrementalError {
    #[error("Version control command failed: {0}")]
    VersionControl(String),

    #[error("Failed to hash {}: {source}", .path.display())]
    Hash {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to remove orphaned test {}: {source}", .path.display())]
    RemoveTest {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    History(#[from] HistoryError),
}

/// Errors from the history and baseline store.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("Baseline not found: {0}")]
    BaselineNotFound(String),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors from driving a batched generation run end to end.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("No gap report to schedule. Run `testweaver analyze` first or pass --report")]
    MissingReport,

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
