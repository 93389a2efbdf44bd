pub mod batch;
pub mod config;
pub mod gap;
pub mod history;
pub mod incremental;
pub mod task;
pub mod test_layout;

pub use batch::{
    AttemptRecord, Batch, BatchConfig, BatchPhase, BatchProgress, BatchResult, BatchStats,
    BatchingBenefit, TaskResult, BATCH_STATE_SCHEMA_VERSION, MAX_BATCH_SIZE,
};
pub use config::{
    AiConfig, AnalysisConfig, BatchingConfig, ComplexityWeights, Config, IncrementalConfig,
    LoggingConfig, ModelRate,
};
pub use gap::{
    AnalyzedFile, Assessment, Gap, GapReport, GapSummary, GapType, ReportTiming,
    StructuralAnalysis,
};
pub use history::{Baseline, BaselineComparison, BaselineSnapshot, HistoryEntry};
pub use incremental::{
    ChangeKind, FileChange, IncrementalOptions, IncrementalRecommendation, IncrementalState,
    IncrementalUpdate,
};
pub use task::{AiTask, TaskBatch, TaskStatus};
