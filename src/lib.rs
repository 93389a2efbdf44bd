//! Testweaver - budget-aware AI generation of logical tests
//!
//! Testweaver finds the source files whose logic is too dense for structural
//! test templates, prices the work of covering them with an external AI
//! generation engine, and runs that work in resumable, cost-limited batches
//! with bounded concurrency and a single fallback retry per task.
//! Incremental runs limit the work to files changed since the last run.
//!
//! # Architecture
//!
//! - **Domain Layer** (`domain`): models, error enums and ports
//! - **Service Layer** (`services`): analysis, estimation, scheduling and execution
//! - **Infrastructure Layer** (`infrastructure`): engine, version control,
//!   scanner, JSON store, configuration and logging adapters
//! - **CLI Layer** (`cli`): command-line interface
//!
//! # Example
//!
//! ```ignore
//! use testweaver::services::{GapAnalyzer, TaskPreparer};
//! use testweaver::domain::models::Config;
//!
//! let config = Config::default();
//! let report = GapAnalyzer::from_config(&config)?.analyze(&analysis);
//! let tasks = TaskPreparer::from_config(&config).prepare_tasks(&report);
//! println!("{}", TaskPreparer::generate_summary(&tasks));
//! ```

pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::models::{
    AiTask, Batch, BatchConfig, BatchProgress, BatchResult, Config, Gap, GapReport, GapType,
    StructuralAnalysis, TaskStatus,
};
pub use domain::ports::{GenerationEngine, StructuralAnalyzer, VersionControl};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{
    BatchRunner, BatchScheduler, CostEstimator, ExecutionOrchestrator, GapAnalyzer,
    IncrementalCoordinator, TaskPreparer,
};
