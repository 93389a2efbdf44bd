//! Service layer: the test generation pipeline.
//!
//! Leaf-first: gap analysis, cost estimation and task preparation feed the
//! batch scheduler and the execution orchestrator; the batch runner and the
//! incremental coordinator drive them end to end.

pub mod batch_runner;
pub mod batch_scheduler;
pub mod change_detector;
pub mod cost_estimator;
pub mod execution_orchestrator;
pub mod gap_analyzer;
pub mod history_manager;
pub mod incremental_coordinator;
pub mod task_preparer;

pub use batch_runner::{BatchRunner, PreparedRun, RunMode, RunSummary};
pub use batch_scheduler::{partition, BatchScheduler};
pub use change_detector::ChangeDetector;
pub use cost_estimator::{
    BudgetAllocation, BudgetOptimization, CostEstimate, CostEstimator, ModelRates, UsageSummary,
};
pub use execution_orchestrator::{
    ExecutionOrchestrator, ExecutionStats, OrchestratorSettings, TaskEvent,
};
pub use gap_analyzer::GapAnalyzer;
pub use history_manager::HistoryManager;
pub use incremental_coordinator::IncrementalCoordinator;
pub use task_preparer::TaskPreparer;
