//! Domain layer: models, errors and ports of the test generation core.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{
    AnalysisError, EngineError, HistoryError, IncrementalError, OrchestratorError, RunnerError,
    SchedulerError, StoreError,
};
