//! Generation Engine Port
//!
//! The external AI engine that writes logical tests. The default adapter
//! shells out to the Claude Code CLI; tests substitute in-process fakes.

use std::path::PathBuf;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::EngineError;

/// Request to generate tests for one source file
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Task identifier
    pub task_id: Uuid,

    /// Project root the engine runs in
    pub project_root: PathBuf,

    /// Source file, relative to the project root
    pub source_file: PathBuf,

    /// Where the generated test is expected to land, relative to the project root
    pub test_file: PathBuf,

    /// Model to use for this attempt
    pub model: String,

    /// Test framework hint (pytest, jest, ...)
    pub framework: Option<String>,
}

/// Token usage statistics reported by the engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl EngineUsage {
    pub const fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// Successful engine invocation
#[derive(Debug, Clone, Default)]
pub struct GenerationOutput {
    /// Generated test source, if the engine returned it rather than writing it
    pub content: Option<String>,

    /// Cost reported by the engine, in USD
    pub cost_usd: Option<f64>,

    /// Token usage, if reported
    pub usage: Option<EngineUsage>,

    /// Engine-side session identifier
    pub session_id: Option<String>,

    /// Engine-reported duration in milliseconds
    pub duration_ms: Option<u64>,
}

/// External AI generation engine.
///
/// Implementations must be cancel-safe: dropping the `generate` future has to
/// terminate any subprocess it started.
#[async_trait]
pub trait GenerationEngine: Send + Sync {
    /// Human-readable engine name for logs
    fn name(&self) -> &str;

    /// Verify the engine can be invoked at all. Called once before orchestration.
    async fn check_available(&self) -> Result<(), EngineError>;

    /// Run one generation attempt.
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationOutput, EngineError>;
}
