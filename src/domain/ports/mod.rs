//! Port trait definitions (Hexagonal Architecture)
//!
//! Interfaces that infrastructure adapters implement:
//! - GenerationEngine: the external AI test generator
//! - VersionControl: change enumeration for incremental runs
//! - StructuralAnalyzer: per-file structural signals
//!
//! These traits keep the scheduling core independent of specific tools.

pub mod generation_engine;
pub mod structural_analyzer;
pub mod version_control;

pub use generation_engine::{EngineUsage, GenerationEngine, GenerationOutput, GenerationRequest};
pub use structural_analyzer::StructuralAnalyzer;
pub use version_control::VersionControl;
