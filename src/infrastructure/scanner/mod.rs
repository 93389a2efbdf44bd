//! Structural analysis sources: the built-in scanner or a pre-computed file.

pub mod project_scanner;

use std::path::Path;

pub use project_scanner::{ProjectInventory, ProjectScanner};

use crate::domain::errors::AnalysisError;
use crate::domain::models::StructuralAnalysis;
use crate::infrastructure::store::read_json;

/// Load a structural analysis produced by an external generator.
pub fn load_structural_analysis(path: &Path) -> Result<StructuralAnalysis, AnalysisError> {
    read_json(path)
        .map_err(|e| AnalysisError::Structural(e.to_string()))?
        .ok_or_else(|| AnalysisError::Structural(format!("{} does not exist", path.display())))
}
