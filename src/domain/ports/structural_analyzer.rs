use std::path::{Path, PathBuf};

use crate::domain::errors::AnalysisError;
use crate::domain::models::StructuralAnalysis;

/// Structural analysis collaborator that seeds the gap analyzer.
pub trait StructuralAnalyzer: Send + Sync {
    /// Analyze the whole project.
    fn analyze_project(&self, root: &Path) -> Result<StructuralAnalysis, AnalysisError>;

    /// Analyze only the given project-relative files. Missing files are skipped.
    fn analyze_files(&self, root: &Path, files: &[PathBuf]) -> Result<StructuralAnalysis, AnalysisError>;
}
