//! Gap analysis domain models.
//!
//! A [`StructuralAnalysis`] is what the structural generator hands over; a
//! [`GapReport`] is what the gap analyzer produces from it.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Structural signals for one source file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AnalyzedFile {
    /// Path of the source file, relative to the project root when possible
    pub path: PathBuf,
    pub line_count: usize,
    /// Branching constructs (conditionals, loops, boolean operators)
    pub branch_count: usize,
    pub function_count: usize,
    /// Whether a test file for this source already exists
    pub has_existing_tests: bool,
    /// Structural coverage percentage, `0.0..=100.0`
    #[serde(default)]
    pub structural_coverage: f64,
    /// Whether structural tests are considered sufficient on their own
    #[serde(default)]
    pub has_adequate_coverage: bool,
}

impl AnalyzedFile {
    /// Create a file record with no tests and no coverage.
    pub fn new(path: impl Into<PathBuf>, line_count: usize, branch_count: usize, function_count: usize) -> Self {
        Self {
            path: path.into(),
            line_count,
            branch_count,
            function_count,
            has_existing_tests: false,
            structural_coverage: 0.0,
            has_adequate_coverage: false,
        }
    }

    /// Mark the file as having tests with the given structural coverage.
    #[must_use]
    pub fn with_coverage(mut self, coverage: f64, adequate: bool) -> Self {
        self.has_existing_tests = coverage > 0.0;
        self.structural_coverage = coverage.clamp(0.0, 100.0);
        self.has_adequate_coverage = adequate;
        self
    }
}

/// Result of the structural generation step: the analyzed file list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StructuralAnalysis {
    pub files: Vec<AnalyzedFile>,
}

impl StructuralAnalysis {
    pub fn new(files: Vec<AnalyzedFile>) -> Self {
        Self { files }
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Why a file needs logical tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapType {
    /// No tests at all
    Untested,
    /// Some structural coverage, but not enough
    PartialCoverage,
    /// Logic dense enough that structural templates cannot cover it
    HighComplexity,
}

impl fmt::Display for GapType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Untested => "untested",
            Self::PartialCoverage => "partial_coverage",
            Self::HighComplexity => "high_complexity",
        };
        write!(f, "{s}")
    }
}

/// A source file that needs AI-generated tests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Gap {
    pub source_file: PathBuf,
    pub complexity_score: f64,
    /// Existing coverage percentage, `0.0..=100.0`
    pub current_coverage: f64,
    pub gap_type: GapType,
    pub estimated_tokens: u64,
    pub estimated_cost: f64,
}

impl Gap {
    /// Priority used for ranking and budget selection: complexity weighted by
    /// the coverage deficit.
    pub fn priority(&self) -> f64 {
        self.complexity_score * (1.0 - self.current_coverage.clamp(0.0, 100.0) / 100.0)
    }
}

/// Coarse verdict on how much of the project lacks logical tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Assessment {
    Excellent,
    Good,
    Poor,
}

impl Assessment {
    /// Bucket a gapped/total ratio.
    pub fn from_ratio(gapped: usize, total: usize) -> Self {
        if total == 0 {
            return Self::Excellent;
        }
        let ratio = gapped as f64 / total as f64;
        if ratio <= 0.1 {
            Self::Excellent
        } else if ratio <= 0.4 {
            Self::Good
        } else {
            Self::Poor
        }
    }
}

impl fmt::Display for Assessment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Excellent => "excellent",
            Self::Good => "good",
            Self::Poor => "poor",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct GapSummary {
    pub total_files: usize,
    pub files_needing_logical_tests: usize,
    pub total_gaps: usize,
    pub overall_assessment: Assessment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ReportTiming {
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

/// Ranked gaps for one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct GapReport {
    pub gaps: Vec<Gap>,
    pub summary: GapSummary,
    /// Sum of the gaps' estimated cost in USD
    pub estimated_cost: f64,
    pub timing: ReportTiming,
    /// Model the cost estimates were computed for
    #[serde(default)]
    pub model: String,
}

impl GapReport {
    pub fn has_gaps(&self) -> bool {
        !self.gaps.is_empty()
    }

    pub fn total_estimated_tokens(&self) -> u64 {
        self.gaps.iter().map(|g| g.estimated_tokens).sum()
    }
}
