//! Gap analysis.
//!
//! Scores every file of a structural analysis, keeps the ones complex enough
//! to need logical tests that lack adequate structural coverage, and ranks
//! them by priority.

use std::cmp::Ordering;
use std::path::Path;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use crate::domain::errors::AnalysisError;
use crate::domain::models::{
    AnalyzedFile, Assessment, ComplexityWeights, Config, Gap, GapReport, GapSummary, GapType,
    ReportTiming, StructuralAnalysis,
};
use crate::infrastructure::store::{read_json, write_json_atomic};
use crate::services::cost_estimator::ModelRates;

/// Scores at or above this are reported as high complexity gaps.
pub const HIGH_COMPLEXITY_SCORE: f64 = 8.0;

const BASE_INPUT_TOKENS: u64 = 2000;
const INPUT_TOKENS_PER_LINE: u64 = 12;
const BASE_OUTPUT_TOKENS: f64 = 1000.0;
const OUTPUT_TOKENS_PER_POINT: f64 = 400.0;

/// Estimated input and output tokens for generating tests for one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenEstimate {
    pub input: u64,
    pub output: u64,
}

impl TokenEstimate {
    pub const fn total(&self) -> u64 {
        self.input + self.output
    }
}

/// Token estimate for a file of `line_count` lines with the given score.
pub fn estimate_tokens(line_count: usize, complexity_score: f64) -> TokenEstimate {
    TokenEstimate {
        input: BASE_INPUT_TOKENS + line_count as u64 * INPUT_TOKENS_PER_LINE,
        output: (BASE_OUTPUT_TOKENS + complexity_score * OUTPUT_TOKENS_PER_POINT).round() as u64,
    }
}

/// Deterministic ranking: priority descending, then cost ascending, then path.
pub fn rank_gaps(a: &Gap, b: &Gap) -> Ordering {
    b.priority()
        .total_cmp(&a.priority())
        .then_with(|| a.estimated_cost.total_cmp(&b.estimated_cost))
        .then_with(|| a.source_file.cmp(&b.source_file))
}

#[derive(Debug, Clone)]
pub struct GapAnalyzer {
    threshold: f64,
    weights: ComplexityWeights,
    rates: ModelRates,
    model: String,
}

impl GapAnalyzer {
    pub fn new(
        threshold: f64,
        weights: ComplexityWeights,
        rates: ModelRates,
        model: impl Into<String>,
    ) -> Result<Self, AnalysisError> {
        if !threshold.is_finite() || threshold < 0.0 {
            return Err(AnalysisError::InvalidThreshold(threshold));
        }
        Ok(Self {
            threshold,
            weights,
            rates,
            model: model.into(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, AnalysisError> {
        Self::new(
            config.analysis.complexity_threshold,
            config.analysis.weights,
            ModelRates::new(config.pricing.clone()),
            config.ai.model.clone(),
        )
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Complexity score of one file, in `[1, max_score]` with one decimal.
    pub fn complexity_score(&self, file: &AnalyzedFile) -> f64 {
        let w = &self.weights;
        let lines = if w.lines_per_point > 0.0 {
            file.line_count as f64 / w.lines_per_point
        } else {
            0.0
        };
        let mut score = 1.0
            + file.branch_count as f64 * w.branch
            + file.function_count as f64 * w.function
            + lines;
        if file.has_existing_tests {
            score -= w.tested_discount;
        }
        let clamped = score.clamp(1.0, w.max_score.max(1.0));
        (clamped * 10.0).round() / 10.0
    }

    fn gap_for(&self, file: &AnalyzedFile, score: f64) -> Gap {
        let coverage = file.structural_coverage.clamp(0.0, 100.0);
        let gap_type = if coverage <= 0.0 {
            GapType::Untested
        } else if score >= HIGH_COMPLEXITY_SCORE {
            GapType::HighComplexity
        } else {
            GapType::PartialCoverage
        };
        let tokens = estimate_tokens(file.line_count, score);
        Gap {
            source_file: file.path.clone(),
            complexity_score: score,
            current_coverage: coverage,
            gap_type,
            estimated_tokens: tokens.total(),
            estimated_cost: self.rates.cost(&self.model, tokens.input, tokens.output),
        }
    }

    /// Build a ranked gap report. An empty analysis yields an empty report.
    #[instrument(skip_all, fields(files = analysis.files.len(), threshold = self.threshold))]
    pub fn analyze(&self, analysis: &StructuralAnalysis) -> GapReport {
        let started_at = Utc::now();
        let clock = Instant::now();

        let mut needing_logical = 0;
        let mut gaps = Vec::new();
        for file in &analysis.files {
            let score = self.complexity_score(file);
            if score < self.threshold {
                continue;
            }
            needing_logical += 1;
            if file.has_adequate_coverage {
                debug!(path = %file.path.display(), score, "adequately covered");
                continue;
            }
            gaps.push(self.gap_for(file, score));
        }
        gaps.sort_by(rank_gaps);

        let total_files = analysis.files.len();
        let summary = GapSummary {
            total_files,
            files_needing_logical_tests: needing_logical,
            total_gaps: gaps.len(),
            overall_assessment: Assessment::from_ratio(gaps.len(), total_files),
        };
        let estimated_cost = gaps.iter().map(|g| g.estimated_cost).sum();

        info!(
            total_files,
            gaps = summary.total_gaps,
            assessment = %summary.overall_assessment,
            "gap analysis complete"
        );

        GapReport {
            gaps,
            summary,
            estimated_cost,
            timing: ReportTiming {
                started_at,
                duration_ms: u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX),
            },
            model: self.model.clone(),
        }
    }

    pub fn save_report(report: &GapReport, path: &Path) -> Result<(), AnalysisError> {
        write_json_atomic(path, report).map_err(|e| AnalysisError::ReportUnwritable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Save a report, logging instead of failing.
    pub fn save_report_best_effort(report: &GapReport, path: &Path) {
        if let Err(e) = Self::save_report(report, path) {
            warn!(error = %e, "gap report not saved");
        }
    }

    pub fn load_report(path: &Path) -> Result<GapReport, AnalysisError> {
        let unreadable = |reason: String| AnalysisError::ReportUnreadable {
            path: path.to_path_buf(),
            reason,
        };
        read_json(path)
            .map_err(|e| unreadable(e.to_string()))?
            .ok_or_else(|| unreadable("file does not exist".to_string()))
    }
}
