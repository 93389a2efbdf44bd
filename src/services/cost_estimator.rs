//! Model-aware cost estimation, budget optimization and usage tracking.
//!
//! Rates are USD per million tokens. A model name matches a rate when the
//! rate's model string is a substring of it (e.g. "sonnet" matches
//! "claude-sonnet-4-5").

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::domain::models::{Config, GapReport, ModelRate};
use crate::infrastructure::store::{append_json_line, read_json_lines, StateLayout};
use crate::services::gap_analyzer::{rank_gaps, HIGH_COMPLEXITY_SCORE};

/// Scores below this are low complexity.
pub const MEDIUM_COMPLEXITY_SCORE: f64 = 5.0;

/// Used only when the configured table is empty.
const FALLBACK_RATE: (f64, f64) = (15.0, 75.0);

/// Per-model pricing table.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelRates {
    rates: Vec<ModelRate>,
}

impl Default for ModelRates {
    fn default() -> Self {
        Self::new(Config::default().pricing)
    }
}

impl ModelRates {
    pub fn new(rates: Vec<ModelRate>) -> Self {
        Self { rates }
    }

    /// Rate for `model`. Unknown models are charged at the most expensive
    /// known rate so estimates err on the high side.
    pub fn rate_for(&self, model: &str) -> (f64, f64) {
        let model_lower = model.to_lowercase();
        if let Some(rate) = self
            .rates
            .iter()
            .find(|r| model_lower.contains(&r.model.to_lowercase()))
        {
            return (rate.input_per_million, rate.output_per_million);
        }
        self.rates
            .iter()
            .max_by(|a, b| {
                (a.input_per_million + a.output_per_million)
                    .total_cmp(&(b.input_per_million + b.output_per_million))
            })
            .map_or(FALLBACK_RATE, |r| (r.input_per_million, r.output_per_million))
    }

    pub fn cost(&self, model: &str, input_tokens: u64, output_tokens: u64) -> f64 {
        let (input, output) = self.rate_for(model);
        (input_tokens as f64 * input + output_tokens as f64 * output) / 1_000_000.0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TierCost {
    pub count: usize,
    pub tokens: u64,
    pub cost: f64,
}

impl TierCost {
    fn add(&mut self, tokens: u64, cost: f64) {
        self.count += 1;
        self.tokens += tokens;
        self.cost += cost;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ComplexityBreakdown {
    pub low: TierCost,
    pub medium: TierCost,
    pub high: TierCost,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostEstimate {
    pub model: String,
    pub total_cost: f64,
    pub total_tokens: u64,
    pub by_complexity: ComplexityBreakdown,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetAllocation {
    pub source_file: PathBuf,
    pub estimated_cost: f64,
    pub priority: f64,
    pub include_in_batch: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetOptimization {
    pub budget: f64,
    pub tasks_included: usize,
    pub tasks_excluded: usize,
    pub total_estimated_cost: f64,
    pub allocations: Vec<BudgetAllocation>,
}

impl BudgetOptimization {
    pub fn included(&self) -> impl Iterator<Item = &BudgetAllocation> {
        self.allocations.iter().filter(|a| a.include_in_batch)
    }
}

/// One line of the usage log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub timestamp: DateTime<Utc>,
    pub project_path: PathBuf,
    pub model: String,
    pub tokens_used: u64,
    pub cost: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelUsage {
    pub runs: usize,
    pub tokens: u64,
    pub cost: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageSummary {
    pub runs: usize,
    pub total_tokens: u64,
    pub total_cost: f64,
    pub by_model: BTreeMap<String, ModelUsage>,
}

#[derive(Debug, Clone)]
pub struct CostEstimator {
    rates: ModelRates,
    model: String,
    state_dir: String,
}

impl CostEstimator {
    pub fn new(rates: ModelRates, model: impl Into<String>, state_dir: impl Into<String>) -> Self {
        Self {
            rates,
            model: model.into(),
            state_dir: state_dir.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            ModelRates::new(config.pricing.clone()),
            config.ai.model.clone(),
            config.batching.state_dir.clone(),
        )
    }

    pub fn rates(&self) -> &ModelRates {
        &self.rates
    }

    /// Break the report's cost down by complexity tier.
    pub fn estimate_report_cost(&self, report: &GapReport) -> CostEstimate {
        let mut by_complexity = ComplexityBreakdown::default();
        for gap in &report.gaps {
            let tier = if gap.complexity_score >= HIGH_COMPLEXITY_SCORE {
                &mut by_complexity.high
            } else if gap.complexity_score >= MEDIUM_COMPLEXITY_SCORE {
                &mut by_complexity.medium
            } else {
                &mut by_complexity.low
            };
            tier.add(gap.estimated_tokens, gap.estimated_cost);
        }

        let total_cost: f64 = report.gaps.iter().map(|g| g.estimated_cost).sum();
        let estimate = CostEstimate {
            model: self.model.clone(),
            total_cost,
            total_tokens: report.total_estimated_tokens(),
            by_complexity,
            recommendations: Self::recommendations(&by_complexity, total_cost),
        };
        debug!(total_cost, gaps = report.gaps.len(), "estimated report cost");
        estimate
    }

    fn recommendations(breakdown: &ComplexityBreakdown, total_cost: f64) -> Vec<String> {
        let mut out = Vec::new();
        if total_cost <= 0.0 {
            out.push("No AI generation needed".to_string());
            return out;
        }
        if breakdown.high.count > 0 && breakdown.high.cost > total_cost / 2.0 {
            out.push(format!(
                "{} high-complexity files account for most of the cost; consider generating them first",
                breakdown.high.count
            ));
        }
        if breakdown.low.count > 0 {
            out.push(format!(
                "{} low-complexity files could use a cheaper model",
                breakdown.low.count
            ));
        }
        if breakdown.low.count + breakdown.medium.count + breakdown.high.count > 10 {
            out.push("Use batch processing to checkpoint progress and cost".to_string());
        }
        out
    }

    /// Greedy selection of the highest-priority gaps that fit in `budget`.
    ///
    /// Stops at the first gap that would overflow; it and every later gap
    /// are excluded even if a cheaper one would still fit.
    pub fn optimize_for_budget(&self, report: &GapReport, budget: f64) -> BudgetOptimization {
        let mut ranked: Vec<_> = report.gaps.iter().collect();
        ranked.sort_by(|a, b| rank_gaps(a, b));

        let budget = if budget.is_finite() { budget.max(0.0) } else { 0.0 };
        let mut total = 0.0;
        let mut overflowed = false;
        let allocations: Vec<_> = ranked
            .into_iter()
            .map(|gap| {
                let include = !overflowed && total + gap.estimated_cost <= budget;
                if include {
                    total += gap.estimated_cost;
                } else {
                    overflowed = true;
                }
                BudgetAllocation {
                    source_file: gap.source_file.clone(),
                    estimated_cost: gap.estimated_cost,
                    priority: gap.priority(),
                    include_in_batch: include,
                }
            })
            .collect();

        let tasks_included = allocations.iter().filter(|a| a.include_in_batch).count();
        info!(
            budget,
            tasks_included,
            total_estimated_cost = total,
            "budget optimization complete"
        );
        BudgetOptimization {
            budget,
            tasks_included,
            tasks_excluded: allocations.len() - tasks_included,
            total_estimated_cost: total,
            allocations,
        }
    }

    fn usage_log(&self, project: &Path) -> PathBuf {
        StateLayout::for_project(project, &self.state_dir).usage_log()
    }

    /// Append a usage record. Failures are logged and swallowed.
    pub fn track_usage(&self, project: &Path, model: &str, tokens_used: u64, cost: f64) {
        let record = UsageRecord {
            timestamp: Utc::now(),
            project_path: project.to_path_buf(),
            model: model.to_string(),
            tokens_used,
            cost,
        };
        if let Err(e) = append_json_line(&self.usage_log(project), &record) {
            warn!(error = %e, "failed to record usage");
        }
    }

    /// Totals from the usage log. A missing or unreadable log yields an empty summary.
    pub fn usage_summary(&self, project: &Path) -> UsageSummary {
        let records: Vec<UsageRecord> = read_json_lines(&self.usage_log(project)).unwrap_or_else(|e| {
            warn!(error = %e, "failed to read usage log");
            Vec::new()
        });

        let mut summary = UsageSummary::default();
        for record in records {
            summary.runs += 1;
            summary.total_tokens += record.tokens_used;
            summary.total_cost += record.cost;
            let entry = summary.by_model.entry(record.model).or_default();
            entry.runs += 1;
            entry.tokens += record.tokens_used;
            entry.cost += record.cost;
        }
        summary
    }
}
