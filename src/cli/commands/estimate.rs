//! `testweaver estimate`: cost of covering the gaps, and what a budget buys.

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Args;
use serde::Serialize;

use crate::cli::commands::analyze::resolve_report;
use crate::cli::commands::CommandContext;
use crate::cli::output::{output, CommandOutput, TableFormatter};
use crate::services::{BudgetOptimization, CostEstimate, CostEstimator, UsageSummary};

#[derive(Args, Debug)]
pub struct EstimateArgs {
    /// Gap report to estimate (defaults to the last saved report)
    #[arg(short, long)]
    pub report: Option<PathBuf>,

    /// Budget in USD; selects the highest-priority gaps that fit
    #[arg(short, long)]
    pub budget: Option<f64>,

    /// Model to price the estimate for
    #[arg(short, long)]
    pub model: Option<String>,

    /// Also show recorded usage for this project
    #[arg(long)]
    pub usage: bool,
}

#[derive(Debug, Serialize)]
pub struct EstimateOutput {
    pub estimate: CostEstimate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub budget: Option<BudgetOptimization>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageSummary>,
}

impl CommandOutput for EstimateOutput {
    fn to_human(&self) -> String {
        let e = &self.estimate;
        let tiers = &e.by_complexity;
        let mut lines = vec![
            format!("Cost Estimate ({}):", e.model),
            format!("  Total cost:    ${:.4}", e.total_cost),
            format!("  Total tokens:  {}", e.total_tokens),
            format!("  Low:           {} files, ${:.4}", tiers.low.count, tiers.low.cost),
            format!("  Medium:        {} files, ${:.4}", tiers.medium.count, tiers.medium.cost),
            format!("  High:          {} files, ${:.4}", tiers.high.count, tiers.high.cost),
        ];

        if !e.recommendations.is_empty() {
            lines.push(String::new());
            lines.push("Recommendations:".to_string());
            lines.extend(e.recommendations.iter().map(|r| format!("  - {r}")));
        }

        if let Some(ref budget) = self.budget {
            lines.push(String::new());
            lines.push(format!(
                "Budget ${:.2}: {} included, {} excluded, ${:.4} planned",
                budget.budget, budget.tasks_included, budget.tasks_excluded, budget.total_estimated_cost
            ));
            if !budget.allocations.is_empty() {
                lines.push(TableFormatter::new().format_allocations(&budget.allocations));
            }
        }

        if let Some(ref usage) = self.usage {
            lines.push(String::new());
            lines.push(format!(
                "Recorded usage: {} runs, {} tokens, ${:.4}",
                usage.runs, usage.total_tokens, usage.total_cost
            ));
            for (model, m) in &usage.by_model {
                lines.push(format!("  {model}: {} runs, {} tokens, ${:.4}", m.runs, m.tokens, m.cost));
            }
        }
        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub fn execute(args: EstimateArgs, ctx: &CommandContext) -> Result<i32> {
    if let Some(budget) = args.budget {
        if !budget.is_finite() || budget < 0.0 {
            bail!("Invalid budget {budget}. Must be a non-negative amount in USD");
        }
    }

    let mut ctx = ctx.clone();
    if let Some(model) = args.model {
        ctx.config.ai.model = model;
    }
    let report = resolve_report(&ctx, args.report.as_deref())?;
    let estimator = CostEstimator::from_config(&ctx.config);

    let result = EstimateOutput {
        estimate: estimator.estimate_report_cost(&report),
        budget: args.budget.map(|b| estimator.optimize_for_budget(&report, b)),
        usage: args.usage.then(|| estimator.usage_summary(&ctx.project)),
    };
    output(&result, ctx.json);
    Ok(0)
}
