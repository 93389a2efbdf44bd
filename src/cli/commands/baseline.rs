//! `testweaver baseline`: snapshot coverage and compare against it later.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use serde::Serialize;
use serde_json::json;

use crate::cli::commands::CommandContext;
use crate::cli::output::{output, signed, CommandOutput, TableFormatter};
use crate::domain::models::{Baseline, BaselineComparison};

#[derive(Args, Debug)]
pub struct BaselineArgs {
    #[command(subcommand)]
    pub command: BaselineCommands,
}

#[derive(Subcommand, Debug)]
pub enum BaselineCommands {
    /// Record the current coverage as a baseline
    Create {
        /// What this baseline marks
        #[arg(default_value = "")]
        description: String,
    },
    /// List recorded baselines
    List,
    /// Compare the project with a baseline
    Compare {
        /// Baseline ID
        id: String,
    },
}

#[derive(Debug, Serialize)]
pub struct BaselineCreatedOutput {
    pub baseline: Baseline,
}

impl CommandOutput for BaselineCreatedOutput {
    fn to_human(&self) -> String {
        let s = &self.baseline.snapshot;
        format!(
            "Baseline {} created: {} source files, {} test files, {:.1}% coverage, {} gaps",
            self.baseline.id, s.source_files, s.test_files, s.coverage_percent, s.gap_count
        )
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

#[derive(Debug, Serialize)]
pub struct BaselineListOutput {
    pub baselines: Vec<Baseline>,
    pub total: usize,
}

impl CommandOutput for BaselineListOutput {
    fn to_human(&self) -> String {
        if self.baselines.is_empty() {
            return "No baselines recorded. Create one with `testweaver baseline create`.".to_string();
        }
        format!(
            "Found {} baseline(s):\n{}",
            self.total,
            TableFormatter::new().format_baselines(&self.baselines)
        )
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

#[derive(Debug, Serialize)]
pub struct BaselineComparisonOutput {
    #[serde(flatten)]
    pub comparison: BaselineComparison,
}

impl CommandOutput for BaselineComparisonOutput {
    fn to_human(&self) -> String {
        let c = &self.comparison;
        let mut lines = vec![
            format!(
                "Compared with baseline {} ({})",
                c.baseline.id,
                c.baseline.timestamp.format("%Y-%m-%d %H:%M")
            ),
            format!(
                "  Source files:      {} ({})",
                c.current.source_files,
                signed(c.source_files_delta)
            ),
            format!("  Test files:        {} ({})", c.current.test_files, signed(c.test_files_delta)),
            format!(
                "  Files with tests:  {} ({})",
                c.current.files_with_tests,
                signed(c.files_with_tests_delta)
            ),
            format!(
                "  Coverage:          {:.1}% ({:+.1})",
                c.current.coverage_percent, c.coverage_delta
            ),
            format!("  Gaps:              {} ({})", c.current.gap_count, signed(c.gap_count_delta)),
            String::new(),
            "Recommendations:".to_string(),
        ];
        lines.extend(c.recommendations.iter().map(|r| format!("  - {r}")));
        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub fn execute(args: BaselineArgs, ctx: &CommandContext) -> Result<i32> {
    let history = ctx.history()?;
    match args.command {
        BaselineCommands::Create { description } => {
            let baseline = history
                .create_baseline(&description)
                .context("Failed to create baseline")?;
            history.record_best_effort(
                "baseline",
                format!("Baseline {} created", baseline.id),
                json!({ "id": baseline.id, "gap_count": baseline.snapshot.gap_count }),
            );
            output(&BaselineCreatedOutput { baseline }, ctx.json);
        }
        BaselineCommands::List => {
            let baselines = history.list_baselines().context("Failed to list baselines")?;
            let total = baselines.len();
            output(&BaselineListOutput { baselines, total }, ctx.json);
        }
        BaselineCommands::Compare { id } => {
            let comparison = history
                .compare_with_baseline(&id)
                .with_context(|| format!("Failed to compare with baseline {id}"))?;
            output(&BaselineComparisonOutput { comparison }, ctx.json);
        }
    }
    Ok(0)
}
