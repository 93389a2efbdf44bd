//! `testweaver incremental`: regenerate tests only for changed files.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Args;
use serde::Serialize;

use crate::cli::commands::CommandContext;
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::{IncrementalOptions, IncrementalRecommendation, IncrementalUpdate};
use crate::infrastructure::vcs::GitCli;
use crate::services::{ChangeDetector, IncrementalCoordinator};

#[derive(Args, Debug)]
pub struct IncrementalArgs {
    /// Treat every changed file as new, ignoring recorded hashes
    #[arg(short, long)]
    pub force: bool,

    /// Update bookkeeping and remove orphaned tests without calling the engine
    #[arg(long)]
    pub skip_ai: bool,

    /// Report what would change without writing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Maximum concurrent generation tasks
    #[arg(long)]
    pub max_concurrency: Option<usize>,

    /// Cost limit in USD for this run; lower-priority files are skipped
    #[arg(long)]
    pub cost_limit: Option<f64>,

    /// Only report whether an incremental run is appropriate
    #[arg(long)]
    pub check: bool,
}

impl IncrementalArgs {
    fn options(&self) -> IncrementalOptions {
        IncrementalOptions {
            force_regenerate: self.force,
            skip_ai: self.skip_ai,
            dry_run: self.dry_run,
            max_concurrency: self.max_concurrency,
            cost_limit: self.cost_limit,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RecommendationOutput {
    #[serde(flatten)]
    pub recommendation: IncrementalRecommendation,
}

impl CommandOutput for RecommendationOutput {
    fn to_human(&self) -> String {
        let verdict = if self.recommendation.use_incremental {
            "Incremental run recommended"
        } else {
            "Full run recommended"
        };
        format!("{verdict}: {}", self.recommendation.reason)
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

#[derive(Debug, Serialize)]
pub struct IncrementalOutput {
    #[serde(flatten)]
    pub update: IncrementalUpdate,
}

fn push_paths(lines: &mut Vec<String>, title: &str, paths: &[PathBuf]) {
    if paths.is_empty() {
        return;
    }
    lines.push(format!("{title} ({}):", paths.len()));
    lines.extend(paths.iter().map(|p| format!("  {}", p.display())));
}

impl CommandOutput for IncrementalOutput {
    fn to_human(&self) -> String {
        let u = &self.update;
        if let Some(ref reason) = u.full_run_reason {
            return format!("Full run recommended: {reason}");
        }
        if u.is_noop() {
            return "No changes since the last incremental run.".to_string();
        }

        let mut lines = Vec::new();
        if u.dry_run {
            lines.push("Dry run: nothing was written".to_string());
        }
        push_paths(&mut lines, "Changed files", &u.changed_files);
        push_paths(&mut lines, "New tests", &u.new_tests);
        push_paths(&mut lines, "Updated tests", &u.updated_tests);
        push_paths(&mut lines, "Deleted tests", &u.deleted_tests);
        push_paths(&mut lines, "Skipped", &u.skipped_files);
        lines.push(format!("Estimated cost: ${:.4}", u.cost_estimate));
        if let Some(ref stats) = u.generation {
            lines.push(format!(
                "Generated: {} completed, {} failed, ${:.4}",
                stats.completed, stats.failed, stats.total_cost
            ));
        }
        lines.push(format!("Time: {}ms", u.total_time_ms));
        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn execute(args: IncrementalArgs, ctx: &CommandContext) -> Result<i32> {
    if let Some(limit) = args.cost_limit {
        if !limit.is_finite() || limit < 0.0 {
            bail!("Invalid cost limit {limit}. Must be a non-negative amount in USD");
        }
    }
    if args.max_concurrency == Some(0) {
        bail!("Invalid --max-concurrency 0. Must be at least 1");
    }

    let detector = ChangeDetector::new(
        ctx.project.clone(),
        Arc::new(GitCli::new(ctx.project.clone())),
        ctx.layout().incremental_state(),
    );
    let coordinator = IncrementalCoordinator::new(
        ctx.project.clone(),
        ctx.config.clone(),
        detector,
        Arc::new(ctx.scanner()),
        ctx.engine(),
        ctx.history()?,
    );

    if args.check {
        let recommendation = coordinator
            .should_use_incremental()
            .await
            .context("Failed to inspect changes")?;
        output(&RecommendationOutput { recommendation }, ctx.json);
        return Ok(0);
    }

    let update = coordinator
        .generate_incremental(&args.options())
        .await
        .context("Incremental run failed")?;
    let failed = update.generation.as_ref().map_or(0, |s| s.failed);
    output(&IncrementalOutput { update }, ctx.json);
    Ok(i32::from(failed > 0))
}
