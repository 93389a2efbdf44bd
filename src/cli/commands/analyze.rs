//! `testweaver analyze`: rank the files that need logical tests.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use serde_json::json;

use crate::cli::commands::CommandContext;
use crate::cli::exit_code_for_report;
use crate::cli::output::{create_spinner, output, CommandOutput, ProgressBarExt, TableFormatter};
use crate::domain::models::GapReport;
use crate::domain::ports::StructuralAnalyzer;
use crate::infrastructure::scanner::load_structural_analysis;
use crate::services::GapAnalyzer;

#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// Pre-computed structural analysis (JSON) to use instead of scanning the project
    #[arg(short, long)]
    pub structure: Option<PathBuf>,

    /// Complexity threshold (0-10); files scoring at least this need logical tests
    #[arg(short, long)]
    pub threshold: Option<f64>,

    /// Where to write the gap report (defaults to the state directory)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Number of gaps to list
    #[arg(short, long, default_value = "20")]
    pub limit: usize,
}

#[derive(Debug, Serialize)]
pub struct AnalyzeOutput {
    pub report: GapReport,
    pub report_path: PathBuf,
    #[serde(skip)]
    pub limit: usize,
}

impl CommandOutput for AnalyzeOutput {
    fn to_human(&self) -> String {
        let summary = &self.report.summary;
        let mut lines = vec![
            "Gap Analysis:".to_string(),
            format!("  Files analyzed:          {}", summary.total_files),
            format!("  Need logical tests:      {}", summary.files_needing_logical_tests),
            format!("  Gaps:                    {}", summary.total_gaps),
            format!("  Assessment:              {}", summary.overall_assessment),
            format!(
                "  Estimated cost:          ${:.4} ({})",
                self.report.estimated_cost, self.report.model
            ),
            format!("  Report:                  {}", self.report_path.display()),
        ];

        if self.report.gaps.is_empty() {
            lines.push(String::new());
            lines.push("No files need AI-generated logical tests.".to_string());
            return lines.join("\n");
        }

        lines.push(String::new());
        let shown = &self.report.gaps[..self.report.gaps.len().min(self.limit)];
        lines.push(TableFormatter::new().format_gaps(shown));
        if self.report.gaps.len() > shown.len() {
            lines.push(format!("... and {} more", self.report.gaps.len() - shown.len()));
        }
        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// Analyze the project, or a pre-computed structural analysis.
pub fn analyze_project(ctx: &CommandContext, analyzer: &GapAnalyzer, structure: Option<&Path>) -> Result<GapReport> {
    let analysis = match structure {
        Some(path) => load_structural_analysis(path)
            .with_context(|| format!("Failed to load structural analysis {}", path.display()))?,
        None => ctx
            .scanner()
            .analyze_project(&ctx.project)
            .with_context(|| format!("Failed to scan {}", ctx.project.display()))?,
    };
    Ok(analyzer.analyze(&analysis))
}

/// The report at `path`, else the last saved report, else a fresh analysis.
pub fn resolve_report(ctx: &CommandContext, path: Option<&Path>) -> Result<GapReport> {
    if let Some(path) = path {
        return GapAnalyzer::load_report(path)
            .with_context(|| format!("Failed to load gap report {}", path.display()));
    }
    let saved = ctx.layout().gap_report();
    if saved.is_file() {
        return GapAnalyzer::load_report(&saved)
            .with_context(|| format!("Failed to load gap report {}", saved.display()));
    }
    let analyzer = ctx.gap_analyzer()?;
    let report = analyze_project(ctx, &analyzer, None)?;
    GapAnalyzer::save_report_best_effort(&report, &saved);
    Ok(report)
}

pub fn execute(args: AnalyzeArgs, ctx: &CommandContext) -> Result<i32> {
    let mut ctx = ctx.clone();
    if let Some(threshold) = args.threshold {
        ctx.config.analysis.complexity_threshold = threshold;
    }
    let analyzer = ctx.gap_analyzer()?;

    let spinner = (!ctx.json).then(|| create_spinner("Analyzing project..."));
    let report = match analyze_project(&ctx, &analyzer, args.structure.as_deref()) {
        Ok(report) => report,
        Err(e) => {
            if let Some(spinner) = spinner {
                spinner.finish_error("Analysis failed");
            }
            return Err(e);
        }
    };
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }

    let report_path = args.output.unwrap_or_else(|| ctx.layout().gap_report());
    GapAnalyzer::save_report_best_effort(&report, &report_path);

    ctx.history()?.record_best_effort(
        "analyze",
        format!(
            "{} of {} files need logical tests ({})",
            report.summary.total_gaps, report.summary.total_files, report.summary.overall_assessment
        ),
        json!({
            "total_gaps": report.summary.total_gaps,
            "estimated_cost": report.estimated_cost,
            "threshold": analyzer.threshold(),
        }),
    );

    let code = exit_code_for_report(&report);
    output(
        &AnalyzeOutput {
            report,
            report_path,
            limit: args.limit,
        },
        ctx.json,
    );
    Ok(code)
}
