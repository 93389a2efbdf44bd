//! `testweaver generate`: batched AI test generation with resume support.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use indicatif::ProgressBar;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::cli::commands::analyze::resolve_report;
use crate::cli::commands::CommandContext;
use crate::cli::output::{output, CommandOutput, MultiProgressManager, ProgressBarExt, TableFormatter};
use crate::domain::models::{BatchConfig, BatchingBenefit, GapReport};
use crate::services::{
    partition, BatchRunner, BatchScheduler, GapAnalyzer, RunMode, RunSummary, TaskEvent, TaskPreparer,
};

#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// Gap report to generate tests for (defaults to the last saved report)
    #[arg(short, long)]
    pub report: Option<PathBuf>,

    /// Tasks per batch (1-100)
    #[arg(short, long)]
    pub batch_size: Option<usize>,

    /// Maximum concurrent generation tasks
    #[arg(long)]
    pub max_concurrent: Option<usize>,

    /// Primary model
    #[arg(short, long)]
    pub model: Option<String>,

    /// Model used for the single retry of a failed task
    #[arg(long)]
    pub fallback_model: Option<String>,

    /// Per-batch cost limit in USD; a batch estimated above it is not run
    #[arg(long)]
    pub cost_limit: Option<f64>,

    /// Per-task timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Minimum complexity score for a gap to become a task
    #[arg(long)]
    pub min_complexity: Option<f64>,

    /// Continue the existing batched run
    #[arg(long, conflicts_with = "clean")]
    pub resume: bool,

    /// Discard any existing batched run before starting
    #[arg(long)]
    pub clean: bool,

    /// Stop after this many batches (resume later with --resume)
    #[arg(long)]
    pub max_batches: Option<usize>,

    /// Prepare and price the tasks without running the engine
    #[arg(long)]
    pub dry_run: bool,

    /// Also write the prepared task batch to this file
    #[arg(long)]
    pub save_tasks: Option<PathBuf>,
}

impl GenerateArgs {
    fn batch_config(&self, ctx: &CommandContext) -> BatchConfig {
        let mut config = BatchConfig::from_config(&ctx.config);
        if let Some(size) = self.batch_size {
            config.batch_size = size;
        }
        if let Some(max) = self.max_concurrent {
            config.max_concurrent = max;
        }
        if let Some(ref model) = self.model {
            config.model.clone_from(model);
        }
        if let Some(ref model) = self.fallback_model {
            config.fallback_model = Some(model.clone());
        }
        if let Some(limit) = self.cost_limit {
            config.cost_limit = Some(limit);
        }
        if let Some(secs) = self.timeout {
            config.timeout_secs = secs;
        }
        if let Some(min) = self.min_complexity {
            config.min_complexity = min;
        }
        config
    }
}

#[derive(Debug, Serialize)]
pub struct DryRunOutput {
    pub tasks: usize,
    pub total_batches: usize,
    pub batch_size: usize,
    pub estimated_cost: f64,
    pub estimated_tokens: u64,
    pub batching: BatchingBenefit,
    pub task_file: PathBuf,
    pub summary: String,
}

impl CommandOutput for DryRunOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![
            "Dry run: nothing was generated".to_string(),
            String::new(),
            self.summary.trim_end().to_string(),
            String::new(),
            format!(
                "Batches:             {} of up to {} tasks",
                self.total_batches, self.batch_size
            ),
            format!("Batching:            {}", self.batching.reason),
            format!("Tasks saved to:      {}", self.task_file.display()),
        ];
        if !self.batching.beneficial {
            lines.push("Hint: a single batch (--batch-size) is enough for this many gaps".to_string());
        }
        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

#[derive(Debug, Serialize)]
pub struct GenerateOutput {
    pub summary: RunSummary,
    pub completed_tasks: usize,
    pub failed_tasks: usize,
    pub cost: f64,
    pub state_cleared: bool,
    #[serde(skip)]
    pub report: String,
}

impl CommandOutput for GenerateOutput {
    fn to_human(&self) -> String {
        let progress = &self.summary.progress;
        let mut lines = vec![
            format!(
                "Batches: {}/{} complete, {} run now",
                progress.completed_batches,
                progress.total_batches,
                self.summary.batches.len()
            ),
            format!(
                "Tasks:   {} completed, {} failed, ${:.4}",
                self.completed_tasks, self.failed_tasks, self.cost
            ),
        ];
        for batch in &self.summary.batches {
            let failed: Vec<_> = batch
                .task_results
                .iter()
                .filter(|r| !r.succeeded())
                .cloned()
                .collect();
            if !failed.is_empty() {
                lines.push(String::new());
                lines.push(format!("Failed tasks in batch {}:", batch.batch_index + 1));
                lines.push(TableFormatter::new().format_task_results(&failed));
            }
        }
        lines.push(String::new());
        lines.push(self.report.clone());
        if self.state_cleared {
            lines.push(String::new());
            lines.push("All batches complete; batch state cleared.".to_string());
        } else if !progress.is_complete() {
            lines.push(String::new());
            lines.push(format!(
                "{} batches remain. Continue with `testweaver generate --resume`.",
                progress.remaining_batches()
            ));
        }
        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

#[derive(Debug, Serialize)]
pub struct NothingToDoOutput {
    pub message: String,
}

impl CommandOutput for NothingToDoOutput {
    fn to_human(&self) -> String {
        self.message.clone()
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn execute(args: GenerateArgs, ctx: &CommandContext) -> Result<i32> {
    if let Some(limit) = args.cost_limit {
        if !limit.is_finite() || limit <= 0.0 {
            bail!("Invalid cost limit {limit}. Must be a positive amount in USD");
        }
    }
    let batch_config = args.batch_config(ctx);

    if args.dry_run {
        return dry_run(&args, ctx, &batch_config);
    }

    let report = if args.resume {
        args.report
            .as_deref()
            .map(GapAnalyzer::load_report)
            .transpose()
            .context("Failed to load gap report")?
    } else {
        let report = resolve_report(ctx, args.report.as_deref())?;
        let tasks = TaskPreparer::new(batch_config.min_complexity).prepare_tasks(&report);
        if let Some(ref path) = args.save_tasks {
            TaskPreparer::save_batch(&tasks, path)
                .with_context(|| format!("Failed to save tasks to {}", path.display()))?;
        }
        if tasks.is_empty() {
            output(
                &NothingToDoOutput {
                    message: "No gaps qualify for AI generation; nothing to do.".to_string(),
                },
                ctx.json,
            );
            return Ok(0);
        }
        Some(report)
    };

    run_batches(args, ctx, report, batch_config).await
}

fn dry_run(args: &GenerateArgs, ctx: &CommandContext, batch_config: &BatchConfig) -> Result<i32> {
    let report = resolve_report(ctx, args.report.as_deref())?;
    let tasks = TaskPreparer::new(batch_config.min_complexity).prepare_tasks(&report);
    let task_file = args.save_tasks.clone().unwrap_or_else(|| ctx.layout().task_batch());
    TaskPreparer::save_batch(&tasks, &task_file)
        .with_context(|| format!("Failed to save tasks to {}", task_file.display()))?;

    let batching =
        BatchScheduler::from_config(&ctx.config).validate_batching_benefit(&report, batch_config.batch_size);
    let result = DryRunOutput {
        tasks: tasks.len(),
        total_batches: partition(tasks.tasks.clone(), batch_config.batch_size).len(),
        batch_size: batch_config.batch_size,
        estimated_cost: tasks.total_estimated_cost,
        estimated_tokens: tasks.total_estimated_tokens,
        batching,
        task_file,
        summary: TaskPreparer::generate_summary(&tasks),
    };
    output(&result, ctx.json);
    Ok(0)
}

/// Show task events on a progress bar until the sender side is dropped.
fn spawn_event_consumer(
    mut events: mpsc::UnboundedReceiver<TaskEvent>,
    bar: ProgressBar,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                TaskEvent::Started { source_file, .. } => {
                    bar.set_message(source_file.display().to_string());
                }
                TaskEvent::Completed { .. } => bar.inc(1),
                TaskEvent::Failed { result, error } => {
                    bar.inc(1);
                    bar.println(format!(
                        "{} {}: {error}",
                        console::style("failed").red(),
                        result.source_file.display()
                    ));
                }
            }
        }
    })
}

async fn run_batches(
    args: GenerateArgs,
    ctx: &CommandContext,
    report: Option<GapReport>,
    batch_config: BatchConfig,
) -> Result<i32> {
    let runner = BatchRunner::new(ctx.project.clone(), ctx.config.clone(), ctx.history()?, ctx.engine());
    let mode = RunMode::from_flags(args.resume, args.clean);
    let mut run = runner
        .prepare(report, mode, batch_config)
        .await
        .context("Failed to prepare the batched run")?;

    let progress = &run.progress;
    let bars = MultiProgressManager::for_mode(ctx.json);
    let batch_bar = bars.add_progress_bar(progress.total_batches as u64, "batches");
    batch_bar.set_position(progress.completed_batches as u64);
    let done_tasks = (progress.completed_batches * progress.config.batch_size).min(progress.total_tasks);
    let task_bar = bars.add_progress_bar(progress.total_tasks as u64, "tasks");
    task_bar.set_position(done_tasks as u64);

    let (tx, rx) = mpsc::unbounded_channel();
    let consumer = spawn_event_consumer(rx, task_bar.clone());

    let mut batches = Vec::new();
    let mut failure = None;
    while args.max_batches.map_or(true, |max| batches.len() < max) {
        match runner.run_next_batch(&mut run, &tx).await {
            Ok(Some(result)) => {
                batch_bar.inc(1);
                batches.push(result);
            }
            Ok(None) => break,
            Err(e) => {
                failure = Some(e);
                break;
            }
        }
    }
    drop(tx);
    let _ = consumer.await;

    if let Some(e) = failure {
        batch_bar.finish_error("stopped");
        task_bar.finish_and_clear();
        return Err(e).context("Batched run stopped; completed batches are saved, fix the cause and use --resume");
    }

    let summary = RunSummary {
        project_path: ctx.project.clone(),
        batches,
        progress: run.progress.clone(),
    };
    if summary.failed_tasks() > 0 {
        batch_bar.finish_warning(format!("{} tasks failed", summary.failed_tasks()));
    } else {
        batch_bar.finish_success("batches done");
    }
    task_bar.finish_and_clear();
    bars.clear();

    let state_cleared = summary.progress.is_complete()
        && runner
            .scheduler()
            .cleanup_batch_state(runner.root())
            .context("Failed to clear completed batch state")?;

    let result = GenerateOutput {
        completed_tasks: summary.completed_tasks(),
        failed_tasks: summary.failed_tasks(),
        cost: summary.cost(),
        report: run.orchestrator().generate_report().await,
        state_cleared,
        summary,
    };
    let code = result.summary.exit_code();
    output(&result, ctx.json);
    Ok(code)
}
