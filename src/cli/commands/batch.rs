//! `testweaver batch`: inspect or discard batched-run state.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use serde::Serialize;

use crate::cli::commands::CommandContext;
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::{BatchPhase, BatchProgress};
use crate::services::BatchScheduler;

#[derive(Args, Debug)]
pub struct BatchArgs {
    #[command(subcommand)]
    pub command: BatchCommands,
}

#[derive(Subcommand, Debug)]
pub enum BatchCommands {
    /// Show progress of the current batched run
    Status,
    /// Discard the current batched run
    Clean,
}

#[derive(Debug, Serialize)]
pub struct BatchStatusOutput {
    pub phase: BatchPhase,
    pub progress: Option<BatchProgress>,
    #[serde(skip)]
    pub rendered: Option<String>,
}

impl CommandOutput for BatchStatusOutput {
    fn to_human(&self) -> String {
        match self.rendered {
            Some(ref text) => text.clone(),
            None => "No batched run in progress.".to_string(),
        }
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

#[derive(Debug, Serialize)]
pub struct BatchCleanOutput {
    pub removed: bool,
    pub message: String,
}

impl CommandOutput for BatchCleanOutput {
    fn to_human(&self) -> String {
        self.message.clone()
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub fn execute(args: BatchArgs, ctx: &CommandContext) -> Result<i32> {
    let scheduler = BatchScheduler::from_config(&ctx.config);
    match args.command {
        BatchCommands::Status => {
            let progress = scheduler
                .load_batch_state(&ctx.project)
                .context("Failed to read batch state")?;
            let rendered = scheduler
                .get_progress_report(&ctx.project)
                .context("Failed to read batch state")?;
            let result = BatchStatusOutput {
                phase: progress.as_ref().map_or(BatchPhase::Uninitialized, BatchProgress::phase),
                progress,
                rendered,
            };
            output(&result, ctx.json);
        }
        BatchCommands::Clean => {
            let removed = scheduler
                .cleanup_batch_state(&ctx.project)
                .context("Failed to remove batch state")?;
            let message = if removed {
                "Batch state removed.".to_string()
            } else {
                "No batch state to remove.".to_string()
            };
            output(&BatchCleanOutput { removed, message }, ctx.json);
        }
    }
    Ok(0)
}
