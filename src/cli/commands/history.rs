//! `testweaver history`: list or prune the operation log.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use serde::Serialize;

use crate::cli::commands::CommandContext;
use crate::cli::output::{output, CommandOutput, TableFormatter};
use crate::domain::models::HistoryEntry;

#[derive(Args, Debug)]
pub struct HistoryArgs {
    #[command(subcommand)]
    pub command: HistoryCommands,
}

#[derive(Subcommand, Debug)]
pub enum HistoryCommands {
    /// List recent operations, newest first
    List {
        /// Maximum number of entries to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
    /// Remove entries older than the given number of days
    Cleanup {
        /// Age in days
        #[arg(short, long, default_value = "30")]
        days: u32,
    },
}

#[derive(Debug, Serialize)]
pub struct HistoryListOutput {
    pub entries: Vec<HistoryEntry>,
    pub total: usize,
}

impl CommandOutput for HistoryListOutput {
    fn to_human(&self) -> String {
        if self.entries.is_empty() {
            return "No history recorded.".to_string();
        }
        TableFormatter::new().format_history(&self.entries)
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

#[derive(Debug, Serialize)]
pub struct HistoryCleanupOutput {
    pub removed: usize,
    pub days: u32,
}

impl CommandOutput for HistoryCleanupOutput {
    fn to_human(&self) -> String {
        format!(
            "Removed {} history entries older than {} days.",
            self.removed, self.days
        )
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub fn execute(args: HistoryArgs, ctx: &CommandContext) -> Result<i32> {
    let history = ctx.history()?;
    match args.command {
        HistoryCommands::List { limit } => {
            let entries = history
                .list_entries(Some(limit))
                .context("Failed to read history")?;
            let total = entries.len();
            output(&HistoryListOutput { entries, total }, ctx.json);
        }
        HistoryCommands::Cleanup { days } => {
            let removed = history.cleanup(days).context("Failed to clean up history")?;
            output(&HistoryCleanupOutput { removed, days }, ctx.json);
        }
    }
    Ok(0)
}
