//! CLI type definitions
//!
//! This module contains clap command structures that define the CLI interface.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::cli::commands::analyze::AnalyzeArgs;
use crate::cli::commands::baseline::BaselineArgs;
use crate::cli::commands::batch::BatchArgs;
use crate::cli::commands::estimate::EstimateArgs;
use crate::cli::commands::generate::GenerateArgs;
use crate::cli::commands::history::HistoryArgs;
use crate::cli::commands::incremental::IncrementalArgs;

#[derive(Parser, Debug)]
#[command(name = "testweaver")]
#[command(about = "Testweaver - budget-aware AI generation of logical tests", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Configuration file (defaults to <project>/.testweaver/config.yaml)
    #[arg(short, long, global = true, env = "TESTWEAVER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Project root
    #[arg(short = 'C', long, global = true, default_value = ".")]
    pub project: PathBuf,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Find source files that need logical tests
    Analyze(AnalyzeArgs),

    /// Estimate the cost of covering the gaps, optionally under a budget
    Estimate(EstimateArgs),

    /// Generate tests for the gaps, batch by batch
    Generate(GenerateArgs),

    /// Inspect or discard the state of a batched run
    Batch(BatchArgs),

    /// Regenerate tests only for files changed since the last run
    Incremental(IncrementalArgs),

    /// Coverage baselines
    Baseline(BaselineArgs),

    /// Operation history
    History(HistoryArgs),
}

impl Cli {
    /// Log level implied by `-v` flags, if any were given.
    pub const fn verbosity_level(&self) -> Option<&'static str> {
        match self.verbose {
            0 => None,
            1 => Some("info"),
            2 => Some("debug"),
            _ => Some("trace"),
        }
    }
}
