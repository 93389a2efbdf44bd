//! Subcommand implementations.
//!
//! Each command takes its clap arguments and a [`CommandContext`], prints a
//! [`crate::cli::output::CommandOutput`] and returns the process exit code.

pub mod analyze;
pub mod baseline;
pub mod batch;
pub mod estimate;
pub mod generate;
pub mod history;
pub mod incremental;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::domain::models::Config;
use crate::domain::ports::GenerationEngine;
use crate::infrastructure::engine::{ClaudeCliConfig, ClaudeCliEngine};
use crate::infrastructure::scanner::ProjectScanner;
use crate::infrastructure::store::StateLayout;
use crate::services::{GapAnalyzer, HistoryManager};

/// Resolved project, configuration and output mode shared by all commands.
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub project: PathBuf,
    pub config: Config,
    pub json: bool,
}

impl CommandContext {
    pub const fn new(project: PathBuf, config: Config, json: bool) -> Self {
        Self { project, config, json }
    }

    pub fn layout(&self) -> StateLayout {
        StateLayout::for_project(&self.project, &self.config.batching.state_dir)
    }

    pub fn scanner(&self) -> ProjectScanner {
        ProjectScanner::new(self.config.analysis.extensions.clone())
    }

    pub fn gap_analyzer(&self) -> Result<GapAnalyzer> {
        GapAnalyzer::from_config(&self.config).context("Invalid analysis settings")
    }

    pub fn history(&self) -> Result<HistoryManager> {
        Ok(HistoryManager::new(
            self.project.clone(),
            self.layout(),
            self.scanner(),
            self.gap_analyzer()?,
        ))
    }

    /// The configured external generation engine.
    pub fn engine(&self) -> Arc<dyn GenerationEngine> {
        Arc::new(ClaudeCliEngine::with_config(ClaudeCliConfig {
            command: self.config.ai.engine_command.clone(),
            ..ClaudeCliConfig::default()
        }))
    }
}
