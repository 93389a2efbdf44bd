//! Testweaver CLI entry point.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use testweaver::cli::commands::{self, CommandContext};
use testweaver::cli::{Cli, Commands};
use testweaver::infrastructure::config::ConfigLoader;
use testweaver::infrastructure::logging::{LogConfig, LoggerImpl};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json = cli.json;

    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(err) => testweaver::cli::handle_error(err, json),
    }
}

async fn run(cli: Cli) -> Result<i32> {
    let project = std::fs::canonicalize(&cli.project).unwrap_or_else(|_| PathBuf::from(&cli.project));
    let mut config = match cli.config {
        Some(ref path) => ConfigLoader::load_from_file(path)?,
        None => ConfigLoader::load(&project)?,
    };
    if let Some(level) = cli.verbosity_level() {
        config.logging.level = level.to_string();
    }

    // Held until the command finishes so buffered file logs are flushed.
    let _logger = LoggerImpl::init(&LogConfig::from(&config.logging))?;

    let ctx = CommandContext::new(project, config, cli.json);
    match cli.command {
        Commands::Analyze(args) => commands::analyze::execute(args, &ctx),
        Commands::Estimate(args) => commands::estimate::execute(args, &ctx),
        Commands::Generate(args) => commands::generate::execute(args, &ctx).await,
        Commands::Batch(args) => commands::batch::execute(args, &ctx),
        Commands::Incremental(args) => commands::incremental::execute(args, &ctx).await,
        Commands::Baseline(args) => commands::baseline::execute(args, &ctx),
        Commands::History(args) => commands::history::execute(args, &ctx),
    }
}
