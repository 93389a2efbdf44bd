//! Command-line interface.

pub mod commands;
pub mod output;
pub mod types;

pub use output::progress::{create_progress_bar, create_spinner, MultiProgressManager, ProgressBarExt};
pub use types::{Cli, Commands};

use crate::domain::models::{Assessment, GapReport};

/// Exit status for a gap report: poor coverage is 2, anything else 0.
pub const fn exit_code_for_report(report: &GapReport) -> i32 {
    match report.summary.overall_assessment {
        Assessment::Poor => 2,
        Assessment::Excellent | Assessment::Good => 0,
    }
}

/// Print a fatal error with its cause chain and exit with status 1.
pub fn handle_error(err: anyhow::Error, json_mode: bool) -> ! {
    if json_mode {
        let causes: Vec<String> = err.chain().skip(1).map(ToString::to_string).collect();
        let body = serde_json::json!({
            "success": false,
            "error": err.to_string(),
            "causes": causes,
        });
        println!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
    } else {
        eprintln!("{} {err}", console::style("Error:").red().bold());
        for cause in err.chain().skip(1) {
            eprintln!("  {} {cause}", console::style("caused by:").dim());
        }
    }
    std::process::exit(1);
}
