//! Progress bars and spinners for long-running commands
//!
//! `generate` shows one bar for the batch sequence and one for the tasks of
//! the running batch. Everything draws to stderr, and a hidden manager is
//! used in JSON mode so stdout stays machine-readable.

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::Duration;

const PROGRESS_TEMPLATE: &str =
    "[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg} (ETA: {eta})";
const SPINNER_TEMPLATE: &str = "[{elapsed_precise}] {spinner:.green} {msg}";

const PROGRESS_CHARS: &str = "█▓▒░ ";
const SPINNER_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

fn bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template(PROGRESS_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars(PROGRESS_CHARS)
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template(SPINNER_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars(SPINNER_CHARS)
}

/// Create a standard progress bar with ETA calculation
///
/// # Example
/// ```
/// use testweaver::cli::output::progress::create_progress_bar;
///
/// let pb = create_progress_bar(3);
/// pb.set_message("src/app.py");
/// pb.inc(1);
/// pb.finish_with_message("done");
/// ```
pub fn create_progress_bar(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    pb.set_style(bar_style());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Create a spinner for operations without a known length
pub fn create_spinner(message: impl Into<String>) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(spinner_style());
    spinner.set_message(message.into());
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner
}

/// Extension trait for ProgressBar to add common utility methods
pub trait ProgressBarExt {
    /// Finish with a success message (green checkmark)
    fn finish_success(&self, message: impl Into<String>);

    /// Finish with an error message (red X)
    fn finish_error(&self, message: impl Into<String>);

    /// Finish with a warning message (yellow !)
    fn finish_warning(&self, message: impl Into<String>);

    /// Update progress and message in one call
    fn update(&self, position: u64, message: impl Into<String>);
}

impl ProgressBarExt for ProgressBar {
    fn finish_success(&self, message: impl Into<String>) {
        self.finish_with_message(format!("{} {}", console::style("✓").green(), message.into()));
    }

    fn finish_error(&self, message: impl Into<String>) {
        self.finish_with_message(format!("{} {}", console::style("✗").red(), message.into()));
    }

    fn finish_warning(&self, message: impl Into<String>) {
        self.finish_with_message(format!("{} {}", console::style("!").yellow(), message.into()));
    }

    fn update(&self, position: u64, message: impl Into<String>) {
        self.set_position(position);
        self.set_message(message.into());
    }
}

/// Several bars drawn together
pub struct MultiProgressManager {
    multi: MultiProgress,
}

impl MultiProgressManager {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::with_draw_target(ProgressDrawTarget::stderr()),
        }
    }

    /// A manager that draws nothing (JSON mode and tests)
    pub fn hidden() -> Self {
        let multi = MultiProgress::new();
        multi.set_draw_target(ProgressDrawTarget::hidden());
        Self { multi }
    }

    /// Pick the visible or hidden manager
    pub fn for_mode(json_mode: bool) -> Self {
        if json_mode {
            Self::hidden()
        } else {
            Self::new()
        }
    }

    pub fn add_progress_bar(&self, total: u64, message: impl Into<String>) -> ProgressBar {
        let pb = self.multi.add(create_progress_bar(total));
        pb.set_message(message.into());
        pb
    }

    pub fn add_spinner(&self, message: impl Into<String>) -> ProgressBar {
        self.multi.add(create_spinner(message))
    }

    /// Clear all bars from the terminal
    pub fn clear(&self) {
        let _ = self.multi.clear();
    }
}

impl Default for MultiProgressManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_bar_update() {
        let manager = MultiProgressManager::hidden();
        let pb = manager.add_progress_bar(4, "tasks");
        ProgressBarExt::update(&pb, 2, "src/app.py");
        assert_eq!(pb.position(), 2);
        assert_eq!(pb.length(), Some(4));
        pb.finish_success("done");
        assert!(pb.is_finished());
    }

    #[test]
    fn test_finish_variants() {
        let manager = MultiProgressManager::hidden();
        let warn = manager.add_spinner("working");
        warn.finish_warning("partial");
        assert!(warn.is_finished());

        let err = manager.add_progress_bar(1, "x");
        err.finish_error("failed");
        assert!(err.is_finished());
    }
}
