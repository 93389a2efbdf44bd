//! Table output formatting for CLI commands
//!
//! Gap reports, budget allocations, task results, history and baselines are
//! rendered with comfy-table. Colors follow `NO_COLOR` and `TERM=dumb`.

use crate::domain::models::{Baseline, Gap, GapType, HistoryEntry, TaskResult, TaskStatus};
use crate::services::BudgetAllocation;
use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};
use std::env;

/// Table formatter for CLI output
pub struct TableFormatter {
    use_colors: bool,
    max_width: Option<u16>,
}

impl TableFormatter {
    pub fn new() -> Self {
        Self {
            use_colors: supports_color(),
            max_width: None,
        }
    }

    pub const fn with_config(use_colors: bool, max_width: Option<u16>) -> Self {
        Self { use_colors, max_width }
    }

    /// Ranked gaps, one row per source file
    pub fn format_gaps(&self, gaps: &[Gap]) -> String {
        let mut table = self.create_base_table();
        table.set_header(header(&["#", "Source file", "Type", "Complexity", "Coverage", "Tokens", "Cost"]));

        for (rank, gap) in gaps.iter().enumerate() {
            let type_cell = if self.use_colors {
                Cell::new(gap.gap_type.to_string()).fg(gap_type_color(gap.gap_type))
            } else {
                Cell::new(gap.gap_type.to_string())
            };
            table.add_row(vec![
                Cell::new(rank + 1),
                Cell::new(truncate_text(&gap.source_file.display().to_string(), 50)),
                type_cell,
                Cell::new(format!("{:.1}", gap.complexity_score)),
                Cell::new(format!("{:.0}%", gap.current_coverage)),
                Cell::new(gap.estimated_tokens),
                Cell::new(format!("${:.4}", gap.estimated_cost)),
            ]);
        }
        table.to_string()
    }

    /// Budget selection, in priority order
    pub fn format_allocations(&self, allocations: &[BudgetAllocation]) -> String {
        let mut table = self.create_base_table();
        table.set_header(header(&["Source file", "Priority", "Cost", "Included"]));

        for allocation in allocations {
            let included = if allocation.include_in_batch { "yes" } else { "no" };
            let included_cell = if self.use_colors {
                let color = if allocation.include_in_batch { Color::Green } else { Color::DarkGrey };
                Cell::new(included).fg(color)
            } else {
                Cell::new(included)
            };
            table.add_row(vec![
                Cell::new(truncate_text(&allocation.source_file.display().to_string(), 50)),
                Cell::new(format!("{:.2}", allocation.priority)),
                Cell::new(format!("${:.4}", allocation.estimated_cost)),
                included_cell,
            ]);
        }
        table.to_string()
    }

    /// Per-task outcome of one batch
    pub fn format_task_results(&self, results: &[TaskResult]) -> String {
        let mut table = self.create_base_table();
        table.set_header(header(&["Source file", "Status", "Attempts", "Tokens", "Cost", "Test file"]));

        for result in results {
            let status = if result.used_fallback && result.succeeded() {
                format!("{} (fallback)", result.status)
            } else {
                result.status.to_string()
            };
            let status_cell = if self.use_colors {
                Cell::new(status).fg(status_color(result.status))
            } else {
                Cell::new(status)
            };
            let test_file = result
                .test_file
                .as_ref()
                .map_or_else(|| "-".to_string(), |p| p.display().to_string());
            table.add_row(vec![
                Cell::new(truncate_text(&result.source_file.display().to_string(), 40)),
                status_cell,
                Cell::new(result.attempts.len()),
                Cell::new(result.tokens_used),
                Cell::new(format!("${:.4}", result.total_cost)),
                Cell::new(truncate_text(&test_file, 40)),
            ]);
        }
        table.to_string()
    }

    pub fn format_history(&self, entries: &[HistoryEntry]) -> String {
        let mut table = self.create_base_table();
        table.set_header(header(&["Time", "Operation", "Summary"]));
        for entry in entries {
            let operation = if self.use_colors {
                Cell::new(&entry.operation).fg(Color::Cyan)
            } else {
                Cell::new(&entry.operation)
            };
            table.add_row(vec![
                Cell::new(entry.timestamp.format("%Y-%m-%d %H:%M:%S")),
                operation,
                Cell::new(truncate_text(&entry.summary, 70)),
            ]);
        }
        table.to_string()
    }

    pub fn format_baselines(&self, baselines: &[Baseline]) -> String {
        let mut table = self.create_base_table();
        table.set_header(header(&["ID", "Created", "Description", "Sources", "Tests", "Coverage", "Gaps"]));
        for baseline in baselines {
            let s = &baseline.snapshot;
            table.add_row(vec![
                Cell::new(&baseline.id),
                Cell::new(baseline.timestamp.format("%Y-%m-%d %H:%M")),
                Cell::new(truncate_text(&baseline.description, 40)),
                Cell::new(s.source_files),
                Cell::new(s.test_files),
                Cell::new(format!("{:.1}%", s.coverage_percent)),
                Cell::new(s.gap_count),
            ]);
        }
        table.to_string()
    }

    fn create_base_table(&self) -> Table {
        let mut table = Table::new();
        table
            .load_preset(presets::UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic);
        if let Some(width) = self.max_width {
            table.set_width(width);
        }
        if !self.use_colors {
            table.force_no_tty();
        }
        table
    }
}

impl Default for TableFormatter {
    fn default() -> Self {
        Self::new()
    }
}

fn header(titles: &[&str]) -> Vec<Cell> {
    titles
        .iter()
        .map(|t| Cell::new(t).add_attribute(Attribute::Bold))
        .collect()
}

/// Check if color output is supported
fn supports_color() -> bool {
    if env::var("NO_COLOR").is_ok() {
        return false;
    }
    if let Ok(term) = env::var("TERM") {
        if term == "dumb" {
            return false;
        }
    }
    true
}

const fn gap_type_color(gap_type: GapType) -> Color {
    match gap_type {
        GapType::Untested => Color::Red,
        GapType::HighComplexity => Color::Magenta,
        GapType::PartialCoverage => Color::Yellow,
    }
}

const fn status_color(status: TaskStatus) -> Color {
    match status {
        TaskStatus::Completed => Color::Green,
        TaskStatus::Failed => Color::Red,
        TaskStatus::Running => Color::Cyan,
        TaskStatus::Pending => Color::White,
    }
}

fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        text.to_string()
    } else {
        let kept: String = text.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn gap(path: &str) -> Gap {
        Gap {
            source_file: PathBuf::from(path),
            complexity_score: 6.5,
            current_coverage: 0.0,
            gap_type: GapType::Untested,
            estimated_tokens: 6_000,
            estimated_cost: 0.0123,
        }
    }

    #[test]
    fn test_format_gaps_without_colors() {
        let formatter = TableFormatter::with_config(false, Some(120));
        let out = formatter.format_gaps(&[gap("src/app.py"), gap("src/util.py")]);
        assert!(out.contains("src/app.py"));
        assert!(out.contains("untested"));
        assert!(out.contains("$0.0123"));
        assert!(out.contains("Complexity"));
    }

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("short", 10), "short");
        assert_eq!(truncate_text("a_very_long_path_name.py", 10), "a_very_...");
    }

    #[test]
    fn test_format_allocations_marks_exclusions() {
        let formatter = TableFormatter::with_config(false, Some(120));
        let out = formatter.format_allocations(&[BudgetAllocation {
            source_file: PathBuf::from("src/app.py"),
            estimated_cost: 0.5,
            priority: 4.0,
            include_in_batch: false,
        }]);
        assert!(out.contains("no"));
        assert!(out.contains("$0.5000"));
    }
}
