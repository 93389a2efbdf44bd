//! Heuristic structural scanner.
//!
//! Stands in for the structural generator when no analysis file is supplied.
//! It never parses a language: branching and function counts come from
//! keyword tokens, coverage from the relative size of the matching test file.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use tracing::{debug, warn};

use crate::domain::errors::AnalysisError;
use crate::domain::models::test_layout::{find_existing_test, is_test_file};
use crate::domain::models::{AnalyzedFile, StructuralAnalysis};
use crate::domain::ports::StructuralAnalyzer;

const BRANCH_WORDS: &[&str] = &[
    "if", "elif", "for", "while", "case", "catch", "except", "match", "when", "unless",
];
const FUNCTION_WORDS: &[&str] = &["def", "fn", "function", "func"];
const SKIPPED_DIRS: &[&str] = &[
    "node_modules",
    "venv",
    "env",
    "target",
    "dist",
    "build",
    "__pycache__",
    "vendor",
];

/// Coverage at or above this share counts as adequate structural coverage.
const ADEQUATE_COVERAGE: f64 = 80.0;

/// Source and test files found in a project.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectInventory {
    pub source_files: Vec<PathBuf>,
    pub test_files: Vec<PathBuf>,
}

/// Keyword-counting structural analyzer over a directory tree
#[derive(Debug, Clone)]
pub struct ProjectScanner {
    extensions: HashSet<String>,
}

impl ProjectScanner {
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|e| e.into().trim_start_matches('.').to_lowercase())
                .collect(),
        }
    }

    /// Whether a path has one of the configured source extensions.
    pub fn is_source_file(&self, path: &Path) -> bool {
        path.extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .is_some_and(|e| self.extensions.contains(&e))
    }

    /// Walk the project, honoring ignore files, and split files into
    /// source and test files. Paths are relative to `root` and sorted.
    pub fn inventory(&self, root: &Path) -> Result<ProjectInventory, AnalysisError> {
        if !root.is_dir() {
            return Err(AnalysisError::ProjectNotFound(root.to_path_buf()));
        }

        let walker = WalkBuilder::new(root)
            .standard_filters(true)
            .filter_entry(|entry| {
                let name = entry.file_name().to_string_lossy();
                !(entry.file_type().is_some_and(|t| t.is_dir()) && SKIPPED_DIRS.contains(&name.as_ref()))
            })
            .build();

        let mut inventory = ProjectInventory::default();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }
            let path = entry.path();
            if !self.is_source_file(path) {
                continue;
            }
            let relative = path.strip_prefix(root).unwrap_or(path).to_path_buf();
            if is_test_file(&relative) {
                inventory.test_files.push(relative);
            } else {
                inventory.source_files.push(relative);
            }
        }

        inventory.source_files.sort();
        inventory.test_files.sort();
        debug!(
            sources = inventory.source_files.len(),
            tests = inventory.test_files.len(),
            "project inventory collected"
        );
        Ok(inventory)
    }

    fn analyze_file(root: &Path, relative: &Path) -> Option<AnalyzedFile> {
        let content = match fs::read_to_string(root.join(relative)) {
            Ok(content) => content,
            Err(e) => {
                debug!(path = %relative.display(), error = %e, "skipping unreadable file");
                return None;
            }
        };

        let signals = count_signals(&content);
        let mut file = AnalyzedFile::new(
            relative,
            signals.lines,
            signals.branches,
            signals.functions,
        );

        if let Some(test_file) = find_existing_test(root, relative) {
            let test_lines = fs::read_to_string(root.join(&test_file))
                .map(|c| count_signals(&c).lines)
                .unwrap_or(0);
            let coverage = if signals.lines == 0 {
                100.0
            } else {
                (test_lines as f64 / signals.lines as f64 * 100.0).min(100.0)
            };
            file = file.with_coverage(coverage, coverage >= ADEQUATE_COVERAGE);
            file.has_existing_tests = true;
        }

        Some(file)
    }
}

impl StructuralAnalyzer for ProjectScanner {
    fn analyze_project(&self, root: &Path) -> Result<StructuralAnalysis, AnalysisError> {
        let inventory = self.inventory(root)?;
        Ok(StructuralAnalysis::new(
            inventory
                .source_files
                .iter()
                .filter_map(|f| Self::analyze_file(root, f))
                .collect(),
        ))
    }

    fn analyze_files(&self, root: &Path, files: &[PathBuf]) -> Result<StructuralAnalysis, AnalysisError> {
        if !root.is_dir() {
            return Err(AnalysisError::ProjectNotFound(root.to_path_buf()));
        }
        Ok(StructuralAnalysis::new(
            files
                .iter()
                .filter(|f| self.is_source_file(f) && !is_test_file(f))
                .filter_map(|f| Self::analyze_file(root, f))
                .collect(),
        ))
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
struct Signals {
    lines: usize,
    branches: usize,
    functions: usize,
}

fn count_signals(content: &str) -> Signals {
    let mut signals = Signals::default();
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        signals.lines += 1;
        signals.branches += trimmed.matches("&&").count() + trimmed.matches("||").count();
        signals.functions += trimmed.matches("=>").count();
        for word in trimmed.split(|c: char| !(c.is_alphanumeric() || c == '_')) {
            if BRANCH_WORDS.contains(&word) {
                signals.branches += 1;
            } else if FUNCTION_WORDS.contains(&word) {
                signals.functions += 1;
            }
        }
    }
    signals
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn scanner() -> ProjectScanner {
        ProjectScanner::new(["py", "ts"])
    }

    #[test]
    fn test_count_signals() {
        let src = "def f(x):\n    if x and y:\n        return 1\n\n    for i in x:\n        pass\n";
        let s = count_signals(src);
        assert_eq!(s.lines, 5);
        assert_eq!(s.branches, 2);
        assert_eq!(s.functions, 1);
    }

    #[test]
    fn test_count_signals_operators_and_arrows() {
        let s = count_signals("const f = (a) => a && b || c;\n");
        assert_eq!(s.branches, 2);
        assert_eq!(s.functions, 1);
    }

    #[test]
    fn test_inventory_splits_sources_and_tests() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("src")).unwrap();
        fs::create_dir_all(root.join("node_modules/pkg")).unwrap();
        fs::write(root.join("src/app.py"), "def run():\n    pass\n").unwrap();
        fs::write(root.join("src/test_app.py"), "def test_run():\n    pass\n").unwrap();
        fs::write(root.join("src/readme.md"), "docs").unwrap();
        fs::write(root.join("node_modules/pkg/index.ts"), "export {}").unwrap();

        let inventory = scanner().inventory(root).unwrap();
        assert_eq!(inventory.source_files, vec![PathBuf::from("src/app.py")]);
        assert_eq!(inventory.test_files, vec![PathBuf::from("src/test_app.py")]);
    }

    #[test]
    fn test_analyze_project_detects_existing_tests() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::write(root.join("a.py"), "def a():\n    if x:\n        return 1\n    return 2\n").unwrap();
        fs::write(root.join("test_a.py"), "def test_a():\n    assert a() == 1\n").unwrap();
        fs::write(root.join("b.py"), "def b():\n    return 2\n").unwrap();

        let analysis = scanner().analyze_project(root).unwrap();
        assert_eq!(analysis.files.len(), 2);

        let a = analysis.files.iter().find(|f| f.path == Path::new("a.py")).unwrap();
        assert!(a.has_existing_tests);
        assert!((a.structural_coverage - 50.0).abs() < 1e-9);
        assert!(!a.has_adequate_coverage);

        let b = analysis.files.iter().find(|f| f.path == Path::new("b.py")).unwrap();
        assert!(!b.has_existing_tests);
        assert!(b.structural_coverage.abs() < f64::EPSILON);
    }

    #[test]
    fn test_missing_project_is_an_error() {
        let result = scanner().analyze_project(Path::new("/definitely/not/here"));
        assert!(matches!(result, Err(AnalysisError::ProjectNotFound(_))));
    }

    #[test]
    fn test_analyze_files_skips_tests_and_missing() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::write(root.join("a.py"), "def a():\n    pass\n").unwrap();

        let analysis = scanner()
            .analyze_files(
                root,
                &[
                    PathBuf::from("a.py"),
                    PathBuf::from("test_a.py"),
                    PathBuf::from("gone.py"),
                    PathBuf::from("notes.txt"),
                ],
            )
            .unwrap();
        assert_eq!(analysis.files.len(), 1);
        assert_eq!(analysis.files[0].path, PathBuf::from("a.py"));
    }
}
