//! Common test utilities for integration tests
//!
//! A scriptable generation engine, an in-memory version control fake and
//! small project/report fixtures shared by the integration suites.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tempfile::TempDir;

use testweaver::domain::errors::{EngineError, IncrementalError};
use testweaver::domain::models::{
    Assessment, Config, FileChange, Gap, GapReport, GapSummary, GapType, ReportTiming,
};
use testweaver::domain::ports::{
    EngineUsage, GenerationEngine, GenerationOutput, GenerationRequest, VersionControl,
};
use testweaver::infrastructure::scanner::ProjectScanner;
use testweaver::infrastructure::store::StateLayout;
use testweaver::services::{GapAnalyzer, HistoryManager};

/// Create a temporary directory for test isolation
pub fn temp_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

/// Setup test logging
pub fn setup_test_logging() {
    use tracing_subscriber::fmt;

    let _ = fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Scriptable engine that counts calls and tracks peak concurrency.
pub struct MockEngine {
    pub delay: Duration,
    /// Never returns; only a timeout ends the attempt
    pub hang: bool,
    pub failing_models: Vec<String>,
    /// Source files whose attempts always fail, whatever the model
    pub failing_sources: Vec<PathBuf>,
    pub available: bool,
    pub cost_per_call: f64,
    generate_calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    models: Mutex<Vec<String>>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self {
            delay: Duration::ZERO,
            hang: false,
            failing_models: Vec::new(),
            failing_sources: Vec::new(),
            available: true,
            cost_per_call: 0.01,
            generate_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
            models: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn hanging(mut self) -> Self {
        self.hang = true;
        self
    }

    pub fn failing_on_model(mut self, model: &str) -> Self {
        self.failing_models.push(model.to_string());
        self
    }

    pub fn failing_on_source(mut self, source: &str) -> Self {
        self.failing_sources.push(PathBuf::from(source));
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    pub fn generate_calls(&self) -> usize {
        self.generate_calls.load(Ordering::SeqCst)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn models(&self) -> Vec<String> {
        self.models.lock().unwrap().clone()
    }
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl GenerationEngine for MockEngine {
    fn name(&self) -> &str {
        "mock"
    }

    async fn check_available(&self) -> Result<(), EngineError> {
        if self.available {
            Ok(())
        } else {
            Err(EngineError::Unavailable("mock engine disabled".to_string()))
        }
    }

    async fn generate(&self, request: GenerationRequest) -> Result<GenerationOutput, EngineError> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        self.models.lock().unwrap().push(request.model.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        if self.hang {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.failing_models.contains(&request.model) || self.failing_sources.contains(&request.source_file) {
            return Err(EngineError::NonZeroExit {
                code: Some(1),
                stderr: "scripted failure".to_string(),
                cost_usd: None,
            });
        }
        Ok(GenerationOutput {
            content: Some(format!(
                "def test_generated():\n    # covers {}\n    assert True\n",
                request.source_file.display()
            )),
            cost_usd: Some(self.cost_per_call),
            usage: Some(EngineUsage {
                input_tokens: 200,
                output_tokens: 100,
            }),
            ..GenerationOutput::default()
        })
    }
}

/// Version control fake whose reported changes can be swapped between runs.
pub struct FakeVcs {
    pub repository: bool,
    pub head: Mutex<Option<String>>,
    pub changes: Mutex<Vec<FileChange>>,
    pub tracked: Mutex<Vec<PathBuf>>,
}

impl FakeVcs {
    pub fn new(changes: Vec<FileChange>) -> Self {
        let tracked = changes.iter().map(|c| c.path.clone()).collect();
        Self {
            repository: true,
            head: Mutex::new(Some("0000001".to_string())),
            changes: Mutex::new(changes),
            tracked: Mutex::new(tracked),
        }
    }

    pub fn set_changes(&self, changes: Vec<FileChange>) {
        *self.changes.lock().unwrap() = changes;
    }

    pub fn set_tracked(&self, tracked: Vec<PathBuf>) {
        *self.tracked.lock().unwrap() = tracked;
    }
}

#[async_trait]
impl VersionControl for FakeVcs {
    async fn is_repository(&self) -> bool {
        self.repository
    }

    async fn head_commit(&self) -> Result<Option<String>, IncrementalError> {
        Ok(self.head.lock().unwrap().clone())
    }

    async fn changed_files(&self, _since: Option<&str>) -> Result<Vec<FileChange>, IncrementalError> {
        Ok(self.changes.lock().unwrap().clone())
    }

    async fn tracked_files(&self) -> Result<Vec<PathBuf>, IncrementalError> {
        Ok(self.tracked.lock().unwrap().clone())
    }
}

/// Python source dense enough to score well above the default threshold.
pub const COMPLEX_PYTHON: &str = "\
def classify(value, limits):
    if value is None:
        return 'missing'
    elif value < 0:
        return 'negative'
    for limit in limits:
        if value > limit and limit > 0:
            return 'over'
        while limit:
            limit -= 1
    try:
        return int(value)
    except ValueError:
        return 'invalid'


def merge(a, b):
    if a and b:
        return a + b
    return a or b
";

pub fn write_file(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

/// A report with one untested gap per cost, in the given order.
pub fn report_with_costs(costs: &[f64]) -> GapReport {
    let gaps: Vec<Gap> = costs
        .iter()
        .enumerate()
        .map(|(i, &cost)| Gap {
            source_file: PathBuf::from(format!("src/module_{i:03}.py")),
            complexity_score: 6.0,
            current_coverage: 0.0,
            gap_type: GapType::Untested,
            estimated_tokens: 5_000,
            estimated_cost: cost,
        })
        .collect();
    GapReport {
        summary: GapSummary {
            total_files: gaps.len(),
            files_needing_logical_tests: gaps.len(),
            total_gaps: gaps.len(),
            overall_assessment: Assessment::from_ratio(gaps.len(), gaps.len()),
        },
        estimated_cost: costs.iter().sum(),
        timing: ReportTiming {
            started_at: Utc::now(),
            duration_ms: 1,
        },
        model: "claude-sonnet-4".to_string(),
        gaps,
    }
}

/// A report with `n` gaps costing $0.05 each.
pub fn report_with_gaps(n: usize) -> GapReport {
    report_with_costs(&vec![0.05; n])
}

pub fn history_manager(root: &Path, config: &Config) -> HistoryManager {
    HistoryManager::new(
        root,
        StateLayout::for_project(root, &config.batching.state_dir),
        ProjectScanner::new(config.analysis.extensions.clone()),
        GapAnalyzer::from_config(config).unwrap(),
    )
}

pub fn shared<T>(value: T) -> Arc<T> {
    Arc::new(value)
}
