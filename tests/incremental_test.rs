//! Incremental runs over a fake repository.

mod common;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use testweaver::domain::models::{ChangeKind, Config, FileChange, IncrementalOptions};
use testweaver::domain::ports::VersionControl;
use testweaver::infrastructure::scanner::ProjectScanner;
use testweaver::infrastructure::store::StateLayout;
use testweaver::services::{ChangeDetector, IncrementalCoordinator};

use common::{history_manager, temp_dir, write_file, FakeVcs, MockEngine, COMPLEX_PYTHON};

fn coordinator(root: &Path, vcs: Arc<FakeVcs>, engine: Arc<MockEngine>) -> IncrementalCoordinator {
    let config = Config::default();
    let layout = StateLayout::for_project(root, &config.batching.state_dir);
    let vcs: Arc<dyn VersionControl> = vcs;
    let detector = ChangeDetector::new(root, vcs, layout.incremental_state());
    IncrementalCoordinator::new(
        root,
        config.clone(),
        detector,
        Arc::new(ProjectScanner::new(config.analysis.extensions.clone())),
        engine,
        history_manager(root, &config),
    )
}

/// Every file under `root`, relative, with its content.
fn snapshot(root: &Path) -> BTreeSet<(PathBuf, Vec<u8>)> {
    fn walk(root: &Path, dir: &Path, out: &mut BTreeSet<(PathBuf, Vec<u8>)>) {
        for entry in std::fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                walk(root, &path, out);
            } else {
                let rel = path.strip_prefix(root).unwrap().to_path_buf();
                out.insert((rel, std::fs::read(&path).unwrap()));
            }
        }
    }
    let mut out = BTreeSet::new();
    walk(root, root, &mut out);
    out
}

#[tokio::test]
async fn test_dry_run_lists_updated_test_without_side_effects() {
    let dir = temp_dir();
    write_file(dir.path(), "src/calc.py", COMPLEX_PYTHON);
    write_file(dir.path(), "src/test_calc.py", "def test_merge():\n    assert merge(1, 2) == 3\n");
    let before = snapshot(dir.path());

    let vcs = Arc::new(FakeVcs::new(vec![FileChange::new("src/calc.py", ChangeKind::Modified)]));
    let engine = Arc::new(MockEngine::new());
    let update = coordinator(dir.path(), vcs, engine.clone())
        .generate_incremental(&IncrementalOptions {
            dry_run: true,
            ..IncrementalOptions::default()
        })
        .await
        .unwrap();

    assert!(update.dry_run);
    assert_eq!(update.changed_files, vec![PathBuf::from("src/calc.py")]);
    assert_eq!(update.updated_tests, vec![PathBuf::from("src/test_calc.py")]);
    assert!(update.new_tests.is_empty());
    assert!(update.cost_estimate > 0.0);
    assert!(update.generation.is_none());

    assert_eq!(engine.generate_calls(), 0);
    assert_eq!(snapshot(dir.path()), before);
    assert!(!dir.path().join(".testweaver").exists());
}

#[tokio::test]
async fn test_second_run_without_changes_is_a_noop() {
    let dir = temp_dir();
    write_file(dir.path(), "src/calc.py", COMPLEX_PYTHON);
    write_file(dir.path(), "README.md", "# demo\n");

    let vcs = Arc::new(FakeVcs::new(vec![
        FileChange::new("src/calc.py", ChangeKind::Added),
        FileChange::new("README.md", ChangeKind::Added),
    ]));
    let engine = Arc::new(MockEngine::new());
    let coordinator = coordinator(dir.path(), Arc::clone(&vcs), engine.clone());

    let first = coordinator
        .generate_incremental(&IncrementalOptions::default())
        .await
        .unwrap();
    assert_eq!(first.new_tests, vec![PathBuf::from("src/test_calc.py")]);
    assert_eq!(first.skipped_files, vec![PathBuf::from("README.md")]);
    assert_eq!(first.generation.as_ref().map(|s| s.completed), Some(1));
    assert!(dir.path().join("src/test_calc.py").is_file());
    assert_eq!(engine.generate_calls(), 1);

    // Version control now also reports the generated test as untracked.
    vcs.set_changes(vec![
        FileChange::new("src/calc.py", ChangeKind::Added),
        FileChange::new("README.md", ChangeKind::Added),
        FileChange::new("src/test_calc.py", ChangeKind::Added),
    ]);

    let second = coordinator
        .generate_incremental(&IncrementalOptions::default())
        .await
        .unwrap();
    assert!(second.changed_files.is_empty());
    assert!(second.new_tests.is_empty());
    assert!(second.updated_tests.is_empty());
    assert_eq!(second.cost_estimate, 0.0);
    assert!(second.is_noop());
    assert_eq!(engine.generate_calls(), 1);
}

#[tokio::test]
async fn test_edit_after_run_is_detected_again() {
    let dir = temp_dir();
    write_file(dir.path(), "src/calc.py", COMPLEX_PYTHON);
    let vcs = Arc::new(FakeVcs::new(vec![FileChange::new("src/calc.py", ChangeKind::Modified)]));
    let coordinator = coordinator(dir.path(), vcs, Arc::new(MockEngine::new()));

    let options = IncrementalOptions {
        skip_ai: true,
        ..IncrementalOptions::default()
    };
    coordinator.generate_incremental(&options).await.unwrap();
    assert!(coordinator.generate_incremental(&options).await.unwrap().is_noop());

    write_file(dir.path(), "src/calc.py", &format!("{COMPLEX_PYTHON}\n\ndef extra():\n    return 1\n"));
    let update = coordinator.generate_incremental(&options).await.unwrap();
    assert_eq!(update.changed_files, vec![PathBuf::from("src/calc.py")]);
}

#[tokio::test]
async fn test_deleted_source_removes_orphaned_test() {
    let dir = temp_dir();
    write_file(dir.path(), "src/test_old.py", "def test_old():\n    assert True\n");
    let vcs = Arc::new(FakeVcs::new(vec![FileChange::new("src/old.py", ChangeKind::Deleted)]));
    let engine = Arc::new(MockEngine::new());

    let update = coordinator(dir.path(), vcs, engine.clone())
        .generate_incremental(&IncrementalOptions {
            skip_ai: true,
            ..IncrementalOptions::default()
        })
        .await
        .unwrap();

    assert_eq!(update.deleted_tests, vec![PathBuf::from("src/test_old.py")]);
    assert!(!dir.path().join("src/test_old.py").exists());
    assert_eq!(engine.generate_calls(), 0);
}

#[tokio::test]
async fn test_deletion_after_recorded_run_removes_orphaned_test() {
    let dir = temp_dir();
    write_file(dir.path(), "README.md", "# demo\n");
    write_file(dir.path(), "src/test_old.py", "def test_old():\n    assert True\n");
    let vcs = Arc::new(FakeVcs::new(vec![FileChange::new("README.md", ChangeKind::Modified)]));
    let coordinator = coordinator(dir.path(), Arc::clone(&vcs), Arc::new(MockEngine::new()));
    let options = IncrementalOptions {
        skip_ai: true,
        ..IncrementalOptions::default()
    };

    coordinator.generate_incremental(&options).await.unwrap();

    // src/old.py was committed before the first run and never touched by it.
    vcs.set_changes(vec![
        FileChange::new("README.md", ChangeKind::Modified),
        FileChange::new("src/old.py", ChangeKind::Deleted),
    ]);
    let update = coordinator.generate_incremental(&options).await.unwrap();
    assert_eq!(update.changed_files, vec![PathBuf::from("src/old.py")]);
    assert_eq!(update.deleted_tests, vec![PathBuf::from("src/test_old.py")]);
    assert!(!dir.path().join("src/test_old.py").exists());

    // Once acted on, the deletion is not reported again.
    assert!(coordinator.generate_incremental(&options).await.unwrap().is_noop());
}

#[tokio::test]
async fn test_outside_a_repository_recommends_full_run() {
    let dir = temp_dir();
    write_file(dir.path(), "src/calc.py", COMPLEX_PYTHON);
    let engine = Arc::new(MockEngine::new());

    for dry_run in [true, false] {
        let mut fake = FakeVcs::new(vec![FileChange::new("src/calc.py", ChangeKind::Modified)]);
        fake.repository = false;
        let update = coordinator(dir.path(), Arc::new(fake), engine.clone())
            .generate_incremental(&IncrementalOptions {
                dry_run,
                ..IncrementalOptions::default()
            })
            .await
            .unwrap();

        assert!(update
            .full_run_reason
            .as_deref()
            .unwrap_or_default()
            .contains("Not a git repository"));
        assert!(update.is_noop());
        assert!(update.generation.is_none());
    }

    assert_eq!(engine.generate_calls(), 0);
    assert!(!dir.path().join(".testweaver").exists());
}

#[tokio::test]
async fn test_failed_generation_is_offered_again() {
    let dir = temp_dir();
    write_file(dir.path(), "src/calc.py", COMPLEX_PYTHON);
    let vcs = Arc::new(FakeVcs::new(vec![FileChange::new("src/calc.py", ChangeKind::Modified)]));
    let engine = Arc::new(MockEngine::new().failing_on_source("src/calc.py"));
    let coordinator = coordinator(dir.path(), vcs, engine.clone());

    let first = coordinator
        .generate_incremental(&IncrementalOptions::default())
        .await
        .unwrap();
    assert_eq!(first.generation.as_ref().map(|s| s.failed), Some(1));
    assert_eq!(engine.generate_calls(), 2);

    let second = coordinator
        .generate_incremental(&IncrementalOptions::default())
        .await
        .unwrap();
    assert_eq!(second.changed_files, vec![PathBuf::from("src/calc.py")]);
    assert_eq!(engine.generate_calls(), 4);
}

#[tokio::test]
async fn test_budget_excluded_file_is_offered_again() {
    let dir = temp_dir();
    write_file(dir.path(), "src/calc.py", COMPLEX_PYTHON);
    let vcs = Arc::new(FakeVcs::new(vec![FileChange::new("src/calc.py", ChangeKind::Modified)]));
    let engine = Arc::new(MockEngine::new());
    let coordinator = coordinator(dir.path(), vcs, engine.clone());

    let first = coordinator
        .generate_incremental(&IncrementalOptions {
            cost_limit: Some(0.0),
            ..IncrementalOptions::default()
        })
        .await
        .unwrap();
    assert!(first.generation.is_none());

    let second = coordinator
        .generate_incremental(&IncrementalOptions::default())
        .await
        .unwrap();
    assert_eq!(second.changed_files, vec![PathBuf::from("src/calc.py")]);
    assert_eq!(second.generation.as_ref().map(|s| s.completed), Some(1));
    assert_eq!(engine.generate_calls(), 1);
}

#[tokio::test]
async fn test_cost_limit_skips_generation_that_does_not_fit() {
    let dir = temp_dir();
    write_file(dir.path(), "src/calc.py", COMPLEX_PYTHON);
    let vcs = Arc::new(FakeVcs::new(vec![FileChange::new("src/calc.py", ChangeKind::Modified)]));
    let engine = Arc::new(MockEngine::new());

    let update = coordinator(dir.path(), vcs, engine.clone())
        .generate_incremental(&IncrementalOptions {
            cost_limit: Some(0.0),
            ..IncrementalOptions::default()
        })
        .await
        .unwrap();

    assert_eq!(update.cost_estimate, 0.0);
    assert!(update.generation.is_none());
    assert_eq!(engine.generate_calls(), 0);
}

#[tokio::test]
async fn test_recommendation_needs_recorded_state() {
    let dir = temp_dir();
    write_file(dir.path(), "src/calc.py", COMPLEX_PYTHON);
    let vcs = Arc::new(FakeVcs::new(vec![FileChange::new("src/calc.py", ChangeKind::Modified)]));
    vcs.set_tracked((0..10).map(|i| PathBuf::from(format!("src/f{i}.py"))).collect());
    let coordinator = coordinator(dir.path(), Arc::clone(&vcs), Arc::new(MockEngine::new()));

    let first = coordinator.should_use_incremental().await.unwrap();
    assert!(!first.use_incremental);

    coordinator
        .generate_incremental(&IncrementalOptions {
            skip_ai: true,
            ..IncrementalOptions::default()
        })
        .await
        .unwrap();

    write_file(dir.path(), "src/calc.py", "def changed():\n    return 2\n");
    let second = coordinator.should_use_incremental().await.unwrap();
    assert!(second.use_incremental, "{}", second.reason);
    assert_eq!(second.changed_files, 1);
    assert_eq!(second.tracked_files, 10);
}

#[tokio::test]
async fn test_not_a_repository_recommends_full_run() {
    let dir = temp_dir();
    let mut fake = FakeVcs::new(Vec::new());
    fake.repository = false;
    let recommendation = coordinator(dir.path(), Arc::new(fake), Arc::new(MockEngine::new()))
        .should_use_incremental()
        .await
        .unwrap();
    assert!(!recommendation.use_incremental);
    assert_eq!(recommendation.tracked_files, 0);
}
