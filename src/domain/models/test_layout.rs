//! Naming conventions that map source files to their test files.

use std::path::{Path, PathBuf};

const TEST_DIRS: &[&str] = &["tests", "test", "__tests__", "spec"];

/// Whether a path looks like a test file rather than a source file.
pub fn is_test_file(path: &Path) -> bool {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    if name.starts_with("test_")
        || stem.ends_with("_test")
        || stem.ends_with("_spec")
        || name.contains(".test.")
        || name.contains(".spec.")
        || (stem.ends_with("test") && name.ends_with(".java"))
    {
        return true;
    }

    path.components().any(|c| {
        let part = c.as_os_str().to_string_lossy();
        TEST_DIRS.contains(&part.as_ref())
    })
}

/// Conventional test file path for a source file, next to the source.
pub fn test_path_for(source: &Path) -> PathBuf {
    let parent = source.parent().unwrap_or_else(|| Path::new(""));
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = source
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let file_name = match ext.as_str() {
        "js" | "jsx" | "ts" | "tsx" | "mjs" | "cjs" => format!("{stem}.test.{ext}"),
        "go" | "rs" | "rb" => format!("{stem}_test.{ext}"),
        "java" => format!("{stem}Test.java"),
        _ => format!("test_{name}"),
    };
    parent.join(file_name)
}

/// All locations where an existing test for `source` may live, conventional
/// path first.
pub fn candidate_test_paths(source: &Path) -> Vec<PathBuf> {
    let parent = source.parent().unwrap_or_else(|| Path::new(""));
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = source
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut candidates = vec![test_path_for(source)];
    let alternates = [
        parent.join(format!("test_{name}")),
        parent.join(format!("{stem}_test.{ext}")),
        parent.join(format!("{stem}.test.{ext}")),
        parent.join(format!("{stem}.spec.{ext}")),
        parent.join("tests").join(format!("test_{name}")),
        parent.join("__tests__").join(format!("{stem}.test.{ext}")),
    ];
    for alt in alternates {
        if !candidates.contains(&alt) {
            candidates.push(alt);
        }
    }
    candidates
}

/// First existing test file for `source`, resolved against `root`.
pub fn find_existing_test(root: &Path, source: &Path) -> Option<PathBuf> {
    candidate_test_paths(source)
        .into_iter()
        .find(|candidate| root.join(candidate).is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_python_test_path() {
        assert_eq!(
            test_path_for(Path::new("src/utils.py")),
            PathBuf::from("src/test_utils.py")
        );
    }

    #[test]
    fn test_typescript_and_go_test_paths() {
        assert_eq!(
            test_path_for(Path::new("web/api.ts")),
            PathBuf::from("web/api.test.ts")
        );
        assert_eq!(
            test_path_for(Path::new("pkg/server.go")),
            PathBuf::from("pkg/server_test.go")
        );
    }

    #[test]
    fn test_is_test_file() {
        assert!(is_test_file(Path::new("src/test_utils.py")));
        assert!(is_test_file(Path::new("web/api.test.ts")));
        assert!(is_test_file(Path::new("pkg/server_test.go")));
        assert!(is_test_file(Path::new("tests/integration.rs")));
        assert!(!is_test_file(Path::new("src/utils.py")));
        assert!(!is_test_file(Path::new("src/contest.py")));
    }

    #[test]
    fn test_candidates_start_with_conventional_path() {
        let candidates = candidate_test_paths(Path::new("src/service.py"));
        assert_eq!(candidates[0], PathBuf::from("src/test_service.py"));
        assert!(candidates.contains(&PathBuf::from("src/tests/test_service.py")));
    }
}
