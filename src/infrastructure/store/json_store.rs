//! Minimal JSON file store.
//!
//! Every whole-file write goes through a temp file in the destination
//! directory, is fsynced, then renamed over the target, so readers see either
//! the old or the new document and never a torn one.

use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::domain::errors::StoreError;

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn ensure_parent(path: &Path) -> Result<PathBuf, StoreError> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    fs::create_dir_all(&parent).map_err(io_err(&parent))?;
    Ok(parent)
}

fn write_temp(path: &Path, bytes: &[u8]) -> Result<NamedTempFile, StoreError> {
    let parent = ensure_parent(path)?;
    let mut tmp = NamedTempFile::new_in(&parent).map_err(io_err(&parent))?;
    tmp.write_all(bytes).map_err(io_err(path))?;
    tmp.as_file().sync_all().map_err(io_err(path))?;
    Ok(tmp)
}

/// Read and parse a JSON document. Returns `Ok(None)` if the file does not exist.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(io_err(path)(e)),
    };
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| StoreError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

/// Atomically replace `path` with the JSON rendering of `value`.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let mut bytes = serde_json::to_vec_pretty(value)?;
    bytes.push(b'\n');
    let tmp = write_temp(path, &bytes)?;
    tmp.persist(path).map_err(|e| io_err(path)(e.error))?;
    debug!(path = %path.display(), "wrote json document");
    Ok(())
}

/// Atomically create `path`, failing if it already exists.
pub fn create_json_exclusive<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let mut bytes = serde_json::to_vec_pretty(value)?;
    bytes.push(b'\n');
    let tmp = write_temp(path, &bytes)?;
    tmp.persist_noclobber(path).map_err(|e| io_err(path)(e.error))?;
    Ok(())
}

/// Append one JSON record as a line.
pub fn append_json_line<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    ensure_parent(path)?;
    let mut line = serde_json::to_vec(value)?;
    line.push(b'\n');
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(io_err(path))?;
    file.write_all(&line).map_err(io_err(path))?;
    file.sync_data().map_err(io_err(path))?;
    Ok(())
}

/// Read all JSON-lines records. Malformed lines are skipped with a warning.
pub fn read_json_lines<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, StoreError> {
    let file = match fs::File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(io_err(path)(e)),
    };

    let mut records = Vec::new();
    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(io_err(path))?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(&line) {
            Ok(record) => records.push(record),
            Err(e) => warn!(
                path = %path.display(),
                line = line_no + 1,
                error = %e,
                "skipping malformed record"
            ),
        }
    }
    Ok(records)
}

/// Atomically rewrite a JSON-lines file with the given records.
pub fn rewrite_json_lines<T: Serialize>(path: &Path, records: &[T]) -> Result<(), StoreError> {
    let mut bytes = Vec::new();
    for record in records {
        bytes.extend(serde_json::to_vec(record)?);
        bytes.push(b'\n');
    }
    let tmp = write_temp(path, &bytes)?;
    tmp.persist(path).map_err(|e| io_err(path)(e.error))?;
    Ok(())
}

/// Remove a file. Returns whether it existed.
pub fn remove_if_exists(path: &Path) -> Result<bool, StoreError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(io_err(path)(e)),
    }
}

/// Stable short key for a project path.
///
/// The path is canonicalized when it exists so `.` and an absolute spelling
/// of the same directory map to the same key.
pub fn project_key(project: &Path) -> String {
    let canonical = project
        .canonicalize()
        .unwrap_or_else(|_| project.to_path_buf());
    let digest = Sha256::digest(canonical.to_string_lossy().as_bytes());
    digest
        .iter()
        .take(8)
        .map(|b| format!("{b:02x}"))
        .collect()
}
