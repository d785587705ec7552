//! Crash-safe file replacement
//!
//! Write sequence:
//! 1. Create a uniquely named temp file next to the target
//! 2. Write and fsync it
//! 3. Rename it onto the target (atomic on the same filesystem)
//! 4. fsync the parent directory so the rename itself is durable
//!
//! A crash before step 3 leaves the previous file untouched. If the rename
//! fails, the temp file is removed before the error is returned.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

use serde_json::Value;
use tempfile::{Builder, NamedTempFile};

use super::errors::{PersistenceError, PersistenceResult};
use super::merge::deep_merge;

/// Suffix of in-flight temp files. Nothing else in the layout uses it.
pub const TEMP_SUFFIX: &str = ".tmp";

/// Atomically replace `path` with `data`.
pub fn write_bytes_atomic(path: &Path, data: &[u8]) -> PersistenceResult<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => return Err(PersistenceError::no_parent(path)),
    };
    fs::create_dir_all(parent).map_err(|e| PersistenceError::temp_write(path, e))?;

    let mut temp = stage(path, parent, data).map_err(|e| PersistenceError::temp_write(path, e))?;
    temp.flush().map_err(|e| PersistenceError::temp_write(path, e))?;

    if let Err(err) = temp.persist(path) {
        let rename_error = err.error;
        // `close` unlinks the temp file; its own failure must not mask the rename error.
        let _ = err.file.close();
        return Err(PersistenceError::rename(path, rename_error));
    }

    sync_dir(parent).map_err(|e| PersistenceError::rename(path, e))
}

fn stage(path: &Path, parent: &Path, data: &[u8]) -> io::Result<NamedTempFile> {
    let prefix = format!(
        ".{}.",
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    );
    let mut temp = Builder::new()
        .prefix(&prefix)
        .suffix(TEMP_SUFFIX)
        .tempfile_in(parent)?;
    temp.write_all(data)?;
    temp.as_file().sync_all()?;
    Ok(temp)
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}

/// Read a JSON document. A missing file reads as `None`.
pub fn read_document(path: &Path) -> PersistenceResult<Option<Value>> {
    let contents = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(PersistenceError::read(path, e)),
    };
    serde_json::from_slice(&contents)
        .map(Some)
        .map_err(|e| PersistenceError::parse(path, e))
}

/// Deep-merge `document` into whatever is on disk at `path` and write the
/// result atomically. Returns the document as written.
///
/// An unparseable existing file is an error; it is never silently replaced.
pub fn write_document_atomic(path: &Path, document: &Value) -> PersistenceResult<Value> {
    let merged = match read_document(path)? {
        Some(existing) => deep_merge(existing, document.clone()),
        None => document.clone(),
    };

    let mut bytes = serde_json::to_vec_pretty(&merged).map_err(PersistenceError::serialize)?;
    bytes.push(b'\n');
    write_bytes_atomic(path, &bytes)?;
    Ok(merged)
}
