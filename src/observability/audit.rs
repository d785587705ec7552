//! Recovery audit log
//!
//! - One JSON object per line: `{id, timestamp, event, outcome, details}`
//! - Append-only: the file is opened in append mode and never truncated
//! - Every append is synced before it returns
//! - Detail keys that name secret material are dropped on insertion

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::events::Event;
use super::outcome::RecoveryOutcome;
use super::errors::{AuditError, AuditResult};
use super::is_secret_key;

/// A single audit log line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    /// Unique entry ID
    pub id: Uuid,
    /// RFC 3339 UTC timestamp
    pub timestamp: String,
    /// Event name
    pub event: String,
    /// Outcome classification
    pub outcome: RecoveryOutcome,
    details: BTreeMap<String, Value>,
}

impl AuditLogEntry {
    /// Create a new entry stamped with the current time.
    pub fn new(event: Event, outcome: RecoveryOutcome) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            event: event.as_str().to_string(),
            outcome,
            details: BTreeMap::new(),
        }
    }

    /// Attach a detail. Keys naming secrets are silently dropped.
    pub fn with_detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        if !is_secret_key(key) {
            self.details.insert(key.to_string(), value.into());
        }
        self
    }

    /// Details attached to this entry
    pub fn details(&self) -> &BTreeMap<String, Value> {
        &self.details
    }

    /// Serialize to a single JSON line (without the newline).
    pub fn to_json_line(&self) -> AuditResult<String> {
        serde_json::to_string(self).map_err(AuditError::encode)
    }
}

/// Append-only audit sink.
pub trait AuditLog {
    /// Append an entry. The entry must be durable when this returns.
    fn append(&self, entry: &AuditLogEntry) -> AuditResult<()>;
}

/// File-backed audit log at `logs/recovery.log`.
pub struct FileAuditLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileAuditLog {
    /// Open or create the log file, creating its directory if needed.
    pub fn open(path: impl AsRef<Path>) -> AuditResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| AuditError::open(&path, e))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| AuditError::open(&path, e))?;

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Get the audit log path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, File> {
        // A poisoned lock still guards a valid append-mode handle.
        self.file.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl AuditLog for FileAuditLog {
    fn append(&self, entry: &AuditLogEntry) -> AuditResult<()> {
        let mut line = entry.to_json_line()?;
        line.push('\n');

        let mut file = self.lock();
        file.write_all(line.as_bytes())
            .map_err(|e| AuditError::write(&self.path, "append", e))?;
        file.sync_all()
            .map_err(|e| AuditError::write(&self.path, "fsync", e))
    }
}

/// In-memory audit log for testing and dry runs.
#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    entries: Mutex<Vec<AuditLogEntry>>,
}

impl MemoryAuditLog {
    /// Create a new in-memory audit log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all recorded entries.
    pub fn entries(&self) -> Vec<AuditLogEntry> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Event names in append order.
    pub fn events(&self) -> Vec<String> {
        self.entries().into_iter().map(|e| e.event).collect()
    }
}

impl AuditLog for MemoryAuditLog {
    fn append(&self, entry: &AuditLogEntry) -> AuditResult<()> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(entry.clone());
        Ok(())
    }
}
