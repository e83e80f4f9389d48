//! Backup artifact naming and retention.
//!
//! Backups live in a single directory and are named
//! `<file_name>.<timestamp>.bak`, where the timestamp is RFC 3339 with every
//! `:` and `.` replaced by `-` so the name is safe on every filesystem.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupEntry {
    pub path: PathBuf,
    pub modified: SystemTime,
}

impl BackupEntry {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Name of the backup artifact for `file_name` taken at `at`.
pub fn backup_file_name(file_name: &str, at: DateTime<Utc>) -> String {
    let stamp = at
        .to_rfc3339_opts(SecondsFormat::Nanos, true)
        .replace([':', '.'], "-");
    format!("{file_name}.{stamp}.bak")
}

/// All backups of `file_name` in `backup_dir`, newest first.
///
/// Entries with identical modification times are ordered by file name,
/// newest stamp first. A missing directory yields an empty list.
pub fn list_backups(backup_dir: &Path, file_name: &str) -> crate::Result<Vec<BackupEntry>> {
    if !backup_dir.exists() {
        return Ok(Vec::new());
    }

    let pattern = format!(
        "{}/{}.*",
        glob::Pattern::escape(&backup_dir.to_string_lossy()),
        glob::Pattern::escape(file_name)
    );

    let mut entries = Vec::new();
    for path in glob::glob(&pattern)?.flatten() {
        if !path.is_file() {
            continue;
        }
        match std::fs::metadata(&path).and_then(|m| m.modified()) {
            Ok(modified) => entries.push(BackupEntry { path, modified }),
            Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable backup"),
        }
    }

    entries.sort_by(|a, b| {
        b.modified
            .cmp(&a.modified)
            .then_with(|| b.file_name().cmp(&a.file_name()))
    });
    Ok(entries)
}

/// Deletes every backup of `file_name` beyond the `keep` most recent.
///
/// Returns how many files were removed. Individual deletion failures are
/// logged and skipped.
pub fn cleanup_backups(backup_dir: &Path, file_name: &str, keep: usize) -> crate::Result<usize> {
    let entries = list_backups(backup_dir, file_name)?;
    let mut removed = 0;

    for entry in entries.iter().skip(keep) {
        match std::fs::remove_file(&entry.path) {
            Ok(()) => {
                removed += 1;
                debug!(path = %entry.path.display(), "Removed old backup");
            }
            Err(e) => warn!(path = %entry.path.display(), error = %e, "Failed to remove old backup"),
        }
    }

    Ok(removed)
}
