//! Tracking of items that failed to store for transient reasons
//!
//! Records are buffered in memory during a run and appended to
//! `<failed-dir>/<resource>.failed.json` once at the end. The file is
//! additive across runs: existing entries are never removed or deduplicated.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::debug;
use parking_lot::Mutex;

use crate::error::{StoreError, SyncError};
use crate::models::FailedRecord;

/// Get the failed-records file path for a resource
pub fn failed_records_path(dir: impl AsRef<Path>, resource_name: &str) -> PathBuf {
    dir.as_ref().join(format!("{}.failed.json", resource_name))
}

/// Buffers transient store failures for one resource
#[derive(Debug)]
pub struct FailedRecordTracker {
    path: PathBuf,
    records: Mutex<Vec<FailedRecord>>,
}

impl FailedRecordTracker {
    pub fn new(dir: impl AsRef<Path>, resource_name: &str) -> Self {
        Self {
            path: failed_records_path(dir, resource_name),
            records: Mutex::new(Vec::new()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record `error` for `id` if it is transient
    ///
    /// Returns true if the failure was recorded. Permanent failures are not
    /// recorded; the caller is expected to log them.
    pub fn record(&self, id: &str, error: &StoreError) -> bool {
        if !error.is_transient() {
            return false;
        }
        self.record_failure(id, error.to_string());
        true
    }

    /// Record a failure unconditionally
    pub fn record_failure(&self, id: impl Into<String>, reason: impl Into<String>) {
        let record = FailedRecord::new(id, reason);
        debug!("Recording failed item {}: {}", record.id, record.reason);
        self.records.lock().push(record);
    }

    /// Number of failures buffered in this run
    pub fn count(&self) -> usize {
        self.records.lock().len()
    }

    /// Snapshot of the buffered failures
    pub fn records(&self) -> Vec<FailedRecord> {
        self.records.lock().clone()
    }

    /// Append buffered failures to the on-disk file
    ///
    /// Returns the file path if anything was written. When the buffer is
    /// empty no file is created or touched.
    pub fn flush(&self) -> Result<Option<PathBuf>, SyncError> {
        let mut records = self.records.lock();
        if records.is_empty() {
            return Ok(None);
        }

        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).map_err(|source| SyncError::Io {
                action: "failed to create failed records directory",
                path: dir.to_path_buf(),
                source,
            })?;
        }

        let mut all_records = read_records(&self.path)?;
        all_records.extend(records.iter().cloned());

        let data = serde_json::to_vec_pretty(&all_records).map_err(|source| SyncError::Json {
            action: "failed to serialize failed records",
            path: self.path.clone(),
            source,
        })?;
        fs::write(&self.path, data).map_err(|source| SyncError::Io {
            action: "failed to write failed records",
            path: self.path.clone(),
            source,
        })?;

        records.clear();
        Ok(Some(self.path.clone()))
    }
}

/// Load persisted failed records for a resource (missing file = empty)
pub fn load_failed_records(
    dir: impl AsRef<Path>,
    resource_name: &str,
) -> Result<Vec<FailedRecord>, SyncError> {
    read_records(&failed_records_path(dir, resource_name))
}

/// Remove the failed-records file for a resource (absent is not an error)
pub fn delete_failed_records(dir: impl AsRef<Path>, resource_name: &str) -> Result<(), SyncError> {
    let path = failed_records_path(dir, resource_name);
    match fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(source) => Err(SyncError::Io {
            action: "failed to delete failed records",
            path,
            source,
        }),
    }
}

fn read_records(path: &Path) -> Result<Vec<FailedRecord>, SyncError> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(SyncError::Io {
                action: "failed to read failed records",
                path: path.to_path_buf(),
                source,
            });
        }
    };

    serde_json::from_slice(&data).map_err(|source| SyncError::Json {
        action: "failed to parse failed records",
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn locked() -> StoreError {
        StoreError::new("upsert document", "database is locked")
    }

    #[test]
    fn test_only_transient_failures_are_recorded() {
        let dir = TempDir::new().unwrap();
        let tracker = FailedRecordTracker::new(dir.path(), "vorgaenge");

        assert!(tracker.record("a", &locked()));
        assert!(!tracker.record("c", &StoreError::new("upsert document", "constraint failed")));
        assert_eq!(tracker.count(), 1);

        let records = tracker.records();
        assert_eq!(records[0].id, "a");
        assert_eq!(records[0].reason, "upsert document: database is locked");
    }

    #[test]
    fn test_flush_empty_touches_nothing() {
        let dir = TempDir::new().unwrap();
        let tracker = FailedRecordTracker::new(dir.path().join("failed"), "vorgaenge");

        assert!(tracker.flush().unwrap().is_none());
        assert!(!dir.path().join("failed").exists());
    }

    #[test]
    fn test_flush_is_additive_across_runs() {
        let dir = TempDir::new().unwrap();

        let first = FailedRecordTracker::new(dir.path(), "vorgaenge");
        first.record("a", &locked());
        first.record("b", &locked());
        let path = first.flush().unwrap().unwrap();
        assert_eq!(path, dir.path().join("vorgaenge.failed.json"));

        let second = FailedRecordTracker::new(dir.path(), "vorgaenge");
        second.record("a", &locked());
        second.flush().unwrap();

        let ids: Vec<String> = load_failed_records(dir.path(), "vorgaenge")
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["a", "b", "a"]);
    }

    #[test]
    fn test_flush_clears_buffer() {
        let dir = TempDir::new().unwrap();
        let tracker = FailedRecordTracker::new(dir.path(), "personen");
        tracker.record("a", &locked());
        tracker.flush().unwrap();

        assert_eq!(tracker.count(), 0);
        assert!(tracker.flush().unwrap().is_none());
        assert_eq!(load_failed_records(dir.path(), "personen").unwrap().len(), 1);
    }

    #[test]
    fn test_flush_refuses_to_clobber_corrupt_file() {
        let dir = TempDir::new().unwrap();
        fs::write(failed_records_path(dir.path(), "personen"), "oops").unwrap();

        let tracker = FailedRecordTracker::new(dir.path(), "personen");
        tracker.record("a", &locked());
        assert!(matches!(tracker.flush(), Err(SyncError::Json { .. })));
        assert_eq!(tracker.count(), 1);
    }

    #[test]
    fn test_load_and_delete() {
        let dir = TempDir::new().unwrap();
        assert!(load_failed_records(dir.path(), "missing").unwrap().is_empty());

        let tracker = FailedRecordTracker::new(dir.path(), "drucksachen");
        tracker.record_failure("x", "manual");
        tracker.flush().unwrap();

        delete_failed_records(dir.path(), "drucksachen").unwrap();
        delete_failed_records(dir.path(), "drucksachen").unwrap();
        assert!(load_failed_records(dir.path(), "drucksachen").unwrap().is_empty());
    }
}
