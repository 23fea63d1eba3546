//! File-based checkpoint storage
//!
//! Directory structure:
//! ```text
//! .checkpoints/
//!   vorgaenge.checkpoint.json
//!   drucksachen.checkpoint.json
//! ```

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{info, warn};
use parking_lot::Mutex;

use crate::error::SyncError;
use crate::models::Checkpoint;

/// Reads and writes one checkpoint file per resource
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Get the file path for a resource's checkpoint
    pub fn path(&self, resource_name: &str) -> PathBuf {
        self.dir.join(format!("{}.checkpoint.json", resource_name))
    }

    /// Load the checkpoint for a resource
    ///
    /// A missing file is not an error and yields `None`.
    pub fn load(&self, resource_name: &str) -> Result<Option<Checkpoint>, SyncError> {
        let path = self.path(resource_name);

        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(SyncError::Io {
                    action: "failed to read checkpoint",
                    path,
                    source,
                });
            }
        };

        let checkpoint: Checkpoint =
            serde_json::from_slice(&data).map_err(|source| SyncError::Json {
                action: "failed to parse checkpoint",
                path: path.clone(),
                source,
            })?;

        Ok(Some(checkpoint.for_resource(resource_name)))
    }

    /// Save a checkpoint, overwriting any previous one for the resource
    pub fn save(
        &self,
        resource_name: &str,
        watermark: DateTime<Utc>,
    ) -> Result<Checkpoint, SyncError> {
        fs::create_dir_all(&self.dir).map_err(|source| SyncError::Io {
            action: "failed to create checkpoint directory",
            path: self.dir.clone(),
            source,
        })?;

        let checkpoint = Checkpoint::new(resource_name, watermark);
        let path = self.path(resource_name);

        let data = serde_json::to_vec_pretty(&checkpoint).map_err(|source| SyncError::Json {
            action: "failed to serialize checkpoint",
            path: path.clone(),
            source,
        })?;

        fs::write(&path, data).map_err(|source| SyncError::Io {
            action: "failed to write checkpoint",
            path,
            source,
        })?;

        Ok(checkpoint)
    }

    /// Delete a resource's checkpoint (absent is not an error)
    pub fn delete(&self, resource_name: &str) -> Result<(), SyncError> {
        let path = self.path(resource_name);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(SyncError::Io {
                action: "failed to delete checkpoint",
                path,
                source,
            }),
        }
    }
}

/// In-memory watermark for one resource, backed by a [`CheckpointStore`]
///
/// Clones share the same watermark, so the interrupt callback can persist
/// exactly what the worker has observed so far.
#[derive(Debug, Clone)]
pub struct CheckpointTracker {
    store: CheckpointStore,
    resource_name: String,
    watermark: Arc<Mutex<Option<DateTime<Utc>>>>,
}

impl CheckpointTracker {
    pub fn new(store: CheckpointStore, resource_name: impl Into<String>) -> Self {
        Self {
            store,
            resource_name: resource_name.into(),
            watermark: Arc::new(Mutex::new(None)),
        }
    }

    pub fn resource_name(&self) -> &str {
        &self.resource_name
    }

    /// Load the stored checkpoint and adopt its watermark
    pub fn load(&self) -> Result<Option<Checkpoint>, SyncError> {
        let checkpoint = self.store.load(&self.resource_name)?;
        if let Some(checkpoint) = &checkpoint {
            self.advance(checkpoint.last_watermark);
            info!(
                "Resuming {} from checkpoint: {}",
                self.resource_name,
                checkpoint.last_watermark.format("%Y-%m-%d %H:%M:%S")
            );
        }
        Ok(checkpoint)
    }

    /// Move the watermark forward; returns false if `date` is not newer
    pub fn advance(&self, date: DateTime<Utc>) -> bool {
        let mut watermark = self.watermark.lock();
        match *watermark {
            Some(current) if date <= current => false,
            _ => {
                *watermark = Some(date);
                true
            }
        }
    }

    pub fn watermark(&self) -> Option<DateTime<Utc>> {
        *self.watermark.lock()
    }

    /// Persist the current watermark
    ///
    /// Does nothing and returns `None` if no watermark has been observed.
    /// The lock is held while writing so concurrent saves never interleave.
    pub fn save(&self) -> Result<Option<Checkpoint>, SyncError> {
        let watermark = self.watermark.lock();
        let Some(date) = *watermark else {
            return Ok(None);
        };

        let checkpoint = self.store.save(&self.resource_name, date)?;
        info!(
            "Checkpoint saved for {} at {}",
            self.resource_name,
            date.format("%Y-%m-%d %H:%M:%S")
        );
        Ok(Some(checkpoint))
    }

    /// Save from a context that cannot propagate errors (signal callbacks)
    pub fn save_or_log(&self) {
        if let Err(e) = self.save() {
            warn!("Failed to save checkpoint for {}: {}", self.resource_name, e);
        }
    }

    /// Remove the persisted checkpoint after a complete run
    pub fn delete(&self) -> Result<(), SyncError> {
        self.store.delete(&self.resource_name)
    }
}
