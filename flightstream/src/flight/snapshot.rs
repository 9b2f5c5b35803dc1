//! Snapshot persistence seams.
//!
//! The pipeline itself keeps no durable state. The surrounding system may
//! supply a [`SnapshotSink`] that receives the current flight set after real
//! updates, and a [`SnapshotSource`] that seeds the cache with a
//! last-known-good set at start, before the upstream feed is connected.
//!
//! [`JsonSnapshotStore`] implements both against a single JSON file. Writes go
//! to a temporary file first and are renamed into place so a reader never
//! sees a half-written snapshot.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::model::FlightRecord;

/// Default maximum age of a snapshot file that is still used for seeding.
pub const DEFAULT_MAX_SNAPSHOT_AGE: Duration = Duration::from_secs(15 * 60);

/// Errors from snapshot persistence.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Snapshot I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Snapshot encoding error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Receives the current flight set after real updates.
pub trait SnapshotSink: Send + Sync {
    fn persist_snapshot(&self, flights: &[FlightRecord]) -> Result<(), SnapshotError>;
}

/// Provides a last-known-good flight set at start.
pub trait SnapshotSource: Send + Sync {
    /// Returns `Ok(None)` when no usable snapshot exists.
    fn load_snapshot(&self) -> Result<Option<Vec<FlightRecord>>, SnapshotError>;
}

#[derive(Serialize, Deserialize)]
struct SnapshotFile {
    saved_at: chrono::DateTime<chrono::Utc>,
    flights: Vec<FlightRecord>,
}

/// JSON file snapshot store.
#[derive(Debug, Clone)]
pub struct JsonSnapshotStore {
    path: PathBuf,
    max_age: Duration,
}

impl JsonSnapshotStore {
    /// Store backed by `path`, ignoring snapshots older than the default age.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_age: DEFAULT_MAX_SNAPSHOT_AGE,
        }
    }

    /// Set the maximum age of a snapshot that is still loaded.
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    /// Path of the snapshot file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> SnapshotError {
        SnapshotError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn is_too_old(&self) -> bool {
        let modified = std::fs::metadata(&self.path).and_then(|m| m.modified());
        match modified {
            Ok(modified) => SystemTime::now()
                .duration_since(modified)
                .map(|age| age > self.max_age)
                .unwrap_or(false),
            Err(_) => false,
        }
    }
}

impl SnapshotSink for JsonSnapshotStore {
    fn persist_snapshot(&self, flights: &[FlightRecord]) -> Result<(), SnapshotError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
            }
        }

        let file = SnapshotFile {
            saved_at: chrono::Utc::now(),
            flights: flights.to_vec(),
        };
        let json = serde_json::to_vec(&file)?;

        let temp_path = self.path.with_extension("tmp");
        std::fs::write(&temp_path, json).map_err(|e| self.io_error(e))?;
        std::fs::rename(&temp_path, &self.path).map_err(|e| self.io_error(e))?;

        tracing::debug!(path = %self.path.display(), flights = flights.len(), "Saved flight snapshot");
        Ok(())
    }
}

impl SnapshotSource for JsonSnapshotStore {
    fn load_snapshot(&self) -> Result<Option<Vec<FlightRecord>>, SnapshotError> {
        if !self.path.exists() {
            return Ok(None);
        }

        if self.is_too_old() {
            tracing::info!(path = %self.path.display(), "Flight snapshot is too old, ignoring it");
            return Ok(None);
        }

        let bytes = std::fs::read(&self.path).map_err(|e| self.io_error(e))?;
        let file: SnapshotFile = serde_json::from_slice(&bytes)?;

        tracing::info!(
            path = %self.path.display(),
            flights = file.flights.len(),
            saved_at = %file.saved_at,
            "Loaded flight snapshot"
        );
        Ok(Some(file.flights))
    }
}
