//! JSON file persistence for the proximity records.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::types::{EnrichError, EnrichResult};

/// Number of new entries between automatic flushes.
pub const FLUSH_INTERVAL: u64 = 10;

/// In-memory record map: canonical key to cached result.
pub type RecordMap = HashMap<String, bool>;

/// Durable backing file for the proximity cache.
///
/// The file holds one JSON object mapping `"<lat>,<lon>"` keys to booleans.
/// It is read fully at startup and rewritten fully on every flush.
#[derive(Debug, Clone)]
pub struct CacheStore {
    path: PathBuf,
    flush_interval: u64,
}

impl CacheStore {
    /// Create a store backed by `path` with the default flush interval.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            flush_interval: FLUSH_INTERVAL,
        }
    }

    /// Change the flush interval. Zero is treated as one (flush every entry).
    pub fn with_flush_interval(mut self, interval: u64) -> Self {
        self.flush_interval = interval.max(1);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn flush_interval(&self) -> u64 {
        self.flush_interval
    }

    /// Load the records from disk.
    ///
    /// A missing file yields an empty map. A file that exists but cannot be
    /// read or decoded is an error; nothing is discarded silently.
    pub fn load(&self) -> EnrichResult<RecordMap> {
        if !self.path.exists() {
            tracing::info!("No cache file at {}, starting empty", self.path.display());
            return Ok(RecordMap::new());
        }

        let bytes = std::fs::read(&self.path).map_err(|e| EnrichError::StoreCorrupt {
            path: self.path.clone(),
            reason: format!("read failed: {e}"),
        })?;

        let records: RecordMap =
            serde_json::from_slice(&bytes).map_err(|e| EnrichError::StoreCorrupt {
                path: self.path.clone(),
                reason: format!("expected a JSON object of booleans: {e}"),
            })?;

        tracing::info!(
            "Loaded {} cached records from {}",
            records.len(),
            self.path.display()
        );
        Ok(records)
    }

    /// Replace the file with the full contents of `records`.
    ///
    /// Writes a sibling temp file first and renames it over the target, so a
    /// crash mid-write leaves the previous file intact.
    pub fn save(&self, records: &RecordMap) -> EnrichResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let payload = serde_json::to_vec(records)
            .map_err(|e| EnrichError::Serialization(e.to_string()))?;

        let tmp = self.temp_path();
        std::fs::write(&tmp, &payload)?;
        if let Err(e) = std::fs::rename(&tmp, &self.path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(e.into());
        }

        tracing::debug!(
            "Saved {} records to {}",
            records.len(),
            self.path.display()
        );
        Ok(())
    }

    /// Save only when `mutation_count` lands on a flush boundary.
    ///
    /// Returns `true` when a write happened.
    pub fn maybe_flush(&self, records: &RecordMap, mutation_count: u64) -> EnrichResult<bool> {
        if mutation_count == 0 || mutation_count % self.flush_interval != 0 {
            return Ok(false);
        }
        self.save(records)?;
        Ok(true)
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}
