//! Core data types for proximity lookups and parcel features.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default search radius around a point, in meters.
pub const DEFAULT_RADIUS_M: f64 = 50.0;

/// Default wall-clock deadline for one external probe.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(8);

/// Per-call options for a proximity lookup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LookupOptions {
    pub radius_m: f64,
    pub timeout: Duration,
}

impl Default for LookupOptions {
    fn default() -> Self {
        Self {
            radius_m: DEFAULT_RADIUS_M,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl LookupOptions {
    /// Override the search radius.
    pub fn radius_m(mut self, radius_m: f64) -> Self {
        self.radius_m = radius_m;
        self
    }

    /// Override the probe deadline.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Outcome of a single external probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeOutcome {
    /// At least one qualifying feature within the radius.
    Present,
    /// The service answered and nothing qualified.
    Absent,
    /// The deadline elapsed before the service answered.
    TimedOut,
    /// Transport, status, or decoding failure.
    Failed,
}

impl ProbeOutcome {
    /// Collapse to the cached boolean. Only `Present` is `true`.
    pub fn as_bool(self) -> bool {
        matches!(self, ProbeOutcome::Present)
    }
}

impl std::fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Present => write!(f, "present"),
            Self::Absent => write!(f, "absent"),
            Self::TimedOut => write!(f, "timed out"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Errors that can occur in the enrichment library.
#[derive(thiserror::Error, Debug)]
pub enum EnrichError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache file {path} is corrupt: {reason}")]
    StoreCorrupt { path: PathBuf, reason: String },

    #[error("Cache serialization failed: {0}")]
    Serialization(String),

    #[error("Parcel data error: {0}")]
    Parcels(String),

    #[error("No parcel found at this location.")]
    NoParcel,

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Convenience result type.
pub type EnrichResult<T> = Result<T, EnrichError>;

/// Errors raised by a feature source. Never surfaced past the probe boundary.
#[derive(thiserror::Error, Debug)]
pub enum ProbeError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Probe task failed: {0}")]
    Task(String),
}

impl From<reqwest::Error> for ProbeError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ProbeError::Malformed(e.to_string())
        } else {
            ProbeError::Transport(e.to_string())
        }
    }
}
