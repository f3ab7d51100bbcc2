//! Deadline-bounded execution of a single external feature query.
//!
//! The query runs on its own tokio task. The caller waits at most the given
//! timeout for it; when the deadline passes the task is aborted and the probe
//! answers `false`. Failures never propagate past this boundary.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::geokey::GeoKey;
use crate::types::{ProbeError, ProbeOutcome};

/// Buffered probe events per subscriber before the oldest are dropped.
const EVENT_BUFFER: usize = 256;

/// An external geodata service that can answer proximity questions.
#[async_trait]
pub trait FeatureSource: Send + Sync {
    /// Whether at least one qualifying feature lies within `radius_m` meters
    /// of `(lat, lon)`.
    async fn features_within(&self, lat: f64, lon: f64, radius_m: f64) -> Result<bool, ProbeError>;
}

/// Structured progress event emitted once per probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeEvent {
    pub key: String,
    pub duration_ms: u64,
    pub outcome: ProbeOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Full result of one probe, before it collapses to a boolean.
#[derive(Debug, Clone)]
pub struct ProbeReport {
    pub outcome: ProbeOutcome,
    pub duration: Duration,
    pub detail: Option<String>,
}

impl ProbeReport {
    pub fn found(&self) -> bool {
        self.outcome.as_bool()
    }
}

/// Aborts the wrapped task when dropped, so a cancelled caller never leaves
/// its query running.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Runs a [`FeatureSource`] under a hard wall-clock deadline.
#[derive(Clone)]
pub struct BoundedProbe {
    source: Arc<dyn FeatureSource>,
    events: broadcast::Sender<ProbeEvent>,
}

impl BoundedProbe {
    pub fn new(source: Arc<dyn FeatureSource>) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self { source, events }
    }

    /// Receive a [`ProbeEvent`] for every probe started after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<ProbeEvent> {
        self.events.subscribe()
    }

    /// Probe and collapse the outcome: `true` only when a feature was found
    /// before the deadline.
    pub async fn probe(&self, lat: f64, lon: f64, radius_m: f64, timeout: Duration) -> bool {
        let key = GeoKey::normalize(lat, lon);
        self.probe_detailed(&key, lat, lon, radius_m, timeout)
            .await
            .found()
    }

    /// Probe and return the detailed outcome.
    pub async fn probe_detailed(
        &self,
        key: &GeoKey,
        lat: f64,
        lon: f64,
        radius_m: f64,
        timeout: Duration,
    ) -> ProbeReport {
        tracing::info!("Checking {key} within {radius_m}m...");
        let start = Instant::now();

        let source = Arc::clone(&self.source);
        let mut task = AbortOnDrop(tokio::spawn(async move {
            source.features_within(lat, lon, radius_m).await
        }));

        let (outcome, detail) = match tokio::time::timeout(timeout, &mut task.0).await {
            Ok(Ok(Ok(true))) => (ProbeOutcome::Present, None),
            Ok(Ok(Ok(false))) => (ProbeOutcome::Absent, None),
            Ok(Ok(Err(e))) => (ProbeOutcome::Failed, Some(e.to_string())),
            Ok(Err(join)) => (
                ProbeOutcome::Failed,
                Some(ProbeError::Task(join.to_string()).to_string()),
            ),
            Err(_) => {
                task.0.abort();
                (ProbeOutcome::TimedOut, None)
            }
        };

        let duration = start.elapsed();
        match (&outcome, &detail) {
            (ProbeOutcome::TimedOut, _) => {
                tracing::warn!("Timeout at {key} after {:.2}s", timeout.as_secs_f64());
            }
            (ProbeOutcome::Failed, Some(reason)) => {
                tracing::warn!("Error at {key}: {reason}");
            }
            _ => {
                tracing::info!(
                    "Finished {key} in {:.2}s -> {}",
                    duration.as_secs_f64(),
                    outcome.as_bool()
                );
            }
        }

        // No subscribers is the normal case; the send error is ignored.
        let _ = self.events.send(ProbeEvent {
            key: key.to_string(),
            duration_ms: duration.as_millis() as u64,
            outcome,
            detail: detail.clone(),
        });

        ProbeReport {
            outcome,
            duration,
            detail,
        }
    }
}
