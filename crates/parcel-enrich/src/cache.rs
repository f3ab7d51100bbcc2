//! Sidewalk proximity cache: memoized, deadline-bounded, persisted.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as SyncMutex, MutexGuard};

use tokio::sync::{broadcast, Mutex};

use crate::geokey::GeoKey;
use crate::probe::{BoundedProbe, FeatureSource, ProbeEvent};
use crate::store::{CacheStore, RecordMap};
use crate::types::{EnrichResult, LookupOptions};

/// Answers "is there a qualifying feature near this point?" at most once per
/// rounded location.
///
/// Construct one per process and share it behind an `Arc`. All writes to the
/// record map and every flush are serialized through one lock; concurrent
/// lookups for the same key share a single in-flight probe.
pub struct ProximityCache {
    store: CacheStore,
    probe: BoundedProbe,
    defaults: LookupOptions,
    state: Mutex<CacheState>,
    in_flight: SyncMutex<InFlight>,
}

struct CacheState {
    records: RecordMap,
    inserted: u64,
    unflushed: usize,
    flush_failed: bool,
}

/// Per-key gate plus the number of lookups currently holding it.
type InFlight = HashMap<GeoKey, (Arc<Mutex<()>>, usize)>;

/// One lookup's hold on a key's in-flight gate. The map entry is removed when
/// the last holder ends, whether it completed or was cancelled.
struct GateEntry<'a> {
    in_flight: &'a SyncMutex<InFlight>,
    key: &'a GeoKey,
    gate: Arc<Mutex<()>>,
}

impl<'a> GateEntry<'a> {
    fn join(in_flight: &'a SyncMutex<InFlight>, key: &'a GeoKey) -> Self {
        let mut map = lock_in_flight(in_flight);
        let (gate, holders) = map
            .entry(key.clone())
            .or_insert_with(|| (Arc::new(Mutex::new(())), 0));
        *holders += 1;
        Self {
            in_flight,
            key,
            gate: Arc::clone(gate),
        }
    }
}

impl Drop for GateEntry<'_> {
    fn drop(&mut self) {
        let mut map = lock_in_flight(self.in_flight);
        let last = match map.get_mut(self.key) {
            Some((_, holders)) => {
                *holders = holders.saturating_sub(1);
                *holders == 0
            }
            None => false,
        };
        if last {
            map.remove(self.key);
        }
    }
}

// The map is never left half-updated, so a poisoned lock is still usable.
fn lock_in_flight(in_flight: &SyncMutex<InFlight>) -> MutexGuard<'_, InFlight> {
    in_flight.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ProximityCache {
    /// Load the backing file and build the cache.
    ///
    /// Fails when the backing file exists but is unreadable or corrupt.
    pub fn open(store: CacheStore, source: Arc<dyn FeatureSource>) -> EnrichResult<Self> {
        let records = store.load()?;
        Ok(Self {
            store,
            probe: BoundedProbe::new(source),
            defaults: LookupOptions::default(),
            state: Mutex::new(CacheState {
                records,
                inserted: 0,
                unflushed: 0,
                flush_failed: false,
            }),
            in_flight: SyncMutex::new(HashMap::new()),
        })
    }

    /// Replace the radius and timeout used by [`lookup`](Self::lookup).
    pub fn with_defaults(mut self, defaults: LookupOptions) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn defaults(&self) -> LookupOptions {
        self.defaults
    }

    /// Look up a point with the default radius and timeout.
    pub async fn lookup(&self, lat: f64, lon: f64) -> bool {
        self.lookup_with(lat, lon, self.defaults).await
    }

    /// Look up a point. Always answers; failures and timeouts answer `false`
    /// and are cached like any other result.
    pub async fn lookup_with(&self, lat: f64, lon: f64, options: LookupOptions) -> bool {
        let key = GeoKey::normalize(lat, lon);
        if let Some(hit) = self.cached(&key).await {
            tracing::debug!("Cache hit for {key} -> {hit}");
            return hit;
        }

        let entry = GateEntry::join(&self.in_flight, &key);
        let _guard = entry.gate.lock().await;

        // Resolved by another caller while we waited on the gate.
        if let Some(hit) = self.cached(&key).await {
            tracing::debug!("Shared in-flight result for {key} -> {hit}");
            return hit;
        }

        let report = self
            .probe
            .probe_detailed(&key, lat, lon, options.radius_m, options.timeout)
            .await;
        let found = report.found();
        self.record(&key, found).await;
        found
    }

    /// Cached value for a point, without probing.
    pub async fn peek(&self, lat: f64, lon: f64) -> Option<bool> {
        self.cached(&GeoKey::normalize(lat, lon)).await
    }

    /// Number of cached records, loaded and new.
    pub async fn len(&self) -> usize {
        self.state.lock().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Write every unflushed entry to disk now.
    pub async fn flush(&self) -> EnrichResult<()> {
        let mut state = self.state.lock().await;
        if state.unflushed == 0 && !state.flush_failed {
            return Ok(());
        }
        self.store.save(&state.records)?;
        state.unflushed = 0;
        state.flush_failed = false;
        Ok(())
    }

    /// Receive a [`ProbeEvent`] for every external probe.
    pub fn subscribe(&self) -> broadcast::Receiver<ProbeEvent> {
        self.probe.subscribe()
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    async fn cached(&self, key: &GeoKey) -> Option<bool> {
        self.state.lock().await.records.get(key.as_str()).copied()
    }

    async fn record(&self, key: &GeoKey, found: bool) {
        let mut state = self.state.lock().await;
        if state.records.insert(key.to_string(), found).is_some() {
            return;
        }
        state.inserted += 1;
        state.unflushed += 1;

        let result = if state.flush_failed {
            self.store.save(&state.records).map(|_| true)
        } else {
            self.store.maybe_flush(&state.records, state.inserted)
        };

        match result {
            Ok(true) => {
                state.unflushed = 0;
                state.flush_failed = false;
            }
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(
                    "Failed to flush cache to {}: {e}. Keeping {} entries in memory",
                    self.store.path().display(),
                    state.records.len()
                );
                state.flush_failed = true;
            }
        }
    }
}

impl Drop for ProximityCache {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if state.unflushed > 0 || state.flush_failed {
            if let Err(e) = self.store.save(&state.records) {
                tracing::error!("Failed to save cache on drop: {e}");
            }
        }
    }
}
