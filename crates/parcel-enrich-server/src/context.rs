//! Process-wide enrichment state: one cache, optionally one parcel index.

use std::path::PathBuf;
use std::sync::Arc;

use parcel_enrich::{
    CacheStore, FeatureAssembler, FeatureSource, OverpassSource, ParcelIndex, ProximityCache,
};

use crate::config;
use crate::types::ServerResult;

/// Resolved settings for opening an [`EnrichContext`].
#[derive(Debug, Clone)]
pub struct EnrichSettings {
    pub cache_path: PathBuf,
    pub overpass_url: String,
    pub parcels_path: Option<PathBuf>,
}

impl EnrichSettings {
    /// Resolve settings from optional explicit values, the environment, and
    /// defaults.
    pub fn resolve(cache: Option<&str>, overpass_url: Option<&str>, parcels: Option<&str>) -> Self {
        Self {
            cache_path: config::resolve_cache_path(cache),
            overpass_url: config::resolve_overpass_url(overpass_url),
            parcels_path: config::resolve_parcels_path(parcels),
        }
    }

    /// Resolve settings for commands that only touch the cache. Parcel data
    /// is never looked up, even when `PARCEL_ENRICH_PARCELS` is set.
    pub fn resolve_cache_only(cache: Option<&str>, overpass_url: Option<&str>) -> Self {
        Self {
            cache_path: config::resolve_cache_path(cache),
            overpass_url: config::resolve_overpass_url(overpass_url),
            parcels_path: None,
        }
    }
}

/// Owns the proximity cache for the lifetime of the process and hands out
/// shared handles to it.
pub struct EnrichContext {
    cache: Arc<ProximityCache>,
    assembler: Option<FeatureAssembler>,
}

impl EnrichContext {
    /// Open the cache against the configured Overpass endpoint.
    pub fn open(settings: &EnrichSettings) -> ServerResult<Self> {
        let source = OverpassSource::new(settings.overpass_url.clone());
        tracing::info!("Overpass endpoint: {}", source.endpoint());
        Self::with_source(settings, Arc::new(source))
    }

    /// Open the cache against any feature source.
    pub fn with_source(
        settings: &EnrichSettings,
        source: Arc<dyn FeatureSource>,
    ) -> ServerResult<Self> {
        let store = CacheStore::new(&settings.cache_path);
        let cache = Arc::new(ProximityCache::open(store, source)?);

        let assembler = match &settings.parcels_path {
            Some(path) => {
                let parcels = Arc::new(ParcelIndex::load(path)?);
                Some(FeatureAssembler::new(parcels, Arc::clone(&cache)))
            }
            None => None,
        };

        tracing::info!(
            "Cache {} ready. Parcels: {}",
            settings.cache_path.display(),
            if assembler.is_some() { "loaded" } else { "none" }
        );

        Ok(Self { cache, assembler })
    }

    pub fn cache(&self) -> &Arc<ProximityCache> {
        &self.cache
    }

    pub fn assembler(&self) -> Option<&FeatureAssembler> {
        self.assembler.as_ref()
    }

    /// Persist every unflushed cache entry.
    pub async fn shutdown(&self) -> ServerResult<()> {
        self.cache.flush().await?;
        tracing::info!(
            "Flushed {} cache entries to {}",
            self.cache.len().await,
            self.cache.store().path().display()
        );
        Ok(())
    }
}
