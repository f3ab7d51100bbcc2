//! Configuration loading and resolution.
//!
//! Every setting resolves as: explicit flag, then environment variable, then
//! default.

use std::path::PathBuf;
use std::time::Duration;

use parcel_enrich::{LookupOptions, DEFAULT_OVERPASS_URL};

use crate::types::{ServerError, ServerResult};

pub const CACHE_ENV: &str = "PARCEL_ENRICH_CACHE";
pub const PARCELS_ENV: &str = "PARCEL_ENRICH_PARCELS";
pub const OVERPASS_ENV: &str = "OVERPASS_URL";

/// Cache file used when nothing else is configured.
pub const DEFAULT_CACHE_FILE: &str = "sidewalk_cache.json";

/// Longest per-lookup deadline a caller may request.
pub const MAX_TIMEOUT_SECS: f64 = 120.0;

/// Resolve the sidewalk cache file path.
pub fn resolve_cache_path(explicit: Option<&str>) -> PathBuf {
    if let Some(path) = explicit {
        return PathBuf::from(path);
    }

    if let Some(env_path) = read_env(CACHE_ENV) {
        return PathBuf::from(env_path);
    }

    PathBuf::from(DEFAULT_CACHE_FILE)
}

/// Resolve the parcel GeoJSON path, if any.
pub fn resolve_parcels_path(explicit: Option<&str>) -> Option<PathBuf> {
    explicit
        .map(str::to_string)
        .or_else(|| read_env(PARCELS_ENV))
        .map(PathBuf::from)
}

/// Resolve the Overpass interpreter endpoint.
pub fn resolve_overpass_url(explicit: Option<&str>) -> String {
    explicit
        .map(str::to_string)
        .or_else(|| read_env(OVERPASS_ENV))
        .unwrap_or_else(|| DEFAULT_OVERPASS_URL.to_string())
}

/// Validate caller-supplied lookup overrides.
pub fn lookup_options(radius_m: Option<f64>, timeout_s: Option<f64>) -> ServerResult<LookupOptions> {
    let mut options = LookupOptions::default();

    if let Some(radius) = radius_m {
        if !radius.is_finite() || radius <= 0.0 {
            return Err(ServerError::InvalidParams(format!(
                "radius_m must be a positive number, got {radius}"
            )));
        }
        options = options.radius_m(radius);
    }

    if let Some(secs) = timeout_s {
        if !secs.is_finite() || secs <= 0.0 || secs > MAX_TIMEOUT_SECS {
            return Err(ServerError::InvalidParams(format!(
                "timeout_s must be in (0, {MAX_TIMEOUT_SECS}], got {secs}"
            )));
        }
        options = options.timeout(Duration::from_secs_f64(secs));
    }

    Ok(options)
}

/// Validate a coordinate pair.
pub fn check_coordinates(lat: f64, lon: f64) -> ServerResult<()> {
    if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
        return Err(ServerError::InvalidParams(format!(
            "lat must be within [-90, 90], got {lat}"
        )));
    }
    if !lon.is_finite() || !(-180.0..=180.0).contains(&lon) {
        return Err(ServerError::InvalidParams(format!(
            "lon must be within [-180, 180], got {lon}"
        )));
    }
    Ok(())
}

fn read_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
