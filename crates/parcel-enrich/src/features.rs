//! Model input assembly: parcel attributes merged with sidewalk proximity.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cache::ProximityCache;
use crate::parcel::{Parcel, ParcelIndex};
use crate::types::{EnrichError, EnrichResult};

/// Feature row for one location, keyed the way the model was trained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParcelFeatures {
    #[serde(rename = "legalAcreage")]
    pub legal_acreage: f64,
    #[serde(rename = "imprvActualYearBuilt")]
    pub year_built: f64,
    #[serde(rename = "improvementValue")]
    pub improvement_value: f64,
    #[serde(rename = "propType")]
    pub prop_type: String,
    pub situs_city: String,
    /// Perimeter squared over area; `None` when area is missing or zero.
    pub compactness: Option<f64>,
    pub has_sidewalk: bool,
}

/// Builds [`ParcelFeatures`] from the parcel index and the proximity cache.
#[derive(Clone)]
pub struct FeatureAssembler {
    parcels: Arc<ParcelIndex>,
    cache: Arc<ProximityCache>,
}

impl FeatureAssembler {
    pub fn new(parcels: Arc<ParcelIndex>, cache: Arc<ProximityCache>) -> Self {
        Self { parcels, cache }
    }

    /// Features for the parcel containing the point.
    ///
    /// Returns [`EnrichError::NoParcel`] without touching the cache when no
    /// parcel contains the point.
    pub async fn features_at(&self, lat: f64, lon: f64) -> EnrichResult<ParcelFeatures> {
        if !lat.is_finite() || !lon.is_finite() {
            return Err(EnrichError::InvalidInput(format!(
                "Coordinates must be finite, got ({lat}, {lon})"
            )));
        }

        let parcel = self.parcels.find(lat, lon).ok_or(EnrichError::NoParcel)?;
        let has_sidewalk = self.cache.lookup(lat, lon).await;
        Ok(attributes(parcel, has_sidewalk))
    }

    pub fn cache(&self) -> &Arc<ProximityCache> {
        &self.cache
    }

    pub fn parcels(&self) -> &Arc<ParcelIndex> {
        &self.parcels
    }
}

fn attributes(parcel: &Parcel, has_sidewalk: bool) -> ParcelFeatures {
    let compactness = match (parcel.number("ShapeSTLength"), parcel.number("ShapeSTArea")) {
        (Some(length), Some(area)) if area != 0.0 => Some(length * length / area),
        _ => None,
    };

    ParcelFeatures {
        legal_acreage: parcel.number("legalAcreage").unwrap_or(0.0),
        year_built: parcel.number("imprvActualYearBuilt").unwrap_or(0.0),
        improvement_value: parcel.number("improvementValue").unwrap_or(0.0),
        prop_type: parcel
            .text("propType")
            .unwrap_or_else(|| "Unknown".to_string()),
        situs_city: parcel
            .text("situs_city")
            .unwrap_or_else(|| "Unknown".to_string()),
        compactness,
        has_sidewalk,
    }
}
