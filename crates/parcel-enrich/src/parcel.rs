//! Parcel polygons loaded from GeoJSON, with point containment lookup.

use std::path::Path;

use geojson::{GeoJson, Value};
use serde_json::Map;

use crate::types::{EnrichError, EnrichResult};

/// A closed ring of `(lon, lat)` vertices.
type Ring = Vec<(f64, f64)>;

#[derive(Debug, Clone)]
struct Polygon {
    exterior: Ring,
    holes: Vec<Ring>,
    bbox: BoundingBox,
}

#[derive(Debug, Clone, Copy)]
struct BoundingBox {
    min_lon: f64,
    min_lat: f64,
    max_lon: f64,
    max_lat: f64,
}

impl BoundingBox {
    fn of(ring: &[(f64, f64)]) -> Self {
        ring.iter().fold(
            BoundingBox {
                min_lon: f64::INFINITY,
                min_lat: f64::INFINITY,
                max_lon: f64::NEG_INFINITY,
                max_lat: f64::NEG_INFINITY,
            },
            |b, &(lon, lat)| BoundingBox {
                min_lon: b.min_lon.min(lon),
                min_lat: b.min_lat.min(lat),
                max_lon: b.max_lon.max(lon),
                max_lat: b.max_lat.max(lat),
            },
        )
    }

    fn contains(&self, lon: f64, lat: f64) -> bool {
        lon >= self.min_lon && lon <= self.max_lon && lat >= self.min_lat && lat <= self.max_lat
    }
}

impl Polygon {
    fn contains(&self, lon: f64, lat: f64) -> bool {
        self.bbox.contains(lon, lat)
            && ring_contains(&self.exterior, lon, lat)
            && !self.holes.iter().any(|h| ring_contains(h, lon, lat))
    }
}

// Even-odd ray casting toward +lon.
fn ring_contains(ring: &[(f64, f64)], lon: f64, lat: f64) -> bool {
    let mut inside = false;
    let n = ring.len();
    if n < 3 {
        return false;
    }
    let mut j = n - 1;
    for i in 0..n {
        let (xi, yi) = ring[i];
        let (xj, yj) = ring[j];
        if (yi > lat) != (yj > lat) && lon < (xj - xi) * (lat - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// One land parcel: its geometry and its attribute table row.
#[derive(Debug, Clone)]
pub struct Parcel {
    polygons: Vec<Polygon>,
    properties: Map<String, serde_json::Value>,
}

impl Parcel {
    /// Whether the parcel geometry contains the point.
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        self.polygons.iter().any(|p| p.contains(lon, lat))
    }

    /// Raw attribute value.
    pub fn property(&self, name: &str) -> Option<&serde_json::Value> {
        self.properties.get(name).filter(|v| !v.is_null())
    }

    /// Numeric attribute. Numeric strings are accepted.
    pub fn number(&self, name: &str) -> Option<f64> {
        match self.property(name)? {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Attribute rendered as text.
    pub fn text(&self, name: &str) -> Option<String> {
        match self.property(name)? {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

/// Pre-loaded parcel dataset.
#[derive(Debug, Clone, Default)]
pub struct ParcelIndex {
    parcels: Vec<Parcel>,
}

impl ParcelIndex {
    /// Read a GeoJSON FeatureCollection in WGS84 (lon, lat) coordinates.
    pub fn load(path: &Path) -> EnrichResult<Self> {
        tracing::info!("Loading parcels from {}", path.display());
        let text = std::fs::read_to_string(path)?;
        let index = Self::from_geojson_str(&text)?;
        tracing::info!("Loaded {} parcels", index.len());
        Ok(index)
    }

    pub fn from_geojson_str(text: &str) -> EnrichResult<Self> {
        let geojson: GeoJson = text
            .parse()
            .map_err(|e| EnrichError::Parcels(format!("Invalid GeoJSON: {e}")))?;

        let collection = match geojson {
            GeoJson::FeatureCollection(fc) => fc,
            _ => {
                return Err(EnrichError::Parcels(
                    "Expected a FeatureCollection".to_string(),
                ))
            }
        };

        let mut parcels = Vec::with_capacity(collection.features.len());
        let mut skipped = 0usize;
        for feature in collection.features {
            let polygons = match feature.geometry.as_ref().map(|g| &g.value) {
                Some(Value::Polygon(rings)) => vec![to_polygon(rings)?],
                Some(Value::MultiPolygon(parts)) => parts
                    .iter()
                    .map(|rings| to_polygon(rings))
                    .collect::<EnrichResult<Vec<_>>>()?,
                _ => {
                    skipped += 1;
                    continue;
                }
            };
            parcels.push(Parcel {
                polygons,
                properties: feature.properties.unwrap_or_default(),
            });
        }

        if skipped > 0 {
            tracing::warn!("Skipped {skipped} features without polygon geometry");
        }

        Ok(Self { parcels })
    }

    /// First parcel containing the point.
    pub fn find(&self, lat: f64, lon: f64) -> Option<&Parcel> {
        self.parcels.iter().find(|p| p.contains(lat, lon))
    }

    pub fn len(&self) -> usize {
        self.parcels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parcels.is_empty()
    }
}

fn to_polygon(rings: &[Vec<Vec<f64>>]) -> EnrichResult<Polygon> {
    let mut rings = rings.iter().map(|ring| {
        ring.iter()
            .map(|pos| match pos.as_slice() {
                [lon, lat, ..] => Ok((*lon, *lat)),
                _ => Err(EnrichError::Parcels(
                    "Position needs at least two coordinates".to_string(),
                )),
            })
            .collect::<EnrichResult<Ring>>()
    });

    let exterior = rings
        .next()
        .transpose()?
        .ok_or_else(|| EnrichError::Parcels("Polygon without exterior ring".to_string()))?;
    let holes = rings.collect::<EnrichResult<Vec<_>>>()?;
    let bbox = BoundingBox::of(&exterior);

    Ok(Polygon {
        exterior,
        holes,
        bbox,
    })
}
