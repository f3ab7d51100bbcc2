//! Canonical cache keys for coordinate pairs.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Decimal places kept for each coordinate (about 0.11 m at the equator).
pub const KEY_PRECISION: usize = 6;

/// Canonical `"<lat>,<lon>"` key derived from rounded coordinates.
///
/// Coordinates that round to the same value share a key, so nearby points
/// within the rounding cell share one cached result.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GeoKey(String);

impl GeoKey {
    /// Build the key for a coordinate pair.
    pub fn normalize(lat: f64, lon: f64) -> Self {
        GeoKey(format!("{},{}", render(lat), render(lon)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GeoKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Round to `KEY_PRECISION` decimals from the exact binary value, so
/// `33.0000005` (stored just below the tie) rounds down.
pub fn round_coord(value: f64) -> f64 {
    let rounded = format!("{:.*}", KEY_PRECISION, value)
        .parse::<f64>()
        .unwrap_or(value);
    // Fold -0.0 into 0.0 so both signs share a key.
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

// `{}` on f64 is the shortest round-trip form and ignores locale. Integral
// values keep a trailing ".0" to match keys already persisted on disk.
fn render(value: f64) -> String {
    let rounded = round_coord(value);
    if rounded.is_finite() && rounded.fract() == 0.0 {
        format!("{rounded:.1}")
    } else {
        format!("{rounded}")
    }
}
