//! Parcel Enrich: parcel feature extraction with a bounded-latency,
//! persistent sidewalk proximity cache.

pub mod cache;
pub mod features;
pub mod geokey;
pub mod overpass;
pub mod parcel;
pub mod probe;
pub mod store;
pub mod types;

pub use cache::ProximityCache;
pub use features::{FeatureAssembler, ParcelFeatures};
pub use geokey::GeoKey;
pub use overpass::{OverpassSource, DEFAULT_OVERPASS_URL};
pub use parcel::{Parcel, ParcelIndex};
pub use probe::{BoundedProbe, FeatureSource, ProbeEvent, ProbeReport};
pub use store::{CacheStore, RecordMap, FLUSH_INTERVAL};
pub use types::*;
