//! Parcel Enrich service: CLI, batch precaching, and HTTP access to the
//! sidewalk proximity cache.

pub mod config;
pub mod context;
pub mod precache;
pub mod transport;
pub mod types;

pub use config::resolve_cache_path;
pub use context::{EnrichContext, EnrichSettings};
#[cfg(feature = "http")]
pub use transport::HttpTransport;
