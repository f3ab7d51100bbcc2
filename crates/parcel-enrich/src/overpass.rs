//! OpenStreetMap feature source backed by the Overpass API.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::probe::FeatureSource;
use crate::types::ProbeError;

/// Public Overpass interpreter endpoint.
pub const DEFAULT_OVERPASS_URL: &str = "https://overpass-api.de/api/interpreter";

/// Request-level deadline for one Overpass call.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Largest error body kept in a [`ProbeError::Status`].
const MAX_ERROR_BODY: usize = 200;

/// Queries Overpass for OSM elements carrying one tag near a point.
///
/// Defaults to `footway=sidewalk`, matched on nodes, ways, and relations.
#[derive(Clone)]
pub struct OverpassSource {
    client: reqwest::Client,
    endpoint: String,
    tag_key: String,
    tag_value: String,
    request_timeout: Duration,
}

impl OverpassSource {
    pub fn new(endpoint: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(concat!("parcel-enrich/", env!("CARGO_PKG_VERSION")))
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            client,
            endpoint: endpoint.into(),
            tag_key: "footway".to_string(),
            tag_value: "sidewalk".to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Match a different `key=value` tag.
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tag_key = key.into();
        self.tag_value = value.into();
        self
    }

    /// Bound every outbound request, independent of the caller's deadline.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Overpass QL for the proximity query.
    pub fn query(&self, lat: f64, lon: f64, radius_m: f64) -> String {
        let server_timeout = self.request_timeout.as_secs().max(1);
        format!(
            "[out:json][timeout:{server_timeout}];nwr[\"{}\"=\"{}\"](around:{radius_m},{lat},{lon});out ids;",
            escape(&self.tag_key),
            escape(&self.tag_value),
        )
    }
}

impl Default for OverpassSource {
    fn default() -> Self {
        Self::new(DEFAULT_OVERPASS_URL)
    }
}

#[derive(Deserialize)]
struct OverpassResponse {
    elements: Vec<serde_json::Value>,
}

#[async_trait]
impl FeatureSource for OverpassSource {
    async fn features_within(&self, lat: f64, lon: f64, radius_m: f64) -> Result<bool, ProbeError> {
        let query = self.query(lat, lon, radius_m);
        tracing::debug!("Overpass query: {query}");

        let resp = self
            .client
            .post(&self.endpoint)
            .timeout(self.request_timeout)
            .form(&[("data", query.as_str())])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let mut body = resp.text().await.unwrap_or_default();
            body.truncate(floor_char_boundary(&body, MAX_ERROR_BODY));
            return Err(ProbeError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = resp.bytes().await?;
        let parsed: OverpassResponse = serde_json::from_slice(&bytes)
            .map_err(|e| ProbeError::Malformed(e.to_string()))?;

        Ok(!parsed.elements.is_empty())
    }
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

fn floor_char_boundary(s: &str, max: usize) -> usize {
    if s.len() <= max {
        return s.len();
    }
    (0..=max).rev().find(|&i| s.is_char_boundary(i)).unwrap_or(0)
}
