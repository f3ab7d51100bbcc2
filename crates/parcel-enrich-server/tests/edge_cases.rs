//! Edge case integration tests for parcel-enrich-server.
//!
//! Covers startup, batch precaching, and the HTTP routes.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use parcel_enrich::{FeatureSource, ProbeError};
use parcel_enrich_server::precache::{self, PrecacheOptions};
use parcel_enrich_server::types::ServerError;
use parcel_enrich_server::{EnrichContext, EnrichSettings};

// ─────────────────────── helpers ───────────────────────

/// Feature source that answers by latitude sign and counts calls.
struct NorthHasSidewalks {
    calls: AtomicUsize,
    delay: Option<Duration>,
}

impl NorthHasSidewalks {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            delay: None,
        })
    }

    fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            delay: Some(delay),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeatureSource for NorthHasSidewalks {
    async fn features_within(&self, lat: f64, _: f64, _: f64) -> Result<bool, ProbeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(lat > 0.0)
    }
}

const PARCELS: &str = r#"{
    "type": "FeatureCollection",
    "features": [{
        "type": "Feature",
        "properties": {
            "legalAcreage": 0.2,
            "imprvActualYearBuilt": 1999,
            "improvementValue": 250000,
            "propType": "R",
            "situs_city": "DENTON",
            "ShapeSTLength": 300.0,
            "ShapeSTArea": 4500.0
        },
        "geometry": {
            "type": "Polygon",
            "coordinates": [[[-97.2, 33.2], [-97.1, 33.2], [-97.1, 33.3], [-97.2, 33.3], [-97.2, 33.2]]]
        }
    }]
}"#;

fn settings(dir: &Path, with_parcels: bool) -> EnrichSettings {
    let parcels_path = with_parcels.then(|| {
        let path = dir.join("Parcels.geojson");
        std::fs::write(&path, PARCELS).unwrap();
        path
    });
    EnrichSettings {
        cache_path: dir.join("sidewalk_cache.json"),
        overpass_url: "http://127.0.0.1:9/api/interpreter".to_string(),
        parcels_path,
    }
}

fn context(dir: &Path, with_parcels: bool, source: Arc<NorthHasSidewalks>) -> EnrichContext {
    EnrichContext::with_source(&settings(dir, with_parcels), source).unwrap()
}

fn read_csv(path: &Path) -> Vec<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_path(path)
        .unwrap();
    reader
        .records()
        .map(|r| r.unwrap().iter().map(str::to_string).collect())
        .collect()
}

// ═══════════════════════════════════════════════════════
// STARTUP
// ═══════════════════════════════════════════════════════

/// Test 1: Corrupt cache file: startup must fail with a clear error.
#[tokio::test]
async fn test_01_corrupt_cache_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("sidewalk_cache.json"), b"{\"33.1,-97.1\": tr").unwrap();

    let err = EnrichContext::with_source(&settings(dir.path(), false), NorthHasSidewalks::new())
        .err()
        .expect("corrupt cache should fail to open");
    assert!(matches!(err, ServerError::CorruptCache(_)));
    assert!(err.to_string().contains("sidewalk_cache.json"));
}

/// Test 2: Missing parcel file: startup fails instead of serving without data.
#[tokio::test]
async fn test_02_missing_parcels_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut s = settings(dir.path(), false);
    s.parcels_path = Some(dir.path().join("nope.geojson"));

    let result = EnrichContext::with_source(&s, NorthHasSidewalks::new());
    assert!(matches!(result, Err(ServerError::Io(_))));
}

/// Test 3: Shutdown persists entries below the flush interval.
#[tokio::test]
async fn test_03_shutdown_flushes() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(dir.path(), false, NorthHasSidewalks::new());
    ctx.cache().lookup(33.1, -97.1).await;
    ctx.shutdown().await.unwrap();

    let text = std::fs::read_to_string(dir.path().join("sidewalk_cache.json")).unwrap();
    let saved: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(saved["33.1,-97.1"], true);
}

/// Test 3b: Cache-only commands ignore PARCEL_ENRICH_PARCELS, even when it
/// points at a missing file.
#[tokio::test]
async fn test_03b_cache_only_settings_skip_parcels() {
    let dir = tempfile::tempdir().unwrap();
    let cache = dir.path().join("sidewalk_cache.json");
    let cache = cache.to_str().unwrap();
    std::env::set_var(
        parcel_enrich_server::config::PARCELS_ENV,
        dir.path().join("missing.geojson"),
    );

    let full = EnrichSettings::resolve(Some(cache), None, None);
    let cache_only = EnrichSettings::resolve_cache_only(Some(cache), None);
    std::env::remove_var(parcel_enrich_server::config::PARCELS_ENV);

    assert!(full.parcels_path.is_some());
    assert!(cache_only.parcels_path.is_none());

    let ctx = EnrichContext::with_source(&cache_only, NorthHasSidewalks::new()).unwrap();
    assert!(ctx.assembler().is_none());
}

// ═══════════════════════════════════════════════════════
// PRECACHE
// ═══════════════════════════════════════════════════════

/// Test 4: Every row gains a has_sidewalk column; repeated points probe once.
#[tokio::test]
async fn test_04_precache_adds_column() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("hoa_training.csv");
    std::fs::write(
        &input,
        "id,latitude,longitude,hoa\n\
         1,33.2785,-96.9951,1\n\
         2,-12.5,130.8,0\n\
         3,33.2785,-96.9951,1\n\
         4,not-a-number,-96.0,0\n",
    )
    .unwrap();
    let output = dir.path().join("hoa_training_sampled.csv");

    let source = NorthHasSidewalks::new();
    let ctx = context(dir.path(), false, source.clone());
    let summary = precache::run(
        ctx.cache(),
        &PrecacheOptions {
            input,
            output: output.clone(),
            sample: None,
            seed: 42,
            show_progress: false,
        },
    )
    .await
    .unwrap();

    assert_eq!(summary.rows, 4);
    assert_eq!(summary.with_sidewalk, 2);
    assert_eq!(summary.skipped, 1);
    assert_eq!(source.calls(), 2);

    let rows = read_csv(&output);
    assert_eq!(rows[0], vec!["id", "latitude", "longitude", "hoa", "has_sidewalk"]);
    assert_eq!(rows[1][4], "True");
    assert_eq!(rows[2][4], "False");
    assert_eq!(rows[3][4], "True");
    assert_eq!(rows[4][4], "False");

    // Cache flushed at the end of the batch.
    assert!(dir.path().join("sidewalk_cache.json").exists());
}

/// Test 5: Seeded sample picks the requested number of rows, reproducibly.
#[tokio::test]
async fn test_05_precache_sample() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("points.csv");
    let mut body = String::from("latitude,longitude\n");
    for i in 0..30 {
        body.push_str(&format!("{},{}\n", 30.0 + i as f64 * 0.01, -97.0));
    }
    std::fs::write(&input, body).unwrap();

    let ctx = context(dir.path(), false, NorthHasSidewalks::new());
    let run = |name: &str| PrecacheOptions {
        input: input.clone(),
        output: dir.path().join(name),
        sample: Some(5),
        seed: 42,
        show_progress: false,
    };

    let first = run("a.csv");
    let second = run("b.csv");
    precache::run(ctx.cache(), &first).await.unwrap();
    precache::run(ctx.cache(), &second).await.unwrap();

    let a = read_csv(&first.output);
    let b = read_csv(&second.output);
    assert_eq!(a.len(), 6);
    assert_eq!(a, b);
}

/// Test 6: CSV without coordinate columns is rejected.
#[tokio::test]
async fn test_06_precache_missing_columns() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("bad.csv");
    std::fs::write(&input, "lat,lng\n1,2\n").unwrap();

    let ctx = context(dir.path(), false, NorthHasSidewalks::new());
    let err = precache::run(
        ctx.cache(),
        &PrecacheOptions {
            input,
            output: dir.path().join("out.csv"),
            sample: None,
            seed: 42,
            show_progress: false,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ServerError::InvalidParams(_)));
}

// ═══════════════════════════════════════════════════════
// HTTP
// ═══════════════════════════════════════════════════════

#[cfg(feature = "http")]
mod http {
    use super::*;
    use std::time::Instant;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use parcel_enrich_server::HttpTransport;

    async fn get(ctx: Arc<EnrichContext>, uri: &str) -> (StatusCode, Value) {
        let app = HttpTransport::new(ctx).router();
        let resp = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    /// Test 7: /health reports version and cache size.
    #[tokio::test]
    async fn test_07_health() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = Arc::new(context(dir.path(), true, NorthHasSidewalks::new()));

        let (status, body) = get(ctx, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["cached_entries"], 0);
        assert_eq!(body["parcels"], 1);
    }

    /// Test 8: /sidewalk answers from the cache on the second call.
    #[tokio::test]
    async fn test_08_sidewalk_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let source = NorthHasSidewalks::new();
        let ctx = Arc::new(context(dir.path(), false, source.clone()));

        let (status, body) = get(ctx.clone(), "/sidewalk?lat=33.2785&lon=-96.9951").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["key"], "33.2785,-96.9951");
        assert_eq!(body["has_sidewalk"], true);

        get(ctx, "/sidewalk?lat=33.2785001&lon=-96.9951").await;
        assert_eq!(source.calls(), 1);
    }

    /// Test 9: /sidewalk honors a caller timeout.
    #[tokio::test]
    async fn test_09_sidewalk_timeout_override() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = Arc::new(context(
            dir.path(),
            false,
            NorthHasSidewalks::slow(Duration::from_secs(5)),
        ));

        let start = Instant::now();
        let (status, body) = get(ctx, "/sidewalk?lat=40.0&lon=-75.0&timeout_s=0.1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["has_sidewalk"], false);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    /// Test 10: Out-of-range coordinates and bad overrides are 400s.
    #[tokio::test]
    async fn test_10_bad_params() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = Arc::new(context(dir.path(), false, NorthHasSidewalks::new()));

        let (status, body) = get(ctx.clone(), "/sidewalk?lat=95&lon=0").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("lat"));

        let (status, _) = get(ctx.clone(), "/sidewalk?lat=1&lon=1&timeout_s=-3").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = get(ctx, "/sidewalk?lat=abc&lon=1").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    /// Test 11: /features merges parcel attributes with the sidewalk flag.
    #[tokio::test]
    async fn test_11_features() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = Arc::new(context(dir.path(), true, NorthHasSidewalks::new()));

        let (status, body) = get(ctx, "/features?lat=33.25&lon=-97.15").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["propType"], "R");
        assert_eq!(body["situs_city"], "DENTON");
        assert_eq!(body["compactness"], 20.0);
        assert_eq!(body["has_sidewalk"], true);
    }

    /// Test 12: /features outside every parcel, and without parcel data.
    #[tokio::test]
    async fn test_12_features_errors() {
        let dir = tempfile::tempdir().unwrap();
        let source = NorthHasSidewalks::new();
        let ctx = Arc::new(context(dir.path(), true, source.clone()));

        let (status, body) = get(ctx, "/features?lat=10.0&lon=10.0").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "No parcel found at this location.");
        assert_eq!(source.calls(), 0);

        let other = tempfile::tempdir().unwrap();
        let bare = Arc::new(context(other.path(), false, NorthHasSidewalks::new()));
        let (status, _) = get(bare, "/features?lat=33.25&lon=-97.15").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }
}
