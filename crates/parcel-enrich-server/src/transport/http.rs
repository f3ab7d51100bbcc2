//! HTTP transport: feature and sidewalk lookups for the frontend, plus /health.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json as AxumJson, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};

use parcel_enrich::{GeoKey, ParcelFeatures};

use crate::config;
use crate::context::EnrichContext;
use crate::types::{ServerError, ServerResult};

/// Frontend origin allowed by default.
pub const DEFAULT_CORS_ORIGIN: &str = "http://localhost:5173";

#[derive(Debug, Deserialize)]
pub struct SidewalkQuery {
    pub lat: f64,
    pub lon: f64,
    pub radius_m: Option<f64>,
    pub timeout_s: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct PointQuery {
    pub lat: f64,
    pub lon: f64,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, AxumJson(self.to_json())).into_response()
    }
}

/// HTTP server over a shared [`EnrichContext`].
pub struct HttpTransport {
    context: Arc<EnrichContext>,
    cors_origin: Option<String>,
}

impl HttpTransport {
    pub fn new(context: Arc<EnrichContext>) -> Self {
        Self {
            context,
            cors_origin: Some(DEFAULT_CORS_ORIGIN.to_string()),
        }
    }

    /// Allow a different browser origin, or none.
    pub fn with_cors_origin(mut self, origin: Option<String>) -> Self {
        self.cors_origin = origin;
        self
    }

    /// Build the axum router.
    pub fn router(&self) -> Router {
        let app = Router::new()
            .route("/", get(handle_root))
            .route("/health", get(handle_health))
            .route("/sidewalk", get(handle_sidewalk))
            .route("/features", get(handle_features))
            .with_state(Arc::clone(&self.context));

        match self.cors_origin.as_deref().map(HeaderValue::from_str) {
            Some(Ok(origin)) => app.layer(
                CorsLayer::new()
                    .allow_origin(origin)
                    .allow_methods([Method::GET, Method::OPTIONS])
                    .allow_headers(Any),
            ),
            Some(Err(e)) => {
                tracing::warn!("Ignoring invalid CORS origin: {e}");
                app
            }
            None => app,
        }
    }

    /// Serve until Ctrl-C, then flush the cache.
    pub async fn run(&self, addr: &str) -> ServerResult<()> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(ServerError::Io)?;

        tracing::info!("HTTP transport listening on {addr}");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| ServerError::Transport(e.to_string()))?;

        tracing::info!("Shutting down");
        self.context.shutdown().await
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
}

async fn handle_root() -> AxumJson<serde_json::Value> {
    AxumJson(serde_json::json!({ "message": "Parcel enrichment backend is running!" }))
}

async fn handle_health(State(context): State<Arc<EnrichContext>>) -> AxumJson<serde_json::Value> {
    AxumJson(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "cached_entries": context.cache().len().await,
        "parcels": context.assembler().map(|a| a.parcels().len()),
    }))
}

async fn handle_sidewalk(
    State(context): State<Arc<EnrichContext>>,
    Query(query): Query<SidewalkQuery>,
) -> ServerResult<AxumJson<serde_json::Value>> {
    config::check_coordinates(query.lat, query.lon)?;
    let options = config::lookup_options(query.radius_m, query.timeout_s)?;

    let has_sidewalk = context
        .cache()
        .lookup_with(query.lat, query.lon, options)
        .await;

    Ok(AxumJson(serde_json::json!({
        "key": GeoKey::normalize(query.lat, query.lon),
        "has_sidewalk": has_sidewalk,
    })))
}

async fn handle_features(
    State(context): State<Arc<EnrichContext>>,
    Query(query): Query<PointQuery>,
) -> ServerResult<AxumJson<ParcelFeatures>> {
    config::check_coordinates(query.lat, query.lon)?;
    let assembler = context.assembler().ok_or(ServerError::ParcelsUnavailable)?;
    let features = assembler.features_at(query.lat, query.lon).await?;
    Ok(AxumJson(features))
}
