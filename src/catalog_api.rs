//! HTTP surface: catalog readers and the internal relay.
//!
//! Two pull-based readers expose the published catalog. The direct reader
//! serves straight from the object store; the dual-source reader falls back
//! to a bundled local snapshot when the store is unreachable, with a shorter
//! cache lifetime and an explicit source marker. The relay route is the
//! trusted intermediary that holds the real provider credential: callers
//! authenticate with the shared internal secret, and the provider API key is
//! only ever attached to the outbound upstream request.

use crate::config::{ApiConfig, RelayConfig};
use crate::device_api::INTERNAL_SECRET_HEADER;
use crate::object_store::{ObjectStore, StoreError};
use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, instrument, warn};

/// Response header naming which source served the catalog
pub const CATALOG_SOURCE_HEADER: &str = "X-Catalog-Source";

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ObjectStore>,
    pub http: reqwest::Client,
    pub api: ApiConfig,
    pub relay: RelayConfig,
    pub catalog_key: String,
}

/// Which source ultimately served a catalog read
#[derive(Debug)]
pub enum CatalogSource {
    /// Served from the object store
    Primary(Value),
    /// Served from the bundled snapshot after a primary failure
    Fallback { catalog: Value, reason: String },
}

/// Errors from the reader paths
#[derive(Error, Debug)]
pub enum ReaderError {
    #[error("Catalog download failed: {0}")]
    Store(#[from] StoreError),

    #[error("Stored catalog is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Primary source failed: {primary}; fallback snapshot failed: {fallback}")]
    BothSourcesFailed { primary: String, fallback: String },
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Load and parse the catalog from the object store
pub async fn load_primary(store: &dyn ObjectStore, key: &str) -> Result<Value, ReaderError> {
    let bytes = store.get(key).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Load the catalog, falling back to the local snapshot on any primary
/// failure. Only when both sources fail does this return an error, and the
/// error names both causes.
pub async fn load_with_fallback(
    store: &dyn ObjectStore,
    key: &str,
    snapshot_path: &str,
) -> Result<CatalogSource, ReaderError> {
    match load_primary(store, key).await {
        Ok(catalog) => Ok(CatalogSource::Primary(catalog)),
        Err(primary_err) => {
            warn!(error = %primary_err, "Primary catalog read failed, trying local snapshot");
            match load_snapshot(snapshot_path).await {
                Ok(catalog) => Ok(CatalogSource::Fallback {
                    catalog,
                    reason: primary_err.to_string(),
                }),
                Err(fallback_err) => Err(ReaderError::BothSourcesFailed {
                    primary: primary_err.to_string(),
                    fallback: fallback_err.to_string(),
                }),
            }
        }
    }
}

/// Read the bundled snapshot from the local filesystem
async fn load_snapshot(path: &str) -> Result<Value> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read snapshot {path}"))?;
    serde_json::from_slice(&bytes).with_context(|| format!("Snapshot {path} is not valid JSON"))
}

/// Create the API router
pub fn create_router(state: AppState, config: &ApiConfig) -> Router {
    let cors = if config.cors_enabled {
        if config.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<_> = config
                .cors_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    } else {
        CorsLayer::new()
    };

    Router::new()
        .route("/health", get(health_check))
        .route("/api/v1/catalog", get(get_catalog))
        .route("/api/v1/catalog/direct", get(get_catalog_direct))
        .route("/api/internal/fetch-catalog-data", post(relay_fetch))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "catalog-service"
    }))
}

/// Direct reader: object store only, long cache lifetime
#[instrument(skip(state))]
async fn get_catalog_direct(State(state): State<AppState>) -> Response {
    match load_primary(state.store.as_ref(), &state.catalog_key).await {
        Ok(catalog) => catalog_response(&catalog, state.api.primary_cache_secs, "storage"),
        Err(e) => {
            // Detail stays server-side; the body is deliberately generic
            error!(error = %e, key = %state.catalog_key, "Failed to serve catalog from storage");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to load catalog",
                None,
            )
        }
    }
}

/// Dual-source reader: object store, then the bundled snapshot
#[instrument(skip(state))]
async fn get_catalog(State(state): State<AppState>) -> Response {
    match load_with_fallback(
        state.store.as_ref(),
        &state.catalog_key,
        &state.api.fallback_snapshot_path,
    )
    .await
    {
        Ok(CatalogSource::Primary(catalog)) => {
            catalog_response(&catalog, state.api.primary_cache_secs, "storage")
        }
        Ok(CatalogSource::Fallback { catalog, reason }) => {
            warn!(reason = %reason, "Serving catalog from fallback snapshot");
            catalog_response(&catalog, state.api.fallback_cache_secs, "fallback")
        }
        Err(e) => {
            error!(error = %e, "Catalog unavailable from both sources");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Catalog unavailable",
                Some(e.to_string()),
            )
        }
    }
}

/// Relay: authenticate the caller with the internal secret, then fetch the
/// requested provider endpoint with the server-held API key and relay the
/// upstream response verbatim.
#[instrument(skip(state, headers, body))]
async fn relay_fetch(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Option<Json<Value>>,
) -> Response {
    let Some(expected_secret) = state.relay.internal_secret.as_deref() else {
        error!("Relay called but no internal secret is configured");
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Relay secret not configured",
            None,
        );
    };

    let presented = headers
        .get(INTERNAL_SECRET_HEADER)
        .and_then(|v| v.to_str().ok());
    if presented != Some(expected_secret) {
        return error_response(StatusCode::FORBIDDEN, "Forbidden", None);
    }

    let endpoint = body
        .as_ref()
        .and_then(|Json(v)| v.get("endpoint"))
        .and_then(Value::as_str);
    let Some(endpoint) = endpoint else {
        return error_response(StatusCode::BAD_REQUEST, "Missing endpoint", None);
    };

    let Some(api_key) = state.relay.provider_api_key.as_deref() else {
        error!("Relay called but no provider API key is configured");
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Provider API key not configured",
            None,
        );
    };

    let url = build_upstream_url(&state.relay.provider_base_url, endpoint);
    info!(endpoint = %endpoint, "Relaying catalog data request upstream");

    let upstream = match state
        .http
        .get(&url)
        .header(header::AUTHORIZATION.as_str(), format!("Token {api_key}"))
        .send()
        .await
    {
        Ok(response) => response,
        Err(e) => {
            error!(error = %e, "Upstream fetch failed");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Upstream fetch failed",
                Some(e.to_string()),
            );
        }
    };

    // Relay status, content type, and body verbatim, including upstream's
    // own error payloads.
    let status =
        StatusCode::from_u16(upstream.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    let content_type = upstream
        .headers()
        .get(header::CONTENT_TYPE.as_str())
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/json")
        .to_string();

    match upstream.bytes().await {
        Ok(bytes) => Response::builder()
            .status(status)
            .header(header::CONTENT_TYPE, content_type)
            .body(Body::from(bytes))
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()),
        Err(e) => {
            error!(error = %e, "Failed to read upstream body");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Upstream fetch failed",
                Some(e.to_string()),
            )
        }
    }
}

/// Resolve the upstream URL for an endpoint path.
///
/// Absolute URLs pass through unchanged; paths are joined onto the provider
/// base.
fn build_upstream_url(base: &str, endpoint: &str) -> String {
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        return endpoint.to_string();
    }
    let base = base.trim_end_matches('/');
    if endpoint.starts_with('/') {
        format!("{base}{endpoint}")
    } else {
        format!("{base}/{endpoint}")
    }
}

/// Build a catalog response with cache directive and source marker
fn catalog_response(catalog: &Value, cache_secs: u64, source: &str) -> Response {
    (
        StatusCode::OK,
        [
            (
                header::CACHE_CONTROL.as_str(),
                format!("public, max-age={cache_secs}"),
            ),
            (CATALOG_SOURCE_HEADER, source.to_string()),
        ],
        Json(catalog.clone()),
    )
        .into_response()
}

/// Build a JSON error response
fn error_response(status: StatusCode, error: &str, message: Option<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: error.to_string(),
            message,
        }),
    )
        .into_response()
}

/// Start the catalog API server
pub async fn start_api_server(state: AppState, config: &ApiConfig) -> Result<()> {
    let router = create_router(state, config);
    let addr = format!("{}:{}", config.host, config.port);

    info!(address = %addr, "Starting catalog API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, router)
        .await
        .context("API server error")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ApiConfig, RelayConfig};
    use crate::object_store::MockObjectStore;
    use axum::http::HeaderValue;
    use std::io::Write;

    fn api_config(snapshot_path: &str) -> ApiConfig {
        ApiConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            cors_enabled: true,
            cors_origins: vec![],
            fallback_snapshot_path: snapshot_path.to_string(),
            primary_cache_secs: 3600,
            fallback_cache_secs: 300,
        }
    }

    fn state_with(store: MockObjectStore, snapshot_path: &str, relay: RelayConfig) -> AppState {
        AppState {
            store: Arc::new(store),
            http: reqwest::Client::new(),
            api: api_config(snapshot_path),
            relay,
            catalog_key: "device-catalog.json".to_string(),
        }
    }

    fn snapshot_file(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn download_error() -> StoreError {
        StoreError::Download {
            key: "device-catalog.json".to_string(),
            message: "bucket unreachable".to_string(),
        }
    }

    #[test]
    fn test_build_upstream_url() {
        assert_eq!(
            build_upstream_url("https://api.example/", "/manufacturers/?limit=200"),
            "https://api.example/manufacturers/?limit=200"
        );
        assert_eq!(
            build_upstream_url("https://api.example", "manufacturers/"),
            "https://api.example/manufacturers/"
        );
        // Absolute endpoints pass through unchanged
        assert_eq!(
            build_upstream_url("https://api.example", "https://other.example/x"),
            "https://other.example/x"
        );
    }

    #[tokio::test]
    async fn primary_read_wins_when_store_is_healthy() {
        let mut store = MockObjectStore::new();
        store
            .expect_get()
            .returning(|_| Ok(br#"{"categories":{}}"#.to_vec()));

        let source = load_with_fallback(&store, "device-catalog.json", "missing.json")
            .await
            .unwrap();
        assert!(matches!(source, CatalogSource::Primary(_)));
    }

    #[tokio::test]
    async fn storage_failure_falls_back_to_snapshot() {
        let snapshot = snapshot_file(r#"{"categories":{"phone":{"brands":{}}}}"#);
        let mut store = MockObjectStore::new();
        store.expect_get().returning(|_| Err(download_error()));

        let source = load_with_fallback(
            &store,
            "device-catalog.json",
            snapshot.path().to_str().unwrap(),
        )
        .await
        .unwrap();

        match source {
            CatalogSource::Fallback { catalog, reason } => {
                assert!(catalog["categories"]["phone"].is_object());
                assert!(reason.contains("bucket unreachable"));
            }
            other => panic!("expected fallback, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn both_sources_failing_names_both_causes() {
        let mut store = MockObjectStore::new();
        store.expect_get().returning(|_| Err(download_error()));

        let err = load_with_fallback(&store, "device-catalog.json", "/nonexistent/snapshot.json")
            .await
            .unwrap_err();

        match err {
            ReaderError::BothSourcesFailed { primary, fallback } => {
                assert!(primary.contains("bucket unreachable"));
                assert!(fallback.contains("snapshot"));
            }
            other => panic!("expected BothSourcesFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn fallback_response_carries_marker_and_short_cache() {
        let snapshot = snapshot_file(r#"{"categories":{}}"#);
        let mut store = MockObjectStore::new();
        store.expect_get().returning(|_| Err(download_error()));

        let state = state_with(
            store,
            snapshot.path().to_str().unwrap(),
            RelayConfig::default(),
        );
        let response = get_catalog(State(state)).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(CATALOG_SOURCE_HEADER).unwrap(),
            "fallback"
        );
        assert_eq!(
            response.headers().get(header::CACHE_CONTROL).unwrap(),
            "public, max-age=300"
        );
    }

    #[tokio::test]
    async fn direct_reader_uses_long_cache() {
        let mut store = MockObjectStore::new();
        store
            .expect_get()
            .returning(|_| Ok(br#"{"categories":{}}"#.to_vec()));

        let state = state_with(store, "unused.json", RelayConfig::default());
        let response = get_catalog_direct(State(state)).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(CATALOG_SOURCE_HEADER).unwrap(),
            "storage"
        );
        assert_eq!(
            response.headers().get(header::CACHE_CONTROL).unwrap(),
            "public, max-age=3600"
        );
    }

    #[tokio::test]
    async fn direct_reader_storage_failure_is_generic_500() {
        let mut store = MockObjectStore::new();
        store.expect_get().returning(|_| Err(download_error()));

        let state = state_with(store, "unused.json", RelayConfig::default());
        let response = get_catalog_direct(State(state)).await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    fn relay_config(secret: Option<&str>, key: Option<&str>) -> RelayConfig {
        RelayConfig {
            provider_base_url: "https://api.example".to_string(),
            provider_api_key: key.map(String::from),
            internal_secret: secret.map(String::from),
        }
    }

    #[tokio::test]
    async fn relay_without_configured_secret_is_500() {
        let state = state_with(MockObjectStore::new(), "unused.json", relay_config(None, None));
        let response = relay_fetch(State(state), HeaderMap::new(), None).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn relay_rejects_wrong_secret() {
        let state = state_with(
            MockObjectStore::new(),
            "unused.json",
            relay_config(Some("right"), Some("key")),
        );

        let mut headers = HeaderMap::new();
        headers.insert(INTERNAL_SECRET_HEADER, HeaderValue::from_static("wrong"));
        let response = relay_fetch(State(state), headers, None).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn relay_rejects_missing_endpoint() {
        let state = state_with(
            MockObjectStore::new(),
            "unused.json",
            relay_config(Some("s3cret"), Some("key")),
        );

        let mut headers = HeaderMap::new();
        headers.insert(INTERNAL_SECRET_HEADER, HeaderValue::from_static("s3cret"));
        let response = relay_fetch(
            State(state),
            headers,
            Some(Json(serde_json::json!({ "path": "/oops" }))),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
