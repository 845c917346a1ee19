//! HTTP file serving for one cache root.
//!
//! Each enabled artifact kind gets its own server: static files out of the
//! kind's cache subtree, `/health`, and `/metrics` (the kind's counter
//! snapshot as JSON). A request for a file that is not cached is answered
//! with a 307 redirect to the HTTPS origin of the same host and path, so
//! clients transparently fall back while the counter records the miss.
//!
//! Only complete files are ever visible here: the sync engine publishes
//! artifacts via rename, so a concurrent download never shows up as a
//! truncated file.

use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use tower_http::services::ServeDir;
use tracing::info;

use crate::metrics::{CacheMetrics, MetricsSnapshot};

/// Errors raised by the serving layer.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("cannot bind to {address}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server failed")]
    Serve {
        #[source]
        source: std::io::Error,
    },
}

#[derive(Clone)]
struct ServerState {
    serve_dir: ServeDir,
    metrics: Arc<CacheMetrics>,
}

/// Build the router for one cache root.
pub fn router(serve_root: PathBuf, metrics: Arc<CacheMetrics>) -> Router {
    let state = ServerState {
        serve_dir: ServeDir::new(serve_root),
        metrics,
    };

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_snapshot))
        .fallback(serve_file)
        .with_state(state)
}

/// Serve one cache root until shutdown.
pub async fn serve(
    bind_address: &str,
    serve_root: PathBuf,
    metrics: Arc<CacheMetrics>,
    shutdown: CancellationToken,
) -> Result<(), ServerError> {
    let listener = tokio::net::TcpListener::bind(bind_address)
        .await
        .map_err(|e| ServerError::Bind {
            address: bind_address.to_string(),
            source: e,
        })?;

    info!(
        bind_address,
        directory = %serve_root.display(),
        "starting to serve cached files"
    );

    axum::serve(listener, router(serve_root, metrics))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| ServerError::Serve { source: e })
}

async fn health() -> &'static str {
    "HEALTHY"
}

async fn metrics_snapshot(State(state): State<ServerState>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}

async fn serve_file(State(state): State<ServerState>, request: Request<Body>) -> Response {
    let host = request
        .headers()
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let path = request.uri().path().to_string();

    let response = match state.serve_dir.clone().oneshot(request).await {
        Ok(response) => response,
        Err(never) => match never {},
    };

    match response.status() {
        StatusCode::NOT_FOUND => {
            state.metrics.cache_miss();
            info!(path = %path, "cache miss, redirecting to origin");
            redirect_to_origin(&host, &path)
        }
        status if status.is_success() => {
            state.metrics.file_served();
            response.map(Body::new)
        }
        _ => response.map(Body::new),
    }
}

fn redirect_to_origin(host: &str, path: &str) -> Response {
    Response::builder()
        .status(StatusCode::TEMPORARY_REDIRECT)
        .header(header::LOCATION, format!("https://{host}{path}"))
        .body(Body::from("307 redirect due to cache miss"))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::fs;

    use tempfile::TempDir;

    fn request(path: &str) -> Request<Body> {
        Request::builder()
            .uri(path)
            .header(header::HOST, "cache.example.org")
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_serves_cached_file_and_counts_download() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("ubuntu")).unwrap();
        fs::write(temp.path().join("ubuntu/img.tar.lz4"), b"image-bytes").unwrap();

        let metrics = Arc::new(CacheMetrics::new());
        let app = router(temp.path().to_path_buf(), Arc::clone(&metrics));

        let response = app.oneshot(request("/ubuntu/img.tar.lz4")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"image-bytes");
        assert_eq!(metrics.snapshot().files_served, 1);
        assert_eq!(metrics.snapshot().cache_misses, 0);
    }

    #[tokio::test]
    async fn test_miss_redirects_to_origin_and_counts_miss() {
        let temp = TempDir::new().unwrap();
        let metrics = Arc::new(CacheMetrics::new());
        let app = router(temp.path().to_path_buf(), Arc::clone(&metrics));

        let response = app.oneshot(request("/not/cached/img.tar.lz4")).await.unwrap();

        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(
            response.headers().get(header::LOCATION).unwrap(),
            "https://cache.example.org/not/cached/img.tar.lz4"
        );
        assert_eq!(metrics.snapshot().cache_misses, 1);
        assert_eq!(metrics.snapshot().files_served, 0);
    }

    #[tokio::test]
    async fn test_health() {
        let temp = TempDir::new().unwrap();
        let app = router(temp.path().to_path_buf(), Arc::new(CacheMetrics::new()));

        let response = app.oneshot(request("/health")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"HEALTHY");
    }

    #[tokio::test]
    async fn test_metrics_snapshot_endpoint() {
        let temp = TempDir::new().unwrap();
        let metrics = Arc::new(CacheMetrics::new());
        metrics.add_downloaded_bytes(42);
        let app = router(temp.path().to_path_buf(), Arc::clone(&metrics));

        let response = app.oneshot(request("/metrics")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let snapshot: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(snapshot["sync_downloaded_bytes"], 42);
    }
}
