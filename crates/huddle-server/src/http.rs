//! HTTP surface: the WebSocket route plus the auxiliary endpoints.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tokio_util::io::ReaderStream;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::warn;

use crate::ws::{ws_handler, AppState};

pub fn router(state: Arc<AppState>, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .route("/downloads/host-app-win.zip", get(download_handler))
        .layer(cors_layer(cors_origins))
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        return CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);
    }
    let mut allowed = Vec::with_capacity(origins.len());
    for origin in origins {
        match origin.parse::<HeaderValue>() {
            Ok(value) => allowed.push(value),
            Err(_) => warn!(origin = %origin, "ignoring unparseable CORS origin"),
        }
    }
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(Any)
        .allow_headers(Any)
}

async fn health_handler() -> &'static str {
    "OK"
}

/// Stream the configured host app package, or 404 with a JSON error when it
/// is unconfigured or missing on disk.
async fn download_handler(State(state): State<Arc<AppState>>) -> Response {
    let Some(path) = state.host_app_zip.clone() else {
        return not_found("host app download is not configured");
    };
    match tokio::fs::File::open(&path).await {
        Ok(file) => {
            let body = Body::from_stream(ReaderStream::new(file));
            (
                [
                    (header::CONTENT_TYPE, HeaderValue::from_static("application/zip")),
                    (
                        header::CONTENT_DISPOSITION,
                        HeaderValue::from_static("attachment; filename=\"host-app-win.zip\""),
                    ),
                ],
                body,
            )
                .into_response()
        }
        Err(err) => {
            warn!(path = %path.display(), %err, "host app package unavailable");
            not_found("host app package not found")
        }
    }
}

fn not_found(message: &str) -> Response {
    (StatusCode::NOT_FOUND, Json(json!({ "error": message }))).into_response()
}
