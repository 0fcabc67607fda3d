//! HTTP surface: one image route plus a health check.
//!
//! The image route is mounted at the path of the configured
//! `api_route_url`. Responses carry `Content-Type`, `Cache-Control` and an
//! `X-Transform-Cache: hit|miss` header. Errors are plain text with the
//! status from [`TransformError::status_code`].

use crate::handler::{TransformError, TransformHandler, TransformResponse};
use axum::Router;
use axum::extract::{OriginalUri, State};
use axum::http::{HeaderValue, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Reports whether the response was served from the disk cache.
pub const CACHE_STATUS_HEADER: &str = "x-transform-cache";

/// Build the router with the image route at `route_path`.
pub fn router(handler: Arc<TransformHandler>, route_path: &str) -> Router {
    Router::new()
        .route(route_path, get(transform))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .with_state(handler)
}

async fn transform(
    State(handler): State<Arc<TransformHandler>>,
    OriginalUri(uri): OriginalUri,
) -> Result<TransformResponse, TransformError> {
    handler.handle(&uri.to_string()).await
}

async fn healthz() -> &'static str {
    "ok"
}

impl IntoResponse for TransformResponse {
    fn into_response(self) -> Response {
        let mut response = self.body.into_response();
        let headers = response.headers_mut();
        let content_type = HeaderValue::from_str(&self.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static(crate::handler::FALLBACK_CONTENT_TYPE));
        headers.insert(header::CONTENT_TYPE, content_type);
        if let Ok(value) = HeaderValue::from_str(&self.cache_control) {
            headers.insert(header::CACHE_CONTROL, value);
        }
        headers.insert(
            CACHE_STATUS_HEADER,
            HeaderValue::from_static(self.cache_status.as_str()),
        );
        response
    }
}

impl IntoResponse for TransformError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }
        (status, self.to_string()).into_response()
    }
}

/// Serve until ctrl-c.
pub async fn serve(listener: TcpListener, app: Router) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("Listening on http://{}", addr);
    }
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutting down");
    }
}
