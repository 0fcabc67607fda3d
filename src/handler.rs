//! Request orchestration: URL in, transformed image out.
//!
//! ## Stages
//!
//! ```text
//! decode ─► canonicalize ─► cache lookup ─┬─ hit ──────────────────────────────► respond
//!                                         └─ miss ─► validate ─► fetch ─► engine ─► publish ─► respond
//! ```
//!
//! 1. **Decode**: [`UrlCodec::safe_decode`] the request target. Failure is a
//!    client error.
//! 2. **Canonicalize**: re-encode the descriptor and hash it into the key.
//! 3. **Lookup**: a hit is served straight from disk. The source is neither
//!    validated nor fetched again.
//! 4. **Validate**: scheme, credentials and allowlist checks on `source`.
//! 5. **Fetch**: through the [`SourceFetcher`].
//! 6. **Engine**: the [`ImageBackend`] runs on the rayon pool; the request
//!    task awaits it through a oneshot channel.
//! 7. **Publish**: write body and metadata to the cache.
//!
//! Each stage has its own error type; [`TransformError`] wraps them and maps
//! each to an HTTP status.

use crate::cache::{CacheMetadata, CacheStatus, FileCache, derive_key};
use crate::codec::{CodecError, UrlCodec};
use crate::fetch::{FetchError, SourceFetcher};
use crate::imaging::{BackendError, ImageBackend, TransformOps, TransformOutput};
use crate::validate::{SourceValidator, ValidationError};
use axum::http::StatusCode;
use bytes::Bytes;
use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// `Cache-Control` sent with every successful response unless configured.
pub const DEFAULT_CACHE_CONTROL: &str = "public, max-age=31536000, immutable";

/// Content type when neither upstream nor the engine can name one.
pub const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("invalid request: {0}")]
    Decode(#[from] CodecError),
    #[error("{0}")]
    Validation(#[from] ValidationError),
    #[error("upstream fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("image transform failed: {0}")]
    Transform(#[from] BackendError),
    #[error("cache I/O failed: {0}")]
    Cache(#[from] io::Error),
}

impl TransformError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            TransformError::Decode(_) => StatusCode::BAD_REQUEST,
            TransformError::Validation(e) if e.is_forbidden() => StatusCode::FORBIDDEN,
            TransformError::Validation(_) => StatusCode::BAD_REQUEST,
            TransformError::Fetch(_) | TransformError::Transform(_) => StatusCode::BAD_GATEWAY,
            TransformError::Cache(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// A successful transform, ready to be written to the client.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformResponse {
    pub body: Bytes,
    pub content_type: String,
    pub cache_control: String,
    pub cache_status: CacheStatus,
}

pub struct TransformHandler {
    codec: UrlCodec,
    cache: FileCache,
    validator: SourceValidator,
    fetcher: Arc<dyn SourceFetcher>,
    backend: Arc<dyn ImageBackend>,
    cache_control: String,
}

impl TransformHandler {
    pub fn new(
        codec: UrlCodec,
        cache: FileCache,
        validator: SourceValidator,
        fetcher: Arc<dyn SourceFetcher>,
        backend: Arc<dyn ImageBackend>,
    ) -> Self {
        Self {
            codec,
            cache,
            validator,
            fetcher,
            backend,
            cache_control: DEFAULT_CACHE_CONTROL.to_string(),
        }
    }

    pub fn with_cache_control(mut self, cache_control: impl Into<String>) -> Self {
        self.cache_control = cache_control.into();
        self
    }

    pub fn codec(&self) -> &UrlCodec {
        &self.codec
    }

    /// Serve one request target (absolute URL or `/path?query`).
    pub async fn handle(&self, request_url: &str) -> Result<TransformResponse, TransformError> {
        let descriptor = self.codec.safe_decode(request_url)?;
        let canonical = self.codec.encode(&descriptor);
        let key = derive_key(&canonical);

        if let Some(entry) = self.cache.read(&key).await? {
            debug!("Cache hit {} for {}", key, canonical);
            return Ok(self.respond(entry.body, entry.metadata.content_type, CacheStatus::Hit));
        }
        debug!("Cache miss {} for {}", key, canonical);

        let source = self.validator.validate(&descriptor.source).inspect_err(|e| {
            debug!("Rejected source {}: {}", descriptor.source, e);
        })?;
        let fetched = self.fetcher.fetch(&source).await.inspect_err(|e| {
            warn!("Fetch failed for {}: {}", source, e);
        })?;

        let ops = TransformOps::from(&descriptor);
        let output = self
            .run_engine(fetched.bytes, ops)
            .await
            .inspect_err(|e| warn!("Transform failed for {}: {}", canonical, e))?;

        let content_type = match descriptor.fmt.content_type() {
            Some(ct) => ct.to_string(),
            None => fetched
                .content_type
                .or(output.content_type)
                .unwrap_or_else(|| FALLBACK_CONTENT_TYPE.to_string()),
        };

        let metadata = CacheMetadata::for_body(content_type.as_str(), &output.bytes);
        self.cache.write(&key, &output.bytes, &metadata).await?;
        info!(
            "Published {} ({}, {} bytes) for {}",
            key,
            content_type,
            output.bytes.len(),
            canonical
        );

        Ok(self.respond(Bytes::from(output.bytes), content_type, CacheStatus::Miss))
    }

    /// Run the backend on the rayon pool and await its result.
    async fn run_engine(
        &self,
        input: Bytes,
        ops: TransformOps,
    ) -> Result<TransformOutput, BackendError> {
        let backend = Arc::clone(&self.backend);
        let (tx, rx) = oneshot::channel();
        rayon::spawn(move || {
            // A panic escaping a rayon job aborts the process.
            let result = panic::catch_unwind(AssertUnwindSafe(|| backend.transform(&input, &ops)))
                .unwrap_or_else(|payload| {
                    Err(BackendError::ProcessingFailed(format!(
                        "transform panicked: {}",
                        panic_message(payload.as_ref())
                    )))
                });
            let _ = tx.send(result);
        });
        rx.await.map_err(|_| {
            BackendError::ProcessingFailed("transform worker exited without a result".to_string())
        })?
    }

    fn respond(&self, body: Bytes, content_type: String, cache_status: CacheStatus) -> TransformResponse {
        TransformResponse {
            body,
            content_type,
            cache_control: self.cache_control.clone(),
            cache_status,
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
