//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait has one operation: turn source bytes into output
//! bytes according to [`TransformOps`]. The rest of the crate only ever talks
//! to this trait, so tests can substitute a recording mock.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend): pure Rust, statically
//! linked.

use super::params::TransformOps;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
}

/// Encoded result of a transform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformOutput {
    pub bytes: Vec<u8>,
    /// MIME type of `bytes` when the backend knows it.
    pub content_type: Option<String>,
}

/// Trait for image processing backends.
///
/// Implementations run on rayon worker threads, so they must be `Send + Sync`
/// and may block.
pub trait ImageBackend: Send + Sync {
    fn transform(&self, input: &[u8], ops: &TransformOps) -> Result<TransformOutput, BackendError>;
}
