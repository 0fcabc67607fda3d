//! Image processing in pure Rust, statically linked.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Decode + orient** | `image::ImageReader` + EXIF orientation; AVIF via `avif-parse` + `rav1d` |
//! | **Resize** | Lanczos3, fit-mode geometry from [`calculations`] |
//! | **Encode** | WebP (libwebp, lossy), AVIF (rav1e), or the source format |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Parameters**: Data structures describing image operations
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]

mod avif;
pub mod backend;
pub mod calculations;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, ImageBackend, TransformOutput};
pub use params::{ResizeOp, TransformOps};
pub use rust_backend::{RustBackend, detect_content_type};
