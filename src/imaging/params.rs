//! Parameter types for image operations.
//!
//! These structs describe *what* to do, not *how* to do it. They are the
//! interface between the [`handler`](crate::handler) (which decides what the
//! request asks for) and the [`backend`](super::backend) (which does the pixel
//! work). Swapping in a mock backend for tests needs no change to the handler.
//!
//! ## Types
//!
//! - [`TransformOps`]: the full engine instruction for one request.
//! - [`ResizeOp`]: requested box, fit mode, and the no-upscaling rule.

use crate::descriptor::{Fit, Format, Quality, TransformDescriptor};

/// Resize request. At least one of `width`/`height` is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizeOp {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fit: Fit,
    /// Never produce an output larger than the source on either axis.
    pub without_enlargement: bool,
}

/// Everything the engine does to one source image, in order:
/// orient, resize, encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransformOps {
    pub auto_orient: bool,
    pub resize: Option<ResizeOp>,
    pub format: Format,
    pub quality: Quality,
}

impl TransformOps {
    /// `Preserve` with no resize: the source bytes are the output.
    pub fn is_passthrough(&self) -> bool {
        self.format == Format::Preserve && self.resize.is_none()
    }
}

impl From<&TransformDescriptor> for TransformOps {
    fn from(d: &TransformDescriptor) -> Self {
        Self {
            auto_orient: true,
            resize: d.resizes().then_some(ResizeOp {
                width: d.w,
                height: d.h,
                fit: d.fit,
                without_enlargement: true,
            }),
            format: d.fmt,
            quality: d.effective_quality(),
        }
    }
}
