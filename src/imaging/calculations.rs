//! Pure calculation functions for image dimensions.
//!
//! All functions here are pure and testable without any I/O or images.

use super::params::ResizeOp;
use crate::descriptor::Fit;

/// What the backend has to do to the pixels for a resize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizePlan {
    /// Resample to exactly these dimensions.
    Scale { width: u32, height: u32 },
    /// Fill this box, cropping the overflow around the center.
    Crop { width: u32, height: u32 },
    /// Resample to `width`×`height` and center on a `canvas` sized box.
    Pad {
        width: u32,
        height: u32,
        canvas_width: u32,
        canvas_height: u32,
    },
}

/// The box a request asks for. A missing side follows the source aspect ratio.
///
/// # Examples
/// ```
/// # use pixgate::imaging::calculations::requested_box;
/// assert_eq!(requested_box((800, 600), Some(400), None), (400, 300));
/// assert_eq!(requested_box((800, 600), None, Some(150)), (200, 150));
/// ```
pub fn requested_box(source: (u32, u32), width: Option<u32>, height: Option<u32>) -> (u32, u32) {
    let (src_w, src_h) = source;
    match (width, height) {
        (Some(w), Some(h)) => (w, h),
        (Some(w), None) => (w, scale_dim(src_h, w as f64 / src_w as f64)),
        (None, Some(h)) => (scale_dim(src_w, h as f64 / src_h as f64), h),
        (None, None) => source,
    }
}

/// Decide output geometry for `op` applied to an image of `source` size.
///
/// With `without_enlargement`, the output never exceeds the source on either
/// axis: scale factors are capped at 1 for `inside`/`outside`, and the box is
/// clamped to the source for `cover`/`contain`/`fill`.
pub fn plan_resize(source: (u32, u32), op: &ResizeOp) -> ResizePlan {
    let (src_w, src_h) = source;
    let (box_w, box_h) = requested_box(source, op.width, op.height);
    let ratio_w = box_w as f64 / src_w as f64;
    let ratio_h = box_h as f64 / src_h as f64;

    let scaled = |factor: f64| {
        let factor = if op.without_enlargement {
            factor.min(1.0)
        } else {
            factor
        };
        ResizePlan::Scale {
            width: scale_dim(src_w, factor),
            height: scale_dim(src_h, factor),
        }
    };
    let (box_w, box_h) = if op.without_enlargement {
        (box_w.min(src_w), box_h.min(src_h))
    } else {
        (box_w, box_h)
    };

    match op.fit {
        Fit::Inside => scaled(ratio_w.min(ratio_h)),
        Fit::Outside => scaled(ratio_w.max(ratio_h)),
        Fit::Fill => ResizePlan::Scale {
            width: box_w,
            height: box_h,
        },
        Fit::Cover => ResizePlan::Crop {
            width: box_w,
            height: box_h,
        },
        Fit::Contain => {
            let factor = (box_w as f64 / src_w as f64).min(box_h as f64 / src_h as f64);
            let width = scale_dim(src_w, factor).min(box_w);
            let height = scale_dim(src_h, factor).min(box_h);
            if (width, height) == (box_w, box_h) {
                ResizePlan::Scale { width, height }
            } else {
                ResizePlan::Pad {
                    width,
                    height,
                    canvas_width: box_w,
                    canvas_height: box_h,
                }
            }
        }
    }
}

/// Offset that centers `inner` within `outer`.
pub fn center_offset(outer: (u32, u32), inner: (u32, u32)) -> (u32, u32) {
    (
        outer.0.saturating_sub(inner.0) / 2,
        outer.1.saturating_sub(inner.1) / 2,
    )
}

fn scale_dim(value: u32, factor: f64) -> u32 {
    (value as f64 * factor).round().clamp(1.0, u32::MAX as f64) as u32
}
