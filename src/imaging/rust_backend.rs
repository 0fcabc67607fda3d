//! Pure Rust image processing backend.
//!
//! Everything is statically linked into the binary.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, GIF, TIFF, WebP) | `image` crate, format sniffed from the bytes |
//! | Decode (AVIF) | `avif::decode`: `avif-parse` + `rav1d` |
//! | Auto-orient | `ImageDecoder::orientation` + `DynamicImage::apply_orientation` |
//! | Resize | `resize_exact` / `resize_to_fill` with `Lanczos3` |
//! | Pad (`contain`) | `imageops::overlay` onto an opaque black canvas |
//! | Encode → WebP | `webp::Encoder` (libwebp, lossy at `q`) |
//! | Encode → AVIF | `image::codecs::avif::AvifEncoder` (rav1e, speed 6) |
//! | Re-encode in source format | `DynamicImage::write_to`, JPEG via `JpegEncoder` with quality |
//!
//! A request with no resize and no format change returns the source bytes
//! untouched, unless the source carries an EXIF orientation that needs
//! applying; then it is decoded, rotated upright and re-encoded in its own
//! format.

use super::avif;
use super::backend::{BackendError, ImageBackend, TransformOutput};
use super::calculations::{ResizePlan, center_offset, plan_resize};
use super::params::{ResizeOp, TransformOps};
use crate::descriptor::{Format, Quality};
use image::codecs::avif::AvifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::metadata::Orientation;
use image::{DynamicImage, ImageDecoder, ImageFormat, ImageReader, Rgba, RgbaImage};
use std::io::Cursor;

/// AV1 encoder speed (0 slowest/best … 10 fastest).
const AVIF_SPEED: u8 = 6;

/// Pure Rust backend using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// MIME type of an encoded image, sniffed from its magic bytes.
pub fn detect_content_type(bytes: &[u8]) -> Option<&'static str> {
    if avif::sniff(bytes) {
        return Some("image/avif");
    }
    image::guess_format(bytes).ok().map(|f| f.to_mime_type())
}

/// EXIF orientation of the source, when it can be read from the headers alone.
fn source_orientation(input: &[u8]) -> Option<Orientation> {
    ImageReader::new(Cursor::new(input))
        .with_guessed_format()
        .ok()?
        .into_decoder()
        .ok()?
        .orientation()
        .ok()
}

/// Decode from memory, applying the EXIF orientation when asked.
fn decode(input: &[u8], auto_orient: bool) -> Result<(DynamicImage, ImageFormat), BackendError> {
    let failed = |e: image::ImageError| {
        BackendError::ProcessingFailed(format!("Failed to decode source image: {}", e))
    };
    if avif::sniff(input) {
        return Ok((avif::decode(input)?, ImageFormat::Avif));
    }
    let reader = ImageReader::new(Cursor::new(input)).with_guessed_format()?;
    let format = reader.format().ok_or_else(|| {
        BackendError::ProcessingFailed("Unrecognized source image format".to_string())
    })?;
    let mut decoder = reader.into_decoder().map_err(failed)?;
    let orientation = if auto_orient {
        decoder.orientation().unwrap_or(Orientation::NoTransforms)
    } else {
        Orientation::NoTransforms
    };
    let mut img = DynamicImage::from_decoder(decoder).map_err(failed)?;
    img.apply_orientation(orientation);
    Ok((img, format))
}

fn resize(img: DynamicImage, op: &ResizeOp) -> DynamicImage {
    match plan_resize((img.width(), img.height()), op) {
        ResizePlan::Scale { width, height } => {
            if (width, height) == (img.width(), img.height()) {
                img
            } else {
                img.resize_exact(width, height, FilterType::Lanczos3)
            }
        }
        ResizePlan::Crop { width, height } => img.resize_to_fill(width, height, FilterType::Lanczos3),
        ResizePlan::Pad {
            width,
            height,
            canvas_width,
            canvas_height,
        } => {
            let scaled = img.resize_exact(width, height, FilterType::Lanczos3);
            let mut canvas = RgbaImage::from_pixel(canvas_width, canvas_height, Rgba([0, 0, 0, 255]));
            let (x, y) = center_offset((canvas_width, canvas_height), (width, height));
            image::imageops::overlay(&mut canvas, &scaled.to_rgba8(), x.into(), y.into());
            DynamicImage::ImageRgba8(canvas)
        }
    }
}

/// Narrow to 8-bit RGB(A), the layouts every encoder here accepts.
fn to_8bit(img: DynamicImage) -> DynamicImage {
    match img {
        DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_) => img,
        other if other.color().has_alpha() => DynamicImage::ImageRgba8(other.to_rgba8()),
        other => DynamicImage::ImageRgb8(other.to_rgb8()),
    }
}

fn encode(
    img: DynamicImage,
    format: Format,
    quality: Quality,
    source_format: ImageFormat,
) -> Result<TransformOutput, BackendError> {
    let failed = |what: &str, e: image::ImageError| {
        BackendError::ProcessingFailed(format!("{} encode failed: {}", what, e))
    };
    let mut buf = Vec::new();
    let content_type = match format {
        Format::Webp => {
            buf = encode_webp(&img, quality)?;
            "image/webp"
        }
        Format::Avif => {
            let encoder = AvifEncoder::new_with_speed_quality(&mut buf, AVIF_SPEED, quality.value().max(1));
            to_8bit(img)
                .write_with_encoder(encoder)
                .map_err(|e| failed("AVIF", e))?;
            "image/avif"
        }
        Format::Preserve => {
            match source_format {
                ImageFormat::Jpeg => {
                    let encoder = JpegEncoder::new_with_quality(&mut buf, quality.value().max(1));
                    DynamicImage::ImageRgb8(img.to_rgb8())
                        .write_with_encoder(encoder)
                        .map_err(|e| failed("JPEG", e))?;
                }
                other => img
                    .write_to(&mut Cursor::new(&mut buf), other)
                    .map_err(|e| failed(&format!("{:?}", other), e))?,
            }
            source_format.to_mime_type()
        }
    };
    Ok(TransformOutput {
        bytes: buf,
        content_type: Some(content_type.to_string()),
    })
}

/// Lossy WebP at `quality`, keeping alpha when the image has it.
fn encode_webp(img: &DynamicImage, quality: Quality) -> Result<Vec<u8>, BackendError> {
    let (width, height) = (img.width(), img.height());
    let q = f32::from(quality.value());
    let encoded = if img.color().has_alpha() {
        let rgba = img.to_rgba8();
        webp::Encoder::from_rgba(rgba.as_raw(), width, height).encode_simple(false, q)
    } else {
        let rgb = img.to_rgb8();
        webp::Encoder::from_rgb(rgb.as_raw(), width, height).encode_simple(false, q)
    };
    encoded
        .map(|memory| memory.to_vec())
        .map_err(|e| BackendError::ProcessingFailed(format!("WebP encode failed: {:?}", e)))
}

impl ImageBackend for RustBackend {
    fn transform(&self, input: &[u8], ops: &TransformOps) -> Result<TransformOutput, BackendError> {
        let upright = !ops.auto_orient
            || source_orientation(input).is_none_or(|o| o == Orientation::NoTransforms);
        if ops.is_passthrough() && upright {
            return Ok(TransformOutput {
                bytes: input.to_vec(),
                content_type: detect_content_type(input).map(str::to_string),
            });
        }

        let (img, source_format) = decode(input, ops.auto_orient)?;
        let img = match &ops.resize {
            Some(op) => resize(img, op),
            None => img,
        };
        encode(img, ops.format, ops.quality, source_format)
    }
}
