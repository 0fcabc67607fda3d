//! Shared test utilities for the pixgate test suite.
//!
//! Provides in-memory image fixtures and a recording [`MockFetcher`] so
//! handler tests never touch the network.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let fetcher = MockFetcher::serving(jpeg_bytes(400, 300), Some("image/jpeg"));
//! // ... run a request through the handler ...
//! assert_eq!(fetcher.fetched(), ["https://img.example/a.jpg"]);
//! ```

use crate::fetch::{FetchError, FetchedSource, SourceFetcher};
use async_trait::async_trait;
use bytes::Bytes;
use image::{ImageEncoder, RgbImage, RgbaImage};
use reqwest::StatusCode;
use std::sync::Mutex;
use url::Url;

// =========================================================================
// Image fixtures
// =========================================================================

/// A gradient JPEG of the given size.
pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    });
    let mut buf = Vec::new();
    image::codecs::jpeg::JpegEncoder::new(&mut buf)
        .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgb8)
        .unwrap();
    buf
}

/// A gradient PNG with an alpha channel.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = RgbaImage::from_fn(width, height, |x, y| {
        image::Rgba([(x % 256) as u8, (y % 256) as u8, 64, 255])
    });
    let mut buf = Vec::new();
    image::codecs::png::PngEncoder::new(&mut buf)
        .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgba8)
        .unwrap();
    buf
}

/// A flat orange AVIF, encoded with rav1e.
pub fn avif_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, image::Rgb([255, 140, 0]));
    let mut buf = Vec::new();
    image::codecs::avif::AvifEncoder::new_with_speed_quality(&mut buf, 10, 90)
        .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgb8)
        .unwrap();
    buf
}

/// Splice an EXIF APP1 segment carrying only `Orientation` into a JPEG.
pub fn with_exif_orientation(jpeg: &[u8], orientation: u16) -> Vec<u8> {
    let mut tiff = Vec::new();
    tiff.extend_from_slice(b"MM\0\x2a\0\0\0\x08"); // big-endian, IFD at 8
    tiff.extend_from_slice(&1u16.to_be_bytes()); // one entry
    tiff.extend_from_slice(&0x0112u16.to_be_bytes()); // Orientation
    tiff.extend_from_slice(&3u16.to_be_bytes()); // SHORT
    tiff.extend_from_slice(&1u32.to_be_bytes());
    tiff.extend_from_slice(&orientation.to_be_bytes());
    tiff.extend_from_slice(&[0, 0]);
    tiff.extend_from_slice(&0u32.to_be_bytes()); // no next IFD

    let payload_len = (2 + 6 + tiff.len()) as u16;
    let mut out = jpeg[..2].to_vec(); // SOI
    out.extend_from_slice(&[0xFF, 0xE1]);
    out.extend_from_slice(&payload_len.to_be_bytes());
    out.extend_from_slice(b"Exif\0\0");
    out.extend_from_slice(&tiff);
    out.extend_from_slice(&jpeg[2..]);
    out
}

// =========================================================================
// MockFetcher
// =========================================================================

/// Fetcher that serves one canned response and records every URL asked for.
#[derive(Default)]
pub struct MockFetcher {
    pub body: Mutex<Option<FetchedSource>>,
    pub status: Mutex<Option<StatusCode>>,
    pub requests: Mutex<Vec<String>>,
}

impl MockFetcher {
    pub fn serving(body: Vec<u8>, content_type: Option<&str>) -> Self {
        Self {
            body: Mutex::new(Some(FetchedSource {
                bytes: Bytes::from(body),
                content_type: content_type.map(str::to_string),
            })),
            ..Self::default()
        }
    }

    /// Every fetch fails with this upstream status.
    pub fn failing(status: StatusCode) -> Self {
        Self {
            status: Mutex::new(Some(status)),
            ..Self::default()
        }
    }

    pub fn fetched(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl SourceFetcher for MockFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchedSource, FetchError> {
        self.requests.lock().unwrap().push(url.to_string());
        if let Some(status) = *self.status.lock().unwrap() {
            return Err(FetchError::Status {
                status,
                url: url.to_string(),
            });
        }
        self.body.lock().unwrap().clone().ok_or(FetchError::Status {
            status: StatusCode::NOT_FOUND,
            url: url.to_string(),
        })
    }
}
