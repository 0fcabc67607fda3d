//! AVIF source decoding.
//!
//! The `image` crate's `"avif"` feature only enables the rav1e encoder;
//! decoding needs `"avif-native"`, which links the C dav1d library. Sources
//! are decoded here instead: `avif-parse` pulls the primary AV1 item out of
//! the HEIF container and `rav1d` (the Rust port of dav1d) decodes it. The
//! YUV planes are converted to RGB8 with full-range BT.601 coefficients.

use super::backend::BackendError;
use image::{DynamicImage, RgbImage};
use rav1d::include::dav1d::data::Dav1dData;
use rav1d::include::dav1d::dav1d::Dav1dSettings;
use rav1d::include::dav1d::headers::{
    DAV1D_PIXEL_LAYOUT_I400, DAV1D_PIXEL_LAYOUT_I420, DAV1D_PIXEL_LAYOUT_I422,
    DAV1D_PIXEL_LAYOUT_I444,
};
use rav1d::include::dav1d::picture::Dav1dPicture;
use rav1d::src::lib as dav1d;
use std::io::Cursor;
use std::mem::MaybeUninit;
use std::ptr::NonNull;

/// True for an ISO-BMFF `ftyp` box with an AVIF brand.
pub fn sniff(bytes: &[u8]) -> bool {
    bytes.len() >= 12 && &bytes[4..8] == b"ftyp" && matches!(&bytes[8..12], b"avif" | b"avis")
}

fn failed(what: impl std::fmt::Display) -> BackendError {
    BackendError::ProcessingFailed(format!("AVIF decode failed: {}", what))
}

/// Runs a cleanup closure on scope exit.
struct OnDrop<F: FnMut()>(F);

impl<F: FnMut()> Drop for OnDrop<F> {
    fn drop(&mut self) {
        (self.0)()
    }
}

/// Decode the primary image of an AVIF file held in memory.
pub fn decode(bytes: &[u8]) -> Result<DynamicImage, BackendError> {
    let avif = avif_parse::read_avif(&mut Cursor::new(bytes)).map_err(|e| failed(format!("{e:?}")))?;
    let av1: &[u8] = &avif.primary_item;

    let mut settings = MaybeUninit::<Dav1dSettings>::uninit();
    unsafe { dav1d::dav1d_default_settings(NonNull::from(&mut settings).cast()) };
    let mut settings = unsafe { settings.assume_init() };
    settings.n_threads = 1;
    settings.max_frame_delay = 1;

    let mut ctx = None;
    let rc = unsafe { dav1d::dav1d_open(NonNull::new(&mut ctx), NonNull::new(&mut settings)) };
    if rc.0 != 0 {
        return Err(failed(format!("rav1d open returned {}", rc.0)));
    }
    let decoder = ctx;
    let _close = OnDrop(|| unsafe {
        dav1d::dav1d_close(NonNull::new(&mut ctx));
    });

    let mut data = Dav1dData::default();
    let buf = unsafe { dav1d::dav1d_data_create(NonNull::new(&mut data), av1.len()) };
    if buf.is_null() {
        return Err(failed("rav1d could not allocate input buffer"));
    }
    unsafe { std::ptr::copy_nonoverlapping(av1.as_ptr(), buf, av1.len()) };

    let rc = unsafe { dav1d::dav1d_send_data(decoder, NonNull::new(&mut data)) };
    if rc.0 != 0 {
        unsafe { dav1d::dav1d_data_unref(NonNull::new(&mut data)) };
        return Err(failed(format!("rav1d send_data returned {}", rc.0)));
    }

    let mut pic: Dav1dPicture = unsafe { std::mem::zeroed() };
    let rc = unsafe { dav1d::dav1d_get_picture(decoder, NonNull::new(&mut pic)) };
    if rc.0 != 0 {
        return Err(failed(format!("rav1d get_picture returned {}", rc.0)));
    }
    let converted = picture_to_rgb(&pic);
    unsafe { dav1d::dav1d_picture_unref(NonNull::new(&mut pic)) };

    let (width, height, rgb) = converted?;
    RgbImage::from_raw(width, height, rgb)
        .map(DynamicImage::ImageRgb8)
        .ok_or_else(|| failed("decoded buffer does not match picture size"))
}

/// One plane of a decoded picture.
#[derive(Clone, Copy)]
struct Plane {
    ptr: *const u8,
    stride: isize,
}

impl Plane {
    /// Sample at `(x, y)`. Depths above 8 bits are stored as `u16`.
    fn sample(&self, x: u32, y: u32, bpc: u32) -> f32 {
        let row = y as isize * self.stride;
        unsafe {
            if bpc <= 8 {
                f32::from(*self.ptr.offset(row + x as isize))
            } else {
                let p = self.ptr.offset(row + x as isize * 2) as *const u16;
                f32::from(p.read_unaligned())
            }
        }
    }
}

fn picture_to_rgb(pic: &Dav1dPicture) -> Result<(u32, u32, Vec<u8>), BackendError> {
    let width = pic.p.w as u32;
    let height = pic.p.h as u32;
    let bpc = pic.p.bpc as u32;
    let layout = pic.p.layout;

    let plane = |index: usize, stride: isize| {
        pic.data[index]
            .map(|ptr| Plane {
                ptr: ptr.as_ptr() as *const u8,
                stride,
            })
            .ok_or_else(|| failed(format!("picture has no plane {index}")))
    };
    let luma = plane(0, pic.stride[0])?;

    let chroma = if layout == DAV1D_PIXEL_LAYOUT_I400 {
        None
    } else {
        let subsampling = match layout {
            DAV1D_PIXEL_LAYOUT_I420 => (1, 1),
            DAV1D_PIXEL_LAYOUT_I422 => (1, 0),
            DAV1D_PIXEL_LAYOUT_I444 => (0, 0),
            other => return Err(failed(format!("unsupported pixel layout {other}"))),
        };
        Some((plane(1, pic.stride[1])?, plane(2, pic.stride[1])?, subsampling))
    };

    let max = ((1u32 << bpc) - 1) as f32;
    let center = (1u32 << (bpc - 1)) as f32;
    let scale = 255.0 / max;
    let to_u8 = |v: f32| (v * scale).clamp(0.0, 255.0) as u8;

    let mut rgb = Vec::with_capacity(width as usize * height as usize * 3);
    for y in 0..height {
        for x in 0..width {
            let luma_value = luma.sample(x, y, bpc);
            match chroma {
                None => {
                    let v = to_u8(luma_value);
                    rgb.extend_from_slice(&[v, v, v]);
                }
                Some((cb_plane, cr_plane, (sx, sy))) => {
                    let cb = cb_plane.sample(x >> sx, y >> sy, bpc) - center;
                    let cr = cr_plane.sample(x >> sx, y >> sy, bpc) - center;
                    rgb.extend_from_slice(&[
                        to_u8(luma_value + 1.402 * cr),
                        to_u8(luma_value - 0.344136 * cb - 0.714136 * cr),
                        to_u8(luma_value + 1.772 * cb),
                    ]);
                }
            }
        }
    }
    Ok((width, height, rgb))
}
