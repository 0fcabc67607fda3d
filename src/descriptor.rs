//! The transform descriptor: what a single request asks for.
//!
//! A [`TransformDescriptor`] is the decoded, validated shape of an image
//! request. It is produced by the [`codec`](crate::codec) from an inbound URL,
//! re-encoded by the same codec to get the canonical URL, and then handed to
//! the [`handler`](crate::handler) which turns it into engine operations.
//!
//! ## Fields and defaults
//!
//! | Field | Type | Default | Omitted from canonical URL when |
//! |---|---|---|---|
//! | `w` | positive `u32` (≤ `i32::MAX`) | none | absent |
//! | `h` | positive `u32` (≤ `i32::MAX`) | none | absent |
//! | `fit` | [`Fit`] | `inside` | `inside` |
//! | `fmt` | [`Format`] | `preserve` | `preserve` |
//! | `q` | [`Quality`] (0–100) | none (engine uses 100) | absent |
//! | `source` | absolute URL string | required | never |
//!
//! Every field has exactly one default, and the codec omits a field exactly
//! when it holds that default. Keeping that pairing in one table is what makes
//! the canonical URL unique per descriptor.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Largest accepted width/height. Dimensions are 32-bit signed on the wire.
pub const MAX_DIMENSION: u32 = i32::MAX as u32;

/// Quality used when re-encoding and the request carries no `q`.
pub const DEFAULT_QUALITY: u8 = 100;

/// Resize fit mode.
///
/// - `cover`: fill the box, cropping the overflow (aspect preserved)
/// - `contain`: fit inside the box, padding the remainder (aspect preserved)
/// - `fill`: stretch to the box exactly (aspect ignored)
/// - `inside`: fit inside the box, no padding (aspect preserved)
/// - `outside`: cover the box, no cropping (aspect preserved)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Fit {
    Cover,
    Contain,
    Fill,
    #[default]
    Inside,
    Outside,
}

impl Fit {
    pub const ALL: [Fit; 5] = [Fit::Cover, Fit::Contain, Fit::Fill, Fit::Inside, Fit::Outside];

    pub fn as_str(self) -> &'static str {
        match self {
            Fit::Cover => "cover",
            Fit::Contain => "contain",
            Fit::Fill => "fill",
            Fit::Inside => "inside",
            Fit::Outside => "outside",
        }
    }
}

impl FromStr for Fit {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Fit::ALL
            .into_iter()
            .find(|fit| fit.as_str() == s)
            .ok_or_else(|| UnknownVariant(s.to_string()))
    }
}

impl fmt::Display for Fit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output format. `Preserve` keeps whatever the upstream image already is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Format {
    #[default]
    Preserve,
    Webp,
    Avif,
}

impl Format {
    pub const ALL: [Format; 3] = [Format::Preserve, Format::Webp, Format::Avif];

    pub fn as_str(self) -> &'static str {
        match self {
            Format::Preserve => "preserve",
            Format::Webp => "webp",
            Format::Avif => "avif",
        }
    }

    /// MIME type of the re-encoded output, `None` for `Preserve`.
    pub fn content_type(self) -> Option<&'static str> {
        match self {
            Format::Preserve => None,
            Format::Webp => Some("image/webp"),
            Format::Avif => Some("image/avif"),
        }
    }
}

impl FromStr for Format {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Format::ALL
            .into_iter()
            .find(|format| format.as_str() == s)
            .ok_or_else(|| UnknownVariant(s.to_string()))
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An enum literal that is not one of the allowed values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown value '{0}'")]
pub struct UnknownVariant(pub String);

/// Lossy encoding quality (0-100). Clamped on construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Quality(u8);

impl Quality {
    pub fn new(value: i64) -> Self {
        Self(value.clamp(0, 100) as u8)
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(DEFAULT_QUALITY)
    }
}

/// A decoded image transform request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransformDescriptor {
    pub w: Option<u32>,
    pub h: Option<u32>,
    pub fit: Fit,
    pub fmt: Format,
    pub q: Option<Quality>,
    pub source: String,
}

impl TransformDescriptor {
    /// A pass-through descriptor: no resize, original format.
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            w: None,
            h: None,
            fit: Fit::default(),
            fmt: Format::default(),
            q: None,
            source: source.into(),
        }
    }

    pub fn with_width(mut self, w: u32) -> Self {
        self.w = Some(w);
        self
    }

    pub fn with_height(mut self, h: u32) -> Self {
        self.h = Some(h);
        self
    }

    pub fn with_fit(mut self, fit: Fit) -> Self {
        self.fit = fit;
        self
    }

    pub fn with_format(mut self, fmt: Format) -> Self {
        self.fmt = fmt;
        self
    }

    pub fn with_quality(mut self, q: i64) -> Self {
        self.q = Some(Quality::new(q));
        self
    }

    /// True when either dimension is set.
    pub fn resizes(&self) -> bool {
        self.w.is_some() || self.h.is_some()
    }

    /// Quality the engine should encode with.
    pub fn effective_quality(&self) -> Quality {
        self.q.unwrap_or_default()
    }
}
