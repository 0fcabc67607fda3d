//! Descriptor ↔ URL codecs.
//!
//! Cache correctness rests on this module. Two requests that *mean* the same
//! transform must produce byte-identical canonical URLs, because the cache key
//! is nothing more than a hash of that URL. The codecs are therefore written
//! as matched encode/decode pairs of pure functions with a round-trip law:
//!
//! ```text
//! decode(encode(d)) == d
//! decode(u1) == decode(u2)  ⇒  encode(decode(u1)) == encode(decode(u2))
//! ```
//!
//! The second law is what canonicalization means here: parameter order,
//! unknown keys, explicit defaults (`fit=inside`, `fmt=preserve`) and leading
//! zeros all disappear on the way back out.
//!
//! | Layer | Module | Shape |
//! |---|---|---|
//! | Integers | [`int`] | `&str` ↔ `i64`, strict decimal |
//! | Query | [`params`] | [`SearchParams`] ↔ [`TransformDescriptor`](crate::descriptor::TransformDescriptor) |
//! | URL | [`url`] | `&str` ↔ [`TransformDescriptor`](crate::descriptor::TransformDescriptor), via [`UrlCodec`] |

pub mod int;
pub mod params;
pub mod url;

pub use params::SearchParams;
pub use url::UrlCodec;

use thiserror::Error;

/// Why an inbound URL or query failed to decode.
///
/// Every variant is a client error: the request itself is malformed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Malformed URL: {0}")]
    InvalidUrl(#[from] ::url::ParseError),
    #[error("Missing required parameter 'source'")]
    MissingSource,
    #[error("Parameter '{field}' is not an integer: {value:?}")]
    InvalidInteger { field: &'static str, value: String },
    #[error("Parameter '{field}' is out of range: {value}")]
    OutOfRange { field: &'static str, value: i64 },
    #[error("Parameter '{field}' has unknown value {value:?}")]
    InvalidEnum { field: &'static str, value: String },
}
