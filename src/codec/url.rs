//! Full URL ↔ transform descriptor.
//!
//! [`UrlCodec`] is bound to the API route URL the service is mounted at.
//! Encoding takes that base and replaces its query with the canonical
//! parameter set, which makes `encode` both the canonicalizer used for cache
//! keys and the URL builder pages use to mint image links.

use super::{CodecError, SearchParams, params};
use crate::descriptor::TransformDescriptor;
use tracing::debug;
use url::Url;

#[derive(Debug, Clone)]
pub struct UrlCodec {
    base: Url,
}

impl UrlCodec {
    /// Bind the codec to the route the handler is served from,
    /// e.g. `https://example.com/api/image`.
    pub fn new(api_route_url: &str) -> Result<Self, CodecError> {
        Ok(Self {
            base: Url::parse(api_route_url)?,
        })
    }

    pub fn from_url(base: Url) -> Self {
        Self { base }
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Build the canonical URL for a descriptor.
    pub fn encode(&self, descriptor: &TransformDescriptor) -> String {
        let mut url = self.base.clone();
        url.set_query(Some(&params::encode(descriptor).to_string()));
        url.into()
    }

    /// Decode an absolute URL. Relative input is a malformed URL.
    pub fn decode(&self, input: &str) -> Result<TransformDescriptor, CodecError> {
        decode_url(&Url::parse(input)?)
    }

    /// Decode at the request boundary.
    ///
    /// Accepts either an absolute URL or an origin-form request target such
    /// as `/api/image?w=100&source=...`, which is resolved against the base
    /// URL. A malformed request comes back as an error value for the caller to
    /// map to a client error.
    pub fn safe_decode(&self, input: &str) -> Result<TransformDescriptor, CodecError> {
        let result = Url::options()
            .base_url(Some(&self.base))
            .parse(input)
            .map_err(CodecError::from)
            .and_then(|url| decode_url(&url));
        if let Err(e) = &result {
            debug!("Rejected request target {:?}: {}", input, e);
        }
        result
    }

    /// Decode then re-encode: the canonical form of any request URL.
    pub fn canonicalize(&self, input: &str) -> Result<String, CodecError> {
        Ok(self.encode(&self.safe_decode(input)?))
    }
}

fn decode_url(url: &Url) -> Result<TransformDescriptor, CodecError> {
    params::decode(&SearchParams::parse(url.query().unwrap_or("")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{Fit, Format};
    use proptest::prelude::*;

    const BASE: &str = "https://site.example/api/image";
    const SRC: &str = "https://img.example/a.jpg";

    fn codec() -> UrlCodec {
        UrlCodec::new(BASE).unwrap()
    }

    // =========================================================================
    // encode / decode
    // =========================================================================

    #[test]
    fn encode_minimal() {
        assert_eq!(
            codec().encode(&TransformDescriptor::new(SRC)),
            "https://site.example/api/image?source=https%3A%2F%2Fimg.example%2Fa.jpg"
        );
    }

    #[test]
    fn encode_full() {
        let d = TransformDescriptor::new(SRC)
            .with_width(100)
            .with_height(80)
            .with_fit(Fit::Cover)
            .with_format(Format::Webp)
            .with_quality(75);
        assert_eq!(
            codec().encode(&d),
            "https://site.example/api/image?w=100&h=80&fit=cover&fmt=webp&q=75\
             &source=https%3A%2F%2Fimg.example%2Fa.jpg"
        );
    }

    #[test]
    fn encode_replaces_existing_base_query() {
        let codec = UrlCodec::new("https://site.example/api/image?stale=1").unwrap();
        let url = codec.encode(&TransformDescriptor::new(SRC));
        assert!(!url.contains("stale"));
    }

    #[test]
    fn decode_rejects_relative_input() {
        assert!(matches!(
            codec().decode("/api/image?source=x"),
            Err(CodecError::InvalidUrl(_))
        ));
    }

    #[test]
    fn decode_ignores_base_host() {
        // Only the query matters; the route host is not part of the descriptor.
        let d = codec()
            .decode("http://other.example/whatever?w=5&source=s")
            .unwrap();
        assert_eq!(d, TransformDescriptor::new("s").with_width(5));
    }

    #[test]
    fn safe_decode_resolves_request_target() {
        let d = codec()
            .safe_decode("/api/image?w=100&fmt=webp&source=https%3A%2F%2Fimg.example%2Fa.jpg")
            .unwrap();
        assert_eq!(
            d,
            TransformDescriptor::new(SRC)
                .with_width(100)
                .with_format(Format::Webp)
        );
    }

    #[test]
    fn safe_decode_returns_error_for_bad_query() {
        assert!(matches!(
            codec().safe_decode("/api/image?q=abc&source=x"),
            Err(CodecError::InvalidInteger { field: "q", .. })
        ));
        assert_eq!(
            codec().safe_decode("/api/image"),
            Err(CodecError::MissingSource)
        );
    }

    #[test]
    fn safe_decode_returns_error_for_malformed_url() {
        assert!(matches!(
            codec().safe_decode("http://[not-an-ip/x?source=y"),
            Err(CodecError::InvalidUrl(_))
        ));
    }

    // =========================================================================
    // Canonicalization
    // =========================================================================

    #[test]
    fn reordered_params_share_canonical_url() {
        let a = codec()
            .canonicalize("/api/image?w=100&fmt=webp&source=https://img.example/a.jpg")
            .unwrap();
        let b = codec()
            .canonicalize("/api/image?fmt=webp&w=100&source=https://img.example/a.jpg")
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn explicit_defaults_and_noise_canonicalize_away() {
        let noisy = codec()
            .canonicalize("/api/image?utm_source=x&fit=inside&fmt=preserve&w=0100&source=s")
            .unwrap();
        let clean = codec().canonicalize("/api/image?w=100&source=s").unwrap();
        assert_eq!(noisy, clean);
        assert_eq!(noisy, "https://site.example/api/image?w=100&source=s");
    }

    #[test]
    fn canonical_url_is_a_fixed_point() {
        let once = codec()
            .canonicalize("/api/image?q=50&fmt=avif&h=20&source=https://x.example/p%20q.png")
            .unwrap();
        assert_eq!(codec().canonicalize(&once).unwrap(), once);
    }

    // =========================================================================
    // Properties
    // =========================================================================

    fn arb_descriptor() -> impl Strategy<Value = TransformDescriptor> {
        (
            proptest::option::of(1u32..=crate::descriptor::MAX_DIMENSION),
            proptest::option::of(1u32..=crate::descriptor::MAX_DIMENSION),
            proptest::sample::select(Fit::ALL.to_vec()),
            proptest::sample::select(Format::ALL.to_vec()),
            proptest::option::of(0i64..=100),
            "[a-z]{1,8}://[a-z0-9.]{1,12}/[ -~]{0,24}",
        )
            .prop_map(|(w, h, fit, fmt, q, source)| {
                let mut d = TransformDescriptor::new(source).with_fit(fit).with_format(fmt);
                d.w = w;
                d.h = h;
                if let Some(q) = q {
                    d = d.with_quality(q);
                }
                d
            })
    }

    proptest! {
        #[test]
        fn decode_inverts_encode(d in arb_descriptor()) {
            let codec = codec();
            prop_assert_eq!(codec.decode(&codec.encode(&d)).unwrap(), d);
        }

        #[test]
        fn param_order_and_extras_do_not_change_cache_key(
            d in arb_descriptor(),
            extras in proptest::collection::vec(("[x-z]{1,3}", "[a-z0-9]{0,4}"), 0..4),
            seed in any::<u64>(),
        ) {
            let codec = codec();
            let canonical = codec.encode(&d);

            let mut pairs: Vec<(String, String)> = params::encode(&d)
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            pairs.extend(extras);
            // Deterministic shuffle driven by the seed.
            let len = pairs.len();
            for i in (1..len).rev() {
                let j = (seed as usize).wrapping_mul(i + 7) % (i + 1);
                pairs.swap(i, j);
            }
            let shuffled: SearchParams = pairs.into_iter().collect();
            let request = format!("/api/image?{}", shuffled);

            prop_assert_eq!(
                crate::cache::derive_key(&codec.canonicalize(&request).unwrap()),
                crate::cache::derive_key(&canonical)
            );
        }
    }
}
