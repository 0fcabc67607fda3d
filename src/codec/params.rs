//! Query parameters ↔ transform descriptor.
//!
//! Encoding emits, in fixed order, `w`, `h`, `fit`, `fmt`, `q`, `source`, and
//! skips any field that is absent or at its default. Decoding reads only those
//! six keys; everything else in the query is ignored. When a key repeats, the
//! first occurrence wins.

use super::{CodecError, int};
use crate::descriptor::{Fit, Format, MAX_DIMENSION, Quality, TransformDescriptor};
use std::fmt;
use url::form_urlencoded;

pub const WIDTH: &str = "w";
pub const HEIGHT: &str = "h";
pub const FIT: &str = "fit";
pub const FORMAT: &str = "fmt";
pub const QUALITY: &str = "q";
pub const SOURCE: &str = "source";

/// An ordered, possibly repeating list of query parameters.
///
/// Serializes as `application/x-www-form-urlencoded`, the same encoding a
/// browser uses for query strings (space becomes `+`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchParams(Vec<(String, String)>);

impl SearchParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a raw query string (without the leading `?`).
    pub fn parse(query: &str) -> Self {
        form_urlencoded::parse(query.as_bytes())
            .into_owned()
            .collect()
    }

    /// First value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Set `key` to a single value. The first existing occurrence is
    /// updated in place and later ones are dropped; a new key is appended.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.0.iter().position(|(k, _)| k == key) {
            Some(first) => {
                self.0[first].1 = value;
                let mut index = 0;
                self.0.retain(|(k, _)| {
                    let keep = index <= first || k != key;
                    index += 1;
                    keep
                });
            }
            None => self.0.push((key.to_string(), value)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for SearchParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl fmt::Display for SearchParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        serializer.extend_pairs(self.iter());
        f.write_str(&serializer.finish())
    }
}

/// Encode a descriptor into its canonical parameter set.
pub fn encode(descriptor: &TransformDescriptor) -> SearchParams {
    let mut params = SearchParams::new();
    if let Some(w) = descriptor.w {
        params.set(WIDTH, int::encode(i64::from(w)));
    }
    if let Some(h) = descriptor.h {
        params.set(HEIGHT, int::encode(i64::from(h)));
    }
    if descriptor.fit != Fit::default() {
        params.set(FIT, descriptor.fit.as_str());
    }
    if descriptor.fmt != Format::default() {
        params.set(FORMAT, descriptor.fmt.as_str());
    }
    if let Some(q) = descriptor.q {
        params.set(QUALITY, int::encode(i64::from(q.value())));
    }
    params.set(SOURCE, descriptor.source.as_str());
    params
}

/// Decode a parameter set into a descriptor.
pub fn decode(params: &SearchParams) -> Result<TransformDescriptor, CodecError> {
    let source = match params.get(SOURCE) {
        Some(s) if !s.is_empty() => s.to_string(),
        _ => return Err(CodecError::MissingSource),
    };

    Ok(TransformDescriptor {
        w: params.get(WIDTH).map(|v| decode_dimension(WIDTH, v)).transpose()?,
        h: params.get(HEIGHT).map(|v| decode_dimension(HEIGHT, v)).transpose()?,
        fit: params
            .get(FIT)
            .map(|v| decode_enum::<Fit>(FIT, v))
            .transpose()?
            .unwrap_or_default(),
        fmt: params
            .get(FORMAT)
            .map(|v| decode_enum::<Format>(FORMAT, v))
            .transpose()?
            .unwrap_or_default(),
        q: params
            .get(QUALITY)
            .map(|v| decode_integer(QUALITY, v).map(Quality::new))
            .transpose()?,
        source,
    })
}

fn decode_integer(field: &'static str, value: &str) -> Result<i64, CodecError> {
    int::decode(value).map_err(|_| CodecError::InvalidInteger {
        field,
        value: value.to_string(),
    })
}

fn decode_dimension(field: &'static str, value: &str) -> Result<u32, CodecError> {
    let n = decode_integer(field, value)?;
    if n < 1 || n > i64::from(MAX_DIMENSION) {
        return Err(CodecError::OutOfRange { field, value: n });
    }
    Ok(n as u32)
}

fn decode_enum<T: std::str::FromStr>(field: &'static str, value: &str) -> Result<T, CodecError> {
    value.parse().map_err(|_| CodecError::InvalidEnum {
        field,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SRC: &str = "https://img.example/a.jpg";

    fn params(pairs: &[(&str, &str)]) -> SearchParams {
        pairs.iter().copied().collect()
    }

    // =========================================================================
    // SearchParams
    // =========================================================================

    #[test]
    fn parse_decodes_form_encoding() {
        let p = SearchParams::parse("source=https%3A%2F%2Fa.example%2Fx+y.jpg&w=10");
        assert_eq!(p.get("source"), Some("https://a.example/x y.jpg"));
        assert_eq!(p.get("w"), Some("10"));
        assert_eq!(p.len(), 2);
    }

    #[test]
    fn get_returns_first_occurrence() {
        let p = SearchParams::parse("w=1&w=2");
        assert_eq!(p.get("w"), Some("1"));
    }

    #[test]
    fn set_replaces_all_occurrences() {
        let mut p = SearchParams::parse("w=1&h=3&w=2");
        p.set("w", "9");
        assert_eq!(p.to_string(), "w=9&h=3");
    }

    #[test]
    fn display_form_encodes() {
        let p = params(&[("source", "https://a.example/x y.jpg?v=1&z")]);
        assert_eq!(
            p.to_string(),
            "source=https%3A%2F%2Fa.example%2Fx+y.jpg%3Fv%3D1%26z"
        );
    }

    // =========================================================================
    // encode
    // =========================================================================

    #[test]
    fn encode_minimal_emits_only_source() {
        let p = encode(&TransformDescriptor::new(SRC));
        assert_eq!(p, params(&[("source", SRC)]));
    }

    #[test]
    fn encode_uses_fixed_field_order() {
        let d = TransformDescriptor::new(SRC)
            .with_quality(80)
            .with_format(Format::Webp)
            .with_fit(Fit::Cover)
            .with_height(50)
            .with_width(100);
        let encoded = encode(&d);
        let keys: Vec<&str> = encoded.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, ["w", "h", "fit", "fmt", "q", "source"]);
    }

    #[test]
    fn encode_omits_defaults() {
        let d = TransformDescriptor::new(SRC)
            .with_fit(Fit::Inside)
            .with_format(Format::Preserve);
        assert_eq!(encode(&d).get(FIT), None);
        assert_eq!(encode(&d).get(FORMAT), None);
    }

    // =========================================================================
    // decode
    // =========================================================================

    #[test]
    fn decode_applies_defaults() {
        let d = decode(&params(&[("source", SRC)])).unwrap();
        assert_eq!(d, TransformDescriptor::new(SRC));
        assert_eq!(d.fit, Fit::Inside);
        assert_eq!(d.fmt, Format::Preserve);
    }

    #[test]
    fn decode_all_fields() {
        let d = decode(&params(&[
            ("w", "100"),
            ("h", "80"),
            ("fit", "cover"),
            ("fmt", "avif"),
            ("q", "70"),
            ("source", SRC),
        ]))
        .unwrap();
        assert_eq!(d.w, Some(100));
        assert_eq!(d.h, Some(80));
        assert_eq!(d.fit, Fit::Cover);
        assert_eq!(d.fmt, Format::Avif);
        assert_eq!(d.q, Some(Quality::new(70)));
        assert_eq!(d.source, SRC);
    }

    #[test]
    fn decode_ignores_unknown_keys() {
        let d = decode(&params(&[("utm", "x"), ("source", SRC), ("zz", "1")])).unwrap();
        assert_eq!(d, TransformDescriptor::new(SRC));
    }

    #[test]
    fn decode_missing_source_fails() {
        assert_eq!(
            decode(&params(&[("w", "10")])),
            Err(CodecError::MissingSource)
        );
    }

    #[test]
    fn decode_empty_source_fails() {
        assert_eq!(
            decode(&params(&[("source", "")])),
            Err(CodecError::MissingSource)
        );
    }

    #[test]
    fn decode_non_integer_quality_fails() {
        assert_eq!(
            decode(&params(&[("q", "abc"), ("source", SRC)])),
            Err(CodecError::InvalidInteger {
                field: "q",
                value: "abc".into()
            })
        );
    }

    #[test]
    fn decode_empty_integer_fails() {
        assert!(matches!(
            decode(&params(&[("w", ""), ("source", SRC)])),
            Err(CodecError::InvalidInteger { field: "w", .. })
        ));
    }

    #[test]
    fn decode_signed_or_fractional_width_fails() {
        for bad in ["+10", "10.5", " 10"] {
            assert!(
                decode(&params(&[("w", bad), ("source", SRC)])).is_err(),
                "accepted w={bad:?}"
            );
        }
    }

    #[test]
    fn decode_non_positive_dimension_fails() {
        assert_eq!(
            decode(&params(&[("h", "0"), ("source", SRC)])),
            Err(CodecError::OutOfRange {
                field: "h",
                value: 0
            })
        );
        assert_eq!(
            decode(&params(&[("w", "-4"), ("source", SRC)])),
            Err(CodecError::OutOfRange {
                field: "w",
                value: -4
            })
        );
    }

    #[test]
    fn decode_dimension_above_int32_fails() {
        assert!(matches!(
            decode(&params(&[("w", "2147483648"), ("source", SRC)])),
            Err(CodecError::OutOfRange { field: "w", .. })
        ));
        assert_eq!(
            decode(&params(&[("w", "2147483647"), ("source", SRC)]))
                .unwrap()
                .w,
            Some(MAX_DIMENSION)
        );
    }

    #[test]
    fn decode_clamps_quality() {
        let hi = decode(&params(&[("q", "250"), ("source", SRC)])).unwrap();
        assert_eq!(hi.q, Some(Quality::new(100)));
        let lo = decode(&params(&[("q", "-1"), ("source", SRC)])).unwrap();
        assert_eq!(lo.q, Some(Quality::new(0)));
    }

    #[test]
    fn decode_unknown_enum_fails() {
        assert_eq!(
            decode(&params(&[("fmt", "png"), ("source", SRC)])),
            Err(CodecError::InvalidEnum {
                field: "fmt",
                value: "png".into()
            })
        );
        assert!(matches!(
            decode(&params(&[("fit", "stretch"), ("source", SRC)])),
            Err(CodecError::InvalidEnum { field: "fit", .. })
        ));
    }

    #[test]
    fn decode_first_duplicate_wins() {
        let d = decode(&params(&[("w", "10"), ("w", "abc"), ("source", SRC)])).unwrap();
        assert_eq!(d.w, Some(10));
    }
}
