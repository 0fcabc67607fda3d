//! Strict decimal integers.
//!
//! Accepts an optional leading `-` followed by one or more ASCII digits and
//! nothing else: no `+`, no whitespace, no decimal point, no exponent. Leading
//! zeros are accepted on decode and dropped on encode, so `"007"` canonicalizes
//! to `"7"`.

use thiserror::Error;

/// The input was not a strict decimal integer (or overflowed `i64`).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("not a decimal integer")]
pub struct NotAnInteger;

/// Parse a strict decimal integer.
pub fn decode(input: &str) -> Result<i64, NotAnInteger> {
    let digits = input.strip_prefix('-').unwrap_or(input);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(NotAnInteger);
    }
    // The shape is checked above, so the only remaining failure is overflow.
    input.parse::<i64>().map_err(|_| NotAnInteger)
}

/// Render an integer in its canonical decimal form.
pub fn encode(value: i64) -> String {
    value.to_string()
}
