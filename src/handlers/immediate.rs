//! Immediate values: parsing in any supported radix and rendering as signed decimal.
//!
//! Accepted forms: optional sign, then `0x`/`0o`/`0b` (any case) or plain decimal digits.
//! Underscores between digits are ignored. Values are held as `i128`, so both the full
//! unsigned and signed 64-bit ranges round-trip.

use crate::error::NormalizeError;

/// Parse immediate text into its integer value
pub fn parse_immediate(text: &str) -> Option<i128> {
    let text = text.trim();
    let (negative, body) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };

    let bytes = body.as_bytes();
    let (radix, digits) = if bytes.len() > 2 && bytes[0] == b'0' {
        match bytes[1] {
            b'x' | b'X' => (16, &body[2..]),
            b'o' | b'O' => (8, &body[2..]),
            b'b' | b'B' => (2, &body[2..]),
            _ => (10, body),
        }
    } else {
        (10, body)
    };

    let digits: String = digits.chars().filter(|c| *c != '_').collect();
    if digits.is_empty() || digits.starts_with(['+', '-']) {
        return None;
    }

    let magnitude = u128::from_str_radix(&digits, radix).ok()?;
    if negative {
        if magnitude > i128::MAX as u128 + 1 {
            return None;
        }
        Some((magnitude as i128).wrapping_neg())
    } else {
        i128::try_from(magnitude).ok()
    }
}

/// Signed decimal rendering of an immediate, or an error naming the offending text
pub fn immediate_to_decimal(text: &str) -> Result<String, NormalizeError> {
    parse_immediate(text)
        .map(|value| value.to_string())
        .ok_or_else(|| NormalizeError::InvalidImmediate {
            text: text.to_string(),
        })
}
