//! Per-feature normalization functions

use crate::core::types::EncoderKind;
use sha2::{Digest, Sha256};

/// Denominator for `base100_encode`
const BASE100_MAX: f64 = 10_000_000_000.0; // 100^5

/// Divisor for numbers without a declared encoder
const UNKNOWN_DIVISOR: f64 = 1e6;

/// A flattened primitive value
#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    Number(f64),
    Text(String),
}

/// Encode the first five characters of a string as base-100 digits
///
/// Each character contributes `code % 100`; shorter strings are padded
/// with zero digits. The result lies in `[0, 1)`.
pub fn base100_encode(s: &str) -> f64 {
    let mut value = 0.0;
    let mut chars = s.chars();
    for _ in 0..5 {
        let digit = chars.next().map(|c| (c as u32 % 100) as f64).unwrap_or(0.0);
        value = value * 100.0 + digit;
    }
    value / BASE100_MAX
}

/// Cardinality encoder, saturating at 100
pub fn count_encoder(n: f64) -> f64 {
    (n / 100.0).min(1.0)
}

pub fn normalize_by_specific_number(v: f64, divisor: f64) -> f64 {
    (v / divisor).min(1.0)
}

pub fn normalize_unknown(v: f64) -> f64 {
    (v / UNKNOWN_DIVISOR).min(1.0)
}

/// Apply a schema encoder to a flattened primitive
pub fn encode_primitive(kind: Option<EncoderKind>, divisor: Option<f64>, value: &Primitive) -> f64 {
    match (kind, value) {
        (_, Primitive::Text(s)) => base100_encode(s),
        (Some(EncoderKind::Base100), Primitive::Number(n)) => base100_encode(&format_number(*n)),
        (Some(EncoderKind::Count), Primitive::Number(n)) => count_encoder(*n),
        (Some(EncoderKind::NormalizeBySpecificNumber), Primitive::Number(n)) => match divisor {
            Some(d) if d > 0.0 => normalize_by_specific_number(*n, d),
            _ => normalize_unknown(*n),
        },
        (Some(EncoderKind::Identity), Primitive::Number(n)) => *n,
        (None, Primitive::Number(n)) => normalize_unknown(*n),
    }
}

/// Integers print without a fractional part
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// Stable hex digest of an encoded vector
pub fn state_hash(vector: &[f32]) -> String {
    let mut hasher = Sha256::new();
    for v in vector {
        hasher.update(v.to_le_bytes());
    }
    format!("{:x}", hasher.finalize())
}
