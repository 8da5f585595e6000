//! Kubernetes resource quantities.
//!
//! `k8s_openapi` carries quantities as opaque strings. Comparing requests with
//! limits needs their numeric value, so this module parses the canonical
//! quantity grammar (`<number><suffix>`) into an exact fixed-point value.
//!
//! Supported suffixes:
//!
//! - binary SI: `Ki`, `Mi`, `Gi`, `Ti`, `Pi`, `Ei`
//! - decimal SI: `n`, `u`, `m`, (none), `k`, `M`, `G`, `T`, `P`, `E`
//! - decimal exponent: `e<int>` / `E<int>`, e.g. `1e3`

use std::fmt;
use thiserror::Error;

/// Fixed-point scale: values are stored in nano-units.
const NANO_DIGITS: i32 = 9;

/// Errors produced while parsing a quantity string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuantityError {
    /// Empty input.
    #[error("quantity is empty")]
    Empty,

    /// The numeric part is malformed.
    #[error("invalid quantity {0:?}: malformed number")]
    InvalidNumber(String),

    /// The suffix is not one Kubernetes understands.
    #[error("invalid quantity {0:?}: unknown suffix")]
    InvalidSuffix(String),

    /// The value does not fit the fixed-point representation.
    #[error("invalid quantity {0:?}: out of range")]
    OutOfRange(String),
}

/// A parsed quantity, totally ordered by numeric value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ParsedQuantity {
    nanos: i128,
}

enum Multiplier {
    Binary(u32),
    Decimal(i32),
}

impl ParsedQuantity {
    /// Parse a quantity such as `500m`, `2`, `1.5Gi` or `1e3`.
    pub fn parse(input: &str) -> Result<Self, QuantityError> {
        let s = input.trim();
        if s.is_empty() {
            return Err(QuantityError::Empty);
        }

        let split = s
            .char_indices()
            .find(|(i, c)| !(c.is_ascii_digit() || *c == '.' || (*i == 0 && (*c == '+' || *c == '-'))))
            .map(|(i, _)| i)
            .unwrap_or(s.len());
        let (number, suffix) = s.split_at(split);

        let (mantissa, fraction_digits) = parse_number(number)
            .ok_or_else(|| QuantityError::InvalidNumber(input.to_string()))?;
        let multiplier =
            parse_suffix(suffix).ok_or_else(|| QuantityError::InvalidSuffix(input.to_string()))?;

        let out_of_range = || QuantityError::OutOfRange(input.to_string());

        let nanos = match multiplier {
            Multiplier::Binary(shift) => {
                let scaled = mantissa
                    .checked_mul(1i128 << shift)
                    .and_then(|v| v.checked_mul(10i128.pow(NANO_DIGITS as u32)))
                    .ok_or_else(out_of_range)?;
                scaled / 10i128.pow(fraction_digits)
            }
            Multiplier::Decimal(exponent) => {
                let shift = exponent + NANO_DIGITS - fraction_digits as i32;
                if shift >= 0 {
                    let factor = 10i128.checked_pow(shift as u32).ok_or_else(out_of_range)?;
                    mantissa.checked_mul(factor).ok_or_else(out_of_range)?
                } else {
                    let divisor = 10i128
                        .checked_pow(shift.unsigned_abs())
                        .ok_or_else(out_of_range)?;
                    mantissa / divisor
                }
            }
        };

        Ok(Self { nanos })
    }

    /// Whether the quantity is exactly zero.
    pub fn is_zero(&self) -> bool {
        self.nanos == 0
    }

    /// Whether the quantity is below zero.
    pub fn is_negative(&self) -> bool {
        self.nanos < 0
    }
}

impl fmt::Display for ParsedQuantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unit = 10i128.pow(NANO_DIGITS as u32);
        let sign = if self.nanos < 0 { "-" } else { "" };
        let whole = (self.nanos / unit).abs();
        let frac = (self.nanos % unit).abs();
        if frac == 0 {
            write!(f, "{}{}", sign, whole)
        } else {
            let digits = format!("{:09}", frac);
            write!(f, "{}{}.{}", sign, whole, digits.trim_end_matches('0'))
        }
    }
}

impl std::str::FromStr for ParsedQuantity {
    type Err = QuantityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Parse `[+-]digits[.digits]` into a mantissa and its number of fraction digits.
fn parse_number(number: &str) -> Option<(i128, u32)> {
    let (negative, unsigned) = match number.as_bytes().first()? {
        b'-' => (true, &number[1..]),
        b'+' => (false, &number[1..]),
        _ => (false, number),
    };

    let (int_part, frac_part) = match unsigned.split_once('.') {
        Some((int_part, frac_part)) => (int_part, frac_part),
        None => (unsigned, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if frac_part.contains('.') || frac_part.len() > 18 {
        return None;
    }

    let digits = format!("{}{}", int_part, frac_part);
    let mantissa: i128 = digits.parse().ok()?;
    let mantissa = if negative { -mantissa } else { mantissa };
    Some((mantissa, frac_part.len() as u32))
}

fn parse_suffix(suffix: &str) -> Option<Multiplier> {
    let multiplier = match suffix {
        "Ki" => Multiplier::Binary(10),
        "Mi" => Multiplier::Binary(20),
        "Gi" => Multiplier::Binary(30),
        "Ti" => Multiplier::Binary(40),
        "Pi" => Multiplier::Binary(50),
        "Ei" => Multiplier::Binary(60),
        "n" => Multiplier::Decimal(-9),
        "u" => Multiplier::Decimal(-6),
        "m" => Multiplier::Decimal(-3),
        "" => Multiplier::Decimal(0),
        "k" => Multiplier::Decimal(3),
        "M" => Multiplier::Decimal(6),
        "G" => Multiplier::Decimal(9),
        "T" => Multiplier::Decimal(12),
        "P" => Multiplier::Decimal(15),
        "E" => Multiplier::Decimal(18),
        other => {
            let exponent = other
                .strip_prefix('e')
                .or_else(|| other.strip_prefix('E'))?;
            let exponent: i32 = exponent.parse().ok()?;
            if !(-30..=30).contains(&exponent) {
                return None;
            }
            Multiplier::Decimal(exponent)
        }
    };
    Some(multiplier)
}
