/// Decimal quotients by long division
use std::fmt;
use thiserror::Error;

/// Raised when a rate would be divided by zero.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("division by zero")]
pub struct DivideByZero;

/// A truncated decimal quotient.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FixedPoint {
    negative: bool,
    integer: u128,
    /// Fractional digits, most significant first, without trailing zeros
    fraction: String,
}

impl FixedPoint {
    pub fn zero() -> Self {
        Self::default()
    }

    /// Integer part truncated toward zero, the value thresholds compare against.
    pub fn integer_part(&self) -> i128 {
        let magnitude = self.integer as i128;
        if self.negative {
            -magnitude
        } else {
            magnitude
        }
    }

    pub fn is_negative(&self) -> bool {
        self.negative
    }

    /// Render with exactly `scale` fractional digits, zero padded or cut
    /// short. Never rounds.
    pub fn with_scale(&self, scale: usize) -> String {
        let mut out = String::with_capacity(24);
        if self.negative {
            out.push('-');
        }
        out.push_str(&self.integer.to_string());
        if scale > 0 {
            out.push('.');
            out.extend(
                self.fraction
                    .chars()
                    .chain(std::iter::repeat('0'))
                    .take(scale),
            );
        }
        out
    }
}

impl fmt::Display for FixedPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negative {
            f.write_str("-")?;
        }
        write!(f, "{}", self.integer)?;
        if !self.fraction.is_empty() {
            write!(f, ".{}", self.fraction)?;
        }
        Ok(())
    }
}

/// Divide `dividend` by `divisor`, keeping at most `precision` fractional
/// digits. Stops early once the remainder is exhausted.
///
/// No floating point is involved: the integer part comes from plain integer
/// division and every fractional digit from multiplying the running
/// remainder by ten. Truncates toward zero.
pub fn divide(dividend: i128, divisor: i64, precision: u32) -> Result<FixedPoint, DivideByZero> {
    if divisor == 0 {
        return Err(DivideByZero);
    }

    let numerator = dividend.unsigned_abs();
    let denominator = divisor.unsigned_abs() as u128;

    let integer = numerator / denominator;
    // remainder < 2^63, so remainder * 10 always fits
    let mut remainder = numerator % denominator;
    let mut fraction = String::with_capacity(precision as usize);

    for _ in 0..precision {
        if remainder == 0 {
            break;
        }
        remainder *= 10;
        let digit = (remainder / denominator) as u8;
        fraction.push((b'0' + digit) as char);
        remainder %= denominator;
    }

    while fraction.ends_with('0') {
        fraction.pop();
    }

    let nonzero = integer != 0 || !fraction.is_empty();
    let negative = nonzero && ((dividend < 0) != (divisor < 0));

    Ok(FixedPoint {
        negative,
        integer,
        fraction,
    })
}
