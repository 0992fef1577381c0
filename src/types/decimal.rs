//! Exact DECIMAL values
//!
//! MonetDB decimals carry up to 38 digits, which fits an `i128` unscaled
//! value. Values arrive as plain text such as `-12.50`.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// A decimal as an unscaled integer and a scale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Decimal {
    unscaled: i128,
    scale: u16,
}

impl Decimal {
    /// Create from an unscaled value and scale (`Decimal::new(1250, 2)` is 12.50)
    pub fn new(unscaled: i128, scale: u16) -> Self {
        Self { unscaled, scale }
    }

    /// Unscaled integer value
    pub fn unscaled(&self) -> i128 {
        self.unscaled
    }

    /// Digits after the decimal point
    pub fn scale(&self) -> u16 {
        self.scale
    }

    /// Lossy conversion to `f64`
    pub fn to_f64(&self) -> f64 {
        self.unscaled as f64 / 10f64.powi(self.scale as i32)
    }

    /// The integral value, if there is no fractional part
    pub fn to_i128(&self) -> Option<i128> {
        let factor = 10i128.checked_pow(self.scale as u32)?;
        (self.unscaled % factor == 0).then(|| self.unscaled / factor)
    }

    /// Rescale to `scale` digits, if exact
    pub fn rescale(&self, scale: u16) -> Option<Self> {
        if scale >= self.scale {
            let factor = 10i128.checked_pow((scale - self.scale) as u32)?;
            Some(Self::new(self.unscaled.checked_mul(factor)?, scale))
        } else {
            let factor = 10i128.checked_pow((self.scale - scale) as u32)?;
            (self.unscaled % factor == 0).then(|| Self::new(self.unscaled / factor, scale))
        }
    }
}

impl FromStr for Decimal {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let conversion_error = || Error::DataConversion {
            value: s.to_string(),
            type_name: "decimal".to_string(),
        };

        let text = s.trim();
        let (negative, digits) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text.strip_prefix('+').unwrap_or(text)),
        };

        let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, ""));
        if (int_part.is_empty() && frac_part.is_empty())
            || !int_part.bytes().all(|b| b.is_ascii_digit())
            || !frac_part.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(conversion_error());
        }

        let scale = u16::try_from(frac_part.len()).map_err(|_| conversion_error())?;
        let mut unscaled: i128 = 0;
        for b in int_part.bytes().chain(frac_part.bytes()) {
            unscaled = unscaled
                .checked_mul(10)
                .and_then(|v| v.checked_add((b - b'0') as i128))
                .ok_or_else(conversion_error)?;
        }

        Ok(Self::new(if negative { -unscaled } else { unscaled }, scale))
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.scale == 0 {
            return write!(f, "{}", self.unscaled);
        }

        let digits = self.unscaled.unsigned_abs().to_string();
        let scale = self.scale as usize;
        let padded = format!("{:0>width$}", digits, width = scale + 1);
        let (int_part, frac_part) = padded.split_at(padded.len() - scale);
        let sign = if self.unscaled < 0 { "-" } else { "" };
        write!(f, "{}{}.{}", sign, int_part, frac_part)
    }
}
