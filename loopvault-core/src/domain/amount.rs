//! Fixed-point amounts and basis-point rates.
//!
//! Every token quantity in the protocol is an `Amount`: an unsigned integer
//! scaled to 18 decimal places. Arithmetic is checked; an overflow is an
//! error, never a wrapped or saturated value.

use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Number of fractional decimal digits carried by an `Amount`.
pub const DECIMALS: u32 = 18;

/// Raw units per whole token (10^18).
pub const SCALE: u128 = 1_000_000_000_000_000_000;

/// Basis points denominator (100% = 10000).
pub const BPS_DENOMINATOR: u128 = 10_000;

/// Errors from fixed-point arithmetic and parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    #[error("arithmetic overflow")]
    Overflow,

    #[error("division by zero")]
    DivisionByZero,

    #[error("invalid amount '{input}': {reason}")]
    Parse { input: String, reason: String },
}

/// Fixed-point token amount (18 decimals).
///
/// Serializes as a decimal string so it survives formats without 128-bit
/// integers (TOML, JSON consumers in other languages).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Amount(u128);

impl Amount {
    pub const ZERO: Amount = Amount(0);
    pub const ONE: Amount = Amount(SCALE);

    /// Wrap raw scaled units.
    pub const fn from_raw(raw: u128) -> Self {
        Self(raw)
    }

    /// Raw scaled units.
    pub const fn raw(self) -> u128 {
        self.0
    }

    /// Whole tokens. `u64::MAX * 10^18` fits in a `u128`, so this cannot fail.
    pub const fn from_units(units: u64) -> Self {
        Self(units as u128 * SCALE)
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, rhs: Amount) -> Result<Amount, AmountError> {
        self.0
            .checked_add(rhs.0)
            .map(Amount)
            .ok_or(AmountError::Overflow)
    }

    /// Subtraction that returns `None` on underflow. Callers map underflow to
    /// their own domain error (insufficient debt, balance, shares).
    pub fn checked_sub(self, rhs: Amount) -> Option<Amount> {
        self.0.checked_sub(rhs.0).map(Amount)
    }

    pub fn saturating_sub(self, rhs: Amount) -> Amount {
        Amount(self.0.saturating_sub(rhs.0))
    }

    /// `self * numerator / denominator`, rounded down. The product is taken
    /// at 256-bit width, so only a quotient beyond 128 bits overflows.
    pub fn mul_div_floor(self, numerator: u128, denominator: u128) -> Result<Amount, AmountError> {
        let (quotient, _) = mul_div_u256(self.0, numerator, denominator)?;
        Ok(Amount(quotient))
    }

    /// `self * numerator / denominator`, rounded up.
    pub fn mul_div_ceil(self, numerator: u128, denominator: u128) -> Result<Amount, AmountError> {
        let (quotient, remainder) = mul_div_u256(self.0, numerator, denominator)?;
        if remainder == 0 {
            Ok(Amount(quotient))
        } else {
            quotient
                .checked_add(1)
                .map(Amount)
                .ok_or(AmountError::Overflow)
        }
    }

    /// Multiply by a fixed-point ratio (`ratio` is itself an 18-decimal
    /// amount, `1.0 == Amount::ONE`). Rounds down.
    pub fn mul_ratio(self, ratio: Amount) -> Result<Amount, AmountError> {
        self.mul_div_floor(ratio.0, SCALE)
    }

    /// Checked sum over an iterator of amounts.
    pub fn checked_sum<I>(amounts: I) -> Result<Amount, AmountError>
    where
        I: IntoIterator<Item = Amount>,
    {
        amounts
            .into_iter()
            .try_fold(Amount::ZERO, |acc, a| acc.checked_add(a))
    }

    /// Lossy conversion for display and reporting only.
    pub fn to_f64(self) -> f64 {
        self.0 as f64 / SCALE as f64
    }
}

/// `a * b / d` at 256-bit width. Returns `(quotient, remainder)`.
fn mul_div_u256(a: u128, b: u128, d: u128) -> Result<(u128, u128), AmountError> {
    if d == 0 {
        return Err(AmountError::DivisionByZero);
    }
    let product = U256::from(a)
        .checked_mul(U256::from(b))
        .ok_or(AmountError::Overflow)?;
    let (quotient, remainder) = product.div_mod(U256::from(d));
    if quotient > U256::from(u128::MAX) {
        return Err(AmountError::Overflow);
    }
    // remainder < d, so it always fits.
    Ok((quotient.low_u128(), remainder.low_u128()))
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / SCALE;
        let frac = self.0 % SCALE;
        if frac == 0 {
            return write!(f, "{whole}");
        }
        let digits = format!("{frac:0width$}", width = DECIMALS as usize);
        write!(f, "{whole}.{}", digits.trim_end_matches('0'))
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    /// Parse a decimal string such as `"1000"`, `"0.05"` or `"1_000_000.5"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fail = |reason: &str| AmountError::Parse {
            input: s.to_string(),
            reason: reason.to_string(),
        };

        let cleaned: String = s.trim().chars().filter(|c| *c != '_').collect();
        if cleaned.is_empty() {
            return Err(fail("empty"));
        }

        let (whole, frac) = match cleaned.split_once('.') {
            Some((w, f)) => (w, f),
            None => (cleaned.as_str(), ""),
        };
        if whole.is_empty() && frac.is_empty() {
            return Err(fail("no digits"));
        }
        if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
            return Err(fail("expected digits with an optional decimal point"));
        }
        if frac.len() > DECIMALS as usize {
            return Err(fail("more than 18 fractional digits"));
        }

        let whole_units: u128 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| fail("integer part too large"))?
        };
        let frac_units: u128 = if frac.is_empty() {
            0
        } else {
            let padded = format!("{frac:0<width$}", width = DECIMALS as usize);
            padded.parse().map_err(|_| fail("invalid fraction"))?
        };

        whole_units
            .checked_mul(SCALE)
            .and_then(|w| w.checked_add(frac_units))
            .map(Amount)
            .ok_or_else(|| fail("value exceeds 128-bit range"))
    }
}

impl TryFrom<String> for Amount {
    type Error = AmountError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Amount> for String {
    fn from(value: Amount) -> Self {
        value.to_string()
    }
}

/// A rate in basis points (`10_000` = 100%).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Bps(pub u16);

impl Bps {
    pub const ZERO: Bps = Bps(0);
    pub const FULL: Bps = Bps(10_000);

    /// Apply the rate to an amount, rounding down.
    pub fn apply(self, amount: Amount) -> Result<Amount, AmountError> {
        amount.mul_div_floor(u128::from(self.0), BPS_DENOMINATOR)
    }

    /// True for rates strictly below 100%.
    pub fn is_fraction(self) -> bool {
        u128::from(self.0) < BPS_DENOMINATOR
    }

    /// `100% - self`, floored at zero.
    pub fn complement(self) -> Bps {
        Bps(Self::FULL.0.saturating_sub(self.0))
    }
}

impl fmt::Display for Bps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}%", self.0 / 100, self.0 % 100)
    }
}
