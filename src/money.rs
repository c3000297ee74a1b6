//! Fixed-point currency arithmetic.
//!
//! Balances, stakes and payouts are held in minor units (cents) so that
//! balance conservation is exact. Multipliers are carried as integer
//! rationals and only collapsed to an `Amount` at payout time, flooring
//! to the nearest cent.

use crate::errors::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A non-negative currency amount in minor units (cents).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Amount(u64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub const fn from_minor(minor: u64) -> Self {
        Amount(minor)
    }

    /// Whole units and cents, e.g. `Amount::from_units(10, 0)` is 10.00.
    pub const fn from_units(units: u64, cents: u64) -> Self {
        Amount(units * 100 + cents)
    }

    pub const fn minor(self) -> u64 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Amount) -> EngineResult<Amount> {
        self.0
            .checked_add(other.0)
            .map(Amount)
            .ok_or_else(|| EngineError::Internal("amount overflow".into()))
    }

    /// Fails with `InsufficientBalance` rather than a generic error so the
    /// debit path can surface the business-rule failure directly.
    pub fn checked_sub(self, other: Amount) -> EngineResult<Amount> {
        self.0
            .checked_sub(other.0)
            .map(Amount)
            .ok_or(EngineError::InsufficientBalance {
                needed: other,
                available: self,
            })
    }

    /// `self * num / den`, floored. Used to apply a rational multiplier to
    /// a stake without ever touching floats.
    pub fn mul_frac(self, num: u128, den: u128) -> EngineResult<Amount> {
        if den == 0 {
            return Err(EngineError::Internal("zero denominator".into()));
        }
        let product = (self.0 as u128)
            .checked_mul(num)
            .ok_or_else(|| EngineError::Internal("payout overflow".into()))?;
        let minor = product / den;
        u64::try_from(minor)
            .map(Amount)
            .map_err(|_| EngineError::Internal("payout overflow".into()))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

/// Convert a rational multiplier to basis points for display and bet
/// records (floored).
pub fn frac_to_bps(num: u128, den: u128) -> u64 {
    if den == 0 {
        return 0;
    }
    (num.saturating_mul(10_000) / den) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_formats_minor_units() {
        assert_eq!(Amount::from_minor(1000).to_string(), "10.00");
        assert_eq!(Amount::from_minor(5).to_string(), "0.05");
        assert_eq!(Amount::from_units(10, 50).to_string(), "10.50");
    }

    #[test]
    fn sub_reports_insufficient_balance() {
        let err = Amount::from_minor(50)
            .checked_sub(Amount::from_minor(100))
            .unwrap_err();
        match err {
            EngineError::InsufficientBalance { needed, available } => {
                assert_eq!(needed.minor(), 100);
                assert_eq!(available.minor(), 50);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn mul_frac_floors_to_cents() {
        // 10.00 * 11250/10000 = 11.25
        let payout = Amount::from_minor(1000).mul_frac(11_250, 10_000).unwrap();
        assert_eq!(payout.minor(), 1125);

        // Flooring: 0.01 * 1/3 = 0.00
        let tiny = Amount::from_minor(1).mul_frac(1, 3).unwrap();
        assert_eq!(tiny, Amount::ZERO);
    }

    #[test]
    fn frac_to_bps_matches_ratio() {
        assert_eq!(frac_to_bps(247_500, 220_000), 11_250);
        assert_eq!(frac_to_bps(1, 1), 10_000);
    }
}
