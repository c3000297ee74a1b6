//! Coinflip: a single-flip mode.
//!
//! One fair bit from the outcome stream; a correct call pays double less
//! the house edge.

use crate::errors::EngineResult;
use crate::money::{frac_to_bps, Amount};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CoinChoice {
    Heads,
    Tails,
}

impl CoinChoice {
    pub fn from_bit(bit: u32) -> Self {
        if bit == 0 {
            CoinChoice::Heads
        } else {
            CoinChoice::Tails
        }
    }
}

impl fmt::Display for CoinChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoinChoice::Heads => write!(f, "heads"),
            CoinChoice::Tails => write!(f, "tails"),
        }
    }
}

/// Settled coinflip round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoinFlip {
    pub choice: CoinChoice,
    pub landed: CoinChoice,
    pub win: bool,
    pub multiplier_bps: u64,
    pub payout: Amount,
}

pub fn resolve(
    stake: Amount,
    choice: CoinChoice,
    landed: CoinChoice,
    edge_bps: u64,
) -> EngineResult<CoinFlip> {
    let num = 2 * (10_000 - edge_bps) as u128;
    let den = 10_000u128;
    let win = choice == landed;
    let payout = if win {
        stake.mul_frac(num, den)?
    } else {
        Amount::ZERO
    };
    Ok(CoinFlip {
        choice,
        landed,
        win,
        multiplier_bps: frac_to_bps(num, den),
        payout,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn win_pays_double_less_edge() {
        let flip = resolve(
            Amount::from_units(10, 0),
            CoinChoice::Heads,
            CoinChoice::Heads,
            100,
        )
        .unwrap();
        assert!(flip.win);
        assert_eq!(flip.multiplier_bps, 19_800);
        assert_eq!(flip.payout, Amount::from_minor(1_980));
    }

    #[test]
    fn loss_pays_zero() {
        let flip = resolve(
            Amount::from_units(10, 0),
            CoinChoice::Heads,
            CoinChoice::Tails,
            100,
        )
        .unwrap();
        assert!(!flip.win);
        assert_eq!(flip.payout, Amount::ZERO);
    }

    #[test]
    fn bit_maps_to_faces() {
        assert_eq!(CoinChoice::from_bit(0), CoinChoice::Heads);
        assert_eq!(CoinChoice::from_bit(1), CoinChoice::Tails);
    }
}
