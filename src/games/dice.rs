//! Dice: a single-roll mode.
//!
//! The reveal loop of the multi-step lifecycle collapses to one step: a
//! roll in `0..10000` wins when it lands below the chosen target. Payout
//! is `stake * (10000 - edge) / target`, exact in integer arithmetic.

use crate::errors::{EngineError, EngineResult};
use crate::money::{frac_to_bps, Amount};
use serde::{Deserialize, Serialize};

pub const SIDES: u32 = 10_000;
pub const MIN_TARGET: u32 = 100; // 1% win chance
pub const MAX_TARGET: u32 = 9_600; // 96%

pub fn validate_target(target: u32) -> EngineResult<()> {
    if !(MIN_TARGET..=MAX_TARGET).contains(&target) {
        return Err(EngineError::InvalidField(format!(
            "target {} outside allowed range {}..={}",
            target, MIN_TARGET, MAX_TARGET
        )));
    }
    Ok(())
}

/// Settled dice round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiceRoll {
    pub target: u32,
    pub roll: u32,
    pub win: bool,
    /// Win multiplier in basis points (what a win pays, shown either way).
    pub multiplier_bps: u64,
    pub payout: Amount,
}

/// Resolve a roll that has already been drawn from the outcome stream.
pub fn resolve(stake: Amount, target: u32, roll: u32, edge_bps: u64) -> EngineResult<DiceRoll> {
    validate_target(target)?;
    let num = (10_000 - edge_bps) as u128;
    let den = target as u128;
    let win = roll < target;
    let payout = if win {
        stake.mul_frac(num, den)?
    } else {
        Amount::ZERO
    };
    Ok(DiceRoll {
        target,
        roll,
        win,
        multiplier_bps: frac_to_bps(num, den),
        payout,
    })
}
