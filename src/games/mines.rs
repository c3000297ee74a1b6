//! Mines game state machine.
//!
//! Lifecycle: `Created → Revealing → {Busted | Completed | CashedOut}`.
//! The session stores the hidden mine placement and the revealed tiles as
//! fixed-width bitsets, so persisted state is size-bounded and cannot hit
//! the parse-failure class that embedded JSON arrays would.
//!
//! The multiplier after `k` safe reveals is the inverse of the
//! hypergeometric survival probability, scaled by the house edge:
//! `(1 - edge) * Π (total - i) / (safe - i)` for `i in 0..k`. It is
//! carried as an exact integer rational and floored to cents only when a
//! payout is fixed.

use crate::errors::{EngineError, EngineResult};
use crate::money::{frac_to_bps, Amount};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const TOTAL_TILES: u8 = 25;
pub const MIN_MINES: u8 = 1;
pub const MAX_MINES: u8 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MinesStatus {
    Created,
    Revealing,
    Busted,
    Completed,
    CashedOut,
}

impl MinesStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MinesStatus::Busted | MinesStatus::Completed | MinesStatus::CashedOut
        )
    }
}

/// Result of a single reveal step.
#[derive(Debug, Clone, PartialEq)]
pub enum RevealOutcome {
    /// Safe tile; the round continues. Payout shown for display only.
    Safe {
        multiplier_bps: u64,
        current_payout: Amount,
    },
    /// Hit a mine; round over, payout zero.
    Busted,
    /// All safe tiles revealed; round over at the full multiplier.
    Completed { payout: Amount, multiplier_bps: u64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MinesSession {
    pub id: Uuid,
    pub user_id: u64,
    pub stake: Amount,
    pub mines_count: u8,
    pub seed_id: Uuid,
    pub nonce: u64,
    /// Hidden outcome: bit `i` set means tile `i` is a mine.
    pub mine_mask: u32,
    /// Bit `i` set means tile `i` has been revealed.
    pub revealed_mask: u32,
    pub status: MinesStatus,
    pub payout: Amount,
    pub started_at: i64,
    pub ended_at: Option<i64>,
}

/// Multiplier after `revealed` safe reveals, as an exact `(num, den)`
/// rational. Identity for zero reveals.
pub fn multiplier(total: u8, mines: u8, revealed: u8, edge_bps: u64) -> (u128, u128) {
    if revealed == 0 {
        return (1, 1);
    }
    let safe = total - mines;
    debug_assert!(revealed <= safe);
    let mut num: u128 = 10_000 - edge_bps as u128;
    let mut den: u128 = 10_000;
    for i in 0..revealed {
        num *= (total - i) as u128;
        den *= (safe - i) as u128;
    }
    (num, den)
}

impl MinesSession {
    pub fn create(
        user_id: u64,
        stake: Amount,
        mines_count: u8,
        seed_id: Uuid,
        nonce: u64,
        mine_positions: &[u8],
        started_at: i64,
    ) -> Self {
        let mut mine_mask = 0u32;
        for &p in mine_positions {
            mine_mask |= 1 << p;
        }
        Self {
            id: Uuid::new_v4(),
            user_id,
            stake,
            mines_count,
            seed_id,
            nonce,
            mine_mask,
            revealed_mask: 0,
            status: MinesStatus::Created,
            payout: Amount::ZERO,
            started_at,
            ended_at: None,
        }
    }

    pub fn is_open(&self) -> bool {
        !self.status.is_terminal()
    }

    pub fn safe_tiles(&self) -> u8 {
        TOTAL_TILES - self.mines_count
    }

    pub fn revealed_count(&self) -> u8 {
        self.revealed_mask.count_ones() as u8
    }

    pub fn revealed_tiles(&self) -> Vec<u8> {
        (0..TOTAL_TILES)
            .filter(|&t| self.revealed_mask & (1 << t) != 0)
            .collect()
    }

    pub fn mine_tiles(&self) -> Vec<u8> {
        (0..TOTAL_TILES)
            .filter(|&t| self.mine_mask & (1 << t) != 0)
            .collect()
    }

    pub fn current_multiplier(&self, edge_bps: u64) -> (u128, u128) {
        multiplier(TOTAL_TILES, self.mines_count, self.revealed_count(), edge_bps)
    }

    /// Stake at the current multiplier; what a cashout right now would pay.
    pub fn current_payout(&self, edge_bps: u64) -> EngineResult<Amount> {
        let (num, den) = self.current_multiplier(edge_bps);
        self.stake.mul_frac(num, den)
    }

    /// Advance the state machine by one reveal. The caller settles
    /// terminal outcomes through the shared settlement path.
    pub fn reveal(&mut self, tile: u8, edge_bps: u64, now: i64) -> EngineResult<RevealOutcome> {
        if self.status.is_terminal() {
            return Err(EngineError::NoActiveGame);
        }
        if tile >= TOTAL_TILES {
            return Err(EngineError::InvalidField(format!(
                "tile {} out of range 0..{}",
                tile, TOTAL_TILES
            )));
        }
        let bit = 1u32 << tile;
        if self.revealed_mask & bit != 0 {
            return Err(EngineError::AlreadyRevealed(tile));
        }

        self.revealed_mask |= bit;
        self.status = MinesStatus::Revealing;

        if self.mine_mask & bit != 0 {
            self.status = MinesStatus::Busted;
            self.payout = Amount::ZERO;
            self.ended_at = Some(now);
            return Ok(RevealOutcome::Busted);
        }

        let (num, den) = self.current_multiplier(edge_bps);
        let payout = self.stake.mul_frac(num, den)?;

        if self.revealed_count() == self.safe_tiles() {
            self.status = MinesStatus::Completed;
            self.payout = payout;
            self.ended_at = Some(now);
            return Ok(RevealOutcome::Completed {
                payout,
                multiplier_bps: frac_to_bps(num, den),
            });
        }

        Ok(RevealOutcome::Safe {
            multiplier_bps: frac_to_bps(num, den),
            current_payout: payout,
        })
    }

    /// Voluntary cashout. Only valid mid-round with at least one reveal.
    pub fn cashout(&mut self, edge_bps: u64, now: i64) -> EngineResult<Amount> {
        if self.status.is_terminal() {
            return Err(EngineError::NoActiveGame);
        }
        if self.status != MinesStatus::Revealing || self.revealed_count() == 0 {
            return Err(EngineError::InvalidField(
                "cashout requires at least one revealed tile".to_string(),
            ));
        }
        let payout = self.current_payout(edge_bps)?;
        self.status = MinesStatus::CashedOut;
        self.payout = payout;
        self.ended_at = Some(now);
        Ok(payout)
    }

    #[cfg(test)]
    pub fn sample_open(user_id: u64, stake: Amount) -> Self {
        Self::create(user_id, stake, 3, Uuid::new_v4(), 0, &[0, 1, 2], 0)
    }
}
