//! Types shared across game modes.

use crate::money::Amount;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Supported game modes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum GameMode {
    Mines,
    Dice,
    Coinflip,
}

impl GameMode {
    pub const ALL: [GameMode; 3] = [GameMode::Mines, GameMode::Dice, GameMode::Coinflip];

    pub fn as_str(&self) -> &'static str {
        match self {
            GameMode::Mines => "mines",
            GameMode::Dice => "dice",
            GameMode::Coinflip => "coinflip",
        }
    }
}

impl fmt::Display for GameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GameMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mines" => Ok(GameMode::Mines),
            "dice" => Ok(GameMode::Dice),
            "coinflip" => Ok(GameMode::Coinflip),
            other => Err(format!("unknown game mode '{}'", other)),
        }
    }
}

/// The settled, publishable projection of a finished round. Immutable
/// once written; the canonical settlement log consumed by the live feed
/// and historical reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BetRecord {
    pub seq: u64,
    pub session_id: Uuid,
    pub user_id: u64,
    pub mode: GameMode,
    pub stake: Amount,
    pub payout: Amount,
    /// Realized payout multiplier in basis points (0 on a loss).
    pub multiplier_bps: u64,
    pub edge_bps: u64,
    pub completed_at: i64,
}

impl BetRecord {
    /// Payout/stake ratio in basis points, for the `lucky` channel filter.
    pub fn realized_bps(&self) -> u64 {
        if self.stake.is_zero() {
            return 0;
        }
        ((self.payout.minor() as u128 * 10_000) / self.stake.minor() as u128) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_round_trips_through_str() {
        for mode in GameMode::ALL {
            assert_eq!(mode.as_str().parse::<GameMode>().unwrap(), mode);
        }
        assert!("poker".parse::<GameMode>().is_err());
    }

    #[test]
    fn realized_bps_is_payout_over_stake() {
        let record = BetRecord {
            seq: 0,
            session_id: Uuid::new_v4(),
            user_id: 1,
            mode: GameMode::Mines,
            stake: Amount::from_minor(1000),
            payout: Amount::from_minor(11_250),
            multiplier_bps: 112_500,
            edge_bps: 100,
            completed_at: 0,
        };
        assert_eq!(record.realized_bps(), 112_500);
    }
}
