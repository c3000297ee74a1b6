//! Game modes and their state machines.
//!
//! Mines is the full multi-step lifecycle; dice and coinflip are
//! single-roll modes where the reveal loop collapses to one step.

pub mod coinflip;
pub mod dice;
pub mod mines;
pub mod types;
