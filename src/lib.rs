//! Fairline: a provably-fair wager transaction engine.
//!
//! Players wager against deterministic outcomes derived from committed
//! seed material, so every result can be reproduced by a third party
//! after the fact. The engine guarantees exact balance conservation
//! through atomic wager transactions, serializes each user's operations
//! behind a per-user lock, and broadcasts settled bets to live feed
//! channels strictly after commit.
//!
//! Module map:
//! - [`seeds`] — seed pair registry (commitment, nonce, rotation)
//! - [`outcome`] — deterministic outcome generator over a SHA-256 stream
//! - [`engine`] — the atomic wager transaction manager
//! - [`games`] — per-mode state machines (mines, dice, coinflip)
//! - [`feed`] — bet broadcast fan-out
//! - [`api`] — HTTP and WebSocket surface

pub mod api;
pub mod config;
pub mod engine;
pub mod errors;
pub mod feed;
pub mod games;
pub mod money;
pub mod outcome;
pub mod seeds;
pub mod storage;

pub use config::{ConfigLoader, EngineConfig};
pub use engine::WagerEngine;
pub use errors::{EngineError, EngineResult};
pub use feed::{BetFeed, FeedChannel};
pub use money::Amount;
pub use seeds::SeedRegistry;
pub use storage::Store;
