//! Wager transaction manager.
//!
//! Serializes all wager operations per user behind an exclusive
//! per-user lock, held from the balance/nonce read until the write batch
//! commits. Stake debit, nonce advance and session insert land in one
//! durable unit; settlement (the single code path shared by bust, natural
//! completion and cashout) credits payout, finalizes the session and
//! appends the bet record in another. The feed publish happens strictly
//! after the settling batch commits.

use crate::config::WagerConfig;
use crate::errors::{EngineError, EngineResult};
use crate::feed::BetFeed;
use crate::games::coinflip::{self, CoinChoice, CoinFlip};
use crate::games::dice::{self, DiceRoll};
use crate::games::mines::{MinesSession, RevealOutcome, MAX_MINES, MIN_MINES, TOTAL_TILES};
use crate::games::types::{BetRecord, GameMode};
use crate::money::{frac_to_bps, Amount};
use crate::outcome;
use crate::seeds::{RetiredSeedReveal, SeedPair, SeedRegistry};
use crate::storage::{
    account_key, bet_key, done_session_key, open_session_key, settlement_key, Account, Batch,
    Store,
};
use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Finalized row for the single-roll modes, written in the same batch
/// that debits the stake: the collapsed lifecycle commits start and
/// settlement as one durable unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SingleRollSession {
    pub id: Uuid,
    pub user_id: u64,
    pub mode: GameMode,
    pub stake: Amount,
    pub seed_id: Uuid,
    pub nonce: u64,
    pub detail: RollDetail,
    pub payout: Amount,
    pub completed_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RollDetail {
    Dice(DiceRoll),
    Coinflip(CoinFlip),
}

/// An open Mines round with its live-computed display numbers.
#[derive(Debug, Clone)]
pub struct MinesRound {
    pub session: MinesSession,
    pub multiplier_bps: u64,
    pub current_payout: Amount,
}

/// Result of a reveal or cashout.
#[derive(Debug, Clone)]
pub enum MinesAction {
    /// Round continues; numbers are display-only, nothing credited.
    Ongoing {
        session: MinesSession,
        multiplier_bps: u64,
        current_payout: Amount,
    },
    /// Round settled through the shared settlement path.
    Settled {
        session: MinesSession,
        record: BetRecord,
    },
}

pub struct WagerEngine {
    store: Store,
    seeds: SeedRegistry,
    feed: Arc<BetFeed>,
    config: WagerConfig,
    locks: DashMap<u64, Arc<Mutex<()>>>,
}

impl WagerEngine {
    pub fn new(store: Store, seeds: SeedRegistry, feed: Arc<BetFeed>, config: WagerConfig) -> Self {
        Self {
            store,
            seeds,
            feed,
            config,
            locks: DashMap::new(),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn seeds(&self) -> &SeedRegistry {
        &self.seeds
    }

    pub fn house_edge_bps(&self) -> u64 {
        self.config.house_edge_bps
    }

    fn user_lock(&self, user_id: u64) -> Arc<Mutex<()>> {
        self.locks
            .entry(user_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn ensure_enabled(&self, mode: GameMode) -> EngineResult<()> {
        if self
            .config
            .disabled_modes
            .iter()
            .any(|m| m == mode.as_str())
        {
            return Err(EngineError::FeatureDisabled(mode.to_string()));
        }
        Ok(())
    }

    fn validate_stake(&self, stake: Amount) -> EngineResult<()> {
        let min = Amount::from_minor(self.config.min_stake_minor);
        let max = Amount::from_minor(self.config.max_stake_minor);
        if stake < min || stake > max {
            return Err(EngineError::InvalidStake {
                min,
                max,
                got: stake,
            });
        }
        Ok(())
    }

    fn load_account(&self, user_id: u64) -> EngineResult<Account> {
        self.store
            .account(user_id)?
            .ok_or_else(|| EngineError::Internal(format!("account {} not provisioned", user_id)))
    }

    /// Debit the stake and credit xp; fails with `InsufficientBalance`.
    fn apply_stake(&self, account: &mut Account, stake: Amount) -> EngineResult<()> {
        account.balance = account.balance.checked_sub(stake)?;
        account.xp += stake.minor() / 100;
        Ok(())
    }

    // -- mines -------------------------------------------------------------

    pub async fn start_mines(
        &self,
        user_id: u64,
        stake: Amount,
        mines_count: u8,
    ) -> EngineResult<MinesRound> {
        self.ensure_enabled(GameMode::Mines)?;
        self.validate_stake(stake)?;
        if !(MIN_MINES..=MAX_MINES).contains(&mines_count) {
            return Err(EngineError::InvalidField(format!(
                "mines count {} outside {}..={}",
                mines_count, MIN_MINES, MAX_MINES
            )));
        }

        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;

        let open_key = open_session_key(GameMode::Mines, user_id);
        if self.store.exists(&open_key)? {
            return Err(EngineError::SessionActive);
        }

        let mut account = self.load_account(user_id)?;
        self.apply_stake(&mut account, stake)?;

        let pair = self.seeds.active_pair(user_id, GameMode::Mines)?;
        let positions = outcome::mine_positions(
            &pair.server_seed,
            &pair.client_seed,
            pair.nonce,
            TOTAL_TILES,
            mines_count,
        );
        let session = MinesSession::create(
            user_id,
            stake,
            mines_count,
            pair.id,
            pair.nonce,
            &positions,
            Utc::now().timestamp_millis(),
        );

        let mut batch = Batch::new();
        self.seeds.stage_advance(&mut batch, &pair)?;
        batch.stage(&account_key(user_id), &account)?;
        batch.stage(&open_key, &session)?;
        self.store.commit(batch)?;

        tracing::info!(
            user_id,
            session_id = %session.id,
            %stake,
            mines_count,
            nonce = session.nonce,
            "mines round started"
        );

        Ok(MinesRound {
            multiplier_bps: 10_000,
            current_payout: stake,
            session,
        })
    }

    /// Open session for the GET surface, with live-computed numbers.
    /// Integrity failures propagate instead of reading as "no game".
    pub async fn mines_round(&self, user_id: u64) -> EngineResult<Option<MinesRound>> {
        let key = open_session_key(GameMode::Mines, user_id);
        let Some(session) = self.store.get::<MinesSession>(&key)? else {
            return Ok(None);
        };
        let (num, den) = session.current_multiplier(self.config.house_edge_bps);
        Ok(Some(MinesRound {
            multiplier_bps: frac_to_bps(num, den),
            current_payout: session.current_payout(self.config.house_edge_bps)?,
            session,
        }))
    }

    fn open_mines(&self, user_id: u64) -> EngineResult<MinesSession> {
        self.store
            .get::<MinesSession>(&open_session_key(GameMode::Mines, user_id))?
            .ok_or(EngineError::NoActiveGame)
    }

    pub async fn reveal_mines_tile(&self, user_id: u64, tile: u8) -> EngineResult<MinesAction> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;

        let mut session = self.open_mines(user_id)?;
        let edge = self.config.house_edge_bps;
        let now = Utc::now().timestamp_millis();

        match session.reveal(tile, edge, now)? {
            RevealOutcome::Safe {
                multiplier_bps,
                current_payout,
            } => {
                self.store
                    .put(&open_session_key(GameMode::Mines, user_id), &session)?;
                Ok(MinesAction::Ongoing {
                    session,
                    multiplier_bps,
                    current_payout,
                })
            }
            RevealOutcome::Busted => {
                let record = self.settle_mines(&session, Amount::ZERO, 0)?;
                tracing::info!(
                    user_id,
                    session_id = %session.id,
                    tile,
                    "mines round busted"
                );
                Ok(MinesAction::Settled { session, record })
            }
            RevealOutcome::Completed {
                payout,
                multiplier_bps,
            } => {
                let record = self.settle_mines(&session, payout, multiplier_bps)?;
                tracing::info!(
                    user_id,
                    session_id = %session.id,
                    %payout,
                    "mines round completed"
                );
                Ok(MinesAction::Settled { session, record })
            }
        }
    }

    pub async fn cashout_mines(&self, user_id: u64) -> EngineResult<MinesAction> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;

        let mut session = self.open_mines(user_id)?;
        let edge = self.config.house_edge_bps;
        let payout = session.cashout(edge, Utc::now().timestamp_millis())?;
        let (num, den) = session.current_multiplier(edge);

        let record = self.settle_mines(&session, payout, frac_to_bps(num, den))?;
        tracing::info!(
            user_id,
            session_id = %session.id,
            %payout,
            revealed = session.revealed_count(),
            "mines round cashed out"
        );
        Ok(MinesAction::Settled { session, record })
    }

    /// Terminal Mines path: credits payout, deletes the open row and
    /// finalizes in one batch. Caller holds the user lock.
    fn settle_mines(
        &self,
        session: &MinesSession,
        payout: Amount,
        multiplier_bps: u64,
    ) -> EngineResult<BetRecord> {
        let mut account = self.load_account(session.user_id)?;
        if !payout.is_zero() {
            account.balance = account.balance.checked_add(payout)?;
        }

        let mut batch = Batch::new();
        batch.delete(&open_session_key(GameMode::Mines, session.user_id));
        self.finish_settlement(
            batch,
            &account,
            session,
            session.id,
            GameMode::Mines,
            session.stake,
            payout,
            multiplier_bps,
        )
    }

    // -- single-roll modes -------------------------------------------------

    pub async fn play_dice(
        &self,
        user_id: u64,
        stake: Amount,
        target: u32,
    ) -> EngineResult<(SingleRollSession, BetRecord)> {
        self.ensure_enabled(GameMode::Dice)?;
        self.validate_stake(stake)?;
        dice::validate_target(target)?;

        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;

        let pair = self.seeds.active_pair(user_id, GameMode::Dice)?;
        let roll = outcome::roll(&pair.server_seed, &pair.client_seed, pair.nonce, dice::SIDES);
        let resolved = dice::resolve(stake, target, roll, self.config.house_edge_bps)?;

        self.commit_single_roll(
            user_id,
            GameMode::Dice,
            stake,
            resolved.payout,
            resolved.multiplier_bps,
            &pair,
            RollDetail::Dice(resolved),
        )
        .await
    }

    pub async fn play_coinflip(
        &self,
        user_id: u64,
        stake: Amount,
        choice: CoinChoice,
    ) -> EngineResult<(SingleRollSession, BetRecord)> {
        self.ensure_enabled(GameMode::Coinflip)?;
        self.validate_stake(stake)?;

        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;

        let pair = self.seeds.active_pair(user_id, GameMode::Coinflip)?;
        let landed = CoinChoice::from_bit(outcome::roll(
            &pair.server_seed,
            &pair.client_seed,
            pair.nonce,
            2,
        ));
        let resolved = coinflip::resolve(stake, choice, landed, self.config.house_edge_bps)?;
        let (payout, multiplier_bps) = if resolved.win {
            (resolved.payout, resolved.multiplier_bps)
        } else {
            (Amount::ZERO, 0)
        };

        self.commit_single_roll(
            user_id,
            GameMode::Coinflip,
            stake,
            payout,
            multiplier_bps,
            &pair,
            RollDetail::Coinflip(resolved),
        )
        .await
    }

    /// Collapsed lifecycle: stake debit, nonce advance and settlement in
    /// one batch. Caller holds the user lock.
    async fn commit_single_roll(
        &self,
        user_id: u64,
        mode: GameMode,
        stake: Amount,
        payout: Amount,
        multiplier_bps: u64,
        pair: &SeedPair,
        detail: RollDetail,
    ) -> EngineResult<(SingleRollSession, BetRecord)> {
        let mut account = self.load_account(user_id)?;
        self.apply_stake(&mut account, stake)?;
        if !payout.is_zero() {
            account.balance = account.balance.checked_add(payout)?;
        }

        let session = SingleRollSession {
            id: Uuid::new_v4(),
            user_id,
            mode,
            stake,
            seed_id: pair.id,
            nonce: pair.nonce,
            detail,
            payout,
            completed_at: Utc::now().timestamp_millis(),
        };

        let mut batch = Batch::new();
        self.seeds.stage_advance(&mut batch, pair)?;
        let record = self.finish_settlement(
            batch,
            &account,
            &session,
            session.id,
            mode,
            stake,
            payout,
            multiplier_bps,
        )?;

        tracing::info!(
            user_id,
            session_id = %session.id,
            %mode,
            %stake,
            %payout,
            nonce = session.nonce,
            "single-roll round settled"
        );

        Ok((session, record))
    }

    // -- seed rotation -----------------------------------------------------

    /// Replace the client seed. The seed-pair row shares the balance's
    /// lock domain, so rotation takes the same per-user lock as round
    /// starts; it can never interleave with one.
    pub async fn rotate_client_seed(
        &self,
        user_id: u64,
        new_client_seed: String,
    ) -> EngineResult<(RetiredSeedReveal, SeedPair)> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;
        self.seeds.rotate_client_seed(user_id, new_client_seed)
    }

    /// Rotate the server seed on demand, keeping the client seed. Same
    /// lock discipline as `rotate_client_seed`.
    pub async fn rotate_server_seed(
        &self,
        user_id: u64,
    ) -> EngineResult<(RetiredSeedReveal, SeedPair)> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;
        self.seeds.rotate_server_seed(user_id)
    }

    /// The single settlement tail shared by every terminal path. Writes
    /// the finalized session, the bet record, the settlement marker and
    /// the mutated account as one durable unit, then publishes.
    ///
    /// Idempotent per session id: a retry finds the marker and returns
    /// the original record without committing anything.
    #[allow(clippy::too_many_arguments)]
    fn finish_settlement<T: Serialize>(
        &self,
        mut batch: Batch,
        account: &Account,
        finalized: &T,
        session_id: Uuid,
        mode: GameMode,
        stake: Amount,
        payout: Amount,
        multiplier_bps: u64,
    ) -> EngineResult<BetRecord> {
        if let Some(existing) = self.store.get::<BetRecord>(&settlement_key(session_id))? {
            tracing::warn!(
                session_id = %session_id,
                "settlement retried for already-settled session"
            );
            return Ok(existing);
        }

        // Allocation is atomic across users; the per-user lock alone
        // cannot protect the shared log key.
        let seq = self.store.allocate_bet_seq();
        let record = BetRecord {
            seq,
            session_id,
            user_id: account.user_id,
            mode,
            stake,
            payout,
            multiplier_bps,
            edge_bps: self.config.house_edge_bps,
            completed_at: Utc::now().timestamp_millis(),
        };

        batch.stage(&account_key(account.user_id), account)?;
        batch.stage(&done_session_key(session_id), finalized)?;
        batch.stage(&bet_key(seq), &record)?;
        batch.stage(&settlement_key(session_id), &record)?;
        self.store.stage_bet_seq(&mut batch, seq + 1);
        self.store.commit(batch)?;

        // Post-commit only: a lost publish never implies a lost settlement.
        self.feed.publish(&record);
        Ok(record)
    }

    /// Recent settlement log, newest first (pull-side reconciliation).
    pub fn recent_bets(&self, limit: usize) -> EngineResult<Vec<BetRecord>> {
        self.store.recent_bets(limit)
    }
}
