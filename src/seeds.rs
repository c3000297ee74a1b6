//! Seed registry: the sole source of fairness material.
//!
//! Each user holds one active seed pair; its nonce increases by exactly
//! one per started round. The nonce advance is staged by the engine into
//! the same write batch as the session insert, under the per-user lock,
//! so concurrent starts can never reuse a nonce.
//!
//! Rotation retires the current pair (revealing its server seed plaintext
//! for audit) and mints a fresh one. It is refused while any mode has an
//! open session, since revealing the seed mid-session would expose the
//! hidden outcome.

use crate::errors::{EngineError, EngineResult};
use crate::games::types::GameMode;
use crate::storage::{active_seed_key, open_session_key, retired_seed_key, Batch, Store};
use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

const MAX_CLIENT_SEED_LEN: usize = 64;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedPair {
    pub id: Uuid,
    pub user_id: u64,
    pub server_seed: [u8; 32],
    pub server_seed_hash: String,
    pub client_seed: String,
    /// Nonce for the next round started with this pair.
    pub nonce: u64,
    pub created_at: i64,
    pub retired_at: Option<i64>,
}

/// What the player sees while the pair is active: the commitment, never
/// the plaintext.
#[derive(Debug, Clone, Serialize)]
pub struct SeedPairView {
    pub seed_id: Uuid,
    pub server_seed_hash: String,
    pub client_seed: String,
    pub nonce: u64,
}

/// Audit disclosure of a retired pair.
#[derive(Debug, Clone, Serialize)]
pub struct RetiredSeedReveal {
    pub seed_id: Uuid,
    pub server_seed: String,
    pub server_seed_hash: String,
    pub client_seed: String,
    pub final_nonce: u64,
}

impl SeedPair {
    pub fn view(&self) -> SeedPairView {
        SeedPairView {
            seed_id: self.id,
            server_seed_hash: self.server_seed_hash.clone(),
            client_seed: self.client_seed.clone(),
            nonce: self.nonce,
        }
    }

    fn reveal(&self) -> RetiredSeedReveal {
        RetiredSeedReveal {
            seed_id: self.id,
            server_seed: hex::encode(self.server_seed),
            server_seed_hash: self.server_seed_hash.clone(),
            client_seed: self.client_seed.clone(),
            final_nonce: self.nonce,
        }
    }
}

pub fn seed_hash_hex(server_seed: &[u8; 32]) -> String {
    hex::encode(Sha256::digest(server_seed))
}

fn validate_client_seed(seed: &str) -> EngineResult<()> {
    if seed.is_empty() || seed.len() > MAX_CLIENT_SEED_LEN {
        return Err(EngineError::InvalidField(format!(
            "client seed must be 1..={} characters",
            MAX_CLIENT_SEED_LEN
        )));
    }
    if !seed.chars().all(|c| c.is_ascii_graphic()) {
        return Err(EngineError::InvalidField(
            "client seed must be printable ASCII".to_string(),
        ));
    }
    Ok(())
}

#[derive(Clone)]
pub struct SeedRegistry {
    store: Store,
}

impl SeedRegistry {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    fn mint(user_id: u64, client_seed: String) -> SeedPair {
        let server_seed: [u8; 32] = rand::thread_rng().gen();
        SeedPair {
            id: Uuid::new_v4(),
            user_id,
            server_seed_hash: seed_hash_hex(&server_seed),
            server_seed,
            client_seed,
            nonce: 0,
            created_at: Utc::now().timestamp_millis(),
            retired_at: None,
        }
    }

    /// Provision the first pair for an account. Called by the account
    /// subsystem at creation time; returns the existing pair if one is
    /// already active.
    pub fn provision(&self, user_id: u64, client_seed: Option<String>) -> EngineResult<SeedPair> {
        if let Some(existing) = self.store.get::<SeedPair>(&active_seed_key(user_id))? {
            return Ok(existing);
        }
        let client_seed = client_seed.unwrap_or_else(|| Uuid::new_v4().simple().to_string());
        validate_client_seed(&client_seed)?;
        let pair = Self::mint(user_id, client_seed);
        self.store.put(&active_seed_key(user_id), &pair)?;
        Ok(pair)
    }

    /// Active pair for a user. The mode parameter keeps the call shape of
    /// a per-game-class registry; all current modes share one class.
    pub fn active_pair(&self, user_id: u64, _mode: GameMode) -> EngineResult<SeedPair> {
        self.store
            .get::<SeedPair>(&active_seed_key(user_id))?
            .ok_or(EngineError::NoActiveSeed)
    }

    /// Stage the nonce advance into the caller's batch. Must run under the
    /// same user lock as the session insert it backs.
    pub fn stage_advance(&self, batch: &mut Batch, pair: &SeedPair) -> EngineResult<u64> {
        let mut advanced = pair.clone();
        advanced.nonce = pair
            .nonce
            .checked_add(1)
            .ok_or_else(|| EngineError::Internal("nonce overflow".into()))?;
        batch.stage(&active_seed_key(pair.user_id), &advanced)?;
        Ok(advanced.nonce)
    }

    fn ensure_no_open_session(&self, user_id: u64) -> EngineResult<()> {
        for mode in GameMode::ALL {
            if self.store.exists(&open_session_key(mode, user_id))? {
                return Err(EngineError::SessionActive);
            }
        }
        Ok(())
    }

    /// The seed-pair row shares the balance's lock domain: callers hold
    /// the engine's per-user lock, so the open-session check and the
    /// active-key swap cannot interleave with a round start.
    fn rotate(
        &self,
        user_id: u64,
        next_client_seed: Option<String>,
    ) -> EngineResult<(RetiredSeedReveal, SeedPair)> {
        self.ensure_no_open_session(user_id)?;

        let mut retiring = self.active_pair(user_id, GameMode::Mines)?;
        retiring.retired_at = Some(Utc::now().timestamp_millis());

        let client_seed = next_client_seed.unwrap_or_else(|| retiring.client_seed.clone());
        validate_client_seed(&client_seed)?;
        let fresh = Self::mint(user_id, client_seed);

        let mut batch = Batch::new();
        batch.stage(&retired_seed_key(retiring.id), &retiring)?;
        batch.stage(&active_seed_key(user_id), &fresh)?;
        self.store.commit(batch)?;

        tracing::info!(
            user_id,
            retired_seed = %retiring.id,
            new_seed = %fresh.id,
            "seed pair rotated"
        );

        Ok((retiring.reveal(), fresh))
    }

    /// Replace the client seed. Mints a fresh server seed as well so the
    /// retiring pair can be revealed in full.
    pub fn rotate_client_seed(
        &self,
        user_id: u64,
        new_client_seed: String,
    ) -> EngineResult<(RetiredSeedReveal, SeedPair)> {
        validate_client_seed(&new_client_seed)?;
        self.rotate(user_id, Some(new_client_seed))
    }

    /// Rotate the server seed on demand, keeping the client seed.
    pub fn rotate_server_seed(
        &self,
        user_id: u64,
    ) -> EngineResult<(RetiredSeedReveal, SeedPair)> {
        self.rotate(user_id, None)
    }

    /// Retired pair lookup for audit tooling.
    pub fn retired_pair(&self, seed_id: Uuid) -> EngineResult<Option<SeedPair>> {
        self.store.get(&retired_seed_key(seed_id))
    }
}
