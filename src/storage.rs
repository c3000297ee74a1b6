//! Durable store backed by RocksDB.
//!
//! Every wager operation commits through a single `WriteBatch`, which is
//! the atomicity boundary: either all staged keys land or none do. Rows
//! are bincode-encoded; a row that fails to decode is an integrity
//! failure, never silently replaced with a default.

use crate::errors::{EngineError, EngineResult};
use crate::games::types::GameMode;
use crate::money::Amount;
use rocksdb::{Direction, IteratorMode, Options, WriteBatch, DB};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// A player account as seen by the engine: balance for validation and
/// atomic deltas, xp credited on stake. Identity lives elsewhere.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub user_id: u64,
    pub balance: Amount,
    pub xp: u64,
}

const BET_SEQ_KEY: &[u8] = b"bets:next_seq";
const BET_PREFIX: &str = "bet:";

pub fn account_key(user_id: u64) -> String {
    format!("account:{}", user_id)
}

pub fn active_seed_key(user_id: u64) -> String {
    format!("seed:active:{}", user_id)
}

pub fn retired_seed_key(seed_id: Uuid) -> String {
    format!("seed:retired:{}", seed_id)
}

/// Open-session row. One key per `(mode, user)` is what makes "at most one
/// non-finalized session" a storage invariant rather than an application
/// check.
pub fn open_session_key(mode: GameMode, user_id: u64) -> String {
    format!("session:open:{}:{}", mode, user_id)
}

pub fn done_session_key(session_id: Uuid) -> String {
    format!("session:done:{}", session_id)
}

/// Settlement marker keyed by session id; its existence is the
/// idempotence check for `settle`.
pub fn settlement_key(session_id: Uuid) -> String {
    format!("settle:{}", session_id)
}

/// Zero-padded so lexicographic key order equals settlement order.
pub fn bet_key(seq: u64) -> String {
    format!("{}{:020}", BET_PREFIX, seq)
}

/// Staged mutations that commit as one durable unit.
pub struct Batch {
    inner: WriteBatch,
}

impl Batch {
    pub fn new() -> Self {
        Self {
            inner: WriteBatch::default(),
        }
    }

    pub fn stage<T: Serialize>(&mut self, key: &str, value: &T) -> EngineResult<()> {
        let bytes = bincode::serialize(value)
            .map_err(|e| EngineError::Internal(format!("encode {}: {}", key, e)))?;
        self.inner.put(key.as_bytes(), bytes);
        Ok(())
    }

    pub fn stage_raw(&mut self, key: &[u8], value: &[u8]) {
        self.inner.put(key, value);
    }

    pub fn delete(&mut self, key: &str) {
        self.inner.delete(key.as_bytes());
    }
}

impl Default for Batch {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
pub struct Store {
    db: Arc<DB>,
    /// Process-wide settlement sequence allocator. Per-user locks do not
    /// protect the shared log, so allocation must be atomic across users.
    bet_seq: Arc<AtomicU64>,
}

impl Store {
    pub fn open<P: AsRef<Path>>(path: P) -> EngineResult<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_write_buffer_size(32 * 1024 * 1024);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);

        let db = DB::open(&opts, path)?;
        let store = Self {
            db: Arc::new(db),
            bet_seq: Arc::new(AtomicU64::new(0)),
        };
        let next = store.recover_bet_seq()?;
        store.bet_seq.store(next, Ordering::SeqCst);
        Ok(store)
    }

    /// Recover the next settlement sequence. The persisted counter row can
    /// trail the log when batches from different users commit out of
    /// order, so the highest bet key is authoritative.
    fn recover_bet_seq(&self) -> EngineResult<u64> {
        let stored = match self.db.get(BET_SEQ_KEY)? {
            None => 0,
            Some(bytes) => {
                let arr: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
                    EngineError::Integrity("corrupt bet sequence counter".to_string())
                })?;
                u64::from_le_bytes(arr)
            }
        };

        let upper = format!("{}~", BET_PREFIX);
        let mut iter = self
            .db
            .iterator(IteratorMode::From(upper.as_bytes(), Direction::Reverse));
        let last = match iter.next() {
            None => None,
            Some(item) => {
                let (key, _) = item?;
                if !key.starts_with(BET_PREFIX.as_bytes()) {
                    None
                } else {
                    std::str::from_utf8(&key[BET_PREFIX.len()..])
                        .ok()
                        .and_then(|s| s.parse::<u64>().ok())
                }
            }
        };

        Ok(match last {
            Some(seq) => stored.max(seq + 1),
            None => stored,
        })
    }

    pub fn get_raw(&self, key: &str) -> EngineResult<Option<Vec<u8>>> {
        Ok(self.db.get(key.as_bytes())?)
    }

    /// Typed read. Decode failure is surfaced as `Integrity` with the key
    /// as context; the caller must not treat it as "absent".
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> EngineResult<Option<T>> {
        match self.db.get(key.as_bytes())? {
            None => Ok(None),
            Some(bytes) => bincode::deserialize(&bytes)
                .map(Some)
                .map_err(|e| EngineError::Integrity(format!("corrupt row at {}: {}", key, e))),
        }
    }

    pub fn exists(&self, key: &str) -> EngineResult<bool> {
        Ok(self.db.get(key.as_bytes())?.is_some())
    }

    pub fn commit(&self, batch: Batch) -> EngineResult<()> {
        self.db.write(batch.inner)?;
        Ok(())
    }

    pub fn put<T: Serialize>(&self, key: &str, value: &T) -> EngineResult<()> {
        let mut batch = Batch::new();
        batch.stage(key, value)?;
        self.commit(batch)
    }

    // -- accounts ---------------------------------------------------------

    pub fn account(&self, user_id: u64) -> EngineResult<Option<Account>> {
        self.get(&account_key(user_id))
    }

    /// Provisioning hook for the external account subsystem (and tests).
    pub fn create_account(&self, user_id: u64, balance: Amount) -> EngineResult<Account> {
        let account = Account {
            user_id,
            balance,
            xp: 0,
        };
        self.put(&account_key(user_id), &account)?;
        Ok(account)
    }

    // -- bet log ----------------------------------------------------------

    /// Next sequence number to be allocated.
    pub fn next_bet_seq(&self) -> u64 {
        self.bet_seq.load(Ordering::SeqCst)
    }

    /// Allocate a settlement sequence number. Unique across concurrent
    /// settlements for different users; a number burned by a failed
    /// commit leaves a harmless gap in the log.
    pub fn allocate_bet_seq(&self) -> u64 {
        self.bet_seq.fetch_add(1, Ordering::SeqCst)
    }

    /// Stage the persisted counter hint into the settling batch. Recovery
    /// takes the max of this row and the log itself.
    pub fn stage_bet_seq(&self, batch: &mut Batch, next: u64) {
        batch.stage_raw(BET_SEQ_KEY, &next.to_le_bytes());
    }

    /// Most recent settled bets, newest first.
    pub fn recent_bets<T: DeserializeOwned>(&self, limit: usize) -> EngineResult<Vec<T>> {
        let upper = format!("{}~", BET_PREFIX); // '~' sorts after all digits
        let mut out = Vec::with_capacity(limit);
        let iter = self
            .db
            .iterator(IteratorMode::From(upper.as_bytes(), Direction::Reverse));
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(BET_PREFIX.as_bytes()) {
                break;
            }
            let record = bincode::deserialize(&value).map_err(|e| {
                EngineError::Integrity(format!(
                    "corrupt bet row at {}: {}",
                    String::from_utf8_lossy(&key),
                    e
                ))
            })?;
            out.push(record);
            if out.len() >= limit {
                break;
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_store() -> (TempDir, Store) {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn batch_commit_is_atomic_unit() {
        let (dir, store) = temp_store();
        let mut batch = Batch::new();
        batch.stage(&account_key(1), &Account {
            user_id: 1,
            balance: Amount::from_minor(500),
            xp: 0,
        })
        .unwrap();
        store.stage_bet_seq(&mut batch, 7);
        store.commit(batch).unwrap();

        let account = store.account(1).unwrap().unwrap();
        assert_eq!(account.balance.minor(), 500);

        // The counter row takes effect on the next open.
        drop(store);
        let store = Store::open(dir.path()).unwrap();
        assert_eq!(store.next_bet_seq(), 7);
    }

    #[test]
    fn bet_seq_allocation_is_unique_across_threads() {
        let (_dir, store) = temp_store();
        let mut handles = Vec::new();
        for _ in 0..4 {
            let store = store.clone();
            handles.push(std::thread::spawn(move || {
                (0..25).map(|_| store.allocate_bet_seq()).collect::<Vec<u64>>()
            }));
        }

        let mut seqs: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        seqs.sort_unstable();
        seqs.dedup();
        assert_eq!(seqs.len(), 100);
        assert_eq!(store.next_bet_seq(), 100);
    }

    #[test]
    fn bet_seq_recovery_prefers_the_log_over_a_stale_counter() {
        let (dir, store) = temp_store();
        // A stale counter row alongside a higher-numbered bet, as left by
        // out-of-order commits.
        let mut batch = Batch::new();
        batch.stage(&bet_key(9), &9u64).unwrap();
        store.stage_bet_seq(&mut batch, 5);
        store.commit(batch).unwrap();

        drop(store);
        let store = Store::open(dir.path()).unwrap();
        assert_eq!(store.next_bet_seq(), 10);
    }

    #[test]
    fn corrupt_row_is_integrity_error_not_default() {
        let (_dir, store) = temp_store();
        let mut batch = Batch::new();
        batch.stage_raw(account_key(9).as_bytes(), b"\xff\xff\xff");
        store.commit(batch).unwrap();

        let err = store.account(9).unwrap_err();
        assert_eq!(err.code(), "INTEGRITY_ERROR");
    }

    #[test]
    fn recent_bets_returns_newest_first() {
        let (_dir, store) = temp_store();
        for seq in 0u64..5 {
            store.put(&bet_key(seq), &seq).unwrap();
        }
        let recent: Vec<u64> = store.recent_bets(3).unwrap();
        assert_eq!(recent, vec![4, 3, 2]);
    }

    #[test]
    fn missing_key_reads_as_none() {
        let (_dir, store) = temp_store();
        assert!(store.account(42).unwrap().is_none());
        assert_eq!(store.next_bet_seq(), 0);
    }
}
