//! Verifies engine state survives stopping and reopening the store.

use fairline::config::{FeedConfig, WagerConfig};
use fairline::engine::WagerEngine;
use fairline::games::types::GameMode;
use fairline::{Amount, BetFeed, SeedRegistry, Store};
use std::sync::Arc;
use tempfile::TempDir;

const USER: u64 = 1;

fn build_engine(store: Store) -> Arc<WagerEngine> {
    let seeds = SeedRegistry::new(store.clone());
    let feed = Arc::new(BetFeed::new(FeedConfig::default()));
    Arc::new(WagerEngine::new(
        store,
        seeds,
        feed,
        WagerConfig::default(),
    ))
}

#[tokio::test]
async fn state_survives_restart() {
    let dir = TempDir::new().unwrap();
    let stake = Amount::from_minor(1_000);

    // Phase 1: provision, wager, settle one dice round, leave a mines
    // round open, then drop everything.
    let (balance_before, open_nonce, bet_seq) = {
        let store = Store::open(dir.path()).unwrap();
        store.create_account(USER, Amount::from_minor(100_000)).unwrap();
        SeedRegistry::new(store.clone())
            .provision(USER, Some("restart".into()))
            .unwrap();
        let engine = build_engine(store.clone());

        let (_, record) = engine.play_dice(USER, stake, 5_000).await.unwrap();
        let round = engine.start_mines(USER, stake, 3).await.unwrap();

        let balance = store.account(USER).unwrap().unwrap().balance;
        (balance, round.session.nonce, record.seq)
    };

    // Phase 2: reopen the same directory and verify everything is back.
    let store = Store::open(dir.path()).unwrap();
    let engine = build_engine(store.clone());

    let account = store.account(USER).unwrap().unwrap();
    assert_eq!(account.balance, balance_before);

    // The open mines round still blocks a new start.
    let round = engine.mines_round(USER).await.unwrap().unwrap();
    assert_eq!(round.session.nonce, open_nonce);
    let err = engine.start_mines(USER, stake, 3).await.unwrap_err();
    assert_eq!(err.code(), "SESSION_ACTIVE");

    // The seed pair kept its nonce position (dice + mines = 2 rounds).
    let pair = engine.seeds().active_pair(USER, GameMode::Mines).unwrap();
    assert_eq!(pair.nonce, 2);

    // The settlement log is intact and the sequence continues.
    let recent = engine.recent_bets(10).unwrap();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].seq, bet_seq);
    assert_eq!(store.next_bet_seq(), bet_seq + 1);
}
