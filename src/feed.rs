//! Bet broadcast fan-out.
//!
//! Settled bets are published to topic channels after the settling batch
//! commits, never before. Delivery is best-effort and at-most-once per
//! subscriber: a lagging receiver drops events and is expected to
//! reconcile through the pull side. Each channel keeps a small in-memory
//! backlog replayed to fresh subscribers.

use crate::config::FeedConfig;
use crate::games::types::BetRecord;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

/// Feed channel names as subscribers address them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedChannel {
    All,
    User(u64),
    High,
    Lucky,
}

impl fmt::Display for FeedChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedChannel::All => write!(f, "all"),
            FeedChannel::User(id) => write!(f, "user:{}", id),
            FeedChannel::High => write!(f, "high"),
            FeedChannel::Lucky => write!(f, "lucky"),
        }
    }
}

impl FromStr for FeedChannel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(FeedChannel::All),
            "high" => Ok(FeedChannel::High),
            "lucky" => Ok(FeedChannel::Lucky),
            other => match other.strip_prefix("user:") {
                Some(id) => id
                    .parse()
                    .map(FeedChannel::User)
                    .map_err(|_| format!("bad user channel '{}'", other)),
                None => Err(format!("unknown channel '{}'", other)),
            },
        }
    }
}

struct ChannelState {
    tx: broadcast::Sender<BetRecord>,
    backlog: Mutex<VecDeque<BetRecord>>,
}

impl ChannelState {
    fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            backlog: Mutex::new(VecDeque::new()),
        }
    }

    fn push(&self, record: &BetRecord, backlog_cap: usize) {
        let mut backlog = self.backlog.lock().expect("feed backlog poisoned");
        if backlog.len() == backlog_cap {
            backlog.pop_front();
        }
        backlog.push_back(record.clone());
        // Sent while the backlog lock is held: a concurrent subscribe
        // sees the record in its snapshot or live, never both.
        // Send failure just means nobody is listening right now.
        let _ = self.tx.send(record.clone());
    }

    fn subscribe(&self) -> (Vec<BetRecord>, broadcast::Receiver<BetRecord>) {
        // Snapshot and receiver are created under one lock acquisition so
        // no push can slot in between them.
        let backlog = self.backlog.lock().expect("feed backlog poisoned");
        let rx = self.tx.subscribe();
        (backlog.iter().cloned().collect(), rx)
    }
}

pub struct BetFeed {
    config: FeedConfig,
    all: ChannelState,
    high: ChannelState,
    lucky: ChannelState,
    users: DashMap<u64, Arc<ChannelState>>,
}

impl BetFeed {
    pub fn new(config: FeedConfig) -> Self {
        let capacity = config.channel_capacity;
        Self {
            config,
            all: ChannelState::new(capacity),
            high: ChannelState::new(capacity),
            lucky: ChannelState::new(capacity),
            users: DashMap::new(),
        }
    }

    /// Seed channel backlogs from the persisted settlement log (oldest
    /// first), so fresh subscribers right after boot still see history.
    pub fn preload(&self, records: impl IntoIterator<Item = BetRecord>) {
        for record in records {
            self.route(&record);
        }
    }

    fn user_channel(&self, user_id: u64) -> Arc<ChannelState> {
        self.users
            .entry(user_id)
            .or_insert_with(|| Arc::new(ChannelState::new(self.config.channel_capacity)))
            .clone()
    }

    fn route(&self, record: &BetRecord) {
        let cap = self.config.backlog;
        self.all.push(record, cap);
        self.user_channel(record.user_id).push(record, cap);
        if record.stake.minor() >= self.config.high_stake_minor {
            self.high.push(record, cap);
        }
        if record.realized_bps() >= self.config.lucky_multiplier_bps {
            self.lucky.push(record, cap);
        }
    }

    /// Publish a settled bet. Callers invoke this strictly after the
    /// settling transaction has committed.
    pub fn publish(&self, record: &BetRecord) {
        tracing::debug!(
            seq = record.seq,
            user_id = record.user_id,
            mode = %record.mode,
            stake = %record.stake,
            payout = %record.payout,
            "bet published"
        );
        self.route(record);
    }

    /// Current backlog plus a live receiver for one channel.
    pub fn subscribe(
        &self,
        channel: FeedChannel,
    ) -> (Vec<BetRecord>, broadcast::Receiver<BetRecord>) {
        match channel {
            FeedChannel::All => self.all.subscribe(),
            FeedChannel::High => self.high.subscribe(),
            FeedChannel::Lucky => self.lucky.subscribe(),
            FeedChannel::User(id) => self.user_channel(id).subscribe(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::types::GameMode;
    use crate::money::Amount;
    use uuid::Uuid;

    fn record(user_id: u64, stake: u64, payout: u64) -> BetRecord {
        BetRecord {
            seq: 0,
            session_id: Uuid::new_v4(),
            user_id,
            mode: GameMode::Mines,
            stake: Amount::from_minor(stake),
            payout: Amount::from_minor(payout),
            multiplier_bps: 0,
            edge_bps: 100,
            completed_at: 0,
        }
    }

    fn feed() -> BetFeed {
        BetFeed::new(FeedConfig {
            high_stake_minor: 10_000,
            lucky_multiplier_bps: 100_000,
            backlog: 3,
            channel_capacity: 16,
        })
    }

    #[test]
    fn channel_names_parse() {
        assert_eq!("all".parse::<FeedChannel>().unwrap(), FeedChannel::All);
        assert_eq!(
            "user:42".parse::<FeedChannel>().unwrap(),
            FeedChannel::User(42)
        );
        assert!("user:abc".parse::<FeedChannel>().is_err());
        assert!("me".parse::<FeedChannel>().is_err()); // resolved upstream
    }

    #[tokio::test]
    async fn routes_to_all_and_user_channels() {
        let feed = feed();
        let (_, mut all_rx) = feed.subscribe(FeedChannel::All);
        let (_, mut user_rx) = feed.subscribe(FeedChannel::User(7));
        let (_, mut other_rx) = feed.subscribe(FeedChannel::User(8));

        feed.publish(&record(7, 100, 200));

        assert_eq!(all_rx.recv().await.unwrap().user_id, 7);
        assert_eq!(user_rx.recv().await.unwrap().user_id, 7);
        assert!(other_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn high_and_lucky_filters_apply_thresholds() {
        let feed = feed();
        let (_, mut high_rx) = feed.subscribe(FeedChannel::High);
        let (_, mut lucky_rx) = feed.subscribe(FeedChannel::Lucky);

        // Below both thresholds.
        feed.publish(&record(1, 100, 150));
        // High stake, modest multiplier.
        feed.publish(&record(2, 50_000, 60_000));
        // Small stake, 20x payout.
        feed.publish(&record(3, 100, 2_000));

        assert_eq!(high_rx.recv().await.unwrap().user_id, 2);
        assert!(high_rx.try_recv().is_err());
        assert_eq!(lucky_rx.recv().await.unwrap().user_id, 3);
        assert!(lucky_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn subscriber_sees_each_record_exactly_once() {
        let feed = feed();
        let mut before = record(1, 100, 0);
        before.seq = 1;
        feed.publish(&before);

        let (backlog, mut rx) = feed.subscribe(FeedChannel::All);

        let mut after = record(1, 100, 0);
        after.seq = 2;
        feed.publish(&after);

        // Published-before arrives via the backlog only, published-after
        // via the live receiver only.
        let backlog_seqs: Vec<u64> = backlog.iter().map(|r| r.seq).collect();
        assert_eq!(backlog_seqs, vec![1]);
        assert_eq!(rx.recv().await.unwrap().seq, 2);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn backlog_is_bounded_and_replayed() {
        let feed = feed();
        for i in 0..5 {
            feed.publish(&record(i, 100, 0));
        }
        let (backlog, _) = feed.subscribe(FeedChannel::All);
        let users: Vec<u64> = backlog.iter().map(|r| r.user_id).collect();
        assert_eq!(users, vec![2, 3, 4]); // capped at 3, oldest dropped
    }
}
