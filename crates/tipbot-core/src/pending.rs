//! Proposed-but-unconfirmed tips awaiting a quick-amount selection.

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::domain::{ContractUserId, PendingKey};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingTip {
    /// Native id of the user who proposed the tip; only they may confirm it.
    pub initiator: u64,
    pub sender_id: ContractUserId,
    pub recipient_id: ContractUserId,
    pub sender_name: String,
    pub recipient_name: String,
    pub recipient_native: Option<u64>,
}

#[async_trait]
pub trait PendingTipStore: Send + Sync {
    async fn create(&self, tip: PendingTip) -> PendingKey;
    async fn get(&self, key: &PendingKey) -> Option<PendingTip>;
    /// Atomic get-and-delete; returns `Some` to exactly one caller per key.
    async fn consume(&self, key: &PendingKey) -> Option<PendingTip>;
    /// Drop expired entries, returning how many were removed.
    async fn purge_expired(&self) -> usize;
}

#[derive(Debug)]
struct Entry {
    tip: PendingTip,
    created: Instant,
}

/// In-memory store with a time-to-live.
///
/// Expired entries read as absent even before the sweeper removes them.
#[derive(Debug)]
pub struct InMemoryPendingTips {
    ttl: Duration,
    entries: Mutex<HashMap<PendingKey, Entry>>,
}

impl InMemoryPendingTips {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn create_at(&self, tip: PendingTip, now: Instant) -> PendingKey {
        let initiator = tip.initiator;
        let mut millis = unix_millis();
        let mut entries = self.entries.lock().await;
        let key = loop {
            let candidate = PendingKey(format!("{initiator}-{millis}"));
            if !entries.contains_key(&candidate) {
                break candidate;
            }
            millis += 1;
        };
        entries.insert(key.clone(), Entry { tip, created: now });
        key
    }

    pub async fn get_at(&self, key: &PendingKey, now: Instant) -> Option<PendingTip> {
        let mut entries = self.entries.lock().await;
        let expired = self.is_expired(entries.get(key)?, now);
        if expired {
            entries.remove(key);
            return None;
        }
        entries.get(key).map(|e| e.tip.clone())
    }

    pub async fn consume_at(&self, key: &PendingKey, now: Instant) -> Option<PendingTip> {
        let entry = self.entries.lock().await.remove(key)?;
        if self.is_expired(&entry, now) {
            return None;
        }
        Some(entry.tip)
    }

    pub async fn purge_expired_at(&self, now: Instant) -> usize {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, e| now.saturating_duration_since(e.created) < self.ttl);
        before - entries.len()
    }

    fn is_expired(&self, entry: &Entry, now: Instant) -> bool {
        now.saturating_duration_since(entry.created) >= self.ttl
    }
}

#[async_trait]
impl PendingTipStore for InMemoryPendingTips {
    async fn create(&self, tip: PendingTip) -> PendingKey {
        self.create_at(tip, Instant::now()).await
    }

    async fn get(&self, key: &PendingKey) -> Option<PendingTip> {
        self.get_at(key, Instant::now()).await
    }

    async fn consume(&self, key: &PendingKey) -> Option<PendingTip> {
        self.consume_at(key, Instant::now()).await
    }

    async fn purge_expired(&self) -> usize {
        self.purge_expired_at(Instant::now()).await
    }
}

/// Periodically purge expired pending tips until `cancel` fires.
pub fn spawn_sweeper(
    store: Arc<dyn PendingTipStore>,
    every: Duration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(every);
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    let removed = store.purge_expired().await;
                    if removed > 0 {
                        tracing::debug!(removed, "purged expired pending tips");
                    }
                }
                _ = cancel.cancelled() => break,
            }
        }
    })
}

fn unix_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
