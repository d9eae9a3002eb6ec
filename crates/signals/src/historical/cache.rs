//! TTL cache for historical votes and pattern statistics.
//!
//! Entries are keyed per instrument so a commit of new archive rows can drop
//! exactly that instrument's answers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

use super::vote::HistoricalVote;
use crate::pattern_stats::PatternStatistics;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub instrument: String,
    pub hour: u32,
    pub minute_bucket: u32,
    pub weekday: u32,
}

struct Entry<T> {
    stored_at: Instant,
    value: T,
}

pub struct PatternCache {
    ttl: Duration,
    votes: RwLock<HashMap<CacheKey, Entry<HistoricalVote>>>,
    statistics: RwLock<HashMap<String, Entry<Arc<PatternStatistics>>>>,
}

impl PatternCache {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            votes: RwLock::new(HashMap::new()),
            statistics: RwLock::new(HashMap::new()),
        }
    }

    fn fresh<T>(&self, entry: &Entry<T>) -> bool {
        entry.stored_at.elapsed() < self.ttl
    }

    pub async fn get_vote(&self, key: &CacheKey) -> Option<HistoricalVote> {
        let guard = self.votes.read().await;
        guard
            .get(key)
            .filter(|e| self.fresh(e))
            .map(|e| e.value.clone())
    }

    pub async fn put_vote(&self, key: CacheKey, vote: HistoricalVote) {
        let mut guard = self.votes.write().await;
        // expired entries are swept on write to bound the map
        guard.retain(|_, e| e.stored_at.elapsed() < self.ttl);
        guard.insert(
            key,
            Entry {
                stored_at: Instant::now(),
                value: vote,
            },
        );
    }

    pub async fn get_statistics(&self, instrument: &str) -> Option<Arc<PatternStatistics>> {
        let guard = self.statistics.read().await;
        guard
            .get(instrument)
            .filter(|e| self.fresh(e))
            .map(|e| Arc::clone(&e.value))
    }

    pub async fn put_statistics(&self, instrument: &str, stats: Arc<PatternStatistics>) {
        self.statistics.write().await.insert(
            instrument.to_string(),
            Entry {
                stored_at: Instant::now(),
                value: stats,
            },
        );
    }

    /// Drops every cached answer for `instrument`. Returns the number removed.
    pub async fn invalidate(&self, instrument: &str) -> usize {
        let mut votes = self.votes.write().await;
        let before = votes.len();
        votes.retain(|k, _| k.instrument != instrument);
        let mut removed = before - votes.len();
        drop(votes);

        if self.statistics.write().await.remove(instrument).is_some() {
            removed += 1;
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.votes.read().await.len() + self.statistics.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
