use anyhow::Result;
use bar_signal_core::{
    AggregateRow, Bar, HistoricalConfig, HistoricalError, HistoricalStore, PatternQuery,
};
use chrono::{DateTime, Datelike, Timelike, Utc};
use std::sync::Arc;

use super::cache::{CacheKey, PatternCache};
use super::vote::{combine, HistoricalStatus, HistoricalVote};
use crate::pattern_stats::PatternStatistics;

/// Bars after the run start that decide a sequence outcome.
pub const SEQUENCE_LENGTH: usize = 5;

/// Read-only query layer over the historical archive.
///
/// All store calls are bounded by `query_timeout`. [`Self::vote`] never fails:
/// store errors degrade to a neutral, zero-sample vote.
pub struct HistoricalPatternAccessor {
    store: Arc<dyn HistoricalStore>,
    config: HistoricalConfig,
    cache: PatternCache,
}

impl HistoricalPatternAccessor {
    #[must_use]
    pub fn new(store: Arc<dyn HistoricalStore>, config: HistoricalConfig) -> Self {
        let cache = PatternCache::new(config.cache_ttl());
        Self {
            store,
            config,
            cache,
        }
    }

    #[must_use]
    pub fn config(&self) -> &HistoricalConfig {
        &self.config
    }

    /// Rows at `hour` within `±hourly_minute_window` of `minute`.
    ///
    /// # Errors
    /// Returns an error if the store fails.
    pub async fn hourly_pattern(
        &self,
        instrument: &str,
        hour: u32,
        minute: u32,
    ) -> Result<AggregateRow> {
        let query = PatternQuery::hourly(hour, minute, self.config.hourly_minute_window);
        self.store.aggregate(instrument, query).await
    }

    /// Rows on `weekday` (0 = Sunday) at `hour`.
    ///
    /// # Errors
    /// Returns an error if the store fails.
    pub async fn daily_pattern(
        &self,
        instrument: &str,
        weekday: u32,
        hour: u32,
    ) -> Result<AggregateRow> {
        self.store
            .aggregate(instrument, PatternQuery::daily(weekday, hour))
            .await
    }

    /// Six-bar continuation runs starting within `±sequence_minute_window`.
    ///
    /// # Errors
    /// Returns an error if the store fails.
    pub async fn sequence_pattern(
        &self,
        instrument: &str,
        hour: u32,
        minute: u32,
    ) -> Result<AggregateRow> {
        let query = PatternQuery::sequence(
            hour,
            minute,
            self.config.sequence_minute_window,
            SEQUENCE_LENGTH,
        );
        self.store.aggregate(instrument, query).await
    }

    fn cache_key(&self, instrument: &str, at: DateTime<Utc>) -> CacheKey {
        CacheKey {
            instrument: instrument.to_string(),
            hour: at.hour(),
            minute_bucket: at.minute() / self.config.cache_minute_bucket.max(1),
            weekday: at.weekday().num_days_from_sunday(),
        }
    }

    /// Queries the three aggregates concurrently and folds them into a vote.
    ///
    /// # Errors
    /// Returns [`HistoricalError::Timeout`] or [`HistoricalError::Store`].
    pub async fn query_vote(
        &self,
        instrument: &str,
        at: DateTime<Utc>,
    ) -> Result<HistoricalVote, HistoricalError> {
        let (hour, minute) = (at.hour(), at.minute());
        let weekday = at.weekday().num_days_from_sunday();
        let timeout = self.config.query_timeout();

        let queries = async {
            tokio::join!(
                self.hourly_pattern(instrument, hour, minute),
                self.daily_pattern(instrument, weekday, hour),
                self.sequence_pattern(instrument, hour, minute),
            )
        };
        let (hourly, daily, sequence) = tokio::time::timeout(timeout, queries)
            .await
            .map_err(|_| HistoricalError::Timeout {
                instrument: instrument.to_string(),
                timeout,
            })?;

        Ok(combine(&self.config, &hourly?, &daily?, &sequence?))
    }

    /// Cached historical vote for the bucket containing `at`.
    pub async fn vote(&self, instrument: &str, at: DateTime<Utc>) -> HistoricalVote {
        let key = self.cache_key(instrument, at);
        if let Some(vote) = self.cache.get_vote(&key).await {
            return vote;
        }

        match self.query_vote(instrument, at).await {
            Ok(vote) => {
                tracing::debug!(
                    instrument,
                    direction = %vote.direction,
                    confidence = vote.confidence,
                    samples = vote.total_samples,
                    status = %vote.status,
                    "Historical vote computed"
                );
                self.cache.put_vote(key, vote.clone()).await;
                vote
            }
            Err(e) => {
                tracing::warn!(instrument, "Historical store unavailable: {e:#}");
                HistoricalVote::neutral(HistoricalStatus::Unavailable)
            }
        }
    }

    /// The `limit` most recent archived bars, oldest first.
    ///
    /// # Errors
    /// Returns [`HistoricalError`] on store failure or timeout.
    pub async fn recent_bars(
        &self,
        instrument: &str,
        limit: usize,
    ) -> Result<Vec<Bar>, HistoricalError> {
        let timeout = self.config.query_timeout();
        tokio::time::timeout(timeout, self.store.recent_bars(instrument, limit))
            .await
            .map_err(|_| HistoricalError::Timeout {
                instrument: instrument.to_string(),
                timeout,
            })?
            .map_err(HistoricalError::from)
    }

    /// Sequence backtest over the last `pattern_lookback_bars` archived bars.
    ///
    /// # Errors
    /// Returns [`HistoricalError`] on store failure or timeout.
    pub async fn pattern_statistics(
        &self,
        instrument: &str,
    ) -> Result<Arc<PatternStatistics>, HistoricalError> {
        if let Some(stats) = self.cache.get_statistics(instrument).await {
            return Ok(stats);
        }

        let bars = self
            .recent_bars(instrument, self.config.pattern_lookback_bars)
            .await?;
        let stats = Arc::new(PatternStatistics::from_bars(&bars));
        tracing::info!(
            instrument,
            bars = bars.len(),
            runs = stats.total(),
            accuracy = stats.accuracy_pct(),
            "Pattern statistics computed"
        );
        self.cache.put_statistics(instrument, Arc::clone(&stats)).await;
        Ok(stats)
    }

    /// Drops cached answers after new archive rows land for `instrument`.
    pub async fn invalidate(&self, instrument: &str) {
        let removed = self.cache.invalidate(instrument).await;
        tracing::debug!(instrument, removed, "Historical cache invalidated");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bar_signal_core::Direction;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Answers every query with the same row and counts calls.
    struct FixedStore {
        row: AggregateRow,
        calls: AtomicUsize,
        delay: Option<Duration>,
        fail: bool,
    }

    impl FixedStore {
        fn new(row: AggregateRow) -> Self {
            Self {
                row,
                calls: AtomicUsize::new(0),
                delay: None,
                fail: false,
            }
        }
    }

    #[async_trait]
    impl HistoricalStore for FixedStore {
        async fn aggregate(&self, _instrument: &str, _query: PatternQuery) -> Result<AggregateRow> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                anyhow::bail!("connection refused");
            }
            Ok(self.row)
        }

        async fn recent_bars(&self, _instrument: &str, _limit: usize) -> Result<Vec<Bar>> {
            Ok(Vec::new())
        }
    }

    fn bullish_row() -> AggregateRow {
        AggregateRow {
            sample_count: 400,
            up_count: 260,
            avg_volatility: 0.0003,
            avg_move_strength: 0.2,
        }
    }

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 4, 14, 30, 0).unwrap()
    }

    #[tokio::test]
    async fn vote_is_cached_per_bucket() {
        let store = Arc::new(FixedStore::new(bullish_row()));
        let accessor = HistoricalPatternAccessor::new(store.clone(), HistoricalConfig::default());

        let first = accessor.vote("EURUSD", at()).await;
        assert_eq!(first.direction, Direction::Up);
        assert_eq!(store.calls.load(Ordering::SeqCst), 3);

        let again = accessor.vote("EURUSD", at() + chrono::Duration::seconds(20)).await;
        assert_eq!(again, first);
        assert_eq!(store.calls.load(Ordering::SeqCst), 3);

        accessor.invalidate("EURUSD").await;
        accessor.vote("EURUSD", at()).await;
        assert_eq!(store.calls.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn store_error_degrades_to_neutral() {
        let mut store = FixedStore::new(bullish_row());
        store.fail = true;
        let accessor = HistoricalPatternAccessor::new(Arc::new(store), HistoricalConfig::default());

        let vote = accessor.vote("EURUSD", at()).await;
        assert_eq!(vote.status, HistoricalStatus::Unavailable);
        assert_eq!(vote.direction, Direction::Neutral);
        assert_eq!(vote.total_samples, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_store_times_out() {
        let mut store = FixedStore::new(bullish_row());
        store.delay = Some(Duration::from_secs(10));
        let accessor = HistoricalPatternAccessor::new(Arc::new(store), HistoricalConfig::default());

        let err = accessor.query_vote("EURUSD", at()).await.unwrap_err();
        assert!(matches!(err, HistoricalError::Timeout { .. }));

        let vote = accessor.vote("EURUSD", at()).await;
        assert_eq!(vote.status, HistoricalStatus::Unavailable);
    }

    #[tokio::test]
    async fn empty_archive_is_no_data() {
        let accessor = HistoricalPatternAccessor::new(
            Arc::new(FixedStore::new(AggregateRow::default())),
            HistoricalConfig::default(),
        );
        let vote = accessor.vote("EURUSD", at()).await;
        assert_eq!(vote.status, HistoricalStatus::NoData);
        assert!(vote.confidence.abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn pattern_statistics_of_empty_archive() {
        let accessor = HistoricalPatternAccessor::new(
            Arc::new(FixedStore::new(AggregateRow::default())),
            HistoricalConfig::default(),
        );
        let stats = accessor.pattern_statistics("EURUSD").await.unwrap();
        assert_eq!(stats.total(), 0);
    }
}
