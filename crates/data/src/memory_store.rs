//! In-process bar archive.
//!
//! Answers the same aggregate queries as the `PostgreSQL` repository by
//! scanning sorted bars. Used for CSV-backed replays and tests.

use anyhow::Result;
use async_trait::async_trait;
use bar_signal_core::{AggregateRow, Bar, HistoricalStore, PatternQuery};
use chrono::Duration;
use std::collections::HashMap;
use tokio::sync::RwLock;

pub struct InMemoryHistoricalStore {
    bars: RwLock<HashMap<String, Vec<Bar>>>,
    bar_interval: Duration,
}

impl InMemoryHistoricalStore {
    #[must_use]
    pub fn new(bar_interval_secs: u64) -> Self {
        Self {
            bars: RwLock::new(HashMap::new()),
            bar_interval: Duration::seconds(i64::try_from(bar_interval_secs).unwrap_or(60)),
        }
    }

    /// Builds a store pre-loaded with `bars` (any order, any instruments).
    #[must_use]
    pub fn from_bars(bars: Vec<Bar>, bar_interval_secs: u64) -> Self {
        let mut grouped: HashMap<String, Vec<Bar>> = HashMap::new();
        for bar in bars {
            grouped.entry(bar.instrument.clone()).or_default().push(bar);
        }
        for series in grouped.values_mut() {
            series.sort_by_key(|b| b.timestamp);
            series.dedup_by_key(|b| b.timestamp);
        }
        let store = Self::new(bar_interval_secs);
        Self {
            bars: RwLock::new(grouped),
            ..store
        }
    }

    /// Archives bars; an existing bar at the same timestamp is kept.
    ///
    /// Returns the number of newly stored bars.
    pub async fn insert(&self, bars: &[Bar]) -> usize {
        let mut guard = self.bars.write().await;
        let mut inserted = 0;
        for bar in bars {
            let series = guard.entry(bar.instrument.clone()).or_default();
            if let Err(pos) = series.binary_search_by_key(&bar.timestamp, |b| b.timestamp) {
                series.insert(pos, bar.clone());
                inserted += 1;
            }
        }
        inserted
    }

    pub async fn len(&self, instrument: &str) -> usize {
        self.bars.read().await.get(instrument).map_or(0, Vec::len)
    }

    pub async fn is_empty(&self) -> bool {
        self.bars.read().await.values().all(Vec::is_empty)
    }

    pub async fn instruments(&self) -> Vec<String> {
        let mut names: Vec<String> = self.bars.read().await.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Running sums for one aggregate answer.
#[derive(Default)]
struct Tally {
    samples: u64,
    ups: u64,
    volatility_sum: f64,
    move_sum: f64,
    move_samples: u64,
}

impl Tally {
    fn add(&mut self, row: &Bar, prev: &Bar, next: &Bar) {
        self.samples += 1;
        if next.close > prev.close {
            self.ups += 1;
        }
        self.volatility_sum += row.body();
        if prev.close != 0.0 {
            self.move_sum += (next.close - prev.close).abs() / prev.close * 100.0;
            self.move_samples += 1;
        }
    }

    fn finish(self) -> AggregateRow {
        AggregateRow {
            sample_count: self.samples,
            up_count: self.ups,
            avg_volatility: if self.samples == 0 {
                0.0
            } else {
                self.volatility_sum / self.samples as f64
            },
            avg_move_strength: if self.move_samples == 0 {
                0.0
            } else {
                self.move_sum / self.move_samples as f64
            },
        }
    }
}

fn bar_at<'a>(series: &'a [Bar], start: &Bar, offset: Duration) -> Option<&'a Bar> {
    let target = start.timestamp + offset;
    series
        .binary_search_by_key(&target, |b| b.timestamp)
        .ok()
        .map(|pos| &series[pos])
}

fn aggregate_series(series: &[Bar], query: PatternQuery, interval: Duration) -> AggregateRow {
    let mut tally = Tally::default();

    for bar in series {
        match query {
            PatternQuery::Hourly {
                hour,
                minute_from,
                minute_to,
            } => {
                if bar.hour() != hour || !(minute_from..=minute_to).contains(&bar.minute()) {
                    continue;
                }
                if let Some(next) = bar_at(series, bar, interval) {
                    tally.add(bar, bar, next);
                }
            }
            PatternQuery::Daily { weekday, hour } => {
                if bar.weekday() != weekday || bar.hour() != hour {
                    continue;
                }
                if let Some(next) = bar_at(series, bar, interval) {
                    tally.add(bar, bar, next);
                }
            }
            PatternQuery::Sequence {
                hour,
                minute_from,
                minute_to,
                length,
            } => {
                if bar.hour() != hour || !(minute_from..=minute_to).contains(&bar.minute()) {
                    continue;
                }
                let last = i32::try_from(length.max(1)).unwrap_or(i32::MAX);
                let run: Option<Vec<&Bar>> = (1..=last)
                    .map(|k| bar_at(series, bar, interval * k))
                    .collect();
                if let Some(run) = run {
                    let next = run[run.len() - 1];
                    let prev = if run.len() >= 2 { run[run.len() - 2] } else { bar };
                    tally.add(bar, prev, next);
                }
            }
        }
    }

    tally.finish()
}

#[async_trait]
impl HistoricalStore for InMemoryHistoricalStore {
    async fn aggregate(&self, instrument: &str, query: PatternQuery) -> Result<AggregateRow> {
        let guard = self.bars.read().await;
        Ok(guard
            .get(instrument)
            .map(|series| aggregate_series(series, query, self.bar_interval))
            .unwrap_or_default())
    }

    async fn recent_bars(&self, instrument: &str, limit: usize) -> Result<Vec<Bar>> {
        let guard = self.bars.read().await;
        Ok(guard
            .get(instrument)
            .map(|series| series[series.len().saturating_sub(limit)..].to_vec())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    const INSTRUMENT: &str = "EURUSD-OTC";

    /// Consecutive 1-minute bars starting at `start`, one close per bar.
    fn series(start: chrono::DateTime<Utc>, closes: &[f64]) -> Vec<Bar> {
        let mut open = closes[0];
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| {
                let ts = start + Duration::minutes(i as i64);
                let bar = Bar::new(
                    INSTRUMENT,
                    ts,
                    open,
                    open.max(close) + 0.0001,
                    open.min(close) - 0.0001,
                    close,
                    10.0,
                );
                open = close;
                bar
            })
            .collect()
    }

    #[tokio::test]
    async fn empty_store_answers_zero_samples() {
        let store = InMemoryHistoricalStore::new(60);
        let row = store
            .aggregate(INSTRUMENT, PatternQuery::hourly(14, 30, 2))
            .await
            .unwrap();
        assert!(row.is_empty());
        assert!(store.recent_bars(INSTRUMENT, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn hourly_counts_rows_with_successor() {
        // 14:28..14:33, closes rising except the last
        let start = Utc.with_ymd_and_hms(2025, 3, 4, 14, 28, 0).unwrap();
        let bars = series(start, &[1.0, 1.1, 1.2, 1.3, 1.4, 1.35]);
        let store = InMemoryHistoricalStore::from_bars(bars, 60);

        // rows 14:28..14:32 all have successors; 14:32 -> 14:33 is down
        let row = store
            .aggregate(INSTRUMENT, PatternQuery::hourly(14, 30, 2))
            .await
            .unwrap();
        assert_eq!(row.sample_count, 5);
        assert_eq!(row.up_count, 4);
        assert!(row.avg_move_strength > 0.0);
    }

    #[tokio::test]
    async fn gap_breaks_successor() {
        let start = Utc.with_ymd_and_hms(2025, 3, 4, 9, 0, 0).unwrap();
        let mut bars = series(start, &[1.0, 1.1]);
        let mut late = series(start + Duration::minutes(5), &[1.2]);
        bars.append(&mut late);
        let store = InMemoryHistoricalStore::from_bars(bars, 60);

        let row = store
            .aggregate(INSTRUMENT, PatternQuery::hourly(9, 0, 5))
            .await
            .unwrap();
        // only 09:00 -> 09:01 qualifies
        assert_eq!(row.sample_count, 1);
    }

    #[tokio::test]
    async fn daily_filters_weekday_and_hour() {
        // 2025-03-04 is a Tuesday
        let start = Utc.with_ymd_and_hms(2025, 3, 4, 10, 0, 0).unwrap();
        let store = InMemoryHistoricalStore::from_bars(series(start, &[1.0, 0.9, 0.8]), 60);

        let tuesday = store
            .aggregate(INSTRUMENT, PatternQuery::daily(2, 10))
            .await
            .unwrap();
        assert_eq!(tuesday.sample_count, 2);
        assert_eq!(tuesday.up_count, 0);

        let monday = store
            .aggregate(INSTRUMENT, PatternQuery::daily(1, 10))
            .await
            .unwrap();
        assert!(monday.is_empty());
    }

    #[tokio::test]
    async fn sequence_requires_full_run() {
        let start = Utc.with_ymd_and_hms(2025, 3, 4, 14, 30, 0).unwrap();
        // seven bars: runs of six start at 14:30 and 14:31
        let closes = [1.0, 1.1, 1.2, 1.3, 1.4, 1.5, 1.45];
        let store = InMemoryHistoricalStore::from_bars(series(start, &closes), 60);

        let row = store
            .aggregate(INSTRUMENT, PatternQuery::sequence(14, 30, 5, 5))
            .await
            .unwrap();
        assert_eq!(row.sample_count, 2);
        // 14:30 run ends 1.4 -> 1.5 (up), 14:31 run ends 1.5 -> 1.45 (down)
        assert_eq!(row.up_count, 1);
    }

    #[tokio::test]
    async fn insert_keeps_order_and_skips_duplicates() {
        let start = Utc.with_ymd_and_hms(2025, 3, 4, 14, 0, 0).unwrap();
        let bars = series(start, &[1.0, 1.1, 1.2]);
        let store = InMemoryHistoricalStore::new(60);

        assert_eq!(store.insert(&[bars[2].clone(), bars[0].clone()]).await, 2);
        assert_eq!(store.insert(&bars).await, 1);
        assert_eq!(store.len(INSTRUMENT).await, 3);

        let recent = store.recent_bars(INSTRUMENT, 2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert!(recent[0].timestamp < recent[1].timestamp);
        assert_eq!(recent[1].timestamp, bars[2].timestamp);
    }
}
