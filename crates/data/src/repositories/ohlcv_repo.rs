//! OHLCV archive repository.
//!
//! Batch inserts for archiving live bars, recent-bar lookups for warm-up, and
//! the three aggregate pattern queries behind [`HistoricalStore`].

use anyhow::{Context, Result};
use async_trait::async_trait;
use bar_signal_core::{AggregateRow, Bar, HistoricalStore, PatternQuery};
use sqlx::PgPool;

use crate::database::OhlcvRecord;

/// Repository for archived bars of one exchange/feed.
#[derive(Debug, Clone)]
pub struct OhlcvRepository {
    pool: PgPool,
    exchange: String,
    /// Spacing between consecutive archive rows
    bar_interval_secs: u64,
}

/// Raw aggregate tuple: count, ups, avg volatility, avg move strength.
type AggregateTuple = (i64, i64, f64, f64);

impl OhlcvRepository {
    /// Creates a new repository instance.
    #[must_use]
    pub fn new(pool: PgPool, exchange: impl Into<String>, bar_interval_secs: u64) -> Self {
        Self {
            pool,
            exchange: exchange.into(),
            bar_interval_secs,
        }
    }

    #[must_use]
    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    /// Inserts a batch of records inside one transaction.
    ///
    /// Uses ON CONFLICT DO NOTHING so re-archiving a bar is harmless.
    ///
    /// # Returns
    /// The number of records actually inserted (excluding duplicates).
    ///
    /// # Errors
    /// Returns an error if the database transaction fails.
    pub async fn insert_batch(&self, records: &[OhlcvRecord]) -> Result<u64> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;
        let mut inserted = 0u64;

        for record in records {
            let result = sqlx::query(
                r#"
                INSERT INTO ohlcv (timestamp, symbol, exchange, open, high, low, close, volume)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT (timestamp, symbol, exchange) DO NOTHING
                "#,
            )
            .bind(record.timestamp)
            .bind(&record.symbol)
            .bind(&record.exchange)
            .bind(record.open)
            .bind(record.high)
            .bind(record.low)
            .bind(record.close)
            .bind(record.volume)
            .execute(&mut *tx)
            .await
            .context("Failed to insert OHLCV record")?;

            inserted += result.rows_affected();
        }

        tx.commit().await.context("Failed to commit transaction")?;
        Ok(inserted)
    }

    /// Archives engine bars under this repository's exchange.
    ///
    /// # Errors
    /// Returns an error if conversion or the insert fails.
    pub async fn archive_bars(&self, bars: &[Bar]) -> Result<u64> {
        let records = bars
            .iter()
            .map(|bar| OhlcvRecord::from_bar(bar, &self.exchange))
            .collect::<Result<Vec<_>>>()?;
        self.insert_batch(&records).await
    }

    fn interval(&self) -> f64 {
        self.bar_interval_secs as f64
    }

    async fn hourly(&self, symbol: &str, hour: u32, from: u32, to: u32) -> Result<AggregateTuple> {
        sqlx::query_as(
            r#"
            SELECT COUNT(*)::BIGINT,
                   COUNT(*) FILTER (WHERE c2.close > c1.close)::BIGINT,
                   COALESCE(AVG(ABS(c1.close - c1.open)), 0)::DOUBLE PRECISION,
                   COALESCE(AVG(ABS(c2.close - c1.close) / NULLIF(c1.close, 0) * 100), 0)::DOUBLE PRECISION
            FROM ohlcv c1
            JOIN ohlcv c2
              ON c2.symbol = c1.symbol AND c2.exchange = c1.exchange
             AND c2.timestamp = c1.timestamp + make_interval(secs => $3)
            WHERE c1.symbol = $1 AND c1.exchange = $2
              AND EXTRACT(HOUR FROM c1.timestamp AT TIME ZONE 'UTC') = $4
              AND EXTRACT(MINUTE FROM c1.timestamp AT TIME ZONE 'UTC') BETWEEN $5 AND $6
            "#,
        )
        .bind(symbol)
        .bind(&self.exchange)
        .bind(self.interval())
        .bind(i32::try_from(hour)?)
        .bind(i32::try_from(from)?)
        .bind(i32::try_from(to)?)
        .fetch_one(&self.pool)
        .await
        .context("Failed to query hourly pattern")
    }

    async fn daily(&self, symbol: &str, weekday: u32, hour: u32) -> Result<AggregateTuple> {
        sqlx::query_as(
            r#"
            SELECT COUNT(*)::BIGINT,
                   COUNT(*) FILTER (WHERE c2.close > c1.close)::BIGINT,
                   COALESCE(AVG(ABS(c1.close - c1.open)), 0)::DOUBLE PRECISION,
                   COALESCE(AVG(ABS(c2.close - c1.close) / NULLIF(c1.close, 0) * 100), 0)::DOUBLE PRECISION
            FROM ohlcv c1
            JOIN ohlcv c2
              ON c2.symbol = c1.symbol AND c2.exchange = c1.exchange
             AND c2.timestamp = c1.timestamp + make_interval(secs => $3)
            WHERE c1.symbol = $1 AND c1.exchange = $2
              AND EXTRACT(DOW FROM c1.timestamp AT TIME ZONE 'UTC') = $4
              AND EXTRACT(HOUR FROM c1.timestamp AT TIME ZONE 'UTC') = $5
            "#,
        )
        .bind(symbol)
        .bind(&self.exchange)
        .bind(self.interval())
        .bind(i32::try_from(weekday)?)
        .bind(i32::try_from(hour)?)
        .fetch_one(&self.pool)
        .await
        .context("Failed to query daily pattern")
    }

    async fn sequence(
        &self,
        symbol: &str,
        hour: u32,
        from: u32,
        to: u32,
        length: usize,
    ) -> Result<AggregateTuple> {
        let sql = sequence_sql(length);
        sqlx::query_as(&sql)
            .bind(symbol)
            .bind(&self.exchange)
            .bind(self.interval())
            .bind(i32::try_from(hour)?)
            .bind(i32::try_from(from)?)
            .bind(i32::try_from(to)?)
            .fetch_one(&self.pool)
            .await
            .context("Failed to query sequence pattern")
    }
}

/// Builds the self-join for runs of `length + 1` consecutive bars.
///
/// Only the numeric join count is interpolated; all values are bound.
fn sequence_sql(length: usize) -> String {
    let last = length.max(1);
    let mut joins = String::new();
    for k in 1..=last {
        joins.push_str(&format!(
            "JOIN ohlcv s{k} ON s{k}.symbol = s0.symbol AND s{k}.exchange = s0.exchange \
             AND s{k}.timestamp = s0.timestamp + make_interval(secs => $3 * {k})\n"
        ));
    }
    let prev = last - 1;
    format!(
        r#"
        SELECT COUNT(*)::BIGINT,
               COUNT(*) FILTER (WHERE s{last}.close > s{prev}.close)::BIGINT,
               COALESCE(AVG(ABS(s0.close - s0.open)), 0)::DOUBLE PRECISION,
               COALESCE(AVG(ABS(s{last}.close - s{prev}.close) / NULLIF(s{prev}.close, 0) * 100), 0)::DOUBLE PRECISION
        FROM ohlcv s0
        {joins}
        WHERE s0.symbol = $1 AND s0.exchange = $2
          AND EXTRACT(HOUR FROM s0.timestamp AT TIME ZONE 'UTC') = $4
          AND EXTRACT(MINUTE FROM s0.timestamp AT TIME ZONE 'UTC') BETWEEN $5 AND $6
        "#
    )
}

fn to_row((count, ups, volatility, move_strength): AggregateTuple) -> AggregateRow {
    AggregateRow {
        sample_count: u64::try_from(count).unwrap_or(0),
        up_count: u64::try_from(ups).unwrap_or(0),
        avg_volatility: volatility,
        avg_move_strength: move_strength,
    }
}

#[async_trait]
impl HistoricalStore for OhlcvRepository {
    async fn aggregate(&self, instrument: &str, query: PatternQuery) -> Result<AggregateRow> {
        let raw = match query {
            PatternQuery::Hourly {
                hour,
                minute_from,
                minute_to,
            } => self.hourly(instrument, hour, minute_from, minute_to).await?,
            PatternQuery::Daily { weekday, hour } => self.daily(instrument, weekday, hour).await?,
            PatternQuery::Sequence {
                hour,
                minute_from,
                minute_to,
                length,
            } => {
                self.sequence(instrument, hour, minute_from, minute_to, length)
                    .await?
            }
        };
        Ok(to_row(raw))
    }

    async fn recent_bars(&self, instrument: &str, limit: usize) -> Result<Vec<Bar>> {
        let records = sqlx::query_as::<_, OhlcvRecord>(
            r#"
            SELECT timestamp, symbol, exchange, open, high, low, close, volume
            FROM ohlcv
            WHERE symbol = $1 AND exchange = $2
            ORDER BY timestamp DESC
            LIMIT $3
            "#,
        )
        .bind(instrument)
        .bind(&self.exchange)
        .bind(i64::try_from(limit)?)
        .fetch_all(&self.pool)
        .await
        .context("Failed to query recent bars")?;

        records.iter().rev().map(OhlcvRecord::to_bar).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ============================================
    // Sequence SQL Tests
    // ============================================

    #[test]
    fn sequence_sql_joins_each_offset() {
        let sql = sequence_sql(5);
        for k in 1..=5 {
            assert!(sql.contains(&format!("JOIN ohlcv s{k} ")));
            assert!(sql.contains(&format!("$3 * {k})")));
        }
        assert!(!sql.contains("JOIN ohlcv s6 "));
        assert!(sql.contains("s5.close > s4.close"));
    }

    #[test]
    fn sequence_sql_degenerate_length_uses_one_join() {
        let sql = sequence_sql(0);
        assert!(sql.contains("JOIN ohlcv s1 "));
        assert!(sql.contains("s1.close > s0.close"));
    }

    // ============================================
    // Row Conversion Tests
    // ============================================

    #[test]
    fn tuple_maps_to_aggregate_row() {
        let row = to_row((200, 120, 0.0004, 0.03));
        assert_eq!(row.sample_count, 200);
        assert_eq!(row.up_count, 120);
        assert!((row.up_ratio_pct() - 60.0).abs() < 1e-9);
    }

    #[test]
    fn negative_counts_clamp_to_zero() {
        let row = to_row((-1, -1, 0.0, 0.0));
        assert!(row.is_empty());
    }
}
