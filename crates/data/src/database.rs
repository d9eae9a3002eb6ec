use anyhow::{Context, Result};
use bar_signal_core::Bar;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use sqlx::{postgres::PgPoolOptions, PgPool};

pub struct DatabaseClient {
    pool: PgPool,
}

impl DatabaseClient {
    /// Connects to the `PostgreSQL`/TimescaleDB bar archive.
    ///
    /// # Errors
    /// Returns an error if the database connection cannot be established.
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .context("Failed to connect to bar archive")?;
        Ok(Self { pool })
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// One archived bar as stored in the `ohlcv` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OhlcvRecord {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub exchange: String,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

impl OhlcvRecord {
    /// Converts an engine bar into an archive row.
    ///
    /// # Errors
    /// Returns an error if a price cannot be represented as a decimal.
    pub fn from_bar(bar: &Bar, exchange: &str) -> Result<Self> {
        let dec = |value: f64, field: &str| {
            Decimal::from_f64(value)
                .with_context(|| format!("{field} {value} of {} is not representable", bar.instrument))
        };
        Ok(Self {
            timestamp: bar.timestamp,
            symbol: bar.instrument.clone(),
            exchange: exchange.to_string(),
            open: dec(bar.open, "open")?,
            high: dec(bar.high, "high")?,
            low: dec(bar.low, "low")?,
            close: dec(bar.close, "close")?,
            volume: dec(bar.volume, "volume")?,
        })
    }

    /// Converts the row into an engine bar.
    ///
    /// # Errors
    /// Returns an error if a decimal column does not fit in an `f64`.
    pub fn to_bar(&self) -> Result<Bar> {
        let float = |value: Decimal, field: &str| {
            value
                .to_f64()
                .with_context(|| format!("{field} {value} of {} overflows f64", self.symbol))
        };
        Ok(Bar::new(
            self.symbol.clone(),
            self.timestamp,
            float(self.open, "open")?,
            float(self.high, "high")?,
            float(self.low, "low")?,
            float(self.close, "close")?,
            float(self.volume, "volume")?,
        ))
    }
}
