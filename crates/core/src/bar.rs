//! Price bar (candle) type and its ingestion invariants.

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::BarError;
use crate::signal::Direction;

/// One OHLCV observation for a fixed time window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Instrument identifier (e.g. "EURUSD-OTC")
    pub instrument: String,
    /// Window-aligned open time of the bar
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// Creates a bar without validating it. Use [`Bar::validate`] before ingesting.
    #[must_use]
    pub fn new(
        instrument: impl Into<String>,
        timestamp: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            instrument: instrument.into(),
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Checks the OHLC invariant: `high >= max(open, close)`,
    /// `low <= min(open, close)`, `volume >= 0`, all values finite.
    ///
    /// # Errors
    /// Returns the first violated invariant.
    pub fn validate(&self) -> Result<(), BarError> {
        let values = [self.open, self.high, self.low, self.close, self.volume];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(BarError::NonFinite {
                instrument: self.instrument.clone(),
                timestamp: self.timestamp,
            });
        }
        if self.high < self.open.max(self.close) {
            return Err(BarError::HighBelowBody {
                instrument: self.instrument.clone(),
                timestamp: self.timestamp,
                high: self.high,
            });
        }
        if self.low > self.open.min(self.close) {
            return Err(BarError::LowAboveBody {
                instrument: self.instrument.clone(),
                timestamp: self.timestamp,
                low: self.low,
            });
        }
        if self.volume < 0.0 {
            return Err(BarError::NegativeVolume {
                instrument: self.instrument.clone(),
                timestamp: self.timestamp,
                volume: self.volume,
            });
        }
        Ok(())
    }

    /// Returns true when the bar closed above its open.
    #[must_use]
    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    /// Realized direction of the bar. A flat bar counts as DOWN.
    #[must_use]
    pub fn realized_direction(&self) -> Direction {
        if self.is_bullish() {
            Direction::Up
        } else {
            Direction::Down
        }
    }

    /// Absolute body size `|close - open|`.
    #[must_use]
    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }

    /// Full high-low range.
    #[must_use]
    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    #[must_use]
    pub fn hour(&self) -> u32 {
        self.timestamp.hour()
    }

    #[must_use]
    pub fn minute(&self) -> u32 {
        self.timestamp.minute()
    }

    /// Day of week, 0 = Sunday.
    #[must_use]
    pub fn weekday(&self) -> u32 {
        self.timestamp.weekday().num_days_from_sunday()
    }
}
