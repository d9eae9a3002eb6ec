//! Domain errors callers need to distinguish.
//!
//! Everything else is carried as `anyhow::Error`.

use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

/// A bar that violates the ingestion invariants. Never fatal to the pipeline.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BarError {
    #[error("{instrument} bar at {timestamp} has non-finite values")]
    NonFinite {
        instrument: String,
        timestamp: DateTime<Utc>,
    },

    #[error("{instrument} bar at {timestamp}: high {high} below open/close")]
    HighBelowBody {
        instrument: String,
        timestamp: DateTime<Utc>,
        high: f64,
    },

    #[error("{instrument} bar at {timestamp}: low {low} above open/close")]
    LowAboveBody {
        instrument: String,
        timestamp: DateTime<Utc>,
        low: f64,
    },

    #[error("{instrument} bar at {timestamp}: negative volume {volume}")]
    NegativeVolume {
        instrument: String,
        timestamp: DateTime<Utc>,
        volume: f64,
    },

    /// Timestamp is not strictly after the last buffered bar.
    #[error("{instrument} bar at {timestamp} is not after last bar at {last}")]
    OutOfOrder {
        instrument: String,
        timestamp: DateTime<Utc>,
        last: DateTime<Utc>,
    },

    /// Bar was pushed into a buffer owned by another instrument.
    #[error("bar for {got} pushed into buffer for {expected}")]
    WrongInstrument { expected: String, got: String },
}

/// Failure of the historical store. Distinct from "no rows", which is a valid answer.
#[derive(Debug, Error)]
pub enum HistoricalError {
    #[error("historical query for {instrument} timed out after {timeout:?}")]
    Timeout {
        instrument: String,
        timeout: Duration,
    },

    #[error("historical store error: {0}")]
    Store(#[from] anyhow::Error),
}
