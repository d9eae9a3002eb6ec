//! Query contract between the engine and the historical archive.

use serde::{Deserialize, Serialize};

/// Filter for one aggregate query over an instrument's archive.
///
/// Minutes are inclusive and already clamped to `0..=59`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PatternQuery {
    /// Rows at `hour` with minute in range that have a successor bar.
    /// "Up" when the successor closes above the row's close.
    Hourly {
        hour: u32,
        minute_from: u32,
        minute_to: u32,
    },
    /// Rows on `weekday` (0 = Sunday) at `hour` that have a successor bar.
    Daily { weekday: u32, hour: u32 },
    /// Runs of `length + 1` consecutive bars starting at `hour` with
    /// minute in range; "up" when the last close exceeds the one before it.
    Sequence {
        hour: u32,
        minute_from: u32,
        minute_to: u32,
        length: usize,
    },
}

impl PatternQuery {
    #[must_use]
    pub fn hourly(hour: u32, minute: u32, window: u32) -> Self {
        let (minute_from, minute_to) = minute_range(minute, window);
        Self::Hourly {
            hour,
            minute_from,
            minute_to,
        }
    }

    #[must_use]
    pub fn daily(weekday: u32, hour: u32) -> Self {
        Self::Daily { weekday, hour }
    }

    #[must_use]
    pub fn sequence(hour: u32, minute: u32, window: u32, length: usize) -> Self {
        let (minute_from, minute_to) = minute_range(minute, window);
        Self::Sequence {
            hour,
            minute_from,
            minute_to,
            length,
        }
    }

    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Hourly { .. } => "hourly",
            Self::Daily { .. } => "daily",
            Self::Sequence { .. } => "sequence",
        }
    }
}

fn minute_range(minute: u32, window: u32) -> (u32, u32) {
    (minute.saturating_sub(window), (minute + window).min(59))
}

/// Aggregate answer for one [`PatternQuery`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateRow {
    pub sample_count: u64,
    pub up_count: u64,
    /// Average `|close - open|` of the matching rows
    pub avg_volatility: f64,
    /// Average `|next.close - close| / close * 100`
    pub avg_move_strength: f64,
}

impl AggregateRow {
    /// Up ratio as a percentage; 50 (neutral) when there are no samples.
    #[must_use]
    pub fn up_ratio_pct(&self) -> f64 {
        if self.sample_count == 0 {
            50.0
        } else {
            self.up_count as f64 / self.sample_count as f64 * 100.0
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sample_count == 0
    }
}
