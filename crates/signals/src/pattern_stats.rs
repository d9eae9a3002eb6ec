//! Sequence backtest over a bar series.
//!
//! Every run of five bars predicts the sixth: UP when more than two of the
//! five are bullish, otherwise DOWN. The realized direction compares the
//! sixth close with the fifth close.

use bar_signal_core::{AccuracyValidation, Bar, Direction};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

const RUN_LENGTH: usize = 5;

/// Classification of a five-bar run by its bullish count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SequenceClass {
    FiveGreen,
    FourGreen,
    ThreeGreen,
    FiveRed,
    FourRed,
    ThreeRed,
    Mixed,
}

impl SequenceClass {
    #[must_use]
    pub fn from_bullish_count(bullish: usize) -> Self {
        match bullish {
            5 => Self::FiveGreen,
            4 => Self::FourGreen,
            3 => Self::ThreeGreen,
            2 => Self::ThreeRed,
            1 => Self::FourRed,
            0 => Self::FiveRed,
            _ => Self::Mixed,
        }
    }
}

impl fmt::Display for SequenceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::FiveGreen => "5green",
            Self::FourGreen => "4green",
            Self::ThreeGreen => "3green",
            Self::FiveRed => "5red",
            Self::FourRed => "4red",
            Self::ThreeRed => "3red",
            Self::Mixed => "mixed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternTally {
    pub total: u64,
    pub correct: u64,
    /// Runs whose realized direction was UP
    pub up: u64,
}

impl PatternTally {
    fn record(&mut self, correct: bool, actual: Direction) {
        self.total += 1;
        if correct {
            self.correct += 1;
        }
        if actual == Direction::Up {
            self.up += 1;
        }
    }

    /// Correct predictions as a percentage; 0 when empty.
    #[must_use]
    pub fn accuracy_pct(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.correct as f64 / self.total as f64 * 100.0
        }
    }
}

/// Accuracy of the majority-of-five rule, overall and by bucket.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatternStatistics {
    pub overall: PatternTally,
    pub by_sequence: BTreeMap<SequenceClass, PatternTally>,
    /// Keyed by the hour of the fifth bar
    pub by_hour: BTreeMap<u32, PatternTally>,
    /// Keyed by the weekday (0 = Sunday) of the fifth bar
    pub by_weekday: BTreeMap<u32, PatternTally>,
}

impl PatternStatistics {
    /// Runs the backtest over `bars` (oldest first).
    #[must_use]
    pub fn from_bars(bars: &[Bar]) -> Self {
        let mut stats = Self::default();
        for window in bars.windows(RUN_LENGTH + 1) {
            let (run, next) = window.split_at(RUN_LENGTH);
            stats.record(run, &next[0]);
        }
        stats
    }

    /// Records the outcome of one five-bar run followed by `next`.
    pub fn record(&mut self, run: &[Bar], next: &Bar) {
        let Some(fifth) = run.last() else {
            return;
        };
        let bullish = run.iter().filter(|b| b.is_bullish()).count();
        let predicted = if bullish > 2 {
            Direction::Up
        } else {
            Direction::Down
        };
        let actual = if next.close > fifth.close {
            Direction::Up
        } else {
            Direction::Down
        };
        let correct = predicted == actual;

        self.overall.record(correct, actual);
        self.by_sequence
            .entry(SequenceClass::from_bullish_count(bullish))
            .or_default()
            .record(correct, actual);
        self.by_hour
            .entry(fifth.hour())
            .or_default()
            .record(correct, actual);
        self.by_weekday
            .entry(fifth.weekday())
            .or_default()
            .record(correct, actual);
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.overall.total
    }

    #[must_use]
    pub fn accuracy_pct(&self) -> f64 {
        self.overall.accuracy_pct()
    }

    /// Significance of the overall accuracy against a coin flip.
    #[must_use]
    pub fn validation(&self) -> AccuracyValidation {
        AccuracyValidation::from_counts(
            usize::try_from(self.overall.correct).unwrap_or(usize::MAX),
            usize::try_from(self.overall.total).unwrap_or(usize::MAX),
        )
    }
}
