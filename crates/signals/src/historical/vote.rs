//! Folds the three historical aggregates into one directional vote.

use bar_signal_core::{AggregateRow, Direction, HistoricalConfig};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether the historical vote reflects real archive data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HistoricalStatus {
    /// At least one query returned samples
    Available,
    /// The store answered, but had no matching rows
    NoData,
    /// The store failed or timed out
    Unavailable,
}

impl fmt::Display for HistoricalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Available => write!(f, "available"),
            Self::NoData => write!(f, "no_data"),
            Self::Unavailable => write!(f, "unavailable"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalVote {
    pub direction: Direction,
    /// 0..=max_confidence
    pub confidence: f64,
    /// Weighted accuracy after bonuses and robustness, 50 = neutral
    pub weighted_accuracy: f64,
    /// Up ratio percentages; 50 when a query had no samples
    pub hourly_accuracy: f64,
    pub daily_accuracy: f64,
    pub sequence_accuracy: f64,
    pub total_samples: u64,
    pub avg_volatility: f64,
    pub avg_move_strength: f64,
    pub status: HistoricalStatus,
}

impl HistoricalVote {
    #[must_use]
    pub fn neutral(status: HistoricalStatus) -> Self {
        Self {
            direction: Direction::Neutral,
            confidence: 0.0,
            weighted_accuracy: 50.0,
            hourly_accuracy: 50.0,
            daily_accuracy: 50.0,
            sequence_accuracy: 50.0,
            total_samples: 0,
            avg_volatility: 0.0,
            avg_move_strength: 0.0,
            status,
        }
    }

    #[must_use]
    pub fn is_available(&self) -> bool {
        self.status == HistoricalStatus::Available
    }
}

/// Combines hourly, daily and sequence aggregates.
///
/// The weighted accuracy `w` is centred on 50. When its lean `|w - 50|`
/// exceeds `lean_threshold`, the consistency and movement bonuses are added
/// in the direction of the lean and the lean is then scaled by
/// `min(total / min_samples, max_robustness)`.
#[must_use]
pub fn combine(
    config: &HistoricalConfig,
    hourly: &AggregateRow,
    daily: &AggregateRow,
    sequence: &AggregateRow,
) -> HistoricalVote {
    let total_samples = hourly.sample_count + daily.sample_count + sequence.sample_count;
    if total_samples == 0 {
        return HistoricalVote::neutral(HistoricalStatus::NoData);
    }

    let hourly_accuracy = hourly.up_ratio_pct();
    let daily_accuracy = daily.up_ratio_pct();
    let sequence_accuracy = sequence.up_ratio_pct();

    let weighted = config.hourly_weight * hourly_accuracy
        + config.daily_weight * daily_accuracy
        + config.sequence_weight * sequence_accuracy;

    let mut lean = weighted - 50.0;
    if lean.abs() > config.lean_threshold {
        let mut bonus = 0.0;
        if (hourly_accuracy - daily_accuracy).abs() < config.consistency_tolerance {
            bonus += config.consistency_bonus;
        }
        if hourly.avg_move_strength > config.strong_move_pct {
            bonus += config.strong_move_bonus;
        } else if hourly.avg_move_strength > config.moderate_move_pct {
            bonus += config.moderate_move_bonus;
        }

        let robustness =
            (total_samples as f64 / config.min_samples as f64).min(config.max_robustness);
        lean = lean.signum() * (lean.abs() + bonus) * robustness;
    }
    let weighted_accuracy = 50.0 + lean;

    let direction = if weighted_accuracy > config.up_threshold {
        Direction::Up
    } else if weighted_accuracy < config.down_threshold {
        Direction::Down
    } else {
        Direction::Neutral
    };

    let boost = if total_samples > config.large_sample_count {
        config.large_sample_boost
    } else {
        1.0
    };
    let confidence = (lean.abs() * config.confidence_scale * boost).min(config.max_confidence);

    HistoricalVote {
        direction,
        confidence,
        weighted_accuracy,
        hourly_accuracy,
        daily_accuracy,
        sequence_accuracy,
        total_samples,
        avg_volatility: (hourly.avg_volatility + daily.avg_volatility) / 2.0,
        avg_move_strength: hourly.avg_move_strength,
        status: HistoricalStatus::Available,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(samples: u64, ups: u64, move_strength: f64) -> AggregateRow {
        AggregateRow {
            sample_count: samples,
            up_count: ups,
            avg_volatility: 0.0002,
            avg_move_strength: move_strength,
        }
    }

    #[test]
    fn empty_rows_are_no_data() {
        let cfg = HistoricalConfig::default();
        let empty = AggregateRow::default();
        let vote = combine(&cfg, &empty, &empty, &empty);
        assert_eq!(vote.status, HistoricalStatus::NoData);
        assert_eq!(vote.direction, Direction::Neutral);
        assert!(vote.confidence.abs() < f64::EPSILON);
    }

    #[test]
    fn small_lean_skips_bonuses() {
        let cfg = HistoricalConfig::default();
        // 52% everywhere, lean 2 <= 3
        let vote = combine(&cfg, &row(100, 52, 0.9), &row(100, 52, 0.9), &row(100, 52, 0.9));
        assert!((vote.weighted_accuracy - 52.0).abs() < 1e-9);
        assert_eq!(vote.direction, Direction::Neutral);
        assert!((vote.confidence - 3.0).abs() < 1e-9);
    }

    #[test]
    fn bullish_history_with_bonuses_and_robustness() {
        let cfg = HistoricalConfig::default();
        // w = 60, lean 10; consistent (+5); move 0.6 (+3) -> 18; samples 300 -> x3 -> 54
        let vote = combine(&cfg, &row(100, 60, 0.6), &row(100, 60, 0.6), &row(100, 60, 0.6));
        assert!((vote.weighted_accuracy - 104.0).abs() < 1e-9);
        assert_eq!(vote.direction, Direction::Up);
        // 54 * 1.5 = 81
        assert!((vote.confidence - 81.0).abs() < 1e-9);
        assert_eq!(vote.total_samples, 300);
    }

    #[test]
    fn few_samples_shrink_lean() {
        let cfg = HistoricalConfig::default();
        // w = 40, lean -10; hourly 40 vs daily 40 consistent (+5); no move bonus -> -15; 50/100 -> -7.5
        let vote = combine(&cfg, &row(20, 8, 0.0), &row(20, 8, 0.0), &row(10, 4, 0.0));
        assert!((vote.weighted_accuracy - 42.5).abs() < 1e-9);
        assert_eq!(vote.direction, Direction::Down);
        assert!((vote.confidence - 11.25).abs() < 1e-9);
    }

    #[test]
    fn inconsistent_hourly_daily_gets_no_bonus() {
        let cfg = HistoricalConfig::default();
        // hourly 80, daily 40, sequence 50: w = 40 + 12 + 10 = 62
        let vote = combine(&cfg, &row(100, 80, 0.0), &row(100, 40, 0.0), &row(100, 50, 0.0));
        // lean 12, no bonus, x3 = 36
        assert!((vote.weighted_accuracy - 86.0).abs() < 1e-9);
    }

    #[test]
    fn gap_at_tolerance_gets_no_bonus() {
        let cfg = HistoricalConfig::default();
        // hourly 70, daily 50, sequence 50: w = 35 + 15 + 10 = 60, gap exactly 20
        let vote = combine(&cfg, &row(100, 70, 0.0), &row(100, 50, 0.0), &row(100, 50, 0.0));
        // lean 10, no bonus, x3 = 30
        assert!((vote.weighted_accuracy - 80.0).abs() < 1e-9);

        // one point inside the tolerance earns it: w = 59.5, (9.5 + 5) x3
        let vote = combine(&cfg, &row(100, 69, 0.0), &row(100, 50, 0.0), &row(100, 50, 0.0));
        assert!((vote.weighted_accuracy - 93.5).abs() < 1e-9);
    }

    #[test]
    fn volatility_averages_hourly_and_daily() {
        let cfg = HistoricalConfig::default();
        let mut daily = row(100, 60, 0.0);
        daily.avg_volatility = 0.0004;
        let vote = combine(&cfg, &row(100, 60, 0.0), &daily, &row(100, 60, 0.0));
        assert!((vote.avg_volatility - 0.0003).abs() < 1e-12);
    }

    #[test]
    fn confidence_is_capped_and_boosted() {
        let cfg = HistoricalConfig::default();
        let vote = combine(&cfg, &row(600, 480, 0.0), &row(600, 480, 0.0), &row(600, 480, 0.0));
        assert!(vote.total_samples > cfg.large_sample_count);
        assert!((vote.confidence - cfg.max_confidence).abs() < f64::EPSILON);
    }
}
