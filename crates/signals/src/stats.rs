//! Running accuracy of emitted signals.

use bar_signal_core::{AccuracyValidation, Outcome};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalCounts {
    pub emitted: usize,
    pub resolved: usize,
    pub correct: usize,
    pub expired: usize,
}

impl SignalCounts {
    /// Correct share of resolved signals as a percentage.
    #[must_use]
    pub fn win_rate_pct(&self) -> f64 {
        if self.resolved == 0 {
            0.0
        } else {
            self.correct as f64 / self.resolved as f64 * 100.0
        }
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.emitted.saturating_sub(self.resolved + self.expired)
    }

    #[must_use]
    pub fn validation(&self) -> AccuracyValidation {
        AccuracyValidation::from_counts(self.correct, self.resolved)
    }
}

/// Engine-wide and per-instrument signal counts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccuracyStats {
    pub overall: SignalCounts,
    pub by_instrument: BTreeMap<String, SignalCounts>,
}

impl AccuracyStats {
    fn entry(&mut self, instrument: &str) -> &mut SignalCounts {
        self.by_instrument
            .entry(instrument.to_string())
            .or_default()
    }

    pub fn record_emitted(&mut self, instrument: &str) {
        self.overall.emitted += 1;
        self.entry(instrument).emitted += 1;
    }

    pub fn record_outcome(&mut self, outcome: &Outcome) {
        let correct = usize::from(outcome.correct);
        self.overall.resolved += 1;
        self.overall.correct += correct;
        let counts = self.entry(&outcome.instrument);
        counts.resolved += 1;
        counts.correct += correct;
    }

    pub fn record_expired(&mut self, instrument: &str) {
        self.overall.expired += 1;
        self.entry(instrument).expired += 1;
    }

    #[must_use]
    pub fn instrument(&self, instrument: &str) -> SignalCounts {
        self.by_instrument
            .get(instrument)
            .copied()
            .unwrap_or_default()
    }

    #[must_use]
    pub fn validation(&self) -> AccuracyValidation {
        self.overall.validation()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bar_signal_core::Direction;
    use chrono::Utc;
    use uuid::Uuid;

    fn outcome(instrument: &str, correct: bool) -> Outcome {
        Outcome {
            signal_id: Uuid::new_v4(),
            instrument: instrument.to_string(),
            predicted: Direction::Up,
            actual_direction: if correct { Direction::Up } else { Direction::Down },
            correct,
            confidence: 55.0,
            target_timestamp: Utc::now(),
        }
    }

    #[test]
    fn counts_split_by_instrument() {
        let mut stats = AccuracyStats::default();
        for _ in 0..3 {
            stats.record_emitted("EURUSD");
        }
        stats.record_emitted("GBPUSD");
        stats.record_outcome(&outcome("EURUSD", true));
        stats.record_outcome(&outcome("EURUSD", false));
        stats.record_expired("GBPUSD");

        assert_eq!(stats.overall.emitted, 4);
        assert_eq!(stats.overall.resolved, 2);
        assert_eq!(stats.overall.expired, 1);
        assert_eq!(stats.overall.pending(), 1);

        let eur = stats.instrument("EURUSD");
        assert_eq!(eur.correct, 1);
        assert!((eur.win_rate_pct() - 50.0).abs() < 1e-9);
        assert_eq!(stats.instrument("USDJPY"), SignalCounts::default());
    }

    #[test]
    fn validation_uses_resolved_only() {
        let mut stats = AccuracyStats::default();
        for i in 0..10 {
            stats.record_emitted("EURUSD");
            stats.record_outcome(&outcome("EURUSD", i < 7));
        }
        stats.record_expired("EURUSD");

        let v = stats.validation();
        assert_eq!(v.sample_size, 10);
        assert!((v.win_rate - 0.7).abs() < 1e-9);
        assert!(!v.is_significant());
    }
}
