//! Decision fusion.
//!
//! Technical windows and the historical vote cast weighted votes; the
//! stronger side wins. Confidence and the hybrid quality score are derived
//! from the same inputs. Every constant comes from [`FusionConfig`].

use bar_signal_core::{Direction, FusionConfig, TieBreak};
use serde::{Deserialize, Serialize};

use crate::historical::{HistoricalStatus, HistoricalVote};
use crate::technical::TechnicalSnapshot;

/// Accumulated vote weight per side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct VoteTally {
    pub up: f64,
    pub down: f64,
    pub neutral: f64,
}

impl VoteTally {
    fn cast(&mut self, direction: Direction, weight: f64) {
        match direction {
            Direction::Up => self.up += weight,
            Direction::Down => self.down += weight,
            Direction::Neutral => self.neutral += weight,
        }
    }

    /// `|up - down|`
    #[must_use]
    pub fn strength(&self) -> f64 {
        (self.up - self.down).abs()
    }
}

/// One fused opinion, before the quality gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub direction: Direction,
    /// 0..=100
    pub confidence: f64,
    /// 0..=100
    pub quality_score: f64,
    pub strength: f64,
    pub votes: VoteTally,
    pub technical_quality: f64,
    pub technical: TechnicalSnapshot,
    pub historical: HistoricalVote,
    /// Anything other than `Available` means technical-only weighting
    pub historical_status: HistoricalStatus,
    pub reasoning: String,
}

impl Decision {
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.historical_status != HistoricalStatus::Available
    }
}

#[derive(Debug, Clone)]
pub struct DecisionFusion {
    config: FusionConfig,
}

impl DecisionFusion {
    #[must_use]
    pub fn new(config: FusionConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    #[must_use]
    pub fn tally(&self, technical: &TechnicalSnapshot, historical: &HistoricalVote) -> VoteTally {
        let c = &self.config;
        let mut votes = VoteTally::default();
        votes.cast(technical.short.direction, c.short_weight);
        votes.cast(technical.medium.direction, c.medium_weight);
        votes.cast(technical.long.direction, c.long_weight);
        votes.cast(historical.direction, c.historical_weight);
        votes
    }

    fn optimal_volatility(&self, volatility: f64) -> bool {
        volatility > self.config.optimal_volatility_min
            && volatility < self.config.optimal_volatility_max
    }

    /// Purely technical quality over four factors, scaled and clamped to 0..=100.
    #[must_use]
    pub fn technical_quality(&self, technical: &TechnicalSnapshot) -> f64 {
        const FACTORS: f64 = 4.0;
        let c = &self.config;
        let mut quality = 0.0;

        let windows = technical.windows();
        let ups = windows.iter().filter(|w| w.direction == Direction::Up).count();
        let downs = windows.iter().filter(|w| w.direction == Direction::Down).count();
        if ups >= 2 || downs >= 2 {
            quality += c.majority_alignment_bonus;
            if ups == 3 || downs == 3 {
                quality += c.full_alignment_bonus;
            }
        }

        let vol = technical.volatility;
        if self.optimal_volatility(vol) {
            quality += c.optimal_volatility_quality;
        } else if vol < c.flat_volatility {
            quality -= c.flat_volatility_penalty;
        } else if vol > c.wild_volatility {
            quality -= c.wild_volatility_penalty;
        }

        if technical.medium.strength > c.strong_trend {
            quality += c.trend_quality_bonus;
        }
        if technical.short.momentum.abs() > c.strong_momentum {
            quality += c.momentum_quality_bonus;
        }

        (quality / FACTORS * 100.0).clamp(0.0, 100.0)
    }

    /// Technical quality blended with historical confidence.
    ///
    /// The historical factor only counts when its confidence is positive;
    /// the sum is divided by the number of contributing factors.
    #[must_use]
    pub fn hybrid_quality(&self, technical: &TechnicalSnapshot, historical: &HistoricalVote) -> f64 {
        let c = &self.config;
        let mut quality = self.technical_quality(technical) * c.technical_quality_weight;
        let mut factors = 1.0;

        if historical.confidence > 0.0 {
            quality += historical.confidence * c.historical_quality_weight;
            factors += 1.0;

            if historical.total_samples > c.rich_history_samples {
                quality += c.rich_history_bonus;
            }
            if (historical.hourly_accuracy - historical.daily_accuracy).abs()
                < c.accuracy_agreement_points
            {
                quality += c.accuracy_agreement_bonus;
            }
        }

        let medium = technical.medium.direction;
        if medium.is_directional() && medium == historical.direction {
            quality += c.alignment_bonus;
        } else if medium.conflicts_with(historical.direction) {
            quality -= c.conflict_penalty;
        }

        (quality / factors).clamp(0.0, 100.0)
    }

    /// Fuses one evaluation. `None` only when votes tie under [`TieBreak::Suppress`].
    #[must_use]
    pub fn fuse(&self, technical: TechnicalSnapshot, historical: HistoricalVote) -> Option<Decision> {
        let c = &self.config;
        let votes = self.tally(&technical, &historical);

        let direction = if votes.up > votes.down {
            Direction::Up
        } else if votes.up < votes.down || c.tie_break == TieBreak::Down {
            Direction::Down
        } else {
            tracing::debug!(up = votes.up, down = votes.down, "Tied votes suppressed");
            return None;
        };
        let strength = votes.strength();

        let technical_quality = self.technical_quality(&technical);
        let quality_score = self.hybrid_quality(&technical, &historical);

        let mut confidence =
            c.base_confidence + strength * c.strength_scale + quality_score / 100.0 * c.quality_scale;
        if self.optimal_volatility(technical.volatility) {
            confidence += c.optimal_volatility_bonus;
        }
        if technical.short.momentum.abs() > c.strong_momentum {
            confidence += c.strong_momentum_bonus;
        }
        if technical.medium.strength > c.strong_trend {
            confidence += c.strong_trend_bonus;
        }
        let confidence = confidence.clamp(c.min_confidence, c.max_confidence);

        let reasoning = reasoning(c, &technical, &historical);
        let historical_status = historical.status;

        Some(Decision {
            direction,
            confidence,
            quality_score,
            strength,
            votes,
            technical_quality,
            technical,
            historical,
            historical_status,
            reasoning,
        })
    }
}

/// Short human-readable list of the factors that shaped a decision.
#[must_use]
pub fn reasoning(
    config: &FusionConfig,
    technical: &TechnicalSnapshot,
    historical: &HistoricalVote,
) -> String {
    let mut reasons = Vec::new();

    let windows = technical.windows();
    let ups = windows.iter().filter(|w| w.direction == Direction::Up).count();
    let downs = windows.iter().filter(|w| w.direction == Direction::Down).count();
    if ups >= 2 {
        reasons.push(format!("{ups}/3 timeframes bullish"));
    } else if downs >= 2 {
        reasons.push(format!("{downs}/3 timeframes bearish"));
    }

    let momentum = technical.short.momentum;
    if momentum.abs() > config.strong_momentum {
        let side = if momentum > 0.0 { "bullish" } else { "bearish" };
        reasons.push(format!("strong {side} momentum"));
    }
    if technical.medium.strength > config.strong_trend {
        reasons.push(format!(
            "solid {} trend",
            technical.medium.direction.to_string().to_lowercase()
        ));
    }
    if technical.volatility > config.optimal_volatility_min
        && technical.volatility < config.optimal_volatility_max
    {
        reasons.push("optimal volatility".to_string());
    }
    if technical.short.pattern.strength > 0.6 {
        reasons.push(format!("{} pattern", technical.short.pattern.kind));
    }
    if historical.direction.is_directional() {
        reasons.push(format!(
            "history {} {:.0}% over {} samples",
            historical.direction.to_string().to_lowercase(),
            historical.weighted_accuracy,
            historical.total_samples
        ));
    } else if historical.status != HistoricalStatus::Available {
        reasons.push(format!("history {}", historical.status));
    }

    reasons.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::technical::{CandlePattern, TimeframeFeatures};

    fn window(direction: Direction, strength: f64, momentum: f64) -> TimeframeFeatures {
        TimeframeFeatures {
            window: 15,
            bars_used: 15,
            direction,
            strength,
            momentum,
            levels: None,
            pattern: CandlePattern::insufficient(),
            confidence: 60.0,
        }
    }

    fn snapshot(short: Direction, medium: Direction, long: Direction, vol: f64) -> TechnicalSnapshot {
        TechnicalSnapshot {
            short: window(short, 0.2, 0.1),
            medium: window(medium, 0.2, 0.1),
            long: window(long, 0.2, 0.1),
            volatility: vol,
        }
    }

    fn historical(direction: Direction, confidence: f64, samples: u64) -> HistoricalVote {
        HistoricalVote {
            direction,
            confidence,
            total_samples: samples,
            hourly_accuracy: 60.0,
            daily_accuracy: 58.0,
            status: HistoricalStatus::Available,
            ..HistoricalVote::neutral(HistoricalStatus::Available)
        }
    }

    // ============================================
    // Voting Tests
    // ============================================

    #[test]
    fn historical_outweighs_short_window() {
        let fusion = DecisionFusion::new(FusionConfig::default());
        let tech = snapshot(Direction::Up, Direction::Neutral, Direction::Neutral, 1.0);
        let decision = fusion
            .fuse(tech, historical(Direction::Down, 40.0, 800))
            .unwrap();
        assert_eq!(decision.direction, Direction::Down);
        assert!((decision.strength - 0.05).abs() < 1e-9);
        assert!((decision.votes.neutral - 0.65).abs() < 1e-9);
    }

    #[test]
    fn tie_resolves_down_by_default() {
        let fusion = DecisionFusion::new(FusionConfig::default());
        let tech = snapshot(Direction::Neutral, Direction::Neutral, Direction::Neutral, 1.0);
        let decision = fusion
            .fuse(tech, HistoricalVote::neutral(HistoricalStatus::NoData))
            .unwrap();
        assert_eq!(decision.direction, Direction::Down);
        assert!(decision.strength.abs() < f64::EPSILON);
        assert!(decision.is_degraded());
    }

    #[test]
    fn tie_suppressed_when_configured() {
        let config = FusionConfig {
            tie_break: TieBreak::Suppress,
            ..FusionConfig::default()
        };
        let fusion = DecisionFusion::new(config);
        let tech = snapshot(Direction::Neutral, Direction::Neutral, Direction::Neutral, 1.0);
        assert!(fusion
            .fuse(tech, HistoricalVote::neutral(HistoricalStatus::NoData))
            .is_none());
    }

    #[test]
    fn unavailable_history_votes_neutral() {
        let fusion = DecisionFusion::new(FusionConfig::default());
        let tech = snapshot(Direction::Up, Direction::Up, Direction::Down, 1.0);
        let decision = fusion
            .fuse(tech, HistoricalVote::neutral(HistoricalStatus::Unavailable))
            .unwrap();
        assert_eq!(decision.direction, Direction::Up);
        assert!((decision.votes.neutral - 0.35).abs() < 1e-9);
        assert_eq!(decision.historical_status, HistoricalStatus::Unavailable);
        assert!(decision.reasoning.contains("history unavailable"));
    }

    // ============================================
    // Quality Tests
    // ============================================

    #[test]
    fn technical_quality_saturates() {
        let fusion = DecisionFusion::new(FusionConfig::default());
        // 30 + 20 + 20 = 70 -> 70 / 4 * 100 -> 100
        let tech = snapshot(Direction::Up, Direction::Up, Direction::Up, 1.0);
        assert!((fusion.technical_quality(&tech) - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn flat_market_has_zero_quality() {
        let fusion = DecisionFusion::new(FusionConfig::default());
        let tech = snapshot(Direction::Up, Direction::Down, Direction::Neutral, 0.1);
        assert!(fusion.technical_quality(&tech).abs() < f64::EPSILON);
    }

    #[test]
    fn hybrid_quality_averages_factors() {
        let fusion = DecisionFusion::new(FusionConfig::default());
        let tech = snapshot(Direction::Up, Direction::Up, Direction::Up, 1.0);
        // (100 * 0.4 + 50 * 0.6 + 5 (agreement) + 15 (aligned)) / 2 = 45
        let quality = fusion.hybrid_quality(&tech, &historical(Direction::Up, 50.0, 800));
        assert!((quality - 45.0).abs() < 1e-9);
    }

    #[test]
    fn hybrid_quality_penalises_conflict() {
        let fusion = DecisionFusion::new(FusionConfig::default());
        let tech = snapshot(Direction::Up, Direction::Up, Direction::Up, 1.0);
        // (40 + 30 + 10 (rich) + 5 - 10) / 2 = 37.5
        let quality = fusion.hybrid_quality(&tech, &historical(Direction::Down, 50.0, 2000));
        assert!((quality - 37.5).abs() < 1e-9);
    }

    #[test]
    fn technical_only_quality_has_one_factor() {
        let fusion = DecisionFusion::new(FusionConfig::default());
        let tech = snapshot(Direction::Up, Direction::Up, Direction::Up, 1.0);
        let quality =
            fusion.hybrid_quality(&tech, &HistoricalVote::neutral(HistoricalStatus::NoData));
        assert!((quality - 40.0).abs() < 1e-9);
    }

    // ============================================
    // Confidence Tests
    // ============================================

    #[test]
    fn confidence_formula_and_clamp() {
        let fusion = DecisionFusion::new(FusionConfig::default());
        let tech = snapshot(Direction::Up, Direction::Up, Direction::Up, 1.0);
        let decision = fusion
            .fuse(tech.clone(), HistoricalVote::neutral(HistoricalStatus::NoData))
            .unwrap();
        // 50 + 0.95*30 + 0.40*20 + 10 = 96.5 -> 90
        assert!((decision.confidence - 90.0).abs() < f64::EPSILON);

        let weak = snapshot(Direction::Up, Direction::Down, Direction::Neutral, 0.1);
        let decision = fusion
            .fuse(weak, HistoricalVote::neutral(HistoricalStatus::NoData))
            .unwrap();
        // down 0.5 vs up 0.3: 50 + 6 + 0 = 56
        assert_eq!(decision.direction, Direction::Down);
        assert!((decision.confidence - 56.0).abs() < 1e-9);
    }
}
