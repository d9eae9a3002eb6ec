//! Multi-timeframe technical analysis over the candle buffer.
//!
//! Each window (short/medium/long) is scored independently from the most
//! recent `n` bars. Windows with too few bars report a neutral,
//! zero-confidence result instead of failing.

use bar_signal_core::{Bar, Direction, TechnicalConfig};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which key level, if any, the current close sits near.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NearLevel {
    Resistance,
    Support,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SupportResistance {
    pub resistance: f64,
    pub support: f64,
    /// Percent of the current close
    pub distance_to_resistance: f64,
    /// Percent of the current close
    pub distance_to_support: f64,
    pub near_level: NearLevel,
}

impl SupportResistance {
    #[must_use]
    pub fn is_near(&self) -> bool {
        self.near_level != NearLevel::None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CandlePatternKind {
    StrongBullish,
    Bullish,
    StrongBearish,
    Bearish,
    Indecision,
    Mixed,
    Insufficient,
}

impl CandlePatternKind {
    /// Fixed strength of each classification.
    #[must_use]
    pub const fn strength(self) -> f64 {
        match self {
            Self::StrongBullish | Self::StrongBearish => 0.8,
            Self::Bullish | Self::Bearish => 0.6,
            Self::Indecision => 0.3,
            Self::Mixed | Self::Insufficient => 0.0,
        }
    }
}

impl fmt::Display for CandlePatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::StrongBullish => "strong_bullish",
            Self::Bullish => "bullish",
            Self::StrongBearish => "strong_bearish",
            Self::Bearish => "bearish",
            Self::Indecision => "indecision",
            Self::Mixed => "mixed",
            Self::Insufficient => "insufficient",
        };
        f.write_str(name)
    }
}

/// Shape classification of the last five bars.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CandlePattern {
    pub kind: CandlePatternKind,
    pub strength: f64,
    pub bullish: usize,
    pub bearish: usize,
    pub doji: usize,
}

impl CandlePattern {
    #[must_use]
    pub fn insufficient() -> Self {
        Self {
            kind: CandlePatternKind::Insufficient,
            strength: 0.0,
            bullish: 0,
            bearish: 0,
            doji: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Trend {
    pub direction: Direction,
    /// |change|
    pub strength: f64,
    /// Percent change between the halves' average closes
    pub change: f64,
}

impl Trend {
    #[must_use]
    pub fn neutral() -> Self {
        Self {
            direction: Direction::Neutral,
            strength: 0.0,
            change: 0.0,
        }
    }
}

/// Scored view of one timeframe window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeframeFeatures {
    /// Requested window size in bars
    pub window: usize,
    /// Bars actually available
    pub bars_used: usize,
    pub direction: Direction,
    pub strength: f64,
    /// Percent
    pub momentum: f64,
    pub levels: Option<SupportResistance>,
    pub pattern: CandlePattern,
    pub confidence: f64,
}

impl TimeframeFeatures {
    #[must_use]
    pub fn insufficient(window: usize, bars_used: usize) -> Self {
        Self {
            window,
            bars_used,
            direction: Direction::Neutral,
            strength: 0.0,
            momentum: 0.0,
            levels: None,
            pattern: CandlePattern::insufficient(),
            confidence: 0.0,
        }
    }

    #[must_use]
    pub fn is_near_level(&self) -> bool {
        self.levels.is_some_and(|l| l.is_near())
    }
}

/// Features of all three windows plus buffer volatility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechnicalSnapshot {
    pub short: TimeframeFeatures,
    pub medium: TimeframeFeatures,
    pub long: TimeframeFeatures,
    /// Percent, population std-dev of close-to-close returns
    pub volatility: f64,
}

impl TechnicalSnapshot {
    #[must_use]
    pub fn windows(&self) -> [&TimeframeFeatures; 3] {
        [&self.short, &self.medium, &self.long]
    }
}

fn avg_close(bars: &[Bar]) -> f64 {
    bars.iter().map(|b| b.close).sum::<f64>() / bars.len() as f64
}

fn pct_change(from: f64, to: f64) -> f64 {
    if from == 0.0 {
        0.0
    } else {
        (to - from) / from * 100.0
    }
}

/// Percent change of the last three closes' average over the three before.
#[must_use]
pub fn momentum(bars: &[Bar]) -> f64 {
    if bars.len() < 3 {
        return 0.0;
    }
    let split = bars.len() - 3;
    let recent = avg_close(&bars[split..]);
    let older = &bars[split.saturating_sub(3)..split];
    if older.is_empty() {
        return 0.0;
    }
    pct_change(avg_close(older), recent)
}

/// First-half versus second-half average close.
#[must_use]
pub fn trend(bars: &[Bar], threshold_pct: f64) -> Trend {
    if bars.len() < 5 {
        return Trend::neutral();
    }
    let (first, second) = bars.split_at(bars.len() / 2);
    let change = pct_change(avg_close(first), avg_close(second));
    let direction = if change > threshold_pct {
        Direction::Up
    } else if change < -threshold_pct {
        Direction::Down
    } else {
        Direction::Neutral
    };
    Trend {
        direction,
        strength: change.abs(),
        change,
    }
}

#[must_use]
pub fn support_resistance(bars: &[Bar], near_pct: f64) -> Option<SupportResistance> {
    let current = bars.last()?.close;
    if current == 0.0 {
        return None;
    }
    let resistance = bars.iter().map(|b| b.high).fold(f64::MIN, f64::max);
    let support = bars.iter().map(|b| b.low).fold(f64::MAX, f64::min);
    let distance_to_resistance = (resistance - current) / current * 100.0;
    let distance_to_support = (current - support) / current * 100.0;

    let near_level = if distance_to_resistance < near_pct {
        NearLevel::Resistance
    } else if distance_to_support < near_pct {
        NearLevel::Support
    } else {
        NearLevel::None
    };

    Some(SupportResistance {
        resistance,
        support,
        distance_to_resistance,
        distance_to_support,
        near_level,
    })
}

/// Classifies the last five bars. A zero-range bar is a doji.
#[must_use]
pub fn candle_pattern(bars: &[Bar], doji_body_ratio: f64) -> CandlePattern {
    if bars.len() < 5 {
        return CandlePattern::insufficient();
    }

    let (mut bullish, mut bearish, mut doji) = (0, 0, 0);
    for bar in &bars[bars.len() - 5..] {
        let range = bar.range();
        if range <= 0.0 || bar.body() < range * doji_body_ratio {
            doji += 1;
        } else if bar.is_bullish() {
            bullish += 1;
        } else {
            bearish += 1;
        }
    }

    let kind = if bullish >= 4 {
        CandlePatternKind::StrongBullish
    } else if bearish >= 4 {
        CandlePatternKind::StrongBearish
    } else if bullish >= 3 {
        CandlePatternKind::Bullish
    } else if bearish >= 3 {
        CandlePatternKind::Bearish
    } else if doji >= 2 {
        CandlePatternKind::Indecision
    } else {
        CandlePatternKind::Mixed
    };

    CandlePattern {
        kind,
        strength: kind.strength(),
        bullish,
        bearish,
        doji,
    }
}

/// Population standard deviation of close-to-close returns, in percent.
///
/// Zero when fewer than `min_bars` bars are given.
#[must_use]
pub fn volatility(bars: &[Bar], min_bars: usize) -> f64 {
    if bars.len() < min_bars.max(2) {
        return 0.0;
    }
    let returns: Vec<f64> = bars
        .windows(2)
        .filter(|w| w[0].close != 0.0)
        .map(|w| (w[1].close - w[0].close) / w[0].close)
        .collect();
    if returns.is_empty() {
        return 0.0;
    }
    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    variance.sqrt() * 100.0
}

#[must_use]
pub fn timeframe_confidence(
    config: &TechnicalConfig,
    trend: &Trend,
    momentum: f64,
    levels: Option<&SupportResistance>,
    pattern: &CandlePattern,
) -> f64 {
    let mut confidence = config.base_confidence;

    if trend.strength > 0.5 {
        confidence += config.trend_strength_bonus;
    }
    if trend.strength > 1.0 {
        confidence += config.strong_trend_bonus;
    }
    let momentum_agrees = (trend.direction == Direction::Up && momentum > 0.0)
        || (trend.direction == Direction::Down && momentum < 0.0);
    if momentum_agrees {
        confidence += config.momentum_alignment_bonus;
    }
    if levels.is_some_and(SupportResistance::is_near) {
        confidence -= config.near_level_penalty;
    }
    confidence += pattern.strength * config.pattern_weight;

    confidence.clamp(config.min_confidence, config.max_confidence)
}

/// Scores the most recent `window` bars.
#[must_use]
pub fn analyze_window(bars: &[Bar], window: usize, config: &TechnicalConfig) -> TimeframeFeatures {
    let relevant = &bars[bars.len().saturating_sub(window)..];
    if relevant.len() < config.min_bars {
        return TimeframeFeatures::insufficient(window, relevant.len());
    }

    let momentum = momentum(relevant);
    let trend = trend(relevant, config.trend_threshold_pct);
    let levels = support_resistance(relevant, config.near_level_pct);
    let pattern = candle_pattern(relevant, config.doji_body_ratio);
    let confidence = timeframe_confidence(config, &trend, momentum, levels.as_ref(), &pattern);

    TimeframeFeatures {
        window,
        bars_used: relevant.len(),
        direction: trend.direction,
        strength: trend.strength,
        momentum,
        levels,
        pattern,
        confidence,
    }
}

/// Runs all three windows over an instrument's buffer.
#[derive(Debug, Clone)]
pub struct TechnicalAnalyzer {
    config: TechnicalConfig,
}

impl TechnicalAnalyzer {
    #[must_use]
    pub fn new(config: TechnicalConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &TechnicalConfig {
        &self.config
    }

    /// Bars the analyzer needs to see at most.
    #[must_use]
    pub fn lookback(&self) -> usize {
        let c = &self.config;
        c.short_window
            .max(c.medium_window)
            .max(c.long_window)
            .max(c.volatility_window)
    }

    /// `bars` must be oldest first.
    #[must_use]
    pub fn analyze(&self, bars: &[Bar]) -> TechnicalSnapshot {
        let c = &self.config;
        let vol_bars = &bars[bars.len().saturating_sub(c.volatility_window)..];
        let snapshot = TechnicalSnapshot {
            short: analyze_window(bars, c.short_window, c),
            medium: analyze_window(bars, c.medium_window, c),
            long: analyze_window(bars, c.long_window, c),
            volatility: volatility(vol_bars, c.min_volatility_bars),
        };
        tracing::debug!(
            short = %snapshot.short.direction,
            medium = %snapshot.medium.direction,
            long = %snapshot.long.direction,
            volatility = snapshot.volatility,
            "Technical windows scored"
        );
        snapshot
    }
}
