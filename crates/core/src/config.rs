//! Engine configuration.
//!
//! Every scoring weight, bonus and threshold lives here so tuning never
//! touches control flow. All sections default to the production values and
//! every field may be omitted from the TOML file.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub buffer: BufferConfig,
    pub technical: TechnicalConfig,
    pub historical: HistoricalConfig,
    pub fusion: FusionConfig,
    pub gate: QualityGateConfig,
    pub lifecycle: LifecycleConfig,
}

impl EngineConfig {
    /// Rejects configurations the pipeline cannot run with.
    ///
    /// # Errors
    /// Returns an error naming the first inconsistent value.
    pub fn validate(&self) -> Result<()> {
        let t = &self.technical;
        if t.short_window == 0 || t.medium_window == 0 || t.long_window == 0 {
            bail!("technical windows must be non-zero");
        }
        let longest = t.short_window.max(t.medium_window).max(t.long_window);
        if self.buffer.capacity < longest {
            bail!(
                "buffer capacity {} is shorter than the longest window {}",
                self.buffer.capacity,
                longest
            );
        }
        let l = &self.lifecycle;
        if l.window_secs == 0 {
            bail!("lifecycle.window_secs must be non-zero");
        }
        if l.resolution_tolerance_secs >= l.window_secs {
            bail!(
                "resolution tolerance {}s must be shorter than the {}s window",
                l.resolution_tolerance_secs,
                l.window_secs
            );
        }
        if l.retention_secs < l.resolution_deadline_secs() {
            bail!(
                "retention {}s is shorter than the resolution deadline {}s",
                l.retention_secs,
                l.resolution_deadline_secs()
            );
        }
        let h = &self.historical;
        if h.min_samples == 0 {
            bail!("historical.min_samples must be non-zero");
        }
        if h.down_threshold > h.up_threshold {
            bail!("historical.down_threshold must not exceed up_threshold");
        }
        let g = &self.gate;
        if g.min_volatility > g.max_volatility {
            bail!("gate.min_volatility must not exceed max_volatility");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Maximum bars retained per instrument
    pub capacity: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self { capacity: 160 }
    }
}

/// Window sizes and per-window scoring constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TechnicalConfig {
    pub short_window: usize,
    pub medium_window: usize,
    pub long_window: usize,
    /// Windows with fewer bars report a neutral, zero-confidence result
    pub min_bars: usize,
    /// Bars used for close-to-close volatility
    pub volatility_window: usize,
    /// Volatility is 0 below this many bars
    pub min_volatility_bars: usize,
    /// Trend change (percent) needed for a direction
    pub trend_threshold_pct: f64,
    /// Distance (percent) to support/resistance that counts as "near"
    pub near_level_pct: f64,
    /// Body/range ratio under which a bar is a doji
    pub doji_body_ratio: f64,
    pub base_confidence: f64,
    pub trend_strength_bonus: f64,
    pub strong_trend_bonus: f64,
    pub momentum_alignment_bonus: f64,
    pub near_level_penalty: f64,
    pub pattern_weight: f64,
    pub min_confidence: f64,
    pub max_confidence: f64,
}

impl Default for TechnicalConfig {
    fn default() -> Self {
        Self {
            short_window: 5,
            medium_window: 15,
            long_window: 60,
            min_bars: 5,
            volatility_window: 60,
            min_volatility_bars: 10,
            trend_threshold_pct: 0.1,
            near_level_pct: 0.5,
            doji_body_ratio: 0.1,
            base_confidence: 50.0,
            trend_strength_bonus: 15.0,
            strong_trend_bonus: 10.0,
            momentum_alignment_bonus: 10.0,
            near_level_penalty: 5.0,
            pattern_weight: 20.0,
            min_confidence: 30.0,
            max_confidence: 85.0,
        }
    }
}

/// Historical aggregate queries and the historical vote formula.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoricalConfig {
    /// Spacing of archive bars; the "next bar" is this far after a row
    pub bar_interval_secs: u64,
    /// Hourly pattern minute window (±)
    pub hourly_minute_window: u32,
    /// Sequence pattern minute window (±)
    pub sequence_minute_window: u32,
    pub hourly_weight: f64,
    pub daily_weight: f64,
    pub sequence_weight: f64,
    /// Samples at which the robustness multiplier reaches 1.0
    pub min_samples: u64,
    pub max_robustness: f64,
    /// Minimum |w - 50| before bonuses and robustness apply
    pub lean_threshold: f64,
    /// Hourly/daily gap (points) below which the consistency bonus applies
    pub consistency_tolerance: f64,
    pub consistency_bonus: f64,
    pub strong_move_pct: f64,
    pub strong_move_bonus: f64,
    pub moderate_move_pct: f64,
    pub moderate_move_bonus: f64,
    pub up_threshold: f64,
    pub down_threshold: f64,
    pub confidence_scale: f64,
    pub large_sample_count: u64,
    pub large_sample_boost: f64,
    pub max_confidence: f64,
    pub cache_ttl_secs: u64,
    /// Minutes folded into one cache bucket
    pub cache_minute_bucket: u32,
    pub query_timeout_ms: u64,
    /// Bars scanned by pattern statistics
    pub pattern_lookback_bars: usize,
}

impl HistoricalConfig {
    #[must_use]
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    #[must_use]
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }
}

impl Default for HistoricalConfig {
    fn default() -> Self {
        Self {
            bar_interval_secs: 60,
            hourly_minute_window: 2,
            sequence_minute_window: 5,
            hourly_weight: 0.5,
            daily_weight: 0.3,
            sequence_weight: 0.2,
            min_samples: 100,
            max_robustness: 3.0,
            lean_threshold: 3.0,
            consistency_tolerance: 20.0,
            consistency_bonus: 5.0,
            strong_move_pct: 0.5,
            strong_move_bonus: 3.0,
            moderate_move_pct: 0.3,
            moderate_move_bonus: 2.0,
            up_threshold: 55.0,
            down_threshold: 45.0,
            confidence_scale: 1.5,
            large_sample_count: 1000,
            large_sample_boost: 1.2,
            max_confidence: 85.0,
            cache_ttl_secs: 300,
            cache_minute_bucket: 1,
            query_timeout_ms: 2_000,
            pattern_lookback_bars: 50_000,
        }
    }
}

/// What to do when up and down votes are exactly equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// Resolve to DOWN (strict `up > down` comparison)
    Down,
    /// Produce no decision
    Suppress,
}

/// Vote weights, confidence formula and hybrid quality constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    pub short_weight: f64,
    pub medium_weight: f64,
    pub long_weight: f64,
    pub historical_weight: f64,
    pub tie_break: TieBreak,

    pub base_confidence: f64,
    pub strength_scale: f64,
    pub quality_scale: f64,
    pub min_confidence: f64,
    pub max_confidence: f64,
    pub optimal_volatility_min: f64,
    pub optimal_volatility_max: f64,
    pub optimal_volatility_bonus: f64,
    pub strong_momentum: f64,
    pub strong_momentum_bonus: f64,
    pub strong_trend: f64,
    pub strong_trend_bonus: f64,

    // technical quality
    pub majority_alignment_bonus: f64,
    pub full_alignment_bonus: f64,
    pub optimal_volatility_quality: f64,
    pub flat_volatility: f64,
    pub flat_volatility_penalty: f64,
    pub wild_volatility: f64,
    pub wild_volatility_penalty: f64,
    pub trend_quality_bonus: f64,
    pub momentum_quality_bonus: f64,

    // hybrid quality
    pub technical_quality_weight: f64,
    pub historical_quality_weight: f64,
    pub rich_history_samples: u64,
    pub rich_history_bonus: f64,
    pub accuracy_agreement_points: f64,
    pub accuracy_agreement_bonus: f64,
    pub alignment_bonus: f64,
    pub conflict_penalty: f64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            short_weight: 0.30,
            medium_weight: 0.50,
            long_weight: 0.15,
            historical_weight: 0.35,
            tie_break: TieBreak::Down,

            base_confidence: 50.0,
            strength_scale: 30.0,
            quality_scale: 20.0,
            min_confidence: 35.0,
            max_confidence: 90.0,
            optimal_volatility_min: 0.5,
            optimal_volatility_max: 3.0,
            optimal_volatility_bonus: 10.0,
            strong_momentum: 0.5,
            strong_momentum_bonus: 5.0,
            strong_trend: 1.0,
            strong_trend_bonus: 10.0,

            majority_alignment_bonus: 30.0,
            full_alignment_bonus: 20.0,
            optimal_volatility_quality: 20.0,
            flat_volatility: 0.3,
            flat_volatility_penalty: 15.0,
            wild_volatility: 5.0,
            wild_volatility_penalty: 10.0,
            trend_quality_bonus: 15.0,
            momentum_quality_bonus: 10.0,

            technical_quality_weight: 0.4,
            historical_quality_weight: 0.6,
            rich_history_samples: 1000,
            rich_history_bonus: 10.0,
            accuracy_agreement_points: 10.0,
            accuracy_agreement_bonus: 5.0,
            alignment_bonus: 15.0,
            conflict_penalty: 10.0,
        }
    }
}

/// Admission thresholds applied after fusion.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityGateConfig {
    pub min_quality: f64,
    pub min_confidence: f64,
    /// Used instead of `min_confidence` when history is rich
    pub min_confidence_rich_history: f64,
    pub rich_history_samples: u64,
    pub min_volatility: f64,
    pub max_volatility: f64,
    /// Historical confidence above which remaining filters are skipped
    pub historical_bypass_confidence: f64,
    pub near_level_historical_confidence: f64,
    pub near_level_min_momentum: f64,
}

impl Default for QualityGateConfig {
    fn default() -> Self {
        Self {
            min_quality: 15.0,
            min_confidence: 35.0,
            min_confidence_rich_history: 25.0,
            rich_history_samples: 500,
            min_volatility: 0.05,
            max_volatility: 20.0,
            historical_bypass_confidence: 30.0,
            near_level_historical_confidence: 20.0,
            near_level_min_momentum: 0.5,
        }
    }
}

/// Dedupe, cooldown, resolution and retention timings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Length of one bar / signal window
    pub window_secs: u64,
    pub cooldown_secs: u64,
    /// A bar within this many seconds of the target resolves the signal;
    /// later bars expire it
    pub resolution_tolerance_secs: u64,
    /// Tracking entries are purged this long after creation
    pub retention_secs: u64,
}

impl LifecycleConfig {
    #[must_use]
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    /// Offset from `generated_at` after which a signal can no longer resolve.
    #[must_use]
    pub fn resolution_deadline_secs(&self) -> u64 {
        self.window_secs + self.resolution_tolerance_secs
    }

    #[must_use]
    pub fn resolution_timeout(&self) -> Duration {
        Duration::from_secs(self.resolution_deadline_secs())
    }

    #[must_use]
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            window_secs: 60,
            cooldown_secs: 300,
            resolution_tolerance_secs: 10,
            retention_secs: 120,
        }
    }
}
