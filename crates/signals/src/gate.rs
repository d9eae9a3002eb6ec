//! Quality gate applied to fused decisions.
//!
//! The gate evaluates filters in this order:
//! 1. Minimum quality
//! 2. Minimum confidence (relaxed when history is rich)
//! 3. Volatility band
//! 4. Strong-history bypass (accepts immediately)
//! 5. Directional support from a window or from history
//! 6. Key-level proximity needs historical or momentum backing
//!
//! A rejection means "no signal this round", never an error.

use bar_signal_core::QualityGateConfig;
use std::fmt;

use crate::fusion::Decision;

#[derive(Debug, Clone, PartialEq)]
pub enum GateRejection {
    LowQuality { quality: f64, min: f64 },
    LowConfidence { confidence: f64, min: f64 },
    VolatilityOutOfRange { volatility: f64 },
    NoDirectionalSupport,
    NearLevelUnsupported { momentum: f64 },
}

impl fmt::Display for GateRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LowQuality { quality, min } => write!(f, "quality {quality:.1} < {min:.1}"),
            Self::LowConfidence { confidence, min } => {
                write!(f, "confidence {confidence:.1} < {min:.1}")
            }
            Self::VolatilityOutOfRange { volatility } => {
                write!(f, "volatility {volatility:.3} out of range")
            }
            Self::NoDirectionalSupport => write!(f, "no window or history supports direction"),
            Self::NearLevelUnsupported { momentum } => {
                write!(f, "near key level with weak momentum {momentum:.3}")
            }
        }
    }
}

/// Result of applying the gate to a decision.
#[derive(Debug, Clone, PartialEq)]
pub enum GateVerdict {
    Accept,
    Reject(GateRejection),
}

impl GateVerdict {
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accept)
    }
}

#[derive(Debug, Clone)]
pub struct QualityGate {
    config: QualityGateConfig,
}

impl QualityGate {
    #[must_use]
    pub fn new(config: QualityGateConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &QualityGateConfig {
        &self.config
    }

    /// Confidence floor for a decision backed by `samples` historical rows.
    #[must_use]
    pub fn min_confidence_for(&self, samples: u64) -> f64 {
        if samples > self.config.rich_history_samples {
            self.config.min_confidence_rich_history
        } else {
            self.config.min_confidence
        }
    }

    #[must_use]
    pub fn evaluate(&self, decision: &Decision) -> GateVerdict {
        let c = &self.config;
        let historical = &decision.historical;
        let technical = &decision.technical;

        if decision.quality_score < c.min_quality {
            return GateVerdict::Reject(GateRejection::LowQuality {
                quality: decision.quality_score,
                min: c.min_quality,
            });
        }

        let min_confidence = self.min_confidence_for(historical.total_samples);
        if decision.confidence < min_confidence {
            return GateVerdict::Reject(GateRejection::LowConfidence {
                confidence: decision.confidence,
                min: min_confidence,
            });
        }

        let volatility = technical.volatility;
        if volatility < c.min_volatility || volatility > c.max_volatility {
            return GateVerdict::Reject(GateRejection::VolatilityOutOfRange { volatility });
        }

        if historical.confidence > c.historical_bypass_confidence {
            return GateVerdict::Accept;
        }

        let window_aligned = technical
            .windows()
            .iter()
            .any(|w| w.direction == decision.direction);
        if !window_aligned && !historical.direction.is_directional() {
            return GateVerdict::Reject(GateRejection::NoDirectionalSupport);
        }

        if technical.medium.is_near_level() {
            let momentum = technical.short.momentum;
            let backed = historical.confidence > c.near_level_historical_confidence
                || momentum.abs() >= c.near_level_min_momentum;
            if !backed {
                return GateVerdict::Reject(GateRejection::NearLevelUnsupported { momentum });
            }
        }

        GateVerdict::Accept
    }
}
