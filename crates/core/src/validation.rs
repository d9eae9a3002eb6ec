//! Statistics for judging resolved-signal accuracy.

use serde::{Deserialize, Serialize};

/// 95% two-sided z-score.
pub const Z_95: f64 = 1.96;

/// Accuracy of a batch of resolved predictions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AccuracyValidation {
    /// Proportion of correct predictions
    pub win_rate: f64,
    pub wilson_lower: f64,
    pub wilson_upper: f64,
    /// Two-tailed p-value against a coin flip
    pub p_value: f64,
    pub sample_size: usize,
}

impl AccuracyValidation {
    #[must_use]
    pub fn from_counts(correct: usize, total: usize) -> Self {
        let win_rate = if total == 0 {
            0.0
        } else {
            correct as f64 / total as f64
        };
        let (wilson_lower, wilson_upper) = wilson_ci(correct, total, Z_95);

        Self {
            win_rate,
            wilson_lower,
            wilson_upper,
            p_value: binomial_test(correct, total, 0.5),
            sample_size: total,
        }
    }

    /// True when the whole interval sits above a coin flip.
    #[must_use]
    pub fn has_positive_edge(&self) -> bool {
        self.wilson_lower > 0.5
    }

    #[must_use]
    pub fn is_significant(&self) -> bool {
        self.p_value < 0.05
    }
}

/// Wilson score interval for a proportion, clamped to `[0, 1]`.
///
/// ```
/// use bar_signal_core::validation::wilson_ci;
///
/// let (lower, upper) = wilson_ci(50, 100, 1.96);
/// assert!(lower > 0.39 && lower < 0.41);
/// assert!(upper > 0.59 && upper < 0.61);
/// ```
#[must_use]
pub fn wilson_ci(successes: usize, n: usize, z: f64) -> (f64, f64) {
    if n == 0 {
        return (0.0, 0.0);
    }

    let n_f = n as f64;
    let p = successes as f64 / n_f;
    let z_sq = z * z;

    let denominator = 1.0 + z_sq / n_f;
    let center = p + z_sq / (2.0 * n_f);
    let spread = z * (p * (1.0 - p) / n_f + z_sq / (4.0 * n_f * n_f)).sqrt();

    (
        ((center - spread) / denominator).max(0.0),
        ((center + spread) / denominator).min(1.0),
    )
}

/// Two-tailed binomial test, normal approximation with continuity correction.
#[must_use]
pub fn binomial_test(successes: usize, n: usize, p0: f64) -> f64 {
    if n == 0 {
        return 1.0;
    }

    let n_f = n as f64;
    let expected = n_f * p0;
    let std_dev = (n_f * p0 * (1.0 - p0)).sqrt();

    if std_dev < f64::EPSILON {
        let degenerate_match =
            (p0 < f64::EPSILON && successes == 0) || (p0 > 1.0 - f64::EPSILON && successes == n);
        return if degenerate_match { 1.0 } else { 0.0 };
    }

    let deviation = (successes as f64 - expected).abs() - 0.5;
    if deviation <= 0.0 {
        return 1.0;
    }

    (2.0 * (1.0 - standard_normal_cdf(deviation / std_dev))).clamp(0.0, 1.0)
}

/// Abramowitz and Stegun 26.2.17.
fn standard_normal_cdf(x: f64) -> f64 {
    if x < 0.0 {
        return 1.0 - standard_normal_cdf(-x);
    }

    const P: f64 = 0.231_641_9;
    const B: [f64; 5] = [
        0.319_381_530,
        -0.356_563_782,
        1.781_477_937,
        -1.821_255_978,
        1.330_274_429,
    ];

    let t = 1.0 / (1.0 + P * x);
    let poly = B.iter().rev().fold(0.0, |acc, b| (acc + b) * t);
    let pdf = (-x * x / 2.0).exp() / (2.0 * std::f64::consts::PI).sqrt();
    1.0 - pdf * poly
}
