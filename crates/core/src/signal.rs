//! Directional signal types shared by the engine and its subscribers.
//!
//! A [`Signal`] is created by the lifecycle manager when a decision passes the
//! quality gate, and is later resolved into an [`Outcome`] against the bar it
//! predicted.

use chrono::{DateTime, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Direction of a prediction or of a technical/historical opinion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Bullish - expect the next bar to close higher
    Up,
    /// Bearish - expect the next bar to close lower
    Down,
    /// No directional bias
    Neutral,
}

impl Direction {
    /// Returns the opposite direction.
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Up => Self::Down,
            Self::Down => Self::Up,
            Self::Neutral => Self::Neutral,
        }
    }

    /// Returns true if this direction has a directional bias.
    #[must_use]
    pub const fn is_directional(self) -> bool {
        !matches!(self, Self::Neutral)
    }

    /// Returns true when both directions are directional and opposed.
    #[must_use]
    pub fn conflicts_with(self, other: Self) -> bool {
        self.is_directional() && other.is_directional() && self != other
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Up => write!(f, "UP"),
            Self::Down => write!(f, "DOWN"),
            Self::Neutral => write!(f, "NEUTRAL"),
        }
    }
}

/// Identifies the single signal slot of an instrument for one time bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowKey {
    pub instrument: String,
    /// Start of the bucket the evaluated bar falls into
    pub bucket_start: DateTime<Utc>,
}

impl WindowKey {
    /// Floors `timestamp` to a multiple of `window_secs` since the epoch.
    #[must_use]
    pub fn for_timestamp(
        instrument: impl Into<String>,
        timestamp: DateTime<Utc>,
        window_secs: u64,
    ) -> Self {
        let window = i64::try_from(window_secs.max(1)).unwrap_or(i64::MAX);
        let secs = timestamp.timestamp();
        let floored = secs - secs.rem_euclid(window);
        let bucket_start = Utc.timestamp_opt(floored, 0).single().unwrap_or(timestamp);
        Self {
            instrument: instrument.into(),
            bucket_start,
        }
    }
}

impl fmt::Display for WindowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{:02}:{:02}",
            self.instrument,
            self.bucket_start.hour(),
            self.bucket_start.minute()
        )
    }
}

/// Lifecycle state of a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalState {
    /// Emitted, waiting for the target bar
    Pending,
    /// Target bar observed
    Resolved { correct: bool },
    /// No target bar within tolerance; no outcome emitted
    Expired,
}

impl SignalState {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// An accepted, emitted prediction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub id: Uuid,
    pub instrument: String,
    pub direction: Direction,
    /// Confidence in [0, 100]
    pub confidence: f64,
    /// Quality score in [0, 100]
    pub quality_score: f64,
    /// Timestamp of the bar the evaluation ran on
    pub generated_at: DateTime<Utc>,
    /// Open time of the bar this signal predicts
    pub target_timestamp: DateTime<Utc>,
    pub window_key: WindowKey,
    pub state: SignalState,
    /// Human-readable summary of the contributing factors
    #[serde(default)]
    pub reasoning: String,
}

/// Result of comparing a signal against its realized bar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outcome {
    pub signal_id: Uuid,
    pub instrument: String,
    pub predicted: Direction,
    pub actual_direction: Direction,
    pub correct: bool,
    pub confidence: f64,
    pub target_timestamp: DateTime<Utc>,
}

/// Event published to signal sinks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EngineEvent {
    Signal(Signal),
    Outcome(Outcome),
}

impl EngineEvent {
    #[must_use]
    pub fn instrument(&self) -> &str {
        match self {
            Self::Signal(s) => &s.instrument,
            Self::Outcome(o) => &o.instrument,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_opposite() {
        assert_eq!(Direction::Up.opposite(), Direction::Down);
        assert_eq!(Direction::Down.opposite(), Direction::Up);
        assert_eq!(Direction::Neutral.opposite(), Direction::Neutral);
    }

    #[test]
    fn direction_conflicts_only_when_both_directional() {
        assert!(Direction::Up.conflicts_with(Direction::Down));
        assert!(!Direction::Up.conflicts_with(Direction::Neutral));
        assert!(!Direction::Neutral.conflicts_with(Direction::Down));
        assert!(!Direction::Up.conflicts_with(Direction::Up));
    }

    #[test]
    fn direction_serializes_to_json() {
        let json = serde_json::to_string(&Direction::Up).unwrap();
        assert_eq!(json, "\"Up\"");
        let dir: Direction = serde_json::from_str("\"Down\"").unwrap();
        assert_eq!(dir, Direction::Down);
    }

    #[test]
    fn window_key_floors_to_bucket() {
        let a = Utc.with_ymd_and_hms(2024, 3, 4, 14, 30, 5).unwrap();
        let b = Utc.with_ymd_and_hms(2024, 3, 4, 14, 30, 59).unwrap();
        let c = Utc.with_ymd_and_hms(2024, 3, 4, 14, 31, 0).unwrap();

        let ka = WindowKey::for_timestamp("EURUSD", a, 60);
        let kb = WindowKey::for_timestamp("EURUSD", b, 60);
        let kc = WindowKey::for_timestamp("EURUSD", c, 60);

        assert_eq!(ka, kb);
        assert_ne!(ka, kc);
        assert_eq!(ka.to_string(), "EURUSD@14:30");
    }

    #[test]
    fn window_key_differs_per_instrument() {
        let t = Utc.with_ymd_and_hms(2024, 3, 4, 14, 30, 0).unwrap();
        assert_ne!(
            WindowKey::for_timestamp("EURUSD", t, 60),
            WindowKey::for_timestamp("GBPUSD", t, 60)
        );
    }

    #[test]
    fn terminal_states() {
        assert!(!SignalState::Pending.is_terminal());
        assert!(SignalState::Expired.is_terminal());
        assert!(SignalState::Resolved { correct: true }.is_terminal());
    }
}
