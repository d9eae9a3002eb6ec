pub mod buffer;
pub mod engine;
pub mod fusion;
pub mod gate;
pub mod historical;
pub mod lifecycle;
pub mod pattern_stats;
pub mod sink;
pub mod stats;
pub mod technical;

// Re-export the pipeline stages for convenience
pub use buffer::CandleBuffer;
pub use fusion::{reasoning, Decision, DecisionFusion, VoteTally};
pub use gate::{GateRejection, GateVerdict, QualityGate};
pub use technical::{
    CandlePattern, CandlePatternKind, NearLevel, SupportResistance, TechnicalAnalyzer,
    TechnicalSnapshot, TimeframeFeatures, Trend,
};

// Re-export historical access
pub use historical::{
    combine, CacheKey, HistoricalPatternAccessor, HistoricalStatus, HistoricalVote, PatternCache,
    SEQUENCE_LENGTH,
};
pub use pattern_stats::{PatternStatistics, PatternTally, SequenceClass};

// Re-export lifecycle and engine
pub use engine::SignalEngine;
pub use lifecycle::{Admission, LifecycleUpdate, SignalLifecycle, TimerFired, TimerKind};
pub use sink::{BroadcastSink, LogSink};
pub use stats::{AccuracyStats, SignalCounts};
