pub mod bar;
pub mod config;
pub mod config_loader;
pub mod error;
pub mod pattern;
pub mod signal;
pub mod traits;
pub mod validation;

pub use bar::Bar;
pub use config::{
    BufferConfig, EngineConfig, FusionConfig, HistoricalConfig, LifecycleConfig,
    QualityGateConfig, TechnicalConfig, TieBreak,
};
pub use config_loader::ConfigLoader;
pub use error::{BarError, HistoricalError};
pub use pattern::{AggregateRow, PatternQuery};
pub use signal::{Direction, EngineEvent, Outcome, Signal, SignalState, WindowKey};
pub use traits::{HistoricalStore, SignalSink};
pub use validation::AccuracyValidation;
