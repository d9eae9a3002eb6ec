use crate::bar::Bar;
use crate::pattern::{AggregateRow, PatternQuery};
use crate::signal::EngineEvent;
use anyhow::Result;
use async_trait::async_trait;

/// Read-only query interface over the historical bar archive.
///
/// An empty archive answers with zero-sample rows; `Err` is reserved for
/// genuine store failures.
#[async_trait]
pub trait HistoricalStore: Send + Sync {
    async fn aggregate(&self, instrument: &str, query: PatternQuery) -> Result<AggregateRow>;

    /// The `limit` most recent bars, oldest first.
    async fn recent_bars(&self, instrument: &str, limit: usize) -> Result<Vec<Bar>>;
}

/// Subscriber for emitted signals and outcomes.
///
/// Delivery is fire-and-forget: implementations must not block, and an
/// error only gets logged by the engine.
pub trait SignalSink: Send + Sync {
    fn publish(&self, event: &EngineEvent) -> Result<()>;

    fn name(&self) -> &str;
}
