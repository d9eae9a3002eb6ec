use anyhow::Result;
use bar_signal_core::{EngineEvent, SignalSink};
use tokio::sync::broadcast;

/// Fans events out to any number of subscribers.
///
/// Publishing with no live subscriber is not an error. Slow subscribers
/// lag and lose the oldest events; they never block the engine.
pub struct BroadcastSink {
    tx: broadcast::Sender<EngineEvent>,
}

impl BroadcastSink {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for BroadcastSink {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl SignalSink for BroadcastSink {
    fn publish(&self, event: &EngineEvent) -> Result<()> {
        let _ = self.tx.send(event.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "broadcast"
    }
}

/// Writes every event to the tracing log.
#[derive(Debug, Default)]
pub struct LogSink;

impl SignalSink for LogSink {
    fn publish(&self, event: &EngineEvent) -> Result<()> {
        match event {
            EngineEvent::Signal(s) => tracing::info!(
                instrument = %s.instrument,
                direction = %s.direction,
                confidence = format!("{:.1}", s.confidence),
                quality = format!("{:.1}", s.quality_score),
                target = %s.target_timestamp,
                "SIGNAL {} {}",
                s.window_key,
                s.reasoning
            ),
            EngineEvent::Outcome(o) => tracing::info!(
                instrument = %o.instrument,
                predicted = %o.predicted,
                actual = %o.actual_direction,
                correct = o.correct,
                "OUTCOME {}",
                if o.correct { "WIN" } else { "LOSS" }
            ),
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}
