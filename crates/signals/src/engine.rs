//! Per-instrument signal pipeline.
//!
//! Bars flow `on_bar -> buffer -> lifecycle resolution -> technical +
//! historical -> fusion -> gate -> lifecycle admission -> sinks`. Every step
//! for one instrument runs under that instrument's mutex, so two evaluations
//! of the same window can never both emit. Instruments do not share locks.

use anyhow::{Context, Result};
use bar_signal_core::{
    Bar, BarError, EngineConfig, EngineEvent, HistoricalError, HistoricalStore, Signal,
    SignalSink,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tokio::task::JoinSet;

use crate::buffer::CandleBuffer;
use crate::fusion::DecisionFusion;
use crate::gate::{GateVerdict, QualityGate};
use crate::historical::HistoricalPatternAccessor;
use crate::lifecycle::{Admission, LifecycleUpdate, SignalLifecycle, TimerFired};
use crate::pattern_stats::PatternStatistics;
use crate::stats::AccuracyStats;
use crate::technical::TechnicalAnalyzer;

struct InstrumentState {
    buffer: CandleBuffer,
    lifecycle: SignalLifecycle,
    /// Timestamp of the last bar the pipeline ran on
    last_evaluated: Option<DateTime<Utc>>,
}

struct InstrumentSlot {
    state: Mutex<InstrumentState>,
}

pub struct SignalEngine {
    config: EngineConfig,
    accessor: HistoricalPatternAccessor,
    analyzer: TechnicalAnalyzer,
    fusion: DecisionFusion,
    gate: QualityGate,
    sinks: Vec<Arc<dyn SignalSink>>,
    instruments: RwLock<HashMap<String, Arc<InstrumentSlot>>>,
    stats: RwLock<AccuracyStats>,
    timer_tx: mpsc::UnboundedSender<TimerFired>,
    accepting: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
}

impl SignalEngine {
    /// Builds the engine and starts its timer dispatch task.
    ///
    /// # Errors
    /// Returns an error if the configuration is inconsistent or no Tokio
    /// runtime is running.
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn HistoricalStore>,
        sinks: Vec<Arc<dyn SignalSink>>,
    ) -> Result<Arc<Self>> {
        config.validate().context("Invalid engine configuration")?;
        let runtime = tokio::runtime::Handle::try_current()
            .context("SignalEngine must be created inside a Tokio runtime")?;

        let (timer_tx, timer_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, _) = watch::channel(false);

        let engine = Arc::new(Self {
            accessor: HistoricalPatternAccessor::new(store, config.historical.clone()),
            analyzer: TechnicalAnalyzer::new(config.technical.clone()),
            fusion: DecisionFusion::new(config.fusion.clone()),
            gate: QualityGate::new(config.gate.clone()),
            config,
            sinks,
            instruments: RwLock::new(HashMap::new()),
            stats: RwLock::new(AccuracyStats::default()),
            timer_tx,
            accepting: AtomicBool::new(true),
            shutdown_tx,
        });

        runtime.spawn(dispatch_timers(Arc::downgrade(&engine), timer_rx));
        Ok(engine)
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn historical(&self) -> &HistoricalPatternAccessor {
        &self.accessor
    }

    async fn slot(&self, instrument: &str) -> Arc<InstrumentSlot> {
        if let Some(slot) = self.instruments.read().await.get(instrument) {
            return Arc::clone(slot);
        }

        let mut instruments = self.instruments.write().await;
        let slot = instruments.entry(instrument.to_string()).or_insert_with(|| {
            tracing::debug!(instrument, "Registering instrument");
            Arc::new(InstrumentSlot {
                state: Mutex::new(InstrumentState {
                    buffer: CandleBuffer::new(instrument, self.config.buffer.capacity),
                    lifecycle: SignalLifecycle::new(
                        instrument,
                        self.config.lifecycle.clone(),
                        self.timer_tx.clone(),
                    ),
                    last_evaluated: None,
                }),
            })
        });
        Arc::clone(slot)
    }

    async fn existing_slot(&self, instrument: &str) -> Option<Arc<InstrumentSlot>> {
        self.instruments.read().await.get(instrument).cloned()
    }

    fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    /// Ingests one closed bar and runs the pipeline on it.
    ///
    /// Returns the emitted signal, if any. A malformed bar is logged, dropped
    /// and returned as the error; the engine keeps running either way.
    ///
    /// # Errors
    /// Returns [`BarError`] when the bar fails validation or ordering.
    pub async fn on_bar(&self, bar: Bar) -> Result<Option<Signal>, BarError> {
        if !self.is_accepting() {
            tracing::debug!(instrument = %bar.instrument, "Engine stopped, bar ignored");
            return Ok(None);
        }

        let slot = self.slot(&bar.instrument).await;
        let mut state = slot.state.lock().await;
        // shutdown may have run while we waited for the lock
        if !self.is_accepting() {
            return Ok(None);
        }

        if let Err(e) = state.buffer.append(bar.clone()) {
            tracing::warn!(instrument = %bar.instrument, "Dropping malformed bar: {e}");
            return Err(e);
        }

        let updates = state.lifecycle.on_bar(&bar);
        self.apply_updates(updates).await;

        Ok(self.evaluate_locked(&mut state, bar.timestamp).await)
    }

    /// Runs the pipeline on the newest buffered bar of `instrument`.
    pub async fn evaluate(&self, instrument: &str) -> Option<Signal> {
        let slot = self.existing_slot(instrument).await?;
        let mut state = slot.state.lock().await;
        if !self.is_accepting() {
            return None;
        }
        let at = state.buffer.last()?.timestamp;
        self.evaluate_locked(&mut state, at).await
    }

    async fn evaluate_locked(&self, state: &mut InstrumentState, at: DateTime<Utc>) -> Option<Signal> {
        let instrument = state.buffer.instrument().to_string();
        let key = state.lifecycle.window_key(at);
        match state.lifecycle.admission(&key, at) {
            Admission::Admitted => {}
            Admission::Duplicate => {
                tracing::trace!(%key, "Signal already exists for window");
                return None;
            }
            Admission::CoolingDown { until } => {
                tracing::trace!(%key, %until, "Instrument cooling down");
                return None;
            }
        }
        state.last_evaluated = Some(at);

        let technical = self
            .analyzer
            .analyze(state.buffer.recent(self.analyzer.lookback()));
        let historical = self.accessor.vote(&instrument, at).await;

        let Some(decision) = self.fusion.fuse(technical, historical) else {
            tracing::debug!(%key, "Vote tie suppressed");
            return None;
        };

        if let GateVerdict::Reject(reason) = self.gate.evaluate(&decision) {
            tracing::debug!(
                %key,
                direction = %decision.direction,
                confidence = decision.confidence,
                quality = decision.quality_score,
                "Decision rejected: {reason}"
            );
            return None;
        }

        let signal = state.lifecycle.admit(&decision, at)?;
        tracing::info!(
            instrument = %signal.instrument,
            direction = %signal.direction,
            confidence = format!("{:.1}", signal.confidence),
            quality = format!("{:.1}", signal.quality_score),
            historical = %decision.historical_status,
            target = %signal.target_timestamp,
            "Signal emitted: {}",
            signal.reasoning
        );

        self.stats.write().await.record_emitted(&instrument);
        self.publish(&EngineEvent::Signal(signal.clone()));
        Some(signal)
    }

    async fn apply_updates(&self, updates: Vec<LifecycleUpdate>) {
        for update in updates {
            match update {
                LifecycleUpdate::Resolved(outcome) => {
                    tracing::info!(
                        instrument = %outcome.instrument,
                        predicted = %outcome.predicted,
                        actual = %outcome.actual_direction,
                        correct = outcome.correct,
                        "Signal resolved"
                    );
                    self.stats.write().await.record_outcome(&outcome);
                    self.publish(&EngineEvent::Outcome(outcome));
                }
                LifecycleUpdate::Expired(signal) => {
                    tracing::info!(
                        instrument = %signal.instrument,
                        key = %signal.window_key,
                        "Signal expired without a resolving bar"
                    );
                    self.stats.write().await.record_expired(&signal.instrument);
                }
            }
        }
    }

    fn publish(&self, event: &EngineEvent) {
        for sink in &self.sinks {
            if let Err(e) = sink.publish(event) {
                tracing::warn!(
                    sink = sink.name(),
                    instrument = event.instrument(),
                    "Failed to deliver event: {e:#}"
                );
            }
        }
    }

    async fn on_timer(&self, fired: TimerFired) {
        let Some(slot) = self.existing_slot(&fired.key.instrument).await else {
            return;
        };
        let update = slot.state.lock().await.lifecycle.on_timer(&fired);
        if let Some(update) = update {
            self.apply_updates(vec![update]).await;
        }
    }

    /// Seeds an empty buffer with the most recent archived bars.
    ///
    /// Returns how many bars were loaded; zero when the buffer already has data.
    ///
    /// # Errors
    /// Returns [`HistoricalError`] when the archive cannot be read.
    pub async fn warm_up(&self, instrument: &str) -> Result<usize, HistoricalError> {
        let slot = self.slot(instrument).await;
        let mut state = slot.state.lock().await;
        if !state.buffer.is_empty() {
            return Ok(0);
        }

        let bars = self
            .accessor
            .recent_bars(instrument, state.buffer.capacity())
            .await?;
        let mut loaded = 0;
        for bar in bars {
            match state.buffer.append(bar) {
                Ok(()) => loaded += 1,
                Err(e) => tracing::debug!(instrument, "Skipping archived bar: {e}"),
            }
        }
        tracing::info!(instrument, loaded, "Buffer warmed up from archive");
        Ok(loaded)
    }

    /// Signals that new rows for `instrument` were committed to the archive.
    pub async fn notify_archive_commit(&self, instrument: &str) {
        self.accessor.invalidate(instrument).await;
    }

    /// # Errors
    /// Returns [`HistoricalError`] when the archive cannot be read.
    pub async fn pattern_statistics(
        &self,
        instrument: &str,
    ) -> Result<Arc<PatternStatistics>, HistoricalError> {
        self.accessor.pattern_statistics(instrument).await
    }

    pub async fn stats(&self) -> AccuracyStats {
        self.stats.read().await.clone()
    }

    pub async fn pending_signals(&self, instrument: &str) -> Vec<Signal> {
        match self.existing_slot(instrument).await {
            Some(slot) => slot.state.lock().await.lifecycle.pending().cloned().collect(),
            None => Vec::new(),
        }
    }

    pub async fn buffered(&self, instrument: &str) -> usize {
        match self.existing_slot(instrument).await {
            Some(slot) => slot.state.lock().await.buffer.len(),
            None => 0,
        }
    }

    pub async fn last_evaluated(&self, instrument: &str) -> Option<DateTime<Utc>> {
        let slot = self.existing_slot(instrument).await?;
        let state = slot.state.lock().await;
        state.last_evaluated
    }

    pub async fn instruments(&self) -> Vec<String> {
        let mut names: Vec<String> = self.instruments.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Consumes bars until the channel closes or [`Self::shutdown`] is called.
    ///
    /// Each instrument gets its own worker so a slow historical query for one
    /// instrument never delays another, while bars of one instrument keep
    /// their arrival order. Worker queues are unbounded: a stalled instrument
    /// backs up only its own queue and intake keeps flowing.
    pub async fn run(self: &Arc<Self>, mut bars: mpsc::Receiver<Bar>) {
        let mut shutdown = self.shutdown_tx.subscribe();
        if *shutdown.borrow_and_update() {
            return;
        }

        let mut workers: HashMap<String, mpsc::UnboundedSender<Bar>> = HashMap::new();
        let mut tasks = JoinSet::new();
        tracing::info!("Signal engine started");

        loop {
            tokio::select! {
                maybe_bar = bars.recv() => {
                    let Some(bar) = maybe_bar else {
                        tracing::info!("Bar feed closed, signal engine draining");
                        break;
                    };
                    let worker = workers.entry(bar.instrument.clone()).or_insert_with(|| {
                        let (tx, rx) = mpsc::unbounded_channel();
                        let engine = Arc::clone(self);
                        tasks.spawn(async move { engine.drain_instrument(rx).await });
                        tx
                    });
                    if let Err(e) = worker.send(bar) {
                        tracing::warn!(instrument = %e.0.instrument, "Instrument worker stopped, bar dropped");
                    }
                }
                _ = shutdown.changed() => {
                    tracing::info!("Shutdown requested, stopping bar intake");
                    break;
                }
            }
        }

        drop(workers);
        while tasks.join_next().await.is_some() {}
    }

    async fn drain_instrument(&self, mut rx: mpsc::UnboundedReceiver<Bar>) {
        while let Some(bar) = rx.recv().await {
            // malformed bars are already logged by on_bar
            let _ = self.on_bar(bar).await;
        }
    }

    /// Stops intake, waits for in-flight evaluations, cancels every timer
    /// and expires all pending signals.
    pub async fn shutdown(&self) {
        self.accepting.store(false, Ordering::Release);
        self.shutdown_tx.send_replace(true);

        let slots: Vec<Arc<InstrumentSlot>> =
            self.instruments.read().await.values().cloned().collect();
        let mut expired = 0;
        for slot in slots {
            let mut state = slot.state.lock().await;
            for signal in state.lifecycle.shutdown() {
                self.stats.write().await.record_expired(&signal.instrument);
                expired += 1;
            }
        }
        tracing::info!(expired, "Signal engine stopped");
    }
}

async fn dispatch_timers(engine: Weak<SignalEngine>, mut rx: mpsc::UnboundedReceiver<TimerFired>) {
    while let Some(fired) = rx.recv().await {
        let Some(engine) = engine.upgrade() else {
            break;
        };
        engine.on_timer(fired).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::BroadcastSink;
    use bar_signal_core::{AggregateRow, PatternQuery, SignalState};
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};

    struct EmptyStore;

    #[async_trait]
    impl HistoricalStore for EmptyStore {
        async fn aggregate(&self, _instrument: &str, _query: PatternQuery) -> Result<AggregateRow> {
            Ok(AggregateRow::default())
        }

        async fn recent_bars(&self, _instrument: &str, _limit: usize) -> Result<Vec<Bar>> {
            Ok(Vec::new())
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 4, 14, 0, 0).unwrap()
    }

    /// Steady uptrend with small pullbacks so windows read as bullish.
    fn uptrend(instrument: &str, n: usize) -> Vec<Bar> {
        (0..n)
            .map(|i| {
                let base = 1.0 + i as f64 * 0.004;
                let (open, close) = if i % 4 == 3 {
                    (base + 0.003, base + 0.0005)
                } else {
                    (base, base + 0.003)
                };
                Bar::new(
                    instrument,
                    t0() + Duration::minutes(i as i64),
                    open,
                    open.max(close) + 0.0004,
                    open.min(close) - 0.0004,
                    close,
                    100.0,
                )
            })
            .collect()
    }

    async fn engine() -> Arc<SignalEngine> {
        SignalEngine::new(EngineConfig::default(), Arc::new(EmptyStore), Vec::new()).unwrap()
    }

    #[tokio::test]
    async fn rejects_invalid_config() {
        let mut config = EngineConfig::default();
        config.lifecycle.window_secs = 0;
        assert!(SignalEngine::new(config, Arc::new(EmptyStore), Vec::new()).is_err());
    }

    #[tokio::test]
    async fn malformed_bar_is_dropped() {
        let engine = engine().await;
        let mut bar = uptrend("EURUSD", 1).remove(0);
        bar.high = bar.close - 0.01;

        assert!(engine.on_bar(bar).await.is_err());
        assert_eq!(engine.buffered("EURUSD").await, 0);
    }

    #[tokio::test]
    async fn uptrend_emits_up_signal_once_per_window() {
        let sink = Arc::new(BroadcastSink::new(64));
        let mut events = sink.subscribe();
        let engine = SignalEngine::new(
            EngineConfig::default(),
            Arc::new(EmptyStore),
            vec![sink.clone() as Arc<dyn SignalSink>],
        )
        .unwrap();

        let mut emitted = Vec::new();
        for bar in uptrend("EURUSD", 30) {
            if let Some(signal) = engine.on_bar(bar).await.unwrap() {
                emitted.push(signal);
            }
        }

        assert!(!emitted.is_empty());
        assert!(emitted.iter().all(|s| s.direction == bar_signal_core::Direction::Up));
        let EngineEvent::Signal(first) = events.recv().await.unwrap() else {
            panic!("expected a signal event");
        };
        assert_eq!(first.id, emitted[0].id);

        // manual evaluation of the same bar is a duplicate
        assert!(engine.evaluate("EURUSD").await.is_none());
        assert_eq!(engine.stats().await.overall.emitted, emitted.len());
    }

    #[tokio::test]
    async fn shutdown_expires_pending_and_stops_intake() {
        let engine = engine().await;
        for bar in uptrend("EURUSD", 30) {
            engine.on_bar(bar).await.unwrap();
        }
        let pending = engine.pending_signals("EURUSD").await;
        assert!(pending.iter().all(|s| s.state == SignalState::Pending));

        engine.shutdown().await;
        assert!(engine.pending_signals("EURUSD").await.is_empty());
        let stats = engine.stats().await;
        assert_eq!(stats.overall.pending(), 0);

        let late = uptrend("EURUSD", 31).pop().unwrap();
        assert!(engine.on_bar(late).await.unwrap().is_none());
    }
}
