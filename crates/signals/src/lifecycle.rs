//! Signal lifecycle: dedupe, cooldown, resolution and purge.
//!
//! One [`SignalLifecycle`] exists per instrument and is only touched under
//! that instrument's lock. Guards and resolution run on bar timestamps so a
//! replay behaves like a live feed. Each tracked signal owns two timer
//! tasks (resolution deadline and retention purge) that report back through
//! a channel; dropping the tracked signal aborts them.

use bar_signal_core::{Bar, LifecycleConfig, Outcome, Signal, SignalState, WindowKey};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::fusion::Decision;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// No target bar arrived within tolerance
    Resolution,
    /// Retention horizon reached
    Purge,
}

/// Message sent by a timer task when it fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerFired {
    pub key: WindowKey,
    pub signal_id: Uuid,
    pub kind: TimerKind,
}

/// Why a decision was or was not turned into a signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    /// A signal already exists for this or a later window key
    Duplicate,
    CoolingDown { until: DateTime<Utc> },
}

/// State change worth reporting to stats and sinks.
#[derive(Debug, Clone)]
pub enum LifecycleUpdate {
    Resolved(Outcome),
    Expired(Signal),
}

struct TrackedSignal {
    signal: Signal,
    timers: Vec<JoinHandle<()>>,
}

impl TrackedSignal {
    fn cancel_timer(&mut self, idx: usize) {
        if let Some(timer) = self.timers.get(idx) {
            timer.abort();
        }
    }
}

impl Drop for TrackedSignal {
    fn drop(&mut self) {
        for timer in &self.timers {
            timer.abort();
        }
    }
}

const RESOLUTION_TIMER: usize = 0;

pub struct SignalLifecycle {
    instrument: String,
    config: LifecycleConfig,
    tracked: HashMap<WindowKey, TrackedSignal>,
    /// Newest window key that produced a signal
    last_emitted: Option<DateTime<Utc>>,
    cooldown_until: Option<DateTime<Utc>>,
    timer_tx: mpsc::UnboundedSender<TimerFired>,
}

fn secs(value: u64) -> ChronoDuration {
    ChronoDuration::seconds(i64::try_from(value).unwrap_or(i64::MAX / 1_000))
}

impl SignalLifecycle {
    #[must_use]
    pub fn new(
        instrument: impl Into<String>,
        config: LifecycleConfig,
        timer_tx: mpsc::UnboundedSender<TimerFired>,
    ) -> Self {
        Self {
            instrument: instrument.into(),
            config,
            tracked: HashMap::new(),
            last_emitted: None,
            cooldown_until: None,
            timer_tx,
        }
    }

    #[must_use]
    pub fn window_key(&self, at: DateTime<Utc>) -> WindowKey {
        WindowKey::for_timestamp(self.instrument.clone(), at, self.config.window_secs)
    }

    /// Idle -> Pending guard for a decision evaluated at bar time `at`.
    #[must_use]
    pub fn admission(&self, key: &WindowKey, at: DateTime<Utc>) -> Admission {
        let already_emitted = self
            .last_emitted
            .is_some_and(|last| key.bucket_start <= last);
        if already_emitted || self.tracked.contains_key(key) {
            return Admission::Duplicate;
        }
        match self.cooldown_until {
            Some(until) if at < until => Admission::CoolingDown { until },
            _ => Admission::Admitted,
        }
    }

    #[must_use]
    pub fn is_cooling_down(&self, at: DateTime<Utc>) -> bool {
        self.cooldown_until.is_some_and(|until| at < until)
    }

    /// Creates a Pending signal when the guard allows it.
    ///
    /// Stamps the cooldown and starts the resolution and purge timers.
    pub fn admit(&mut self, decision: &Decision, generated_at: DateTime<Utc>) -> Option<Signal> {
        let key = self.window_key(generated_at);
        if self.admission(&key, generated_at) != Admission::Admitted {
            return None;
        }

        let signal = Signal {
            id: Uuid::new_v4(),
            instrument: self.instrument.clone(),
            direction: decision.direction,
            confidence: decision.confidence,
            quality_score: decision.quality_score,
            generated_at,
            target_timestamp: generated_at + secs(self.config.window_secs),
            window_key: key.clone(),
            state: SignalState::Pending,
            reasoning: decision.reasoning.clone(),
        };

        let timers = vec![
            self.spawn_timer(&key, signal.id, TimerKind::Resolution, self.config.resolution_timeout()),
            self.spawn_timer(&key, signal.id, TimerKind::Purge, self.config.retention()),
        ];

        self.last_emitted = Some(key.bucket_start);
        self.cooldown_until = Some(generated_at + secs(self.config.cooldown_secs));
        self.tracked.insert(
            key,
            TrackedSignal {
                signal: signal.clone(),
                timers,
            },
        );
        Some(signal)
    }

    fn spawn_timer(
        &self,
        key: &WindowKey,
        signal_id: Uuid,
        kind: TimerKind,
        after: Duration,
    ) -> JoinHandle<()> {
        let tx = self.timer_tx.clone();
        let fired = TimerFired {
            key: key.clone(),
            signal_id,
            kind,
        };
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            // receiver gone means the engine is shutting down
            let _ = tx.send(fired);
        })
    }

    /// Resolves or expires pending signals against a newly ingested bar and
    /// purges entries past retention.
    pub fn on_bar(&mut self, bar: &Bar) -> Vec<LifecycleUpdate> {
        let tolerance = secs(self.config.resolution_tolerance_secs);
        let mut updates = Vec::new();

        for tracked in self.tracked.values_mut() {
            if tracked.signal.state != SignalState::Pending {
                continue;
            }
            let target = tracked.signal.target_timestamp;
            if bar.timestamp < target - tolerance {
                continue;
            }
            tracked.cancel_timer(RESOLUTION_TIMER);

            if bar.timestamp <= target + tolerance {
                let actual = bar.realized_direction();
                let correct = actual == tracked.signal.direction;
                tracked.signal.state = SignalState::Resolved { correct };
                updates.push(LifecycleUpdate::Resolved(Outcome {
                    signal_id: tracked.signal.id,
                    instrument: tracked.signal.instrument.clone(),
                    predicted: tracked.signal.direction,
                    actual_direction: actual,
                    correct,
                    confidence: tracked.signal.confidence,
                    target_timestamp: tracked.signal.target_timestamp,
                }));
            } else {
                tracked.signal.state = SignalState::Expired;
                updates.push(LifecycleUpdate::Expired(tracked.signal.clone()));
            }
        }

        let retention = secs(self.config.retention_secs);
        self.tracked
            .retain(|_, t| bar.timestamp < t.signal.generated_at + retention);

        updates
    }

    /// Applies a fired timer. Stale timers (already purged or replaced) are ignored.
    pub fn on_timer(&mut self, fired: &TimerFired) -> Option<LifecycleUpdate> {
        let tracked = self.tracked.get_mut(&fired.key)?;
        if tracked.signal.id != fired.signal_id {
            return None;
        }

        let was_pending = tracked.signal.state == SignalState::Pending;
        if was_pending {
            tracked.signal.state = SignalState::Expired;
        }
        let expired = was_pending.then(|| LifecycleUpdate::Expired(tracked.signal.clone()));

        if fired.kind == TimerKind::Purge {
            self.tracked.remove(&fired.key);
        }
        expired
    }

    /// Expires every pending signal and drops all tracking, aborting timers.
    pub fn shutdown(&mut self) -> Vec<Signal> {
        self.tracked
            .drain()
            .filter_map(|(_, mut tracked)| {
                (tracked.signal.state == SignalState::Pending).then(|| {
                    tracked.signal.state = SignalState::Expired;
                    tracked.signal.clone()
                })
            })
            .collect()
    }

    pub fn pending(&self) -> impl Iterator<Item = &Signal> {
        self.tracked
            .values()
            .map(|t| &t.signal)
            .filter(|s| s.state == SignalState::Pending)
    }

    #[must_use]
    pub fn tracked_len(&self) -> usize {
        self.tracked.len()
    }

    #[must_use]
    pub fn get(&self, key: &WindowKey) -> Option<&Signal> {
        self.tracked.get(key).map(|t| &t.signal)
    }
}
