//! Replay CLI command.
//!
//! Streams a CSV of closed bars through the signal engine against an
//! archive (CSV or PostgreSQL) and reports signals, outcomes and accuracy.

use anyhow::Result;
use bar_signal_core::{Bar, EngineEvent, SignalSink};
use bar_signal_data::CsvStorage;
use bar_signal_signals::{AccuracyStats, BroadcastSink, LogSink, SignalEngine};
use clap::Args;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

use super::{load_config, ArchiveArgs, OutputFormat};

/// Arguments for the replay command.
#[derive(Args, Debug, Clone)]
pub struct ReplayArgs {
    /// CSV file of bars to feed, in arrival order
    #[arg(long)]
    pub bars: String,

    /// Only replay this instrument
    #[arg(long)]
    pub instrument: Option<String>,

    /// Seed each instrument's buffer from the archive before replaying
    #[arg(long)]
    pub warm_up: bool,

    /// Config file path (defaults to config/Config.toml)
    #[arg(short, long)]
    pub config: Option<String>,

    /// Output format: text, json (default: text)
    #[arg(long, default_value = "text")]
    pub format: String,

    #[command(flatten)]
    pub archive: ArchiveArgs,
}

/// Final report of a replay.
#[derive(Debug, Serialize)]
pub struct ReplaySummary {
    pub bars: usize,
    pub instruments: Vec<String>,
    pub stats: AccuracyStats,
    pub win_rate: f64,
    pub wilson_lower: f64,
    pub wilson_upper: f64,
    pub p_value: f64,
}

impl ReplaySummary {
    fn new(bars: usize, instruments: Vec<String>, stats: AccuracyStats) -> Self {
        let validation = stats.validation();
        Self {
            bars,
            instruments,
            stats,
            win_rate: validation.win_rate,
            wilson_lower: validation.wilson_lower,
            wilson_upper: validation.wilson_upper,
            p_value: validation.p_value,
        }
    }

    /// Formats a text summary.
    pub fn to_text(&self) -> String {
        let mut output = String::new();
        let overall = &self.stats.overall;

        output.push('\n');
        output.push_str(&"=".repeat(72));
        output.push_str("\nREPLAY SUMMARY\n");
        output.push_str(&"=".repeat(72));
        output.push('\n');
        output.push_str(&format!(
            "Bars replayed: {}   Instruments: {}\n",
            self.bars,
            self.instruments.len()
        ));
        output.push_str(&format!(
            "Signals: {}   Resolved: {}   Correct: {}   Expired: {}\n",
            overall.emitted, overall.resolved, overall.correct, overall.expired
        ));
        if overall.resolved > 0 {
            output.push_str(&format!(
                "Win rate: {:.1}%   95% CI: [{:.1}%, {:.1}%]   p-value: {:.4}\n",
                self.win_rate * 100.0,
                self.wilson_lower * 100.0,
                self.wilson_upper * 100.0,
                self.p_value
            ));
        }

        output.push_str(&"-".repeat(72));
        output.push('\n');
        output.push_str(&format!(
            "{:<20} {:>10} {:>10} {:>10} {:>10} {:>8}\n",
            "Instrument", "Signals", "Resolved", "Correct", "Expired", "Win %"
        ));
        for (instrument, counts) in &self.stats.by_instrument {
            output.push_str(&format!(
                "{:<20} {:>10} {:>10} {:>10} {:>10} {:>8.1}\n",
                instrument,
                counts.emitted,
                counts.resolved,
                counts.correct,
                counts.expired,
                counts.win_rate_pct()
            ));
        }
        output.push_str(&"=".repeat(72));
        output.push('\n');
        output
    }
}

/// Runs the replay command.
///
/// # Errors
/// Returns an error if the input cannot be read, the archive cannot be
/// opened or the configuration is invalid.
pub async fn run_replay(args: ReplayArgs) -> Result<()> {
    let format = OutputFormat::parse(&args.format)?;
    let config = load_config(args.config.as_deref())?;

    let mut bars = CsvStorage::read_bars(&args.bars)?;
    if let Some(instrument) = &args.instrument {
        bars.retain(|b| &b.instrument == instrument);
    }
    let instruments: Vec<String> = bars
        .iter()
        .map(|b| b.instrument.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    tracing::info!(
        "Replaying {} bars across {} instrument(s) from {}",
        bars.len(),
        instruments.len(),
        args.bars
    );

    let store = args.archive.open(config.historical.bar_interval_secs).await?;
    let sink = Arc::new(BroadcastSink::new(4096));
    let events = sink.subscribe();
    let sinks: Vec<Arc<dyn SignalSink>> = vec![sink, Arc::new(LogSink)];
    let engine = SignalEngine::new(config, store, sinks)?;

    if args.warm_up {
        for instrument in &instruments {
            if let Err(e) = engine.warm_up(instrument).await {
                tracing::warn!("Warm-up failed for {}: {}", instrument, e);
            }
        }
    }

    let printer = tokio::spawn(print_events(events, format));
    let total = bars.len();
    feed(&engine, bars).await;

    engine.shutdown().await;
    let stats = engine.stats().await;
    // dropping the engine closes the broadcast channel and ends the printer
    drop(engine);
    if let Err(e) = printer.await {
        tracing::warn!("Event printer failed: {}", e);
    }

    let summary = ReplaySummary::new(total, instruments, stats);
    match format {
        OutputFormat::Text => print!("{}", summary.to_text()),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
    }
    Ok(())
}

/// Pushes `bars` through the engine's run loop; Ctrl+C stops the replay early.
async fn feed(engine: &Arc<SignalEngine>, bars: Vec<Bar>) {
    let (tx, rx) = mpsc::channel(1024);
    let runner = tokio::spawn({
        let engine = Arc::clone(engine);
        async move { engine.run(rx).await }
    });

    let producer = async move {
        for bar in bars {
            if tx.send(bar).await.is_err() {
                break;
            }
        }
    };

    tokio::select! {
        () = producer => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received Ctrl+C, stopping replay");
            engine.shutdown().await;
        }
    }

    if let Err(e) = runner.await {
        tracing::error!("Engine run loop failed: {}", e);
    }
}

async fn print_events(mut events: broadcast::Receiver<EngineEvent>, format: OutputFormat) {
    loop {
        match events.recv().await {
            Ok(event) => match format {
                OutputFormat::Text => println!("{}", format_event(&event)),
                OutputFormat::Json => match serde_json::to_string(&event) {
                    Ok(line) => println!("{line}"),
                    Err(e) => tracing::warn!("Failed to serialize event: {}", e),
                },
            },
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!("Event printer lagged, {} events skipped", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// One line per event for the text report.
pub fn format_event(event: &EngineEvent) -> String {
    match event {
        EngineEvent::Signal(s) => format!(
            "{} SIGNAL  {:<14} {:<4} conf {:>5.1} quality {:>5.1} -> {}  {}",
            s.generated_at.format("%Y-%m-%d %H:%M:%S"),
            s.instrument,
            s.direction.to_string(),
            s.confidence,
            s.quality_score,
            s.target_timestamp.format("%H:%M:%S"),
            s.reasoning
        ),
        EngineEvent::Outcome(o) => format!(
            "{} OUTCOME {:<14} {:<4} actual {:<4} {}",
            o.target_timestamp.format("%Y-%m-%d %H:%M:%S"),
            o.instrument,
            o.predicted.to_string(),
            o.actual_direction.to_string(),
            if o.correct { "WIN" } else { "LOSS" }
        ),
    }
}
