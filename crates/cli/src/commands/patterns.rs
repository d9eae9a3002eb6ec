//! Pattern statistics CLI command.
//!
//! Runs the five-bar sequence backtest over an instrument's archive and,
//! optionally, shows the historical vote for a given moment.

use anyhow::{Context, Result};
use bar_signal_signals::{HistoricalPatternAccessor, HistoricalVote, PatternStatistics, PatternTally};
use chrono::{DateTime, Utc};
use clap::Args;
use serde::Serialize;

use super::{load_config, ArchiveArgs, OutputFormat};

const WEEKDAYS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

/// Arguments for the patterns command.
#[derive(Args, Debug, Clone)]
pub struct PatternsArgs {
    /// Instrument to analyze
    #[arg(long)]
    pub instrument: String,

    /// Number of most recent archived bars to backtest (default from config)
    #[arg(long)]
    pub limit: Option<usize>,

    /// Also show the historical vote at this time (RFC 3339, e.g. "2025-03-04T14:30:00Z")
    #[arg(long)]
    pub at: Option<String>,

    /// Config file path (defaults to config/Config.toml)
    #[arg(short, long)]
    pub config: Option<String>,

    /// Output format: text, json (default: text)
    #[arg(long, default_value = "text")]
    pub format: String,

    #[command(flatten)]
    pub archive: ArchiveArgs,
}

#[derive(Debug, Serialize)]
struct PatternReport<'a> {
    instrument: &'a str,
    statistics: &'a PatternStatistics,
    wilson_lower: f64,
    wilson_upper: f64,
    p_value: f64,
    vote: Option<&'a HistoricalVote>,
}

/// Runs the patterns command.
///
/// # Errors
/// Returns an error if the archive cannot be opened or queried, or `--at`
/// is not a valid timestamp.
pub async fn run_patterns(args: PatternsArgs) -> Result<()> {
    let format = OutputFormat::parse(&args.format)?;
    let mut config = load_config(args.config.as_deref())?;
    if let Some(limit) = args.limit {
        config.historical.pattern_lookback_bars = limit;
    }
    let at = args.at.as_deref().map(parse_timestamp).transpose()?;

    let store = args.archive.open(config.historical.bar_interval_secs).await?;
    let accessor = HistoricalPatternAccessor::new(store, config.historical);

    let statistics = accessor.pattern_statistics(&args.instrument).await?;
    let vote = match at {
        Some(at) => Some(accessor.query_vote(&args.instrument, at).await?),
        None => None,
    };

    let validation = statistics.validation();
    let report = PatternReport {
        instrument: &args.instrument,
        statistics: &statistics,
        wilson_lower: validation.wilson_lower,
        wilson_upper: validation.wilson_upper,
        p_value: validation.p_value,
        vote: vote.as_ref(),
    };

    match format {
        OutputFormat::Text => print!("{}", format_report(&report)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }
    Ok(())
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("Invalid timestamp '{s}', expected RFC 3339"))
}

fn tally_row(label: &str, tally: &PatternTally) -> String {
    let up_pct = if tally.total == 0 {
        0.0
    } else {
        tally.up as f64 / tally.total as f64 * 100.0
    };
    format!(
        "{:<12} {:>10} {:>10} {:>10.1} {:>10.1}\n",
        label,
        tally.total,
        tally.correct,
        tally.accuracy_pct(),
        up_pct
    )
}

fn section(title: &str) -> String {
    format!(
        "\n{title}\n{:<12} {:>10} {:>10} {:>10} {:>10}\n{}\n",
        "Bucket",
        "Runs",
        "Correct",
        "Acc %",
        "Up %",
        "-".repeat(56)
    )
}

fn format_report(report: &PatternReport<'_>) -> String {
    let stats = report.statistics;
    let mut output = String::new();

    output.push('\n');
    output.push_str(&"=".repeat(56));
    output.push_str(&format!("\nPATTERN STATISTICS: {}\n", report.instrument));
    output.push_str(&"=".repeat(56));
    output.push('\n');
    output.push_str(&format!(
        "Runs: {}   Accuracy: {:.1}%   95% CI: [{:.1}%, {:.1}%]   p-value: {:.4}\n",
        stats.total(),
        stats.accuracy_pct(),
        report.wilson_lower * 100.0,
        report.wilson_upper * 100.0,
        report.p_value
    ));

    output.push_str(&section("By sequence"));
    for (class, tally) in &stats.by_sequence {
        output.push_str(&tally_row(&class.to_string(), tally));
    }

    output.push_str(&section("By hour (UTC)"));
    for (hour, tally) in &stats.by_hour {
        output.push_str(&tally_row(&format!("{hour:02}:00"), tally));
    }

    output.push_str(&section("By weekday"));
    for (weekday, tally) in &stats.by_weekday {
        let label = usize::try_from(*weekday)
            .ok()
            .and_then(|d| WEEKDAYS.get(d))
            .copied()
            .unwrap_or("?");
        output.push_str(&tally_row(label, tally));
    }

    if let Some(vote) = report.vote {
        output.push_str(&format!(
            "\nHistorical vote: {} (confidence {:.1}, weighted {:.1}%, {} samples, {})\n",
            vote.direction,
            vote.confidence,
            vote.weighted_accuracy,
            vote.total_samples,
            vote.status
        ));
        output.push_str(&format!(
            "  hourly {:.1}%   daily {:.1}%   sequence {:.1}%\n",
            vote.hourly_accuracy, vote.daily_accuracy, vote.sequence_accuracy
        ));
    }

    output.push_str(&"=".repeat(56));
    output.push('\n');
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use bar_signal_signals::HistoricalStatus;

    #[test]
    fn parse_timestamp_accepts_rfc3339() {
        let ts = parse_timestamp("2025-03-04T14:30:00Z").unwrap();
        assert_eq!(ts.to_rfc3339(), "2025-03-04T14:30:00+00:00");
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn tally_row_percentages() {
        let tally = PatternTally {
            total: 8,
            correct: 6,
            up: 2,
        };
        let row = tally_row("5green", &tally);
        assert!(row.starts_with("5green"));
        assert!(row.contains("75.0"));
        assert!(row.contains("25.0"));
    }

    #[test]
    fn report_includes_vote_when_present() {
        let stats = PatternStatistics::default();
        let vote = HistoricalVote::neutral(HistoricalStatus::NoData);
        let report = PatternReport {
            instrument: "EURUSD-OTC",
            statistics: &stats,
            wilson_lower: 0.0,
            wilson_upper: 0.0,
            p_value: 1.0,
            vote: Some(&vote),
        };
        let text = format_report(&report);
        assert!(text.contains("PATTERN STATISTICS: EURUSD-OTC"));
        assert!(text.contains("Historical vote: NEUTRAL"));
        assert!(text.contains("no_data"));
    }
}
