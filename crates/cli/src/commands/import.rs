//! Import CLI command.
//!
//! Loads a CSV of bars into the PostgreSQL archive in batches. Rows that
//! already exist are skipped.

use anyhow::{anyhow, Result};
use bar_signal_core::Bar;
use bar_signal_data::CsvStorage;
use clap::Args;

use super::ArchiveArgs;

/// Arguments for the import command.
#[derive(Args, Debug, Clone)]
pub struct ImportArgs {
    /// CSV file of bars (timestamp,symbol,open,high,low,close,volume)
    #[arg(long)]
    pub data: String,

    /// Batch size for database inserts (default: 1000)
    #[arg(long, default_value = "1000")]
    pub batch_size: usize,

    /// Bar length in seconds (default: 60)
    #[arg(long, default_value = "60")]
    pub bar_interval_secs: u64,

    #[command(flatten)]
    pub archive: ArchiveArgs,
}

/// Statistics for the import operation.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImportStats {
    /// Valid bars read from the file
    pub bars_read: u64,
    /// Bars rejected by OHLC validation
    pub invalid_skipped: u64,
    /// Rows newly inserted
    pub inserted: u64,
    /// Rows already present
    pub duplicates_skipped: u64,
}

impl ImportStats {
    /// Formats a summary report.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "Read: {}, Inserted: {}, Duplicates: {}, Invalid: {}",
            self.bars_read, self.inserted, self.duplicates_skipped, self.invalid_skipped
        )
    }
}

/// Splits bars into valid ones and a count of malformed ones.
fn partition_valid(bars: Vec<Bar>) -> (Vec<Bar>, u64) {
    let mut invalid = 0;
    let valid = bars
        .into_iter()
        .filter(|bar| match bar.validate() {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Skipping bar: {}", e);
                invalid += 1;
                false
            }
        })
        .collect();
    (valid, invalid)
}

/// Runs the import command.
///
/// # Errors
/// Returns an error if no database URL is given, the CSV cannot be read or
/// an insert fails.
pub async fn run_import(args: ImportArgs) -> Result<()> {
    let db_url = args
        .archive
        .db_url
        .as_deref()
        .ok_or_else(|| anyhow!("DATABASE_URL must be set via --db-url or DATABASE_URL env var"))?;

    let (bars, invalid_skipped) = partition_valid(CsvStorage::read_bars(&args.data)?);
    let mut stats = ImportStats {
        bars_read: bars.len() as u64,
        invalid_skipped,
        ..ImportStats::default()
    };

    let repo = args
        .archive
        .repository(db_url, args.bar_interval_secs)
        .await?;

    for chunk in bars.chunks(args.batch_size.max(1)) {
        let inserted = repo.archive_bars(chunk).await?;
        stats.inserted += inserted;
        stats.duplicates_skipped += chunk.len() as u64 - inserted;
        tracing::debug!("Inserted {} of {} bars", inserted, chunk.len());
    }

    tracing::info!("Import complete into exchange '{}'", repo.exchange());
    println!("{}", stats.summary());
    Ok(())
}
