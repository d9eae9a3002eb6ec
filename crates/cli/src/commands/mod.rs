//! CLI commands for the bar signal engine.

pub mod import;
pub mod patterns;
pub mod replay;

pub use import::{run_import, ImportArgs};
pub use patterns::{run_patterns, PatternsArgs};
pub use replay::{run_replay, ReplayArgs};

use anyhow::{anyhow, Result};
use bar_signal_core::{ConfigLoader, EngineConfig, HistoricalStore};
use bar_signal_data::{CsvStorage, DatabaseClient, InMemoryHistoricalStore, OhlcvRepository};
use clap::Args;
use std::sync::Arc;

/// Where historical bars are read from.
#[derive(Args, Debug, Clone)]
pub struct ArchiveArgs {
    /// CSV file of archived bars (timestamp,symbol,open,high,low,close,volume)
    #[arg(long)]
    pub history: Option<String>,

    /// Database connection URL (uses DATABASE_URL env var if not provided)
    #[arg(long, env = "DATABASE_URL")]
    pub db_url: Option<String>,

    /// Exchange tag of archived rows in the database
    #[arg(long, default_value = "otc")]
    pub exchange: String,
}

impl ArchiveArgs {
    /// Opens the archive. A CSV file wins over the database; with neither,
    /// an empty in-memory archive is used.
    ///
    /// # Errors
    /// Returns an error if the CSV cannot be read or the database is unreachable.
    pub async fn open(&self, bar_interval_secs: u64) -> Result<Arc<dyn HistoricalStore>> {
        if let Some(path) = &self.history {
            let bars = CsvStorage::read_bars(path)?;
            tracing::info!("Loaded {} archived bars from {}", bars.len(), path);
            return Ok(Arc::new(InMemoryHistoricalStore::from_bars(
                bars,
                bar_interval_secs,
            )));
        }

        if let Some(url) = &self.db_url {
            let repo = self.repository(url, bar_interval_secs).await?;
            return Ok(Arc::new(repo));
        }

        tracing::warn!("No archive given; historical votes will report no data");
        Ok(Arc::new(InMemoryHistoricalStore::new(bar_interval_secs)))
    }

    /// # Errors
    /// Returns an error if the database is unreachable.
    pub async fn repository(&self, url: &str, bar_interval_secs: u64) -> Result<OhlcvRepository> {
        let client = DatabaseClient::new(url).await?;
        tracing::info!("Connected to database");
        Ok(OhlcvRepository::new(
            client.pool().clone(),
            self.exchange.clone(),
            bar_interval_secs,
        ))
    }
}

/// Loads the engine configuration from `path`, or from the default location.
///
/// # Errors
/// Returns an error if the file cannot be parsed or fails validation.
pub fn load_config(path: Option<&str>) -> Result<EngineConfig> {
    match path {
        Some(path) => ConfigLoader::load_from(path),
        None => ConfigLoader::load(),
    }
}

/// Output format for command reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    /// Parses an output format from string.
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(anyhow!(
                "Unknown format: '{}'. Valid formats: text, json",
                s
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_format_parse() {
        assert_eq!(OutputFormat::parse("TEXT").unwrap(), OutputFormat::Text);
        assert_eq!(OutputFormat::parse("txt").unwrap(), OutputFormat::Text);
        assert_eq!(OutputFormat::parse("json").unwrap(), OutputFormat::Json);
        assert!(OutputFormat::parse("xml").is_err());
    }

    #[tokio::test]
    async fn archive_without_sources_is_empty() {
        let args = ArchiveArgs {
            history: None,
            db_url: None,
            exchange: "otc".to_string(),
        };
        let store = args.open(60).await.unwrap();
        assert!(store.recent_bars("EURUSD", 10).await.unwrap().is_empty());
    }
}
