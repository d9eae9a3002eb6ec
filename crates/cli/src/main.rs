use clap::{Parser, Subcommand};

mod commands;

use commands::{ImportArgs, PatternsArgs, ReplayArgs};

#[derive(Parser)]
#[command(name = "bar-signal")]
#[command(about = "Historical pattern and multi-timeframe signal engine for bar feeds", long_about = None)]
struct Cli {
    /// Optional log file path (logs to file instead of stderr)
    #[arg(long, global = true)]
    log_file: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a CSV of bars through the signal engine
    Replay(ReplayArgs),
    /// Backtest the five-bar sequence rule over an archive
    Patterns(PatternsArgs),
    /// Import a CSV of bars into the PostgreSQL archive
    Import(ImportArgs),
    /// Print the effective engine configuration
    Config {
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };
    match &cli.log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            tracing_subscriber::fmt()
                .with_env_filter(filter())
                .with_writer(std::sync::Mutex::new(file))
                .init();
        }
        None => {
            // stdout carries the report, logs go to stderr
            tracing_subscriber::fmt()
                .with_env_filter(filter())
                .with_writer(std::io::stderr)
                .init();
        }
    }

    match cli.command {
        Commands::Replay(args) => {
            commands::run_replay(args).await?;
        }
        Commands::Patterns(args) => {
            commands::run_patterns(args).await?;
        }
        Commands::Import(args) => {
            commands::run_import(args).await?;
        }
        Commands::Config { config } => {
            let config = commands::load_config(Some(config.as_str()))?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
