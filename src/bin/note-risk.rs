//! Structured note risk CLI
//!
//! Run with: `cargo run --bin note-risk -- analyze --note note.json`
//!
//! Set RUST_LOG to control log output, e.g. `RUST_LOG=note_risk=debug`.

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use note_risk::{
    AssetKey, DateRange, NoteTerms, PriceHistorySource, RiskAnalysisResult, RiskAnalyzer,
    RiskModelConfig, SqliteDataProvider, YahooFinanceDownloader, KNOWN_UNDERLYINGS,
};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Risk scoring for worst-of structured notes
#[derive(Parser)]
#[command(name = "note-risk")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score a note against historical prices of its basket
    Analyze {
        /// Note terms as JSON
        #[arg(short, long)]
        note: PathBuf,

        /// Model constants as TOML; defaults apply when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Read prices from this SQLite store instead of Yahoo Finance
        #[arg(short, long)]
        database: Option<PathBuf>,

        /// Last day of the lookback window (YYYY-MM-DD), defaults to today
        #[arg(long)]
        as_of: Option<NaiveDate>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Download daily closes from Yahoo Finance into a SQLite store
    Download {
        #[arg(short, long)]
        database: PathBuf,

        /// Comma-separated tickers, e.g. SPY,QQQ
        #[arg(short, long, value_delimiter = ',', required = true)]
        assets: Vec<String>,

        /// First day (YYYY-MM-DD)
        #[arg(long)]
        start: NaiveDate,

        /// Last day (YYYY-MM-DD)
        #[arg(long)]
        end: NaiveDate,
    },

    /// List the reference underlyings
    Underlyings,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false).compact())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze {
            note,
            config,
            database,
            as_of,
            json,
        } => analyze(&note, config.as_deref(), database.as_deref(), as_of, json).await,
        Commands::Download {
            database,
            assets,
            start,
            end,
        } => download(&database, &assets, start, end).await,
        Commands::Underlyings => {
            for (ticker, name) in KNOWN_UNDERLYINGS {
                println!("{:<6} {}", ticker, name);
            }
            Ok(())
        }
    }
}

async fn analyze(
    note_path: &Path,
    config_path: Option<&Path>,
    database: Option<&Path>,
    as_of: Option<NaiveDate>,
    json: bool,
) -> Result<()> {
    let raw = std::fs::read_to_string(note_path)
        .with_context(|| format!("failed to read note terms from {}", note_path.display()))?;
    let terms: NoteTerms = serde_json::from_str(&raw)
        .with_context(|| format!("invalid note terms in {}", note_path.display()))?;

    let config = match config_path {
        Some(path) => RiskModelConfig::from_toml_file(path)?,
        None => RiskModelConfig::default(),
    };

    let source: Box<dyn PriceHistorySource> = match database {
        Some(path) => {
            info!(database = %path.display(), "using local price store");
            Box::new(tokio::sync::Mutex::new(SqliteDataProvider::new(path)?))
        }
        None => Box::new(YahooFinanceDownloader::new()?),
    };

    let analyzer = RiskAnalyzer::with_config(source, config);
    let outcome = match as_of {
        Some(date) => analyzer.analyze_as_of(&terms, date).await,
        None => analyzer.analyze(&terms).await,
    };

    let result = match outcome {
        Ok(result) => result,
        Err(err) => {
            debug!(error = ?err, "risk analysis failed");
            bail!("{}", err.user_message());
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_report(&result);
    }
    Ok(())
}

fn print_report(result: &RiskAnalysisResult) {
    println!("Risk score: {}/100", result.score);
    println!("{}", result.summary);
    println!("Correlation penalty: {:.3}", result.correlation_penalty);
    println!();
    println!("{:<8} {:>10} {:>12}", "Asset", "Breach %", "Volatility");
    for metric in &result.probabilities {
        println!(
            "{:<8} {:>10.2} {:>11.1}%",
            metric.asset,
            metric.breach_probability,
            metric.annual_volatility * 100.0
        );
    }
}

async fn download(database: &Path, tickers: &[String], start: NaiveDate, end: NaiveDate) -> Result<()> {
    let range = DateRange::new(start, end);
    if !range.is_valid() {
        bail!("start date {} is after end date {}", start, end);
    }

    let assets = tickers
        .iter()
        .map(|t| Ok((AssetKey::new(t)?, range.clone())))
        .collect::<Result<Vec<_>>>()?;

    let mut store = SqliteDataProvider::new(database)?;
    let downloader = YahooFinanceDownloader::new()?;
    let result = downloader.download_multiple_to_sqlite(&mut store, &assets).await;

    for (ticker, count) in &result.successful {
        println!("{:<6} stored {} points", ticker, count);
    }
    for (ticker, error) in &result.failed {
        eprintln!("{:<6} failed: {}", ticker, error);
    }

    if result.successful.is_empty() {
        bail!("no assets were downloaded");
    }
    Ok(())
}
