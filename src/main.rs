use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};

use catalog_price_matcher::{
    init_tracing, read_catalog, read_sheet, write_sheet, AppConfig, AppError, AppResult,
    ExtractionPool, HttpPageFetcher, SerpApiClient, TwoPassDiscovery,
};

#[derive(Parser)]
#[command(name = "price-matcher")]
#[command(about = "Match catalog products to marketplace and brand listings and read their prices")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Find Myntra, Slikk and brand-site URLs for every catalog row
    Discover {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: PathBuf,
        /// Also write the run stats as JSON
        #[arg(long)]
        stats_json: Option<PathBuf>,
    },

    /// Fetch each discovered URL and fill in its price
    Extract {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: PathBuf,
        #[arg(long)]
        stats_json: Option<PathBuf>,
    },
}

fn write_stats<T: Serialize>(path: Option<&PathBuf>, stats: &T) -> Result<()> {
    let Some(path) = path else {
        return Ok(());
    };
    let rendered = serde_json::to_string_pretty(stats)?;
    std::fs::write(path, rendered)
        .with_context(|| format!("failed to write stats to {}", path.display()))
}

/// A halted stage still writes the rows it kept before surfacing the cause.
fn settle<T>(result: AppResult<T>, output: &Path, stage: &str) -> Result<T> {
    match result {
        Ok(outcome) => Ok(outcome),
        Err(AppError::Halted { cause, rows }) => {
            write_sheet(output, &rows)
                .with_context(|| format!("failed to write {}", output.display()))?;
            warn!(rows = rows.len(), output = %output.display(), "{stage} halted; partial sheet written");
            Err(anyhow::Error::new(*cause).context(format!("{stage} halted")))
        }
        Err(err) => Err(anyhow::Error::new(err).context(format!("{stage} aborted"))),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = AppConfig::from_env();
    info!(config = ?config.public_profile(), "configuration loaded");

    match cli.command {
        Commands::Discover {
            input,
            output,
            stats_json,
        } => {
            let rows = read_catalog(&input)
                .with_context(|| format!("failed to read catalog {}", input.display()))?;
            let search = SerpApiClient::new(&config).context("search client unavailable")?;
            let discovery = TwoPassDiscovery::new(Arc::new(search), &config);
            let outcome = settle(discovery.run(&rows).await, &output, "discovery")?;
            write_sheet(&output, &outcome.rows)
                .with_context(|| format!("failed to write {}", output.display()))?;
            info!(stats = ?outcome.stats, output = %output.display(), "discovery finished");
            write_stats(stats_json.as_ref(), &outcome.stats)?;
        }
        Commands::Extract {
            input,
            output,
            stats_json,
        } => {
            let rows = read_sheet(&input)
                .with_context(|| format!("failed to read sheet {}", input.display()))?;
            let fetcher = HttpPageFetcher::new(&config).context("page fetcher unavailable")?;
            let pool = ExtractionPool::new(Arc::new(fetcher), &config);
            let outcome = settle(pool.run(rows).await, &output, "extraction")?;
            write_sheet(&output, &outcome.rows)
                .with_context(|| format!("failed to write {}", output.display()))?;
            info!(stats = ?outcome.stats, output = %output.display(), "extraction finished");
            write_stats(stats_json.as_ref(), &outcome.stats)?;
        }
    }

    Ok(())
}
