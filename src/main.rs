//! holderscan - multichain token holder scanner
//!
//! Retrieves holders of a token, filters them by balance thresholds,
//! cross-references their portfolios against CoinGecko metadata, and writes
//! CSV reports of notable token holdings plus a global whale list.

mod chains;
mod config;
mod error;
mod modules;
mod utils;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

use chains::Chain;
use config::Config;
use modules::{HolderScanner, ScanParams, TokenClassifier};
use utils::{init_logger, CoinGeckoService, CovalentService, ReportService, RequestThrottle};

#[derive(Parser)]
#[command(name = "holderscan", about = "Multichain token holder scanner", version)]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Retrieve current holders of a token and scan their portfolios
    Scan(ScanArgs),
}

#[derive(Args)]
struct ScanArgs {
    /// Contract address of the token whose holders are scanned
    #[arg(long)]
    token_address: String,

    /// Chain the token lives on (ethereum, matic, arbitrum, avalanche,
    /// fantom, optimism)
    #[arg(long)]
    token_chain: String,

    /// Minimum normalized token quantity for a holder to be inspected
    #[arg(long, default_value_t = 100)]
    min_token_qty: u64,

    /// Minimum USD value for a balance to count toward holdings
    #[arg(long, default_value = "100")]
    min_holding_usd: String,

    /// Portfolio value in USD at which a holder is reported as a whale
    #[arg(long)]
    whale_threshold: String,

    /// Optional historical snapshot date (YYYY-MM-DD)
    #[arg(long)]
    date: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logger();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    match cli.command {
        Commands::Scan(args) => scan(config, args).await,
    }
}

async fn scan(config: Config, args: ScanArgs) -> Result<()> {
    let token_chain: Chain = args.token_chain.parse()?;
    let chains = config.scan_chains()?;

    let min_holding_usd: BigDecimal = args
        .min_holding_usd
        .parse()
        .with_context(|| format!("parsing minimal holding value {}", args.min_holding_usd))?;
    let whale_threshold: BigDecimal = args
        .whale_threshold
        .parse()
        .with_context(|| format!("parsing whale threshold {}", args.whale_threshold))?;
    let snapshot_date = args
        .date
        .as_deref()
        .map(|d| {
            NaiveDate::parse_from_str(d, "%Y-%m-%d").with_context(|| format!("parsing date {}", d))
        })
        .transpose()?;

    let throttle = Arc::new(RequestThrottle::new(Duration::from_millis(
        config.request_interval_ms,
    )));
    let covalent = Arc::new(CovalentService::new(&config, throttle));
    let coingecko = Arc::new(CoinGeckoService::new());
    let classifier = Arc::new(TokenClassifier::new(coingecko, &args.token_address));
    let reports = ReportService::new(&config);

    let params = ScanParams {
        token_address: args.token_address,
        token_chain,
        min_token_qty: BigDecimal::from(args.min_token_qty),
        min_holding_usd,
        whale_threshold,
        snapshot_date,
    };

    let scanner = HolderScanner::new(params, chains, covalent, classifier, reports);
    scanner.run().await
}
