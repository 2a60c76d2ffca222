//! witness-feed
//!
//! Usage: witness-feed -c ./witness-feed.yml [--monitor] [--dry-run | --force]
//!
//! Computes the GBG/GOLOS price from BitShares DEX order books and the GOLD
//! settlement feed, then publishes it for the configured witness when the
//! last feed is stale or has drifted.

use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use witness_feed::config::AppConfig;
use witness_feed::decision::PublishDecisionEngine;
use witness_feed::engine::{CycleSettings, FeedCycle};
use witness_feed::exchange::BitsharesClient;
use witness_feed::ledger::{ChainLedger, ChainSymbols};
use witness_feed::oracle::{FeedConverter, PriceAggregator};
use witness_feed::router::MarketRouter;
use witness_feed::FeedError;

const EXIT_CYCLE_FAILED: u8 = 1;
const EXIT_CONFIG: u8 = 2;
const EXIT_ALL_SOURCES_FAILED: u8 = 3;

#[derive(Parser, Debug)]
#[command(
    name = "witness-feed",
    version,
    about = "golos price feed updater",
    after_help = "Prices come from BitShares DEX order books converted through the GOLD feed."
)]
struct Cli {
    /// Path to the YAML config file
    #[arg(short, long, default_value = "./witness-feed.yml", env = "WITNESS_FEED_CONFIG")]
    config: String,

    /// Run in continuous mode and update the price periodically
    #[arg(short, long)]
    monitor: bool,

    /// Calculate prices but do not send the transaction
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Force a price feed update
    #[arg(short, long)]
    force: bool,

    /// Only show errors
    #[arg(short, long, conflicts_with = "debug")]
    quiet: bool,

    /// Enable debug output
    #[arg(short, long)]
    debug: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

fn init_tracing(cli: &Cli) {
    let level = if cli.quiet {
        "error"
    } else if cli.debug {
        "debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if cli.json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn exit_code(err: &FeedError) -> u8 {
    match err {
        FeedError::Config(_) => EXIT_CONFIG,
        FeedError::AllSourcesFailed(_) => EXIT_ALL_SOURCES_FAILED,
        _ => EXIT_CYCLE_FAILED,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli);

    let mut config = match AppConfig::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("❌ {:#}", e);
            return ExitCode::from(EXIT_CONFIG);
        }
    };
    config.feed.dry_run |= cli.dry_run;
    config.feed.force |= cli.force;

    if let Err(e) = config.validate() {
        error!("❌ {}", e);
        return ExitCode::from(EXIT_CONFIG);
    }
    info!(config = %config, monitor = cli.monitor, "🚀 starting witness-feed");

    let cycle = match build_cycle(&config) {
        Ok(cycle) => cycle,
        Err(e) => {
            error!("❌ {}", e);
            return ExitCode::from(exit_code(&e));
        }
    };

    let result = cycle
        .run(
            cli.monitor,
            Duration::from_secs(config.feed.interval),
            config.cycle_timeout(),
        )
        .await;

    match result {
        Ok(outcome) => match outcome.broadcast {
            Some(Err(_)) => ExitCode::from(EXIT_CYCLE_FAILED),
            _ => ExitCode::SUCCESS,
        },
        Err(_) if cli.monitor => ExitCode::SUCCESS,
        Err(e) => ExitCode::from(exit_code(&e)),
    }
}

fn build_cycle(
    config: &AppConfig,
) -> Result<FeedCycle<BitsharesClient, ChainLedger>, FeedError> {
    let request_timeout = config.request_timeout();

    let exchange = Arc::new(BitsharesClient::new(&config.exchange.nodes, request_timeout)?);
    let ledger = Arc::new(ChainLedger::new(
        &config.chain.node,
        &config.chain.wallet,
        Arc::clone(&exchange),
        ChainSymbols {
            base: config.chain.base_symbol.clone(),
            quote: config.chain.quote_symbol.clone(),
        },
        request_timeout,
    )?);

    let router = MarketRouter::new(
        exchange,
        config.center_price_mode()?,
        config.exchange.fetch_depth,
    );

    let decision = PublishDecisionEngine::new(
        config.feed.max_age,
        config.feed.threshold_pct,
        config.feed.force,
        config.feed.dry_run,
    );

    let settings = CycleSettings {
        witness: config.feed.witness.clone(),
        markets: config.markets()?,
        bridge_asset: config.feed.bridge_asset.to_uppercase(),
        reference_asset: config.feed.reference_asset.to_uppercase(),
        correction_factor: config.correction_factor(),
        request_timeout,
    };

    Ok(FeedCycle::new(
        router,
        ledger,
        PriceAggregator::new(config.metric()?),
        FeedConverter::new(config.feed.target_unit),
        decision,
        settings,
    ))
}
