//! Configuration management for witness-feed
//!
//! Loads from a YAML file + environment variables via .env

use anyhow::{Context, Result};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File, FileFormat};
use serde::Deserialize;
use std::time::Duration;

use crate::error::{FeedError, FeedResult};
use crate::oracle::{AggregationMetric, MassUnit};
use crate::router::CenterPriceMode;
use crate::types::MarketPair;

/// Used when neither a depth nor a target amount is configured
pub const DEFAULT_DEPTH_PCT: f64 = 20.0;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub feed: FeedConfig,
    pub exchange: ExchangeConfig,
    pub chain: ChainConfig,
    pub timeouts: TimeoutConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    /// Witness account publishing the feed
    pub witness: String,
    /// Markets in QUOTE/BASE form
    pub markets: Vec<String>,
    /// Asset every market is priced in
    pub bridge_asset: String,
    /// median, mean or weighted_average
    pub metric: String,
    /// Order book depth percent (exclusive with quote/base amount)
    #[serde(default)]
    pub depth_pct: Option<f64>,
    #[serde(default)]
    pub quote_amount: Option<f64>,
    #[serde(default)]
    pub base_amount: Option<f64>,
    /// Relative change that triggers a publish (0.05 = 5%)
    pub threshold_pct: f64,
    /// Seconds after which the published feed is considered stale
    pub max_age: i64,
    /// Correction factor applied to the final price
    #[serde(default)]
    pub k: Option<f64>,
    /// Seconds between cycles in monitor mode
    pub interval: u64,
    /// Calculate prices but never broadcast
    pub dry_run: bool,
    /// Publish even when no trigger fired
    pub force: bool,
    /// Commodity whose settlement price converts the bridge asset
    pub reference_asset: String,
    pub target_unit: MassUnit,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeConfig {
    /// Bridge chain RPC nodes, tried in order
    pub nodes: Vec<String>,
    /// Order book levels fetched per side
    pub fetch_depth: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    /// Feed chain RPC node
    pub node: String,
    /// Wallet daemon that signs and broadcasts
    pub wallet: String,
    pub base_symbol: String,
    pub quote_symbol: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimeoutConfig {
    /// Per network call
    pub request_secs: u64,
    /// Whole cycle
    pub cycle_secs: u64,
}

fn with_defaults() -> Result<ConfigBuilder<DefaultState>> {
    Ok(Config::builder()
        .set_default("feed.bridge_asset", "BTS")?
        .set_default("feed.metric", "median")?
        .set_default("feed.threshold_pct", 0.05)?
        .set_default("feed.max_age", 86_400)?
        .set_default("feed.interval", 3600)?
        .set_default("feed.dry_run", false)?
        .set_default("feed.force", false)?
        .set_default("feed.reference_asset", "GOLD")?
        .set_default("feed.target_unit", "milligram")?
        // Exchange defaults
        .set_default("exchange.nodes", vec!["https://api.bts.mobi"])?
        .set_default("exchange.fetch_depth", 50)?
        // Chain defaults
        .set_default("chain.node", "https://api.golos.id")?
        .set_default("chain.wallet", "http://127.0.0.1:8093")?
        .set_default("chain.base_symbol", "GBG")?
        .set_default("chain.quote_symbol", "GOLOS")?
        // Timeout defaults
        .set_default("timeouts.request_secs", 10)?
        .set_default("timeouts.cycle_secs", 120)?)
}

fn env_source() -> Environment {
    Environment::with_prefix("WITNESS_FEED")
        .separator("__")
        .list_separator(",")
        .with_list_parse_key("feed.markets")
        .with_list_parse_key("exchange.nodes")
        .try_parsing(true)
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load(path: &str) -> Result<Self> {
        // Load .env file first
        dotenvy::dotenv().ok();

        let config = with_defaults()?
            .add_source(File::with_name(path))
            // Override with environment variables (WITNESS_FEED__*)
            .add_source(env_source())
            .build()
            .with_context(|| format!("Failed to build configuration from {}", path))?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Parse configuration from a YAML document, defaults applied
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config = with_defaults()?
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Reject anything that would only fail once the cycle is running.
    /// Called before any network access.
    pub fn validate(&self) -> FeedResult<()> {
        if self.feed.witness.trim().is_empty() {
            return Err(FeedError::Config("feed.witness must be set".into()));
        }
        self.markets()?;
        self.metric()?;
        self.center_price_mode()?;

        if let Some(k) = self.feed.k {
            if !(k > 0.0) || !k.is_finite() {
                return Err(FeedError::Config(format!("k must be positive, got {}", k)));
            }
        }
        if !(self.feed.threshold_pct >= 0.0) {
            return Err(FeedError::Config(format!(
                "threshold_pct must be non-negative, got {}",
                self.feed.threshold_pct
            )));
        }
        if self.feed.max_age < 0 {
            return Err(FeedError::Config("max_age must be non-negative".into()));
        }
        if self.feed.interval == 0 {
            return Err(FeedError::Config("interval must be at least 1 second".into()));
        }
        if self.exchange.nodes.is_empty() {
            return Err(FeedError::Config("exchange.nodes must not be empty".into()));
        }
        if self.timeouts.request_secs == 0 || self.timeouts.cycle_secs == 0 {
            return Err(FeedError::Config("timeouts must be at least 1 second".into()));
        }
        Ok(())
    }

    pub fn markets(&self) -> FeedResult<Vec<MarketPair>> {
        if self.feed.markets.is_empty() {
            return Err(FeedError::Config("feed.markets must not be empty".into()));
        }
        self.feed.markets.iter().map(|m| m.parse()).collect()
    }

    pub fn metric(&self) -> FeedResult<AggregationMetric> {
        self.feed.metric.parse()
    }

    pub fn center_price_mode(&self) -> FeedResult<CenterPriceMode> {
        let has_amount = self.feed.quote_amount.is_some() || self.feed.base_amount.is_some();
        let depth = match self.feed.depth_pct {
            None if !has_amount => Some(DEFAULT_DEPTH_PCT),
            other => other,
        };
        CenterPriceMode::from_options(depth, self.feed.quote_amount, self.feed.base_amount)
    }

    pub fn correction_factor(&self) -> f64 {
        self.feed.k.unwrap_or(1.0)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.request_secs)
    }

    pub fn cycle_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.cycle_secs)
    }

    /// Generate a digest of the config for logging
    pub fn digest(&self) -> String {
        format!(
            "witness={} markets={:?} bridge={} metric={} threshold={} max_age={}s dry_run={} force={}",
            self.feed.witness,
            self.feed.markets,
            self.feed.bridge_asset,
            self.feed.metric,
            self.feed.threshold_pct,
            self.feed.max_age,
            self.feed.dry_run,
            self.feed.force
        )
    }
}

impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
feed:
  witness: alice
  markets:
    - GOLOS/BTS
    - GOLOS:RUDEX.BTC
"#;

    #[test]
    fn test_defaults_applied() {
        let config = AppConfig::from_yaml_str(MINIMAL).unwrap();
        config.validate().unwrap();

        assert_eq!(config.feed.bridge_asset, "BTS");
        assert_eq!(config.metric().unwrap(), AggregationMetric::Median);
        assert_eq!(
            config.center_price_mode().unwrap(),
            CenterPriceMode::DepthPct(DEFAULT_DEPTH_PCT)
        );
        assert_eq!(config.feed.target_unit, MassUnit::Milligram);
        assert_eq!(config.correction_factor(), 1.0);
        assert_eq!(config.markets().unwrap()[1], MarketPair::new("GOLOS", "RUDEX.BTC"));
    }

    #[test]
    fn test_unknown_metric_is_config_error() {
        let yaml = format!("{}  metric: vwap\n", MINIMAL);
        let config = AppConfig::from_yaml_str(&yaml).unwrap();
        assert!(matches!(config.validate(), Err(FeedError::Config(_))));
    }

    #[test]
    fn test_depth_and_amount_are_exclusive() {
        let yaml = format!("{}  depth_pct: 10.0\n  quote_amount: 100.0\n", MINIMAL);
        let config = AppConfig::from_yaml_str(&yaml).unwrap();
        assert!(matches!(config.validate(), Err(FeedError::Config(_))));
    }

    #[test]
    fn test_amount_mode_without_depth() {
        let yaml = format!("{}  base_amount: 500.0\n", MINIMAL);
        let config = AppConfig::from_yaml_str(&yaml).unwrap();
        assert_eq!(
            config.center_price_mode().unwrap(),
            CenterPriceMode::TargetAmount {
                quote_amount: 0.0,
                base_amount: 500.0
            }
        );
    }

    #[test]
    fn test_rejects_bad_correction_factor() {
        let yaml = format!("{}  k: -1.0\n", MINIMAL);
        let config = AppConfig::from_yaml_str(&yaml).unwrap();
        assert!(matches!(config.validate(), Err(FeedError::Config(_))));
    }

    #[test]
    fn test_missing_witness_fails_to_load() {
        assert!(AppConfig::from_yaml_str("feed:\n  markets: [GOLOS/BTS]\n").is_err());
    }
}
