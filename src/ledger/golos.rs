//! Golos ledger client
//!
//! Reads witness and median data from a Golos node, broadcasts feeds through
//! a `cli_wallet` daemon (which holds the signing key) and reads the
//! commodity reference feed from the bridge chain.

use async_trait::async_trait;
use chrono::{NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{FeedError, FeedResult};
use crate::exchange::BitsharesClient;
use crate::ledger::LedgerClient;
use crate::rpc::RpcClient;
use crate::types::WitnessPriceRecord;

const CHAIN_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Asset symbols of the published exchange rate (`base` per `quote`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainSymbols {
    pub base: String,
    pub quote: String,
}

#[derive(Debug, Deserialize)]
struct RawExchangeRate {
    base: String,
    quote: String,
}

#[derive(Debug, Deserialize)]
struct RawWitness {
    sbd_exchange_rate: RawExchangeRate,
    last_sbd_exchange_update: String,
}

/// Split `"1.234 GBG"` into amount and symbol
pub fn parse_asset_amount(raw: &str) -> FeedResult<(f64, String)> {
    let mut parts = raw.split_whitespace();
    let amount = parts
        .next()
        .and_then(|a| a.parse::<f64>().ok())
        .ok_or_else(|| FeedError::Network(format!("malformed asset amount '{}'", raw)))?;
    let symbol = parts.next().unwrap_or_default().to_string();
    Ok((amount, symbol))
}

/// Base per quote of an on-chain exchange rate; 0.0 when the quote leg is
/// zero (the witness never published)
pub fn parse_exchange_rate(base: &str, quote: &str) -> FeedResult<f64> {
    let (base_amount, _) = parse_asset_amount(base)?;
    let (quote_amount, _) = parse_asset_amount(quote)?;
    if quote_amount == 0.0 {
        return Ok(0.0);
    }
    Ok(base_amount / quote_amount)
}

fn parse_witness(raw: RawWitness) -> FeedResult<WitnessPriceRecord> {
    let published_price =
        parse_exchange_rate(&raw.sbd_exchange_rate.base, &raw.sbd_exchange_rate.quote)?;
    let naive = NaiveDateTime::parse_from_str(&raw.last_sbd_exchange_update, CHAIN_TIME_FORMAT)
        .map_err(|e| {
            FeedError::Network(format!(
                "malformed update time '{}': {}",
                raw.last_sbd_exchange_update, e
            ))
        })?;

    Ok(WitnessPriceRecord {
        published_price,
        last_update: Utc.from_utc_datetime(&naive),
    })
}

/// Feed chain node, signing wallet and bridge chain behind one ledger
pub struct ChainLedger {
    node: RpcClient,
    wallet: RpcClient,
    bridge: Arc<BitsharesClient>,
    symbols: ChainSymbols,
}

impl ChainLedger {
    pub fn new(
        node_url: &str,
        wallet_url: &str,
        bridge: Arc<BitsharesClient>,
        symbols: ChainSymbols,
        request_timeout: Duration,
    ) -> FeedResult<Self> {
        Ok(Self {
            node: RpcClient::new(node_url, request_timeout)?,
            wallet: RpcClient::new(wallet_url, request_timeout)?,
            bridge,
            symbols,
        })
    }
}

#[async_trait]
impl LedgerClient for ChainLedger {
    async fn read_witness(&self, account: &str) -> FeedResult<WitnessPriceRecord> {
        let raw: Option<RawWitness> = self
            .node
            .call_as(
                "call",
                json!(["witness_api", "get_witness_by_account", [account]]),
            )
            .await?;

        let raw = raw.ok_or_else(|| FeedError::NotFound(format!("witness {}", account)))?;
        let record = parse_witness(raw)?;
        tracing::info!(
            witness = account,
            old_price = record.published_price,
            last_update = %record.last_update,
            "witness record"
        );
        Ok(record)
    }

    async fn read_reference_feed(&self, asset: &str) -> FeedResult<f64> {
        self.bridge.settlement_price(asset).await
    }

    async fn read_median_price(&self) -> FeedResult<f64> {
        let raw: RawExchangeRate = self
            .node
            .call_as(
                "call",
                json!(["witness_api", "get_current_median_history_price", []]),
            )
            .await?;
        parse_exchange_rate(&raw.base, &raw.quote)
    }

    async fn publish_feed(&self, account: &str, price: &str, quote_unit: &str) -> FeedResult<()> {
        let exchange_rate = json!({
            "base": format!("{} {}", price, self.symbols.base),
            "quote": format!("{} {}", quote_unit, self.symbols.quote),
        });

        tracing::info!(witness = account, rate = %exchange_rate, "📤 broadcasting price feed");

        self.wallet
            .call("publish_feed", json!([account, exchange_rate, true]))
            .await
            .map(|_| ())
            .map_err(|e| FeedError::Broadcast(e.to_string()))
    }
}
