//! BitShares DEX client
//!
//! Talks to the `database` API of one or more public nodes. Nodes are tried
//! in configured order, so a dead node falls through to the next one before
//! the market is reported as failed.
//!
//! Besides order books this client also reads bitasset settlement prices,
//! which the ledger uses as the reference commodity feed.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use crate::error::{FeedError, FeedResult};
use crate::exchange::ExchangeClient;
use crate::orderbook::{OrderBookSnapshot, OrderLevel};
use crate::rpc::RpcClient;
use crate::types::MarketPair;

/// Order book levels fetched per side; the node caps this at 50
pub const DEFAULT_FETCH_DEPTH: usize = 50;

/// `market_fee_percent` is stored in hundredths of a percent
const FEE_PERCENT_SCALE: f64 = 10_000.0;

#[derive(Debug, Clone, Deserialize)]
struct AssetOptions {
    #[serde(default)]
    market_fee_percent: u32,
}

#[derive(Debug, Clone, Deserialize)]
struct AssetObject {
    id: String,
    symbol: String,
    precision: u8,
    options: AssetOptions,
    #[serde(default)]
    bitasset_data_id: Option<String>,
}

impl AssetObject {
    fn fee_rate(&self) -> f64 {
        self.options.market_fee_percent as f64 / FEE_PERCENT_SCALE
    }
}

#[derive(Debug, Deserialize)]
struct RawLevel {
    price: String,
    quote: String,
    base: String,
}

#[derive(Debug, Deserialize)]
struct RawOrderBook {
    #[serde(default)]
    bids: Vec<RawLevel>,
    #[serde(default)]
    asks: Vec<RawLevel>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawAssetAmount {
    amount: Value,
    asset_id: String,
}

#[derive(Debug, Clone, Deserialize)]
struct RawPrice {
    base: RawAssetAmount,
    quote: RawAssetAmount,
}

#[derive(Debug, Deserialize)]
struct RawPriceFeed {
    settlement_price: RawPrice,
}

#[derive(Debug, Deserialize)]
struct BitassetData {
    current_feed: RawPriceFeed,
}

fn parse_book_level(raw: &RawLevel) -> Option<OrderLevel> {
    let price = raw.price.parse::<f64>().ok()?;
    let quote = raw.quote.parse::<f64>().ok()?;
    let base = raw.base.parse::<f64>().ok()?;
    if !price.is_finite() || price <= 0.0 || !quote.is_finite() || !base.is_finite() {
        return None;
    }
    Some(OrderLevel::new(price, quote, base))
}

/// Share amounts arrive either as JSON numbers or as strings (int64)
fn parse_share_amount(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse::<f64>().ok(),
        _ => None,
    }
}

/// Units of `commodity_id` per one unit of the other asset in `price`,
/// with both legs scaled by their asset precision.
fn settlement_ratio(
    price: &RawPrice,
    commodity_id: &str,
    base_precision: u8,
    quote_precision: u8,
) -> FeedResult<f64> {
    let base_amount = parse_share_amount(&price.base.amount)
        .ok_or_else(|| FeedError::Computation("unreadable settlement base amount".into()))?;
    let quote_amount = parse_share_amount(&price.quote.amount)
        .ok_or_else(|| FeedError::Computation("unreadable settlement quote amount".into()))?;

    let base_units = base_amount / 10f64.powi(base_precision as i32);
    let quote_units = quote_amount / 10f64.powi(quote_precision as i32);
    if !(base_units > 0.0) || !(quote_units > 0.0) {
        return Err(FeedError::Computation(
            "settlement price has a zero leg, feed not published yet".into(),
        ));
    }

    if price.base.asset_id == commodity_id {
        Ok(base_units / quote_units)
    } else if price.quote.asset_id == commodity_id {
        Ok(quote_units / base_units)
    } else {
        Err(FeedError::Computation(format!(
            "settlement price does not reference asset {}",
            commodity_id
        )))
    }
}

/// BitShares `database` API client with node fallback
pub struct BitsharesClient {
    nodes: Vec<RpcClient>,
}

impl BitsharesClient {
    pub fn new(urls: &[String], request_timeout: Duration) -> FeedResult<Self> {
        if urls.is_empty() {
            return Err(FeedError::Config(
                "at least one exchange node is required".into(),
            ));
        }
        let nodes = urls
            .iter()
            .map(|url| RpcClient::new(url, request_timeout))
            .collect::<FeedResult<Vec<_>>>()?;
        Ok(Self { nodes })
    }

    /// Call a `database` API method, falling through the node list on
    /// network failures.
    async fn db_call(&self, method: &str, args: Value) -> FeedResult<Value> {
        let mut last_err = None;
        for node in &self.nodes {
            match node.call("call", json!(["database", method, args.clone()])).await {
                Ok(value) => return Ok(value),
                Err(FeedError::Network(msg)) => {
                    tracing::warn!(node = node.url(), method, error = %msg, "node failed, trying next");
                    last_err = Some(FeedError::Network(msg));
                }
                Err(other) => return Err(other),
            }
        }
        Err(last_err.unwrap_or_else(|| FeedError::Network("no exchange nodes configured".into())))
    }

    async fn db_call_as<T: DeserializeOwned>(&self, method: &str, args: Value) -> FeedResult<T> {
        let raw = self.db_call(method, args).await?;
        serde_json::from_value(raw)
            .map_err(|e| FeedError::Network(format!("{}: unexpected result shape: {}", method, e)))
    }

    async fn lookup_assets(&self, symbols: &[&str]) -> FeedResult<Vec<AssetObject>> {
        let found: Vec<Option<AssetObject>> = self
            .db_call_as("lookup_asset_symbols", json!([symbols]))
            .await?;

        found
            .into_iter()
            .zip(symbols)
            .map(|(asset, symbol)| {
                asset.ok_or_else(|| FeedError::NotFound(format!("asset {} is unknown", symbol)))
            })
            .collect()
    }

    async fn precision_of(&self, asset_id: &str) -> FeedResult<u8> {
        let objects: Vec<Option<AssetObject>> =
            self.db_call_as("get_objects", json!([[asset_id]])).await?;
        objects
            .into_iter()
            .next()
            .flatten()
            .map(|a| a.precision)
            .ok_or_else(|| FeedError::NotFound(format!("asset object {} is unknown", asset_id)))
    }

    async fn precision_for(&self, known: &AssetObject, asset_id: &str) -> FeedResult<u8> {
        if known.id == asset_id {
            Ok(known.precision)
        } else {
            self.precision_of(asset_id).await
        }
    }

    /// Settlement price of a market-pegged asset, as units of that asset per
    /// one unit of the asset it is backed by.
    pub async fn settlement_price(&self, symbol: &str) -> FeedResult<f64> {
        let asset = self
            .lookup_assets(&[symbol])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| FeedError::NotFound(format!("asset {} is unknown", symbol)))?;

        let data_id = asset.bitasset_data_id.clone().ok_or_else(|| {
            FeedError::NotFound(format!("asset {} has no price feed", asset.symbol))
        })?;

        let data: Vec<Option<BitassetData>> =
            self.db_call_as("get_objects", json!([[data_id]])).await?;
        let feed = data
            .into_iter()
            .next()
            .flatten()
            .ok_or_else(|| FeedError::NotFound(format!("bitasset data {} missing", data_id)))?
            .current_feed
            .settlement_price;

        let base_precision = self.precision_for(&asset, &feed.base.asset_id).await?;
        let quote_precision = self.precision_for(&asset, &feed.quote.asset_id).await?;

        let ratio = settlement_ratio(&feed, &asset.id, base_precision, quote_precision)?;
        tracing::debug!(asset = %asset.symbol, ratio, "settlement price");
        Ok(ratio)
    }
}

#[async_trait]
impl ExchangeClient for BitsharesClient {
    fn name(&self) -> &'static str {
        "bitshares"
    }

    async fn fetch_order_book(
        &self,
        market: &MarketPair,
        depth: usize,
    ) -> FeedResult<OrderBookSnapshot> {
        let assets = self
            .lookup_assets(&[market.quote.as_str(), market.base.as_str()])
            .await?;
        let (quote, base) = match assets.as_slice() {
            [quote, base] => (quote, base),
            _ => return Err(FeedError::NotFound(format!("market {} is unknown", market))),
        };

        let limit = depth.clamp(1, DEFAULT_FETCH_DEPTH);
        let raw: RawOrderBook = self
            .db_call_as("get_order_book", json!([base.symbol, quote.symbol, limit]))
            .await?;

        let bids = raw.bids.iter().filter_map(parse_book_level).collect();
        let asks = raw.asks.iter().filter_map(parse_book_level).collect();

        let book = OrderBookSnapshot::new(
            market.clone(),
            bids,
            asks,
            base.fee_rate(),
            quote.fee_rate(),
        );

        tracing::debug!(
            market = %market,
            bids = book.bids.len(),
            asks = book.asks.len(),
            "📥 order book fetched"
        );

        Ok(book)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::{CenterPriceMode, MarketRouter};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    fn amount(amount: Value, asset_id: &str) -> RawAssetAmount {
        RawAssetAmount {
            amount,
            asset_id: asset_id.to_string(),
        }
    }

    #[test]
    fn test_parse_book_level() {
        let raw = RawLevel {
            price: "0.25".into(),
            quote: "100.0".into(),
            base: "25.0".into(),
        };
        assert_eq!(parse_book_level(&raw), Some(OrderLevel::new(0.25, 100.0, 25.0)));

        let bad = RawLevel {
            price: "abc".into(),
            quote: "1".into(),
            base: "1".into(),
        };
        assert_eq!(parse_book_level(&bad), None);
    }

    #[test]
    fn test_order_book_payload_shape() {
        let raw = json!({
            "base": "BTS",
            "quote": "GOLOS",
            "bids": [{"price": "2.0", "quote": "10", "base": "20"}],
            "asks": [{"price": "2.2", "quote": "5", "base": "11"}]
        });
        let book: RawOrderBook = serde_json::from_value(raw).unwrap();
        assert_eq!(book.bids.len(), 1);
        assert_eq!(parse_book_level(&book.asks[0]).unwrap().base_amount, 11.0);
    }

    #[test]
    fn test_fee_rate_scale() {
        let asset: AssetObject = serde_json::from_value(json!({
            "id": "1.3.0",
            "symbol": "BTS",
            "precision": 5,
            "options": {"market_fee_percent": 20}
        }))
        .unwrap();
        assert!((asset.fee_rate() - 0.002).abs() < 1e-12);
        assert!(asset.bitasset_data_id.is_none());
    }

    #[test]
    fn test_settlement_ratio_commodity_on_base() {
        // 1 GOLD (precision 6) per 400000 BTS (precision 5)
        let price = RawPrice {
            base: amount(json!(1_000_000), "1.3.106"),
            quote: amount(json!("40000000000"), "1.3.0"),
        };
        let ratio = settlement_ratio(&price, "1.3.106", 6, 5).unwrap();
        assert!((ratio - 1.0 / 400_000.0).abs() < 1e-15);
    }

    #[test]
    fn test_settlement_ratio_commodity_on_quote() {
        let price = RawPrice {
            base: amount(json!(40_000_000_000i64), "1.3.0"),
            quote: amount(json!(1_000_000), "1.3.106"),
        };
        let ratio = settlement_ratio(&price, "1.3.106", 5, 6).unwrap();
        assert!((ratio - 1.0 / 400_000.0).abs() < 1e-15);
    }

    #[test]
    fn test_settlement_ratio_rejects_empty_feed() {
        let price = RawPrice {
            base: amount(json!(0), "1.3.106"),
            quote: amount(json!(0), "1.3.0"),
        };
        assert!(matches!(
            settlement_ratio(&price, "1.3.106", 6, 5),
            Err(FeedError::Computation(_))
        ));
    }

    #[test]
    fn test_requires_a_node() {
        assert!(matches!(
            BitsharesClient::new(&[], Duration::from_secs(1)),
            Err(FeedError::Config(_))
        ));
    }

    // ============================================================================
    // Node fallback against local nodes
    // ============================================================================

    /// Accepts connections and never answers
    async fn spawn_hanging_node() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });
        format!("http://{}", addr)
    }

    async fn read_request(socket: &mut TcpStream) -> Option<Value> {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.ok()?;
            if n == 0 {
                return None;
            }
            buf.extend_from_slice(&chunk[..n]);

            let end = match buf.windows(4).position(|w| w == b"\r\n\r\n") {
                Some(end) => end,
                None => continue,
            };
            let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
            let length = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= end + 4 + length {
                return serde_json::from_slice(&buf[end + 4..end + 4 + length]).ok();
            }
        }
    }

    fn asset_object(id: &str) -> Value {
        match id {
            "1.3.0" | "BTS" => json!({
                "id": "1.3.0", "symbol": "BTS", "precision": 5,
                "options": {"market_fee_percent": 0}
            }),
            "1.3.4000" | "GOLOS" => json!({
                "id": "1.3.4000", "symbol": "GOLOS", "precision": 3,
                "options": {"market_fee_percent": 0}
            }),
            "1.3.106" | "GOLD" => json!({
                "id": "1.3.106", "symbol": "GOLD", "precision": 6,
                "options": {"market_fee_percent": 0},
                "bitasset_data_id": "2.4.20"
            }),
            "2.4.20" => json!({
                "current_feed": {"settlement_price": {
                    "base": {"amount": 1_000_000, "asset_id": "1.3.106"},
                    "quote": {"amount": "40000000000", "asset_id": "1.3.0"}
                }}
            }),
            _ => Value::Null,
        }
    }

    /// Minimal `database` API: assets, one GOLOS/BTS book at 2.0, GOLD feed
    async fn spawn_healthy_node() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let request = match read_request(&mut socket).await {
                        Some(request) => request,
                        None => return,
                    };
                    let keys: Vec<String> = request["params"][2][0]
                        .as_array()
                        .map(|ids| {
                            ids.iter()
                                .filter_map(|id| id.as_str().map(str::to_string))
                                .collect()
                        })
                        .unwrap_or_default();
                    let result = match request["params"][1].as_str() {
                        Some("lookup_asset_symbols") | Some("get_objects") => {
                            Value::Array(keys.iter().map(|k| asset_object(k)).collect())
                        }
                        Some("get_order_book") => json!({
                            "bids": [{"price": "2.0", "quote": "10", "base": "20"}],
                            "asks": [{"price": "2.0", "quote": "10", "base": "20"}]
                        }),
                        _ => Value::Null,
                    };
                    let body = json!({"jsonrpc": "2.0", "id": request["id"], "result": result})
                        .to_string();
                    let response = format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_hanging_node_falls_through_to_next() {
        let nodes = vec![spawn_hanging_node().await, spawn_healthy_node().await];
        let client = BitsharesClient::new(&nodes, Duration::from_millis(300)).unwrap();
        let router = MarketRouter::new(
            Arc::new(client),
            CenterPriceMode::DepthPct(20.0),
            DEFAULT_FETCH_DEPTH,
        );

        let sample = router
            .resolve_center_price(&MarketPair::new("GOLOS", "BTS"))
            .await
            .unwrap()
            .unwrap();

        assert!((sample.price - 2.0).abs() < 1e-12);
        assert!((sample.volume - 10.0).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_settlement_price_survives_hanging_node() {
        let nodes = vec![spawn_hanging_node().await, spawn_healthy_node().await];
        let client = BitsharesClient::new(&nodes, Duration::from_millis(300)).unwrap();

        let ratio = client.settlement_price("GOLD").await.unwrap();
        assert!((ratio - 1.0 / 400_000.0).abs() < 1e-15);
    }

    #[tokio::test]
    async fn test_only_hanging_nodes_is_network_error() {
        let nodes = vec![spawn_hanging_node().await];
        let client = BitsharesClient::new(&nodes, Duration::from_millis(100)).unwrap();

        let result = client
            .fetch_order_book(&MarketPair::new("GOLOS", "BTS"), DEFAULT_FETCH_DEPTH)
            .await;
        assert!(matches!(result, Err(FeedError::Network(_))));
    }
}
