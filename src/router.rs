//! Market router
//!
//! Resolves the price of a `QUOTE/BASE` pair in bridge-asset terms. Pairs
//! already quoted in the bridge asset need one order book; everything else
//! is composed from two hops, `QUOTE/BASE` and `BASE/BRIDGE`, fetched
//! concurrently.

use std::sync::Arc;

use crate::error::{FeedError, FeedResult};
use crate::exchange::ExchangeClient;
use crate::orderbook::{OrderBookSnapshot, PriceSample};
use crate::types::{BookSide, MarketPair, MarketQuote};

/// How the buy and sell sides of a book are sampled for a center price
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CenterPriceMode {
    /// Levels within this percent of the top of book
    DepthPct(f64),
    /// Fill a fixed amount of quote or base asset
    TargetAmount { quote_amount: f64, base_amount: f64 },
}

impl CenterPriceMode {
    /// Build the mode from the two mutually exclusive option groups
    pub fn from_options(
        depth_pct: Option<f64>,
        quote_amount: Option<f64>,
        base_amount: Option<f64>,
    ) -> FeedResult<Self> {
        let has_amount = quote_amount.is_some() || base_amount.is_some();
        match (depth_pct, has_amount) {
            (Some(_), true) => Err(FeedError::Config(
                "depth_pct and quote_amount/base_amount are mutually exclusive".into(),
            )),
            (Some(depth), false) if depth > 0.0 && depth.is_finite() => {
                Ok(CenterPriceMode::DepthPct(depth))
            }
            (Some(depth), false) => Err(FeedError::Config(format!(
                "depth_pct must be greater than 0, got {}",
                depth
            ))),
            (None, true) => {
                let quote_amount = quote_amount.unwrap_or(0.0);
                let base_amount = base_amount.unwrap_or(0.0);
                if quote_amount > 0.0 || base_amount > 0.0 {
                    Ok(CenterPriceMode::TargetAmount {
                        quote_amount,
                        base_amount,
                    })
                } else {
                    Err(FeedError::Config(
                        "quote_amount or base_amount must be greater than 0".into(),
                    ))
                }
            }
            (None, false) => Err(FeedError::Config(
                "either depth_pct or quote_amount/base_amount must be set".into(),
            )),
        }
    }
}

/// Geometric mean of the buy and sell samples, limited by the thinner side.
/// `None` when either side has no liquidity.
pub fn center_price(
    book: &OrderBookSnapshot,
    mode: CenterPriceMode,
) -> FeedResult<Option<PriceSample>> {
    let (buy, sell) = match mode {
        CenterPriceMode::DepthPct(depth) => (
            book.walk_by_depth(BookSide::Bid, depth)?,
            book.walk_by_depth(BookSide::Ask, depth)?,
        ),
        CenterPriceMode::TargetAmount {
            quote_amount,
            base_amount,
        } => (
            book.walk_by_amount(BookSide::Bid, quote_amount, base_amount)?,
            book.walk_by_amount(BookSide::Ask, quote_amount, base_amount)?,
        ),
    };

    Ok(match (buy, sell) {
        (Some(buy), Some(sell)) if buy.price > 0.0 && sell.price > 0.0 => Some(PriceSample {
            price: (buy.price * sell.price).sqrt(),
            volume: buy.volume.min(sell.volume),
        }),
        _ => None,
    })
}

/// Chain `QUOTE/BASE` with `BASE/BRIDGE`. Volume stays in the first hop's
/// quote units, so the second hop's volume is converted through the first
/// hop's price before taking the minimum.
pub fn compose_hops(hop1: PriceSample, hop2: PriceSample) -> PriceSample {
    PriceSample {
        price: hop1.price * hop2.price,
        volume: hop1.volume.min(hop2.volume / hop1.price),
    }
}

/// Resolves market routes against one exchange
pub struct MarketRouter<E: ExchangeClient> {
    exchange: Arc<E>,
    mode: CenterPriceMode,
    fetch_depth: usize,
}

impl<E: ExchangeClient> MarketRouter<E> {
    pub fn new(
        exchange: Arc<E>,
        mode: CenterPriceMode,
        fetch_depth: usize,
    ) -> Self {
        Self {
            exchange,
            mode,
            fetch_depth,
        }
    }

    /// No deadline here: every RPC inside the exchange client is bounded on
    /// its own, and a node fallback needs several of those in a row.
    async fn fetch(&self, market: &MarketPair) -> FeedResult<OrderBookSnapshot> {
        let book = self
            .exchange
            .fetch_order_book(market, self.fetch_depth)
            .await;
        if let Err(e) = &book {
            tracing::debug!(exchange = self.exchange.name(), market = %market, error = %e, "order book fetch failed");
        }
        book
    }

    /// Center price of a single market; `None` when either side is empty
    pub async fn resolve_center_price(&self, market: &MarketPair) -> FeedResult<Option<PriceSample>> {
        let book = self.fetch(market).await?;
        let sample = center_price(&book, self.mode)?;
        tracing::debug!(market = %market, sample = ?sample, "center price");
        Ok(sample)
    }

    /// Price of `market` in `bridge_asset` units per quote unit
    pub async fn resolve_bridged_price(
        &self,
        market: &MarketPair,
        bridge_asset: &str,
    ) -> FeedResult<Option<MarketQuote>> {
        let market_id = market.to_string();

        if market.base.eq_ignore_ascii_case(bridge_asset) {
            let direct = self.resolve_center_price(market).await?;
            return Ok(direct.map(|s| MarketQuote::new(market_id, s.price, s.volume)));
        }

        let second = MarketPair::new(market.base.clone(), bridge_asset);
        let (hop1, hop2) = tokio::join!(
            self.resolve_center_price(market),
            self.resolve_center_price(&second)
        );

        match (hop1?, hop2?) {
            (Some(hop1), Some(hop2)) => {
                let combined = compose_hops(hop1, hop2);
                tracing::debug!(
                    market = %market,
                    via = %second,
                    price = combined.price,
                    volume = combined.volume,
                    "bridged price"
                );
                Ok(Some(MarketQuote::new(
                    market_id,
                    combined.price,
                    combined.volume,
                )))
            }
            _ => Ok(None),
        }
    }
}
