//! Exchange clients
//!
//! An exchange hands out bounded-depth order book snapshots; everything
//! after that (walking, routing, aggregation) happens locally.

mod bitshares;

pub use bitshares::{BitsharesClient, DEFAULT_FETCH_DEPTH};

use async_trait::async_trait;

use crate::error::FeedResult;
use crate::orderbook::OrderBookSnapshot;
use crate::types::MarketPair;

/// Trait for order book sources
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Get the source name
    fn name(&self) -> &'static str;

    /// Fetch up to `depth` levels per side for `market`.
    ///
    /// Fails with `Network` on transport errors or timeouts and with
    /// `NotFound` when an asset of the market is unknown to the exchange.
    async fn fetch_order_book(
        &self,
        market: &MarketPair,
        depth: usize,
    ) -> FeedResult<OrderBookSnapshot>;
}
