//! Order book snapshots
//!
//! Snapshots arrive from the exchange client already split by side. They are
//! normalized on construction so the sampler can rely on best-first ordering
//! and stop walking early.

mod sampler;

pub use sampler::PriceSample;

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::types::{BookSide, MarketPair};

/// Order book level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLevel {
    /// BASE per QUOTE
    pub price: f64,
    pub quote_amount: f64,
    pub base_amount: f64,
}

impl OrderLevel {
    pub fn new(price: f64, quote_amount: f64, base_amount: f64) -> Self {
        Self {
            price,
            quote_amount,
            base_amount,
        }
    }

    fn is_sane(&self) -> bool {
        self.price.is_finite()
            && self.price > 0.0
            && self.quote_amount.is_finite()
            && self.quote_amount >= 0.0
            && self.base_amount.is_finite()
            && self.base_amount >= 0.0
    }
}

/// Bounded-depth order book for one market
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderBookSnapshot {
    pub market: MarketPair,
    /// Highest price first
    pub bids: Vec<OrderLevel>,
    /// Lowest price first
    pub asks: Vec<OrderLevel>,
    /// Maker fee of the base asset as a fraction (0.002 = 0.2%)
    pub base_fee_rate: f64,
    /// Maker fee of the quote asset as a fraction
    pub quote_fee_rate: f64,
}

impl OrderBookSnapshot {
    pub fn new(
        market: MarketPair,
        bids: Vec<OrderLevel>,
        asks: Vec<OrderLevel>,
        base_fee_rate: f64,
        quote_fee_rate: f64,
    ) -> Self {
        let mut book = Self {
            market,
            bids,
            asks,
            base_fee_rate: sanitize_fee(base_fee_rate),
            quote_fee_rate: sanitize_fee(quote_fee_rate),
        };
        book.normalize_levels();
        book
    }

    /// Normalize raw book levels from RPC snapshots:
    /// - keep only finite positive prices and non-negative amounts
    /// - sort bids descending (best first)
    /// - sort asks ascending (best first)
    pub fn normalize_levels(&mut self) {
        self.bids.retain(OrderLevel::is_sane);
        self.asks.retain(OrderLevel::is_sane);

        self.bids
            .sort_by(|a, b| b.price.partial_cmp(&a.price).unwrap_or(Ordering::Equal));
        self.asks
            .sort_by(|a, b| a.price.partial_cmp(&b.price).unwrap_or(Ordering::Equal));
    }

    /// Levels of one side in walking order, with the maker fee charged on
    /// proceeds of that side
    pub fn side(&self, side: BookSide) -> (&[OrderLevel], f64) {
        match side {
            BookSide::Bid => (&self.bids, self.base_fee_rate),
            BookSide::Ask => (&self.asks, self.quote_fee_rate),
        }
    }

    pub fn best_bid(&self) -> Option<&OrderLevel> {
        self.bids.first()
    }

    pub fn best_ask(&self) -> Option<&OrderLevel> {
        self.asks.first()
    }
}

fn sanitize_fee(rate: f64) -> f64 {
    if rate.is_finite() && rate > 0.0 {
        rate
    } else {
        0.0
    }
}
