//! Core types used throughout the feed pipeline
//!
//! Market identifiers, per-market quotes and the witness record read from
//! the feed chain.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::FeedError;

/// Order book side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookSide {
    /// Buy orders, best (highest) price first
    Bid,
    /// Sell orders, best (lowest) price first
    Ask,
}

impl fmt::Display for BookSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BookSide::Bid => write!(f, "BID"),
            BookSide::Ask => write!(f, "ASK"),
        }
    }
}

/// Market in `QUOTE/BASE` form; prices are expressed as BASE per QUOTE
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MarketPair {
    pub quote: String,
    pub base: String,
}

impl MarketPair {
    pub fn new(quote: impl Into<String>, base: impl Into<String>) -> Self {
        Self {
            quote: quote.into().to_uppercase(),
            base: base.into().to_uppercase(),
        }
    }
}

impl FromStr for MarketPair {
    type Err = FeedError;

    /// Accepts `/`, `:` and `-` as separators, e.g. `golos/bts`, `GOLOS:BTS`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s
            .trim()
            .split(|c| c == '/' || c == ':' || c == '-')
            .map(str::trim)
            .collect();

        match parts.as_slice() {
            [quote, base] if !quote.is_empty() && !base.is_empty() => {
                Ok(MarketPair::new(*quote, *base))
            }
            _ => Err(FeedError::Config(format!(
                "market '{}' must be in QUOTE/BASE form",
                s
            ))),
        }
    }
}

impl fmt::Display for MarketPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.quote, self.base)
    }
}

/// A single route's resolved price for one cycle. Never cached.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketQuote {
    pub market_id: String,
    /// Price in bridge-asset units per quote unit
    pub price: f64,
    /// Confidence volume, in quote units
    pub volume: f64,
}

impl MarketQuote {
    pub fn new(market_id: impl Into<String>, price: f64, volume: f64) -> Self {
        Self {
            market_id: market_id.into(),
            price,
            volume,
        }
    }

    /// Usable downstream: strictly positive finite price, non-negative volume
    pub fn is_valid(&self) -> bool {
        self.price.is_finite() && self.price > 0.0 && self.volume.is_finite() && self.volume >= 0.0
    }
}

/// Last feed published by the witness, read fresh every cycle
#[derive(Debug, Clone, PartialEq)]
pub struct WitnessPriceRecord {
    /// 0.0 when the witness never published a feed
    pub published_price: f64,
    pub last_update: DateTime<Utc>,
}

impl WitnessPriceRecord {
    /// Seconds elapsed since the last on-chain update
    pub fn age_secs(&self, now: DateTime<Utc>) -> i64 {
        (now - self.last_update).num_seconds()
    }
}
