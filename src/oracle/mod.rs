//! Oracle module - price aggregation and unit conversion
//!
//! Reduces the per-market quotes of one cycle to a single bridge-asset price
//! and converts it into the unit the feed is published in.

mod aggregator;
mod converter;

pub use aggregator::{AggregatedPrice, AggregationMetric, PriceAggregator};
pub use converter::{FeedConverter, MassUnit, GRAMS_PER_TROY_OUNCE};
