//! Oracle Aggregator - Combines per-market prices into one
//!
//! Each configured market contributes a `MarketQuote` (bridge price plus a
//! confidence volume). Markets without liquidity were already dropped by the
//! router; quotes that still violate the positive-price invariant are dropped
//! here. The remaining quotes are reduced with the configured statistic.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::{FeedError, FeedResult};
use crate::types::MarketQuote;

/// Statistic used to combine market prices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationMetric {
    Median,
    Mean,
    WeightedAverage,
}

impl Default for AggregationMetric {
    fn default() -> Self {
        AggregationMetric::Median
    }
}

impl FromStr for AggregationMetric {
    type Err = FeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "median" => Ok(AggregationMetric::Median),
            "mean" => Ok(AggregationMetric::Mean),
            "weighted_average" => Ok(AggregationMetric::WeightedAverage),
            other => Err(FeedError::Config(format!(
                "unsupported metric '{}', expected median, mean or weighted_average",
                other
            ))),
        }
    }
}

impl fmt::Display for AggregationMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregationMetric::Median => write!(f, "median"),
            AggregationMetric::Mean => write!(f, "mean"),
            AggregationMetric::WeightedAverage => write!(f, "weighted_average"),
        }
    }
}

/// Aggregated price from all usable markets
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedPrice {
    pub statistic: AggregationMetric,
    pub value: f64,
    /// Markets that contributed to `value`
    pub sources: Vec<String>,
}

/// Price aggregator over one cycle's market quotes
#[derive(Debug, Clone)]
pub struct PriceAggregator {
    metric: AggregationMetric,
}

impl PriceAggregator {
    pub fn new(metric: AggregationMetric) -> Self {
        Self { metric }
    }

    /// Combine quotes with the configured statistic.
    ///
    /// `configured` is the number of markets the cycle tried; it only feeds
    /// the `AllSourcesFailed` error.
    pub fn aggregate(&self, quotes: &[MarketQuote], configured: usize) -> FeedResult<AggregatedPrice> {
        let usable: Vec<&MarketQuote> = quotes.iter().filter(|q| q.is_valid()).collect();

        if usable.is_empty() {
            return Err(FeedError::AllSourcesFailed(configured.max(quotes.len())));
        }

        let prices: Vec<f64> = usable.iter().map(|q| q.price).collect();
        let value = match self.metric {
            AggregationMetric::Median => Self::median(&prices),
            AggregationMetric::Mean => Self::mean(&prices),
            AggregationMetric::WeightedAverage => Self::weighted_average(&usable)?,
        };

        Ok(AggregatedPrice {
            statistic: self.metric,
            value,
            sources: usable.iter().map(|q| q.market_id.clone()).collect(),
        })
    }

    /// Middle value; average of the two central values for an even count
    pub fn median(prices: &[f64]) -> f64 {
        let mut sorted = prices.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
        let mid = sorted.len() / 2;
        if sorted.len() % 2 == 0 {
            (sorted[mid - 1] + sorted[mid]) / 2.0
        } else {
            sorted[mid]
        }
    }

    pub fn mean(prices: &[f64]) -> f64 {
        prices.iter().sum::<f64>() / prices.len() as f64
    }

    /// Volume-weighted price; zero total volume cannot be weighted
    pub fn weighted_average(quotes: &[&MarketQuote]) -> FeedResult<f64> {
        let total_volume: f64 = quotes.iter().map(|q| q.volume).sum();
        if !(total_volume > 0.0) {
            return Err(FeedError::Computation(
                "total volume is zero, cannot compute weighted average".into(),
            ));
        }
        let weighted: f64 = quotes.iter().map(|q| q.price * q.volume).sum();
        Ok(weighted / total_volume)
    }
}

impl Default for PriceAggregator {
    fn default() -> Self {
        Self::new(AggregationMetric::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quote(market: &str, price: f64, volume: f64) -> MarketQuote {
        MarketQuote::new(market, price, volume)
    }

    #[test]
    fn test_weighted_average() {
        let aggregator = PriceAggregator::new(AggregationMetric::WeightedAverage);
        let result = aggregator
            .aggregate(&[quote("A/BTS", 2.0, 10.0), quote("B/BTS", 3.0, 30.0)], 2)
            .unwrap();
        assert!((result.value - 2.75).abs() < 1e-12);
        assert_eq!(result.statistic, AggregationMetric::WeightedAverage);
    }

    #[test]
    fn test_median_odd_and_even() {
        assert_eq!(PriceAggregator::median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(PriceAggregator::median(&[4.0, 1.0, 3.0, 2.0]), 2.5);
    }

    #[test]
    fn test_mean_ignores_volume() {
        let aggregator = PriceAggregator::new(AggregationMetric::Mean);
        let result = aggregator
            .aggregate(&[quote("A/BTS", 1.0, 1000.0), quote("B/BTS", 3.0, 1.0)], 2)
            .unwrap();
        assert_eq!(result.value, 2.0);
    }

    #[test]
    fn test_zero_total_volume_is_computation_error() {
        let aggregator = PriceAggregator::new(AggregationMetric::WeightedAverage);
        let result = aggregator.aggregate(&[quote("A/BTS", 2.0, 0.0), quote("B/BTS", 3.0, 0.0)], 2);
        assert!(matches!(result, Err(FeedError::Computation(_))));
    }

    #[test]
    fn test_invalid_quotes_are_excluded() {
        let aggregator = PriceAggregator::new(AggregationMetric::Median);
        let result = aggregator
            .aggregate(
                &[
                    quote("A/BTS", 0.0, 0.0),
                    quote("B/BTS", 5.0, 10.0),
                    quote("C/BTS", f64::NAN, 1.0),
                ],
                3,
            )
            .unwrap();
        assert_eq!(result.value, 5.0);
        assert_eq!(result.sources, vec!["B/BTS".to_string()]);
    }

    #[test]
    fn test_no_quotes_is_all_sources_failed() {
        let aggregator = PriceAggregator::default();
        assert_eq!(
            aggregator.aggregate(&[], 4),
            Err(FeedError::AllSourcesFailed(4))
        );
        assert_eq!(
            aggregator.aggregate(&[quote("A/BTS", 0.0, 0.0)], 1),
            Err(FeedError::AllSourcesFailed(1))
        );
    }

    #[test]
    fn test_metric_parsing() {
        assert_eq!(
            "weighted_average".parse::<AggregationMetric>().unwrap(),
            AggregationMetric::WeightedAverage
        );
        assert_eq!(" Median ".parse::<AggregationMetric>().unwrap(), AggregationMetric::Median);
        assert!(matches!(
            "vwap".parse::<AggregationMetric>(),
            Err(FeedError::Config(_))
        ));
    }
}
