//! Order book sampler
//!
//! Walks one side of a snapshot and returns an executable price and volume.
//! Two modes:
//! - depth percent: every level inside a price band from the top of book,
//!   hard cutoff at the band edge
//! - target amount: consume levels until a requested amount is filled,
//!   partially filling the last level
//!
//! An empty side or a walk that consumes nothing yields `None` ("no data").

use crate::error::{FeedError, FeedResult};
use crate::orderbook::OrderBookSnapshot;
use crate::types::BookSide;

/// Executable price over a walked slice of the book
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceSample {
    /// BASE per QUOTE
    pub price: f64,
    pub volume: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Leg {
    Quote,
    Base,
}

impl OrderBookSnapshot {
    /// Price and quote volume for the levels within `depth_pct` percent of
    /// the best price on `side`.
    ///
    /// The maker fee is applied to the accumulated quote leg: multiplied on
    /// the bid side, divided on the ask side. Reported volume is that
    /// fee-adjusted quote amount.
    pub fn walk_by_depth(&self, side: BookSide, depth_pct: f64) -> FeedResult<Option<PriceSample>> {
        if !(depth_pct > 0.0) || !depth_pct.is_finite() {
            return Err(FeedError::InvalidArgument(format!(
                "depth_pct must be greater than 0, got {}",
                depth_pct
            )));
        }

        let (levels, fee) = self.side(side);
        let top = match levels.first() {
            Some(level) => level.price,
            None => return Ok(None),
        };

        let band = 1.0 + depth_pct / 100.0;
        let stop_price = match side {
            BookSide::Bid => top / band,
            BookSide::Ask => top * band,
        };

        let mut quote_amount = 0.0;
        let mut base_amount = 0.0;
        for level in levels {
            let inside = match side {
                BookSide::Bid => level.price > stop_price,
                BookSide::Ask => level.price < stop_price,
            };
            if !inside {
                break;
            }
            quote_amount += level.quote_amount;
            base_amount += level.base_amount;
        }

        match side {
            BookSide::Bid => quote_amount *= 1.0 + fee,
            BookSide::Ask => quote_amount /= 1.0 + fee,
        }

        if quote_amount <= 0.0 {
            return Ok(None);
        }

        Ok(Some(PriceSample {
            price: base_amount / quote_amount,
            volume: quote_amount,
        }))
    }

    /// Price for filling a target amount on `side`.
    ///
    /// Exactly one of `quote_amount` / `base_amount` is expected. When both
    /// are given, a bid walk favors the base leg and an ask walk favors the
    /// quote leg, unless the other amount is strictly larger. The target is
    /// grossed up by the maker fee before walking.
    pub fn walk_by_amount(
        &self,
        side: BookSide,
        quote_amount: f64,
        base_amount: f64,
    ) -> FeedResult<Option<PriceSample>> {
        let quote_amount = positive_or_zero(quote_amount, "quote_amount")?;
        let base_amount = positive_or_zero(base_amount, "base_amount")?;
        if quote_amount == 0.0 && base_amount == 0.0 {
            return Err(FeedError::InvalidArgument(
                "quote_amount or base_amount must be given".to_string(),
            ));
        }

        let leg = match side {
            BookSide::Bid if base_amount >= quote_amount => Leg::Base,
            BookSide::Bid => Leg::Quote,
            BookSide::Ask if quote_amount >= base_amount => Leg::Quote,
            BookSide::Ask => Leg::Base,
        };
        let requested = match leg {
            Leg::Quote => quote_amount,
            Leg::Base => base_amount,
        };

        let (levels, fee) = self.side(side);
        let mut missing = requested * (1.0 + fee);
        let mut consumed_quote = 0.0;
        let mut consumed_base = 0.0;

        for level in levels {
            if missing <= 0.0 {
                break;
            }
            let available = match leg {
                Leg::Quote => level.quote_amount,
                Leg::Base => level.base_amount,
            };

            if available <= missing {
                consumed_quote += level.quote_amount;
                consumed_base += level.base_amount;
                missing -= available;
            } else {
                match leg {
                    Leg::Quote => {
                        consumed_quote += missing;
                        consumed_base += missing * level.price;
                    }
                    Leg::Base => {
                        consumed_base += missing;
                        consumed_quote += missing / level.price;
                    }
                }
                break;
            }
        }

        if consumed_quote <= 0.0 {
            return Ok(None);
        }

        let volume = match leg {
            Leg::Quote => consumed_quote,
            Leg::Base => consumed_base,
        };

        Ok(Some(PriceSample {
            price: consumed_base / consumed_quote,
            volume,
        }))
    }
}

fn positive_or_zero(value: f64, name: &str) -> FeedResult<f64> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(FeedError::InvalidArgument(format!(
            "{} must be a non-negative number, got {}",
            name, value
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orderbook::OrderLevel;
    use crate::types::MarketPair;

    fn level(price: f64, quote: f64) -> OrderLevel {
        OrderLevel::new(price, quote, price * quote)
    }

    fn book(bids: Vec<OrderLevel>, asks: Vec<OrderLevel>, fee: f64) -> OrderBookSnapshot {
        OrderBookSnapshot::new(MarketPair::new("GOLOS", "BTS"), bids, asks, fee, fee)
    }

    #[test]
    fn test_depth_rejects_non_positive() {
        let b = book(vec![level(1.0, 1.0)], vec![], 0.0);
        assert!(matches!(
            b.walk_by_depth(BookSide::Bid, 0.0),
            Err(FeedError::InvalidArgument(_))
        ));
        assert!(matches!(
            b.walk_by_depth(BookSide::Ask, -5.0),
            Err(FeedError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_depth_empty_book_is_no_data() {
        let b = book(vec![], vec![], 0.0);
        assert_eq!(b.walk_by_depth(BookSide::Bid, 10.0).unwrap(), None);
        assert_eq!(b.walk_by_depth(BookSide::Ask, 10.0).unwrap(), None);
    }

    #[test]
    fn test_depth_bid_excludes_levels_past_stop() {
        // stop = 1.0 / 1.1 = 0.909..; 0.95 inside, 0.9 and 0.5 outside
        let b = book(
            vec![
                level(1.0, 10.0),
                level(0.95, 10.0),
                level(0.9, 100.0),
                level(0.5, 1000.0),
            ],
            vec![],
            0.0,
        );
        let sample = b.walk_by_depth(BookSide::Bid, 10.0).unwrap().unwrap();
        assert!((sample.volume - 20.0).abs() < 1e-12);
        assert!((sample.price - 19.5 / 20.0).abs() < 1e-12);
    }

    #[test]
    fn test_depth_bid_never_includes_stop_crossing_level() {
        let prices = [2.0, 1.9, 1.85, 1.81, 1.8, 1.7, 1.2];
        let b = book(prices.iter().map(|p| level(*p, 1.0)).collect(), vec![], 0.0);
        for depth in [1.0, 5.0, 10.0, 11.0, 50.0] {
            let stop = 2.0 / (1.0 + depth / 100.0);
            let expected: Vec<f64> = prices.iter().copied().filter(|p| *p > stop).collect();
            let sample = b.walk_by_depth(BookSide::Bid, depth).unwrap().unwrap();
            assert!((sample.volume - expected.len() as f64).abs() < 1e-12);
            let base: f64 = expected.iter().sum();
            assert!((sample.price - base / expected.len() as f64).abs() < 1e-12);
        }
    }

    #[test]
    fn test_depth_ask_cutoff() {
        // stop = 1.0 * 1.05; everything from 1.06 on is excluded
        let b = book(
            vec![],
            vec![level(1.0, 5.0), level(1.04, 5.0), level(1.06, 5.0), level(1.01, 0.0)],
            0.0,
        );
        let sample = b.walk_by_depth(BookSide::Ask, 5.0).unwrap().unwrap();
        assert!((sample.volume - 10.0).abs() < 1e-12);
        assert!((sample.price - 1.02).abs() < 1e-12);
    }

    #[test]
    fn test_depth_fee_direction() {
        let b = book(vec![level(1.0, 100.0)], vec![level(1.0, 100.0)], 0.01);

        let bid = b.walk_by_depth(BookSide::Bid, 1.0).unwrap().unwrap();
        assert!((bid.volume - 101.0).abs() < 1e-9);
        assert!((bid.price - 100.0 / 101.0).abs() < 1e-12);

        let ask = b.walk_by_depth(BookSide::Ask, 1.0).unwrap().unwrap();
        assert!((ask.volume - 100.0 / 1.01).abs() < 1e-9);
        assert!((ask.price - 1.01).abs() < 1e-12);
    }

    #[test]
    fn test_amount_requires_some_amount() {
        let b = book(vec![level(1.0, 1.0)], vec![level(1.1, 1.0)], 0.0);
        assert!(matches!(
            b.walk_by_amount(BookSide::Bid, 0.0, 0.0),
            Err(FeedError::InvalidArgument(_))
        ));
        assert!(matches!(
            b.walk_by_amount(BookSide::Ask, -1.0, 0.0),
            Err(FeedError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_amount_partial_fill_on_quote_leg() {
        let b = book(vec![], vec![level(1.0, 10.0), level(2.0, 10.0)], 0.0);
        let sample = b.walk_by_amount(BookSide::Ask, 15.0, 0.0).unwrap().unwrap();
        // 10 @ 1.0 fully, then 5 of the 2.0 level
        assert!((sample.volume - 15.0).abs() < 1e-12);
        assert!((sample.price - 20.0 / 15.0).abs() < 1e-12);
    }

    #[test]
    fn test_amount_partial_fill_on_base_leg() {
        let b = book(vec![level(2.0, 10.0), level(1.0, 10.0)], vec![], 0.0);
        // base target 30: 20 base from first level, then 10 base (10 quote) at 1.0
        let sample = b.walk_by_amount(BookSide::Bid, 0.0, 30.0).unwrap().unwrap();
        assert!((sample.volume - 30.0).abs() < 1e-12);
        assert!((sample.price - 30.0 / 20.0).abs() < 1e-12);
    }

    #[test]
    fn test_amount_leg_preference() {
        let b = book(vec![level(2.0, 100.0)], vec![level(2.0, 100.0)], 0.0);
        // equal amounts: bid favors base, ask favors quote
        let bid = b.walk_by_amount(BookSide::Bid, 5.0, 5.0).unwrap().unwrap();
        let ask = b.walk_by_amount(BookSide::Ask, 5.0, 5.0).unwrap().unwrap();
        assert!((bid.volume - 5.0).abs() < 1e-12);
        assert!((ask.volume - 5.0).abs() < 1e-12);
        // bid consumed 5 base = 2.5 quote; ask consumed 5 quote
        assert!((bid.price - 2.0).abs() < 1e-12);
        assert!((ask.price - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_amount_fee_grosses_up_target() {
        let b = book(vec![], vec![level(1.0, 100.0)], 0.1);
        let sample = b.walk_by_amount(BookSide::Ask, 10.0, 0.0).unwrap().unwrap();
        assert!((sample.volume - 11.0).abs() < 1e-9);
    }

    #[test]
    fn test_amount_empty_side_is_no_data() {
        let b = book(vec![], vec![], 0.0);
        assert_eq!(b.walk_by_amount(BookSide::Bid, 1.0, 0.0).unwrap(), None);
    }
}
