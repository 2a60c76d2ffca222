//! Publish decision engine
//!
//! Decides per cycle whether the freshly computed price goes on-chain.
//! Two independent triggers are always both evaluated:
//! - staleness: the witness's last update is older than `max_age`
//! - drift: the relative change against the published price exceeds
//!   `threshold_pct`
//!
//! `force` publishes when neither fires; `dry_run` downgrades any publish to
//! a log-only `WouldPublish`, even when forced.

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use std::fmt;

use crate::error::{FeedError, FeedResult};
use crate::types::WitnessPriceRecord;

/// Fractional digits of the published exchange rate
pub const FEED_PRICE_DECIMALS: u32 = 3;
/// Quote side of the published exchange rate
pub const FEED_QUOTE_UNIT: &str = "1.000";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PublishReason {
    Stale,
    Drift,
    Forced,
}

impl fmt::Display for PublishReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublishReason::Stale => write!(f, "STALE"),
            PublishReason::Drift => write!(f, "DRIFT"),
            PublishReason::Forced => write!(f, "FORCED"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishDecision {
    Publish(PublishReason),
    /// Dry run: the feed would have been published
    WouldPublish(PublishReason),
    Skip,
}

impl PublishDecision {
    pub fn should_broadcast(&self) -> bool {
        matches!(self, PublishDecision::Publish(_))
    }
}

impl fmt::Display for PublishDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublishDecision::Publish(reason) => write!(f, "PUBLISH({})", reason),
            PublishDecision::WouldPublish(reason) => write!(f, "WOULD_PUBLISH({})", reason),
            PublishDecision::Skip => write!(f, "SKIP"),
        }
    }
}

/// Decision plus the trigger state that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionReport {
    pub decision: PublishDecision,
    pub stale: bool,
    pub drift: bool,
    pub relative_diff: f64,
    pub age_secs: i64,
}

/// Thresholds and flags, fixed for the lifetime of the process
#[derive(Debug, Clone)]
pub struct PublishDecisionEngine {
    /// Seconds
    pub max_age: i64,
    /// Relative fraction, 0.05 = 5%
    pub threshold_pct: f64,
    pub force: bool,
    pub dry_run: bool,
}

impl PublishDecisionEngine {
    pub fn new(max_age: i64, threshold_pct: f64, force: bool, dry_run: bool) -> Self {
        Self {
            max_age,
            threshold_pct,
            force,
            dry_run,
        }
    }

    pub fn evaluate(
        &self,
        computed_price: f64,
        record: &WitnessPriceRecord,
        now: DateTime<Utc>,
    ) -> FeedResult<DecisionReport> {
        if computed_price == 0.0 || !computed_price.is_finite() {
            return Err(FeedError::Computation(format!(
                "cannot compare against computed price {}",
                computed_price
            )));
        }

        let age_secs = record.age_secs(now);
        let stale = age_secs > self.max_age;
        if stale {
            tracing::info!(age_secs, max_age = self.max_age, "last price update older than max_age");
        }

        let relative_diff = (record.published_price / computed_price - 1.0).abs();
        let drift = relative_diff > self.threshold_pct;
        if drift {
            tracing::info!(
                relative_diff,
                threshold = self.threshold_pct,
                "price moved beyond threshold"
            );
        } else {
            tracing::debug!(relative_diff, "price difference is too low");
        }

        let decision = match (stale, drift) {
            (true, _) => PublishDecision::Publish(PublishReason::Stale),
            (false, true) => PublishDecision::Publish(PublishReason::Drift),
            (false, false) if self.force => PublishDecision::Publish(PublishReason::Forced),
            (false, false) => PublishDecision::Skip,
        };

        let decision = match decision {
            PublishDecision::Publish(reason) if self.dry_run => {
                PublishDecision::WouldPublish(reason)
            }
            other => other,
        };

        Ok(DecisionReport {
            decision,
            stale,
            drift,
            relative_diff,
            age_secs,
        })
    }
}

/// Price string for the exchange-rate base, exactly three decimals.
/// Rounds the exact binary value of `price`, so 0.1455 (stored as
/// 0.14549999..) gives "0.145".
pub fn format_feed_price(price: f64) -> FeedResult<String> {
    let decimal = Decimal::from_f64_retain(price)
        .filter(|d| d.is_sign_positive() && !d.is_zero())
        .ok_or_else(|| FeedError::Computation(format!("cannot publish price {}", price)))?;
    let rounded =
        decimal.round_dp_with_strategy(FEED_PRICE_DECIMALS, RoundingStrategy::MidpointNearestEven);
    Ok(format!("{:.3}", rounded))
}
