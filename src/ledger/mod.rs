//! Ledger access
//!
//! Everything the engine reads from or writes to the chains: the witness's
//! last published feed, the commodity reference feed, the chain median and
//! the feed broadcast itself.

mod golos;

pub use golos::{parse_asset_amount, parse_exchange_rate, ChainLedger, ChainSymbols};

use async_trait::async_trait;

use crate::error::FeedResult;
use crate::types::WitnessPriceRecord;

#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Last feed published by `account`
    async fn read_witness(&self, account: &str) -> FeedResult<WitnessPriceRecord>;

    /// Settlement price of the reference commodity `asset`, in commodity
    /// units per bridge-asset unit
    async fn read_reference_feed(&self, asset: &str) -> FeedResult<f64>;

    /// Current median feed price of the chain; informational only
    async fn read_median_price(&self) -> FeedResult<f64>;

    /// Broadcast `price` (already formatted) against `quote_unit` on behalf
    /// of `account`. Failures are `FeedError::Broadcast`.
    async fn publish_feed(&self, account: &str, price: &str, quote_unit: &str) -> FeedResult<()>;
}
