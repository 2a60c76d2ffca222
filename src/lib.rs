//! witness-feed library
//!
//! Price discovery and publish decisions for a Golos witness price feed,
//! sourced from BitShares DEX order books.

pub mod config;
pub mod decision;
pub mod engine;
pub mod error;
pub mod exchange;
pub mod ledger;
pub mod oracle;
pub mod orderbook;
pub mod router;
pub mod rpc;
pub mod types;

pub use error::{FeedError, FeedResult};
