//! Error taxonomy for the feed pipeline
//!
//! Source-level failures (`Network`, `NotFound`, per-market `Computation`)
//! exclude one market and let the cycle continue. `Config` and
//! `AllSourcesFailed` abort the cycle before any broadcast.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FeedError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("computation error: {0}")]
    Computation(String),

    #[error("all {0} configured markets failed to produce a price")]
    AllSourcesFailed(usize),

    #[error("broadcast failed: {0}")]
    Broadcast(String),
}

impl FeedError {
    /// Whether the failure is scoped to one source and the cycle may go on
    /// without it.
    pub fn is_source_level(&self) -> bool {
        matches!(
            self,
            FeedError::Network(_) | FeedError::NotFound(_) | FeedError::Computation(_)
        )
    }
}

pub type FeedResult<T> = std::result::Result<T, FeedError>;
