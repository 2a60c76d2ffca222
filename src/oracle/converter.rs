//! Feed converter
//!
//! Turns the aggregate bridge-asset price into the feed's target unit using
//! the bridge chain's commodity settlement price.

use serde::{Deserialize, Serialize};

use crate::error::{FeedError, FeedResult};

pub const GRAMS_PER_TROY_OUNCE: f64 = 31.1034768;

/// Mass unit the target asset is pegged to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MassUnit {
    Gram,
    Milligram,
}

impl MassUnit {
    pub fn per_gram(&self) -> f64 {
        match self {
            MassUnit::Gram => 1.0,
            MassUnit::Milligram => 1000.0,
        }
    }
}

impl Default for MassUnit {
    fn default() -> Self {
        MassUnit::Milligram
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FeedConverter {
    unit: MassUnit,
}

impl FeedConverter {
    pub fn new(unit: MassUnit) -> Self {
        Self { unit }
    }

    /// `aggregate` is bridge units per quote asset; `reference` is troy
    /// ounces of the commodity per bridge unit. Returns target units per
    /// quote asset.
    pub fn convert(&self, aggregate: f64, reference: f64) -> FeedResult<f64> {
        if !(aggregate > 0.0) || !aggregate.is_finite() {
            return Err(FeedError::Computation(format!(
                "aggregate price must be positive, got {}",
                aggregate
            )));
        }
        if !(reference > 0.0) || !reference.is_finite() {
            return Err(FeedError::Computation(format!(
                "reference settlement price must be positive, got {}",
                reference
            )));
        }

        let units_per_bridge = reference * GRAMS_PER_TROY_OUNCE * self.unit.per_gram();
        Ok(aggregate * units_per_bridge)
    }
}

impl Default for FeedConverter {
    fn default() -> Self {
        Self::new(MassUnit::default())
    }
}
