//! Cross-venue VWAP aggregation
//!
//! Every venue contributes a [`TwoWayPrice`] derived from its book. The
//! aggregator keeps running totals per instrument so that a new
//! contribution only costs the removal of the venue's previous one plus
//! the addition of the new one.

mod calculator;
mod pool;
mod state;

pub use calculator::VwapAggregator;
pub use pool::{PriceHandle, ResultPool};
pub use state::{AggregationState, SideTotals};

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{AggregatorError, Result};

/// Whether a price is executable or advisory only
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PriceState {
    #[default]
    Firm,
    Indicative,
}

/// One venue's contribution for an instrument.
///
/// `bid_price`/`offer_price` are NaN when the matching amount is zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TwoWayPrice {
    pub state: PriceState,
    pub bid_price: f64,
    pub offer_price: f64,
    pub bid_amount: f64,
    pub offer_amount: f64,
}

impl TwoWayPrice {
    pub fn new(
        state: PriceState,
        bid_price: f64,
        offer_price: f64,
        bid_amount: f64,
        offer_amount: f64,
    ) -> Self {
        Self {
            state,
            bid_price,
            offer_price,
            bid_amount,
            offer_amount,
        }
    }

    /// A contribution with no bid and no offer
    pub fn empty(state: PriceState) -> Self {
        Self::new(state, f64::NAN, f64::NAN, 0.0, 0.0)
    }

    pub fn has_bid(&self) -> bool {
        self.bid_amount > 0.0 && !self.bid_price.is_nan()
    }

    pub fn has_offer(&self) -> bool {
        self.offer_amount > 0.0 && !self.offer_price.is_nan()
    }

    /// Reject contributions that would poison the running totals
    pub fn validate(&self) -> Result<()> {
        for (name, price, amount) in [
            ("bid", self.bid_price, self.bid_amount),
            ("offer", self.offer_price, self.offer_amount),
        ] {
            if amount.is_nan() || amount.is_infinite() || amount < 0.0 {
                return Err(AggregatorError::InvalidInput(format!(
                    "{name} amount must be finite and non-negative, got {amount}"
                )));
            }
            if amount > 0.0 && !price.is_finite() {
                return Err(AggregatorError::InvalidInput(format!(
                    "non-finite {name} price {price} for amount {amount}"
                )));
            }
        }
        Ok(())
    }
}

/// Aggregate VWAP of an instrument across all venues.
///
/// Instances handed to listeners are pooled and rewritten in place on the
/// next update; clone one to keep it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VwapTwoWayPrice {
    pub instrument: Arc<str>,
    pub state: PriceState,
    pub bid_price: f64,
    pub offer_price: f64,
    pub bid_amount: f64,
    pub offer_amount: f64,
}

impl VwapTwoWayPrice {
    pub fn new(instrument: Arc<str>) -> Self {
        Self {
            instrument,
            state: PriceState::Firm,
            bid_price: f64::NAN,
            offer_price: f64::NAN,
            bid_amount: 0.0,
            offer_amount: 0.0,
        }
    }

    /// Overwrite every value, keeping the instrument
    pub fn update(
        &mut self,
        state: PriceState,
        bid_price: f64,
        offer_price: f64,
        bid_amount: f64,
        offer_amount: f64,
    ) -> &mut Self {
        self.state = state;
        self.bid_price = bid_price;
        self.offer_price = offer_price;
        self.bid_amount = bid_amount;
        self.offer_amount = offer_amount;
        self
    }

    /// Aggregate bid VWAP, `None` when no venue bids
    pub fn bid(&self) -> Option<f64> {
        (!self.bid_price.is_nan()).then_some(self.bid_price)
    }

    /// Aggregate offer VWAP, `None` when no venue offers
    pub fn offer(&self) -> Option<f64> {
        (!self.offer_price.is_nan()).then_some(self.offer_price)
    }

    pub fn is_indicative(&self) -> bool {
        self.state == PriceState::Indicative
    }
}
