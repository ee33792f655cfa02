//! Order book module
//!
//! Maintains per-venue price levels for each instrument.

mod book;
mod manager;
mod metrics;

pub use book::OrderBook;
pub use manager::VenueBooks;
pub use metrics::OrderBookMetrics;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::aggregator::PriceState;
use crate::error::AggregatorError;

/// Side of the order book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Bid,
    Ask,
}

impl FromStr for Side {
    type Err = AggregatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("bid") || s.eq_ignore_ascii_case("buy") {
            Ok(Side::Bid)
        } else if s.eq_ignore_ascii_case("ask")
            || s.eq_ignore_ascii_case("offer")
            || s.eq_ignore_ascii_case("sell")
        {
            Ok(Side::Ask)
        } else {
            Err(AggregatorError::InvalidInput(format!("unknown side: {s:?}")))
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Bid => f.write_str("bid"),
            Side::Ask => f.write_str("ask"),
        }
    }
}

/// A single level in the order book
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: f64,
    pub quantity: f64,
}

/// Read-only copy of one venue's book, for inspection and debugging
#[derive(Debug, Clone, Serialize)]
pub struct BookSnapshot {
    pub instrument: Arc<str>,
    pub venue: Arc<str>,
    pub state: PriceState,
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
    pub metrics: OrderBookMetrics,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_side_case_insensitive() {
        assert_eq!("bid".parse::<Side>().unwrap(), Side::Bid);
        assert_eq!("BID".parse::<Side>().unwrap(), Side::Bid);
        assert_eq!("Ask".parse::<Side>().unwrap(), Side::Ask);
        assert_eq!("offer".parse::<Side>().unwrap(), Side::Ask);
        assert_eq!("sell".parse::<Side>().unwrap(), Side::Ask);
    }

    #[test]
    fn test_parse_unknown_side() {
        assert!(matches!(
            "mid".parse::<Side>(),
            Err(AggregatorError::InvalidInput(_))
        ));
    }
}
