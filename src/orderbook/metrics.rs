//! Order book metrics

use serde::{Deserialize, Serialize};

/// Computed metrics for a single venue's order book
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderBookMetrics {
    pub best_bid: Option<f64>,

    pub best_ask: Option<f64>,

    /// Volume-weighted average bid price, `None` without bids
    pub bid_vwap: Option<f64>,

    /// Volume-weighted average ask price, `None` without asks
    pub ask_vwap: Option<f64>,

    /// Total bid depth (volume)
    pub bid_depth: f64,

    /// Total ask depth (volume)
    pub ask_depth: f64,

    /// Number of bid levels
    pub bid_levels: usize,

    /// Number of ask levels
    pub ask_levels: usize,
}

impl OrderBookMetrics {
    /// Check if both sides of the book hold quantity
    pub fn is_two_sided(&self) -> bool {
        self.bid_levels > 0 && self.ask_levels > 0
    }

    /// Spread between best ask and best bid
    pub fn spread(&self) -> Option<f64> {
        match (self.best_bid, self.best_ask) {
            (Some(bid), Some(ask)) => Some(ask - bid),
            _ => None,
        }
    }

    /// Get volume ratio (bid_depth / ask_depth)
    pub fn volume_ratio(&self) -> Option<f64> {
        if self.ask_depth > 0.0 {
            Some(self.bid_depth / self.ask_depth)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_metrics() {
        let metrics = OrderBookMetrics::default();
        assert!(!metrics.is_two_sided());
        assert_eq!(metrics.spread(), None);
        assert_eq!(metrics.volume_ratio(), None);
    }

    #[test]
    fn test_spread_and_ratio() {
        let metrics = OrderBookMetrics {
            best_bid: Some(100.0),
            best_ask: Some(100.5),
            bid_depth: 30.0,
            ask_depth: 15.0,
            bid_levels: 2,
            ask_levels: 1,
            ..Default::default()
        };
        assert_eq!(metrics.spread(), Some(0.5));
        assert_eq!(metrics.volume_ratio(), Some(2.0));
    }
}
