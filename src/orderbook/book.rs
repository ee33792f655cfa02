//! Core order book implementation
//!
//! Uses BTreeMap for sorted price level management. Prices are keyed by
//! their exact `f64` value; two prices are the same level only if they
//! compare equal.

use ordered_float::OrderedFloat;
use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::{BookSnapshot, OrderBookMetrics, PriceLevel, Side};
use crate::aggregator::{PriceState, TwoWayPrice};
use crate::error::{AggregatorError, Result};

/// A totals drop by more than this factor is treated as cancellation
const CANCELLATION_RATIO: f64 = 1e6;

/// Running Σ quantity and Σ price×quantity of one side
#[derive(Debug, Clone, Copy, Default)]
struct LevelTotals {
    amount: f64,
    value: f64,
}

impl LevelTotals {
    fn sum(levels: impl Iterator<Item = (f64, f64)>) -> Self {
        levels.fold(Self::default(), |totals, (price, quantity)| Self {
            amount: totals.amount + quantity,
            value: totals.value + price * quantity,
        })
    }

    /// Swap one level's quantity. Returns false when the subtraction
    /// cancelled most of the totals and they must be summed again.
    fn replace(&mut self, price: f64, old: Option<f64>, new: Option<f64>) -> bool {
        let mut exact = true;
        if let Some(quantity) = old {
            let before = *self;
            self.amount -= quantity;
            self.value -= price * quantity;
            exact = !cancelled(before.amount, self.amount) && !cancelled(before.value, self.value);
        }
        if let Some(quantity) = new {
            self.amount += quantity;
            self.value += price * quantity;
        }
        exact
    }
}

fn cancelled(before: f64, after: f64) -> bool {
    (after <= 0.0 && before > 0.0) || before.abs() > after.abs() * CANCELLATION_RATIO
}

/// Apply a level update to one side and keep its totals in step
fn set_level<K: Ord>(
    levels: &mut BTreeMap<K, f64>,
    totals: &mut LevelTotals,
    key: K,
    price: f64,
    quantity: f64,
    price_of: fn(&K) -> f64,
) {
    let (previous, current) = if quantity <= 0.0 {
        (levels.remove(&key), None)
    } else {
        (levels.insert(key, quantity), Some(quantity))
    };

    if levels.is_empty() {
        *totals = LevelTotals::default();
    } else if !totals.replace(price, previous, current) {
        *totals = LevelTotals::sum(levels.iter().map(|(k, q)| (price_of(k), *q)));
    }
}

/// Order book for a single (instrument, venue) pair
#[derive(Debug, Clone)]
pub struct OrderBook {
    instrument: Arc<str>,
    venue: Arc<str>,
    /// Bids sorted by price descending (highest first)
    bids: BTreeMap<Reverse<OrderedFloat<f64>>, f64>,
    /// Asks sorted by price ascending (lowest first)
    asks: BTreeMap<OrderedFloat<f64>, f64>,
    bid_totals: LevelTotals,
    ask_totals: LevelTotals,
    /// Whether this venue's prices are currently executable
    state: PriceState,
}

impl OrderBook {
    /// Create a new empty order book
    pub fn new(instrument: Arc<str>, venue: Arc<str>) -> Self {
        Self {
            instrument,
            venue,
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            bid_totals: LevelTotals::default(),
            ask_totals: LevelTotals::default(),
            state: PriceState::Firm,
        }
    }

    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    pub fn venue(&self) -> &str {
        &self.venue
    }

    pub fn state(&self) -> PriceState {
        self.state
    }

    pub fn set_state(&mut self, state: PriceState) {
        self.state = state;
    }

    /// Check an update without applying it.
    ///
    /// A non-positive quantity is a removal and is accepted for any price.
    pub fn validate_update(price: f64, quantity: f64) -> Result<()> {
        if !quantity.is_finite() {
            return Err(AggregatorError::InvalidInput(format!(
                "non-finite quantity {quantity} at price {price}"
            )));
        }
        if quantity > 0.0 && !price.is_finite() {
            return Err(AggregatorError::InvalidInput(format!(
                "non-finite price {price} for quantity {quantity}"
            )));
        }
        Ok(())
    }

    /// Set the quantity at a price level, removing the level when
    /// `quantity <= 0`.
    ///
    /// A repeated update at the same price overwrites the quantity.
    pub fn update_level(&mut self, side: Side, price: f64, quantity: f64) -> Result<()> {
        Self::validate_update(price, quantity)?;

        let key = OrderedFloat(price);
        match side {
            Side::Bid => set_level(
                &mut self.bids,
                &mut self.bid_totals,
                Reverse(key),
                price,
                quantity,
                |Reverse(p)| p.0,
            ),
            Side::Ask => set_level(
                &mut self.asks,
                &mut self.ask_totals,
                key,
                price,
                quantity,
                |p| p.0,
            ),
        }
        Ok(())
    }

    /// Bid levels, best (highest) first
    pub fn bids(&self) -> impl Iterator<Item = PriceLevel> + '_ {
        self.bids.iter().map(|(Reverse(p), q)| PriceLevel {
            price: p.0,
            quantity: *q,
        })
    }

    /// Ask levels, best (lowest) first
    pub fn asks(&self) -> impl Iterator<Item = PriceLevel> + '_ {
        self.asks.iter().map(|(p, q)| PriceLevel {
            price: p.0,
            quantity: *q,
        })
    }

    /// Snapshot of one side, best price first
    pub fn levels(&self, side: Side) -> Vec<PriceLevel> {
        match side {
            Side::Bid => self.bids().collect(),
            Side::Ask => self.asks().collect(),
        }
    }

    /// Get best bid price
    pub fn best_bid(&self) -> Option<f64> {
        self.bids.first_key_value().map(|(Reverse(p), _)| p.0)
    }

    /// Get best ask price
    pub fn best_ask(&self) -> Option<f64> {
        self.asks.first_key_value().map(|(p, _)| p.0)
    }

    pub fn level_count(&self, side: Side) -> usize {
        match side {
            Side::Bid => self.bids.len(),
            Side::Ask => self.asks.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    /// Total quantity and total price×quantity on one side
    fn side_totals(&self, side: Side) -> (f64, f64) {
        let totals = match side {
            Side::Bid => self.bid_totals,
            Side::Ask => self.ask_totals,
        };
        (totals.amount, totals.value)
    }

    /// Total quantity resting on one side
    pub fn depth(&self, side: Side) -> f64 {
        self.side_totals(side).0
    }

    /// Volume-weighted average price of one side.
    ///
    /// Returns `0.0` when the side holds no quantity.
    pub fn vwap(&self, side: Side) -> f64 {
        let (amount, value) = self.side_totals(side);
        if amount > 0.0 {
            value / amount
        } else {
            0.0
        }
    }

    /// This venue's contribution to the cross-venue aggregate.
    ///
    /// Prices are NaN for a side without quantity.
    pub fn two_way_price(&self) -> TwoWayPrice {
        let (bid_amount, bid_value) = self.side_totals(Side::Bid);
        let (offer_amount, offer_value) = self.side_totals(Side::Ask);

        TwoWayPrice {
            state: self.state,
            bid_price: if bid_amount > 0.0 {
                bid_value / bid_amount
            } else {
                f64::NAN
            },
            offer_price: if offer_amount > 0.0 {
                offer_value / offer_amount
            } else {
                f64::NAN
            },
            bid_amount,
            offer_amount,
        }
    }

    /// Calculate order book metrics
    pub fn metrics(&self) -> OrderBookMetrics {
        let (bid_depth, bid_value) = self.side_totals(Side::Bid);
        let (ask_depth, ask_value) = self.side_totals(Side::Ask);

        OrderBookMetrics {
            best_bid: self.best_bid(),
            best_ask: self.best_ask(),
            bid_vwap: (bid_depth > 0.0).then(|| bid_value / bid_depth),
            ask_vwap: (ask_depth > 0.0).then(|| ask_value / ask_depth),
            bid_depth,
            ask_depth,
            bid_levels: self.bids.len(),
            ask_levels: self.asks.len(),
        }
    }

    /// Copy the current state out of the book
    pub fn snapshot(&self) -> BookSnapshot {
        BookSnapshot {
            instrument: Arc::clone(&self.instrument),
            venue: Arc::clone(&self.venue),
            state: self.state,
            bids: self.levels(Side::Bid),
            asks: self.levels(Side::Ask),
            metrics: self.metrics(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_book() -> OrderBook {
        let mut book = OrderBook::new(Arc::from("AAPL"), Arc::from("VENUE-1"));
        book.update_level(Side::Bid, 100.0, 10.0).unwrap();
        book.update_level(Side::Bid, 99.0, 20.0).unwrap();
        book.update_level(Side::Ask, 101.0, 5.0).unwrap();
        book.update_level(Side::Ask, 102.0, 15.0).unwrap();
        book
    }

    fn prices(levels: &[PriceLevel]) -> Vec<f64> {
        levels.iter().map(|l| l.price).collect()
    }

    #[test]
    fn test_best_bid_ask() {
        let book = create_test_book();
        assert_eq!(book.best_bid(), Some(100.0));
        assert_eq!(book.best_ask(), Some(101.0));
    }

    #[test]
    fn test_update_existing_level_overwrites() {
        let mut book = create_test_book();
        book.update_level(Side::Bid, 100.0, 15.0).unwrap();

        let bids = book.levels(Side::Bid);
        assert_eq!(bids.len(), 2);
        assert_eq!(bids[0].quantity, 15.0);
    }

    #[test]
    fn test_remove_level() {
        let mut book = create_test_book();
        book.update_level(Side::Bid, 100.0, 0.0).unwrap();
        assert_eq!(prices(&book.levels(Side::Bid)), vec![99.0]);

        book.update_level(Side::Ask, 101.0, -1.0).unwrap();
        assert_eq!(prices(&book.levels(Side::Ask)), vec![102.0]);
    }

    #[test]
    fn test_remove_absent_level_is_noop() {
        let mut book = create_test_book();
        book.update_level(Side::Bid, 42.0, 0.0).unwrap();
        book.update_level(Side::Bid, 42.0, 0.0).unwrap();
        assert_eq!(book.level_count(Side::Bid), 2);
    }

    #[test]
    fn test_bids_descending_asks_ascending() {
        let mut book = OrderBook::new(Arc::from("AAPL"), Arc::from("VENUE-1"));
        for price in [100.0, 101.0, 99.0] {
            book.update_level(Side::Bid, price, 1.0).unwrap();
            book.update_level(Side::Ask, price, 1.0).unwrap();
        }
        assert_eq!(prices(&book.levels(Side::Bid)), vec![101.0, 100.0, 99.0]);
        assert_eq!(prices(&book.levels(Side::Ask)), vec![99.0, 100.0, 101.0]);
    }

    #[test]
    fn test_price_match_is_exact() {
        let mut book = OrderBook::new(Arc::from("AAPL"), Arc::from("VENUE-1"));
        book.update_level(Side::Bid, 0.3, 1.0).unwrap();
        book.update_level(Side::Bid, 0.1 + 0.2, 2.0).unwrap();
        assert_eq!(book.level_count(Side::Bid), 2);
    }

    #[test]
    fn test_vwap() {
        let book = create_test_book();
        // (100*10 + 99*20) / 30
        assert!((book.vwap(Side::Bid) - 2980.0 / 30.0).abs() < 1e-12);
        // (101*5 + 102*15) / 20
        assert!((book.vwap(Side::Ask) - 2035.0 / 20.0).abs() < 1e-12);
    }

    #[test]
    fn test_vwap_empty_side_is_zero() {
        let book = OrderBook::new(Arc::from("AAPL"), Arc::from("VENUE-1"));
        assert_eq!(book.vwap(Side::Bid), 0.0);
        assert_eq!(book.vwap(Side::Ask), 0.0);
    }

    #[test]
    fn test_two_way_price_undefined_side() {
        let mut book = OrderBook::new(Arc::from("AAPL"), Arc::from("VENUE-1"));
        book.update_level(Side::Bid, 100.0, 10.0).unwrap();

        let quote = book.two_way_price();
        assert_eq!(quote.state, PriceState::Firm);
        assert_eq!(quote.bid_price, 100.0);
        assert_eq!(quote.bid_amount, 10.0);
        assert!(quote.offer_price.is_nan());
        assert_eq!(quote.offer_amount, 0.0);
    }

    #[test]
    fn test_rejects_non_finite_add() {
        let mut book = create_test_book();
        assert!(book.update_level(Side::Bid, f64::NAN, 1.0).is_err());
        assert!(book.update_level(Side::Ask, f64::INFINITY, 1.0).is_err());
        assert!(book.update_level(Side::Bid, 100.0, f64::NAN).is_err());
        assert!(book.update_level(Side::Bid, 100.0, f64::INFINITY).is_err());
        // state unchanged
        assert_eq!(book.level_count(Side::Bid), 2);
        assert_eq!(book.levels(Side::Bid)[0].quantity, 10.0);
    }

    #[test]
    fn test_removal_with_nan_price_is_noop() {
        let mut book = create_test_book();
        book.update_level(Side::Bid, f64::NAN, 0.0).unwrap();
        assert_eq!(book.level_count(Side::Bid), 2);
    }

    #[test]
    fn test_metrics() {
        let book = create_test_book();
        let metrics = book.metrics();
        assert_eq!(metrics.bid_depth, 30.0);
        assert_eq!(metrics.ask_depth, 20.0);
        assert_eq!(metrics.bid_levels, 2);
        assert_eq!(metrics.ask_levels, 2);
        assert!(metrics.is_two_sided());
    }

    #[test]
    fn test_running_totals_match_levels() {
        let mut book = create_test_book();
        book.update_level(Side::Bid, 100.0, 12.5).unwrap();
        book.update_level(Side::Bid, 98.5, 3.0).unwrap();
        book.update_level(Side::Bid, 99.0, 0.0).unwrap();
        book.update_level(Side::Ask, 101.0, 0.0).unwrap();

        let bids = book.levels(Side::Bid);
        let depth: f64 = bids.iter().map(|l| l.quantity).sum();
        let value: f64 = bids.iter().map(|l| l.price * l.quantity).sum();
        assert!((book.depth(Side::Bid) - depth).abs() < 1e-12);
        assert!((book.vwap(Side::Bid) - value / depth).abs() < 1e-12);
        assert_eq!(book.depth(Side::Ask), 15.0);
        assert_eq!(book.vwap(Side::Ask), 102.0);
    }

    #[test]
    fn test_emptied_side_totals_reset() {
        let mut book = create_test_book();
        book.update_level(Side::Bid, 100.0, 0.0).unwrap();
        book.update_level(Side::Bid, 99.0, 0.0).unwrap();
        assert_eq!(book.depth(Side::Bid), 0.0);
        assert!(book.two_way_price().bid_price.is_nan());
    }

    #[test]
    fn test_small_level_survives_removal_of_huge_level() {
        let mut book = OrderBook::new(Arc::from("AAPL"), Arc::from("VENUE-1"));
        book.update_level(Side::Bid, 100.0, 1e17).unwrap();
        book.update_level(Side::Bid, 50.0, 1.0).unwrap();
        book.update_level(Side::Bid, 100.0, 0.0).unwrap();

        assert_eq!(book.depth(Side::Bid), 1.0);
        assert_eq!(book.vwap(Side::Bid), 50.0);

        // same cancellation through an overwrite
        book.update_level(Side::Ask, 101.0, 1e17).unwrap();
        book.update_level(Side::Ask, 102.0, 1.0).unwrap();
        book.update_level(Side::Ask, 101.0, 1.0).unwrap();
        assert_eq!(book.depth(Side::Ask), 2.0);
        assert_eq!(book.vwap(Side::Ask), 101.5);
    }

    #[test]
    fn test_many_updates_keep_order() {
        let mut book = OrderBook::new(Arc::from("AAPL"), Arc::from("VENUE-1"));
        for i in 0..1000 {
            book.update_level(Side::Bid, 100.0 + i as f64 * 0.01, (i + 1) as f64)
                .unwrap();
        }
        for i in 0..1000 {
            if i % 2 == 0 {
                book.update_level(Side::Bid, 100.0 + i as f64 * 0.01, 0.0)
                    .unwrap();
            }
        }

        let bids = book.levels(Side::Bid);
        assert_eq!(bids.len(), 500);
        assert!(bids.windows(2).all(|w| w[0].price > w[1].price));
    }
}
