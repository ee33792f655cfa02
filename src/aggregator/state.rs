//! Per-instrument running totals

use serde::Serialize;

use super::{PriceState, TwoWayPrice, VwapTwoWayPrice};

/// A totals drop by more than this factor is treated as cancellation
const CANCELLATION_RATIO: f64 = 1e6;

/// Running totals for one side of the aggregate
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SideTotals {
    /// Σ amount over contributing venues
    pub amount: f64,
    /// Σ price×amount over contributing venues
    pub value: f64,
    /// Number of venues with a defined price on this side
    pub contributors: usize,
}

impl SideTotals {
    fn add(&mut self, price: f64, amount: f64) {
        if amount > 0.0 && !price.is_nan() {
            self.amount += amount;
            self.value += price * amount;
            self.contributors += 1;
        }
    }

    /// Returns false when the subtraction cancelled most of the totals,
    /// leaving them too imprecise to keep.
    fn remove(&mut self, price: f64, amount: f64) -> bool {
        if !(amount > 0.0 && !price.is_nan()) {
            return true;
        }

        self.contributors -= 1;
        if self.contributors == 0 {
            // drop accumulated rounding residue with the last contributor
            self.amount = 0.0;
            self.value = 0.0;
            return true;
        }

        let before = *self;
        self.amount -= amount;
        self.value -= price * amount;
        self.amount > 0.0
            && before.amount <= self.amount * CANCELLATION_RATIO
            && before.value.abs() <= self.value.abs() * CANCELLATION_RATIO
    }

    pub fn vwap(&self) -> f64 {
        if self.amount > 0.0 {
            self.value / self.amount
        } else {
            f64::NAN
        }
    }
}

/// Aggregation state of one instrument across venues
#[derive(Debug, Clone, Default)]
pub struct AggregationState {
    /// Latest contribution per venue ordinal
    venues: Vec<Option<TwoWayPrice>>,
    venue_count: usize,
    bid: SideTotals,
    offer: SideTotals,
    has_indicative: bool,
    /// Set once any venue has quoted a defined bid or offer
    contributed: bool,
    rescans: u64,
    rebuilds: u64,
}

impl AggregationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a venue's contribution, adjusting the totals by the delta.
    pub fn apply(&mut self, venue: usize, price: TwoWayPrice) {
        if venue >= self.venues.len() {
            self.venues.resize(venue + 1, None);
        }

        let previous = self.venues[venue].replace(price);
        if previous.is_none() {
            self.venue_count += 1;
        }

        if price.state == PriceState::Indicative {
            self.has_indicative = true;
        } else if previous.is_some_and(|p| p.state == PriceState::Indicative) {
            self.rescan_indicative();
        }

        self.contributed |= price.has_bid() || price.has_offer();

        let mut exact = true;
        if let Some(old) = previous {
            exact &= self.bid.remove(old.bid_price, old.bid_amount);
            exact &= self.offer.remove(old.offer_price, old.offer_amount);
        }
        if exact {
            self.bid.add(price.bid_price, price.bid_amount);
            self.offer.add(price.offer_price, price.offer_amount);
        } else {
            // the new price is already stored, so the sum includes it
            let (bid, offer, _) = self.recompute();
            self.bid = bid;
            self.offer = offer;
            self.rebuilds += 1;
        }
    }

    /// The only non-constant step: runs when a venue stops being indicative.
    fn rescan_indicative(&mut self) {
        self.rescans += 1;
        self.has_indicative = self
            .venues
            .iter()
            .flatten()
            .any(|p| p.state == PriceState::Indicative);
    }

    /// Render the aggregate into a (possibly pooled) result object
    pub fn write_into(&self, out: &mut VwapTwoWayPrice) {
        out.update(
            self.state(),
            self.bid.vwap(),
            self.offer.vwap(),
            self.bid.amount,
            self.offer.amount,
        );
    }

    pub fn state(&self) -> PriceState {
        if self.has_indicative {
            PriceState::Indicative
        } else {
            PriceState::Firm
        }
    }

    /// Whether any venue has contributed, even an empty price
    pub fn has_venues(&self) -> bool {
        self.venue_count > 0
    }

    /// Whether any venue has ever quoted a defined bid or offer.
    ///
    /// Stays set after that data is deleted again.
    pub fn has_contributed(&self) -> bool {
        self.contributed
    }

    pub fn venue_count(&self) -> usize {
        self.venue_count
    }

    pub fn venue_price(&self, venue: usize) -> Option<&TwoWayPrice> {
        self.venues.get(venue).and_then(Option::as_ref)
    }

    pub fn bid_totals(&self) -> SideTotals {
        self.bid
    }

    pub fn offer_totals(&self) -> SideTotals {
        self.offer
    }

    /// Number of full indicative rescans performed so far
    pub fn rescan_count(&self) -> u64 {
        self.rescans
    }

    /// Number of times the totals were summed again after cancellation
    pub fn rebuild_count(&self) -> u64 {
        self.rebuilds
    }

    /// Rebuild the totals from the stored venue prices, ignoring the
    /// running values.
    pub fn recompute(&self) -> (SideTotals, SideTotals, PriceState) {
        let mut bid = SideTotals::default();
        let mut offer = SideTotals::default();
        let mut indicative = false;
        for price in self.venues.iter().flatten() {
            bid.add(price.bid_price, price.bid_amount);
            offer.add(price.offer_price, price.offer_amount);
            indicative |= price.state == PriceState::Indicative;
        }
        let state = if indicative {
            PriceState::Indicative
        } else {
            PriceState::Firm
        };
        (bid, offer, state)
    }
}
