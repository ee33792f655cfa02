//! VWAP calculator over all instruments
//!
//! Instruments and venues are addressed by dense ordinals handed out by the
//! owner (the registry), so the hot path is two vector lookups.

use std::sync::Arc;
use tracing::trace;

use super::{AggregationState, PriceHandle, ResultPool, TwoWayPrice, VwapTwoWayPrice};
use crate::error::{AggregatorError, Result};

/// Maintains the cross-venue aggregate of every registered instrument.
///
/// Not synchronized: one owner applies all updates of its instruments.
#[derive(Debug)]
pub struct VwapAggregator {
    names: Vec<Arc<str>>,
    states: Vec<AggregationState>,
    pool: ResultPool,
}

impl VwapAggregator {
    pub fn new(pool_size_per_instrument: usize) -> Self {
        Self {
            names: Vec::new(),
            states: Vec::new(),
            pool: ResultPool::new(pool_size_per_instrument),
        }
    }

    /// Start tracking an instrument and return its ordinal
    pub fn register_instrument(&mut self, instrument: Arc<str>) -> usize {
        let index = self.pool.register(Arc::clone(&instrument));
        self.names.push(instrument);
        self.states.push(AggregationState::new());
        debug_assert_eq!(index, self.states.len() - 1);
        index
    }

    /// Apply a venue's latest two-way price and render the new aggregate.
    ///
    /// The returned handle must go back through [`VwapAggregator::release`].
    pub fn apply_market_update(
        &mut self,
        instrument: usize,
        venue: usize,
        price: TwoWayPrice,
    ) -> Result<PriceHandle> {
        price.validate()?;

        let state = self.states.get_mut(instrument).ok_or_else(|| {
            AggregatorError::InvalidInput(format!("instrument #{instrument} is not registered"))
        })?;
        state.apply(venue, price);

        let mut handle = self.pool.acquire(instrument)?;
        if let Some(out) = self.pool.get_mut(&mut handle) {
            state.write_into(out);
            trace!(
                instrument = %out.instrument,
                venue,
                state = ?out.state,
                bid = out.bid_price,
                offer = out.offer_price,
                bid_amount = out.bid_amount,
                offer_amount = out.offer_amount,
                "Aggregate updated"
            );
        }
        Ok(handle)
    }

    /// Read the result behind a handle issued by this aggregator
    pub fn get<'a>(&'a self, handle: &'a PriceHandle) -> Option<&'a VwapTwoWayPrice> {
        self.pool.get(handle)
    }

    pub fn release(&mut self, handle: PriceHandle) -> Result<()> {
        self.pool.release(handle)
    }

    /// Current aggregate of an instrument.
    ///
    /// Fails with `NoData` until at least one venue has quoted a defined
    /// bid or offer.
    pub fn aggregate(&self, instrument: usize) -> Result<VwapTwoWayPrice> {
        let (name, state) = self
            .names
            .get(instrument)
            .zip(self.states.get(instrument))
            .ok_or_else(|| AggregatorError::no_data(&format!("#{instrument}")))?;

        if !state.has_contributed() {
            return Err(AggregatorError::no_data(name));
        }

        let mut out = VwapTwoWayPrice::new(Arc::clone(name));
        state.write_into(&mut out);
        Ok(out)
    }

    pub fn state(&self, instrument: usize) -> Option<&AggregationState> {
        self.states.get(instrument)
    }

    pub fn pool(&self) -> &ResultPool {
        &self.pool
    }

    pub fn instrument_count(&self) -> usize {
        self.states.len()
    }
}
