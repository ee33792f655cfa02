//! Market data registry
//!
//! Routes price level updates to per-venue books, feeds each venue's new
//! two-way price to the aggregator and notifies the instrument's listeners.
//! A registry is a single writer: every instrument it holds is updated
//! from one thread at a time.

mod listener;

pub use listener::{listener_fn, BoxedListener, FnListener, ListenerId, UpdateListener};

#[cfg(test)]
pub use listener::MockUpdateListener;

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::aggregator::{
    AggregationState, PriceHandle, PriceState, ResultPool, TwoWayPrice, VwapAggregator,
    VwapTwoWayPrice,
};
use crate::config::Config;
use crate::error::{AggregatorError, Result};
use crate::orderbook::{BookSnapshot, OrderBook, Side, VenueBooks};
use crate::telemetry::EngineMetrics;

/// Books, aggregates and listeners for a set of instruments
pub struct MarketDataRegistry {
    instrument_index: HashMap<Arc<str>, usize>,
    venue_index: HashMap<Arc<str>, usize>,
    venue_names: Vec<Arc<str>>,
    /// Per instrument ordinal
    books: Vec<VenueBooks>,
    /// Per instrument ordinal, in registration order
    listeners: Vec<Vec<(ListenerId, BoxedListener)>>,
    aggregator: VwapAggregator,
    next_listener: u64,
    metrics: EngineMetrics,
}

impl MarketDataRegistry {
    /// Create an empty registry with private metrics
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self::with_metrics(config, EngineMetrics::new()?))
    }

    pub fn with_metrics(config: &Config, metrics: EngineMetrics) -> Self {
        Self {
            instrument_index: HashMap::new(),
            venue_index: HashMap::new(),
            venue_names: Vec::new(),
            books: Vec::new(),
            listeners: Vec::new(),
            aggregator: VwapAggregator::new(config.pool_size_per_instrument),
            next_listener: 0,
            metrics,
        }
    }

    fn intern_instrument(&mut self, instrument_id: &str) -> usize {
        if let Some(&index) = self.instrument_index.get(instrument_id) {
            return index;
        }

        let name: Arc<str> = Arc::from(instrument_id);
        let index = self.aggregator.register_instrument(Arc::clone(&name));
        self.books.push(VenueBooks::new(Arc::clone(&name)));
        self.listeners.push(Vec::new());
        self.instrument_index.insert(name, index);
        self.metrics.instruments.inc();
        debug!(instrument = instrument_id, index, "Tracking new instrument");
        index
    }

    fn intern_venue(&mut self, venue_id: &str) -> usize {
        if let Some(&index) = self.venue_index.get(venue_id) {
            return index;
        }

        let name: Arc<str> = Arc::from(venue_id);
        let index = self.venue_names.len();
        self.venue_names.push(Arc::clone(&name));
        self.venue_index.insert(name, index);
        index
    }

    /// Ordinals of a book that already exists
    fn book_ordinals(&self, instrument_id: &str, venue_id: &str) -> Option<(usize, usize)> {
        let &instrument = self.instrument_index.get(instrument_id)?;
        let &venue = self.venue_index.get(venue_id)?;
        self.books[instrument].get(venue).map(|_| (instrument, venue))
    }

    fn book_mut(&mut self, instrument: usize, venue: usize) -> &mut OrderBook {
        let (book, created) = self.books[instrument].get_or_create(venue, &self.venue_names[venue]);
        if created {
            self.metrics.books.inc();
            debug!(
                instrument = book.instrument(),
                venue = book.venue(),
                "Created order book"
            );
        }
        book
    }

    /// Apply one price level update from a venue.
    ///
    /// `quantity <= 0` removes the level. Invalid input is rejected before
    /// any state changes. Listeners run after the aggregate is updated; the
    /// first failing listener stops dispatch and its error is returned.
    pub fn update(
        &mut self,
        instrument_id: &str,
        venue_id: &str,
        side: Side,
        price: f64,
        quantity: f64,
    ) -> Result<()> {
        if let Err(err) = OrderBook::validate_update(price, quantity) {
            self.metrics.updates_rejected.inc();
            warn!(
                instrument = instrument_id,
                venue = venue_id,
                %side,
                price,
                quantity,
                error = %err,
                "Rejected update"
            );
            return Err(err);
        }

        if quantity <= 0.0 && self.book_ordinals(instrument_id, venue_id).is_none() {
            debug!(
                instrument = instrument_id,
                venue = venue_id,
                %side,
                price,
                "Ignoring removal from a book that does not exist"
            );
            return Ok(());
        }

        let instrument = self.intern_instrument(instrument_id);
        let venue = self.intern_venue(venue_id);

        let book = self.book_mut(instrument, venue);
        book.update_level(side, price, quantity)?;
        let quote = book.two_way_price();

        self.metrics.updates_applied.inc();
        self.publish(instrument, venue, quote)
    }

    /// Mark a venue's prices for an instrument as firm or indicative.
    ///
    /// The venue's contribution is re-aggregated and listeners are notified
    /// as for a price update. `NoData` if the venue has no book for the
    /// instrument yet; nothing is created in that case.
    pub fn set_venue_state(
        &mut self,
        instrument_id: &str,
        venue_id: &str,
        state: PriceState,
    ) -> Result<()> {
        let (instrument, venue) = self
            .book_ordinals(instrument_id, venue_id)
            .ok_or_else(|| AggregatorError::no_data(instrument_id))?;

        let book = self.book_mut(instrument, venue);
        book.set_state(state);
        let quote = book.two_way_price();

        self.publish(instrument, venue, quote)
    }

    fn publish(&mut self, instrument: usize, venue: usize, quote: TwoWayPrice) -> Result<()> {
        let handle = self.aggregator.apply_market_update(instrument, venue, quote)?;
        let dispatched = self.dispatch(instrument, &handle);
        let released = self.aggregator.release(handle);
        dispatched.and(released)
    }

    fn dispatch(&mut self, instrument: usize, handle: &PriceHandle) -> Result<()> {
        let Some(price) = self.aggregator.get(handle) else {
            return Ok(());
        };

        for (id, listener) in self.listeners[instrument].iter_mut() {
            if let Err(source) = listener.on_update(&price.instrument, price) {
                self.metrics.listener_failures.inc();
                warn!(
                    instrument = %price.instrument,
                    listener = %id,
                    error = %source,
                    "Listener failed"
                );
                return Err(AggregatorError::ListenerFailed {
                    instrument: price.instrument.to_string(),
                    listener: *id,
                    source,
                });
            }
        }
        Ok(())
    }

    /// Add a listener for an instrument; listeners run in registration order
    pub fn register_listener(
        &mut self,
        instrument_id: &str,
        listener: BoxedListener,
    ) -> ListenerId {
        let instrument = self.intern_instrument(instrument_id);
        let id = ListenerId::from_raw(self.next_listener);
        self.next_listener += 1;
        self.listeners[instrument].push((id, listener));
        debug!(instrument = instrument_id, listener = %id, "Registered listener");
        id
    }

    /// Remove a listener. Returns false if it was not registered for the
    /// instrument.
    pub fn unregister_listener(&mut self, instrument_id: &str, id: ListenerId) -> bool {
        let Some(&instrument) = self.instrument_index.get(instrument_id) else {
            return false;
        };

        let listeners = &mut self.listeners[instrument];
        match listeners.iter().position(|(registered, _)| *registered == id) {
            Some(position) => {
                listeners.remove(position);
                debug!(instrument = instrument_id, listener = %id, "Unregistered listener");
                true
            }
            None => false,
        }
    }

    pub fn listener_count(&self, instrument_id: &str) -> usize {
        self.instrument_index
            .get(instrument_id)
            .map(|&i| self.listeners[i].len())
            .unwrap_or(0)
    }

    /// Current aggregate VWAP of an instrument.
    ///
    /// `NoData` if no venue has contributed to the instrument yet.
    pub fn get_aggregate(&self, instrument_id: &str) -> Result<VwapTwoWayPrice> {
        let &instrument = self
            .instrument_index
            .get(instrument_id)
            .ok_or_else(|| AggregatorError::no_data(instrument_id))?;
        self.aggregator.aggregate(instrument)
    }

    /// One venue's book for an instrument
    pub fn get_book(&self, instrument_id: &str, venue_id: &str) -> Option<&OrderBook> {
        let (instrument, venue) = self.book_ordinals(instrument_id, venue_id)?;
        self.books[instrument].get(venue)
    }

    /// All venue books of an instrument
    pub fn books(&self, instrument_id: &str) -> Option<&VenueBooks> {
        let &instrument = self.instrument_index.get(instrument_id)?;
        Some(&self.books[instrument])
    }

    /// Copies of every venue book of an instrument, empty if unknown
    pub fn snapshot(&self, instrument_id: &str) -> Vec<BookSnapshot> {
        self.books(instrument_id)
            .map(VenueBooks::snapshots)
            .unwrap_or_default()
    }

    pub fn aggregation_state(&self, instrument_id: &str) -> Option<&AggregationState> {
        let &instrument = self.instrument_index.get(instrument_id)?;
        self.aggregator.state(instrument)
    }

    /// Instruments in the order they were first seen
    pub fn instruments(&self) -> impl Iterator<Item = &str> {
        self.books.iter().map(VenueBooks::instrument)
    }

    /// Venues quoting an instrument
    pub fn venues(&self, instrument_id: &str) -> Vec<&str> {
        self.books(instrument_id)
            .map(|books| books.iter().map(OrderBook::venue).collect())
            .unwrap_or_default()
    }

    pub fn pool(&self) -> &ResultPool {
        self.aggregator.pool()
    }

    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }
}
