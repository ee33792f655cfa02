//! Venue book collection
//!
//! Holds the order books of every venue quoting one instrument.

use std::sync::Arc;

use super::{BookSnapshot, OrderBook};

/// Order books for one instrument, indexed by venue ordinal
#[derive(Debug)]
pub struct VenueBooks {
    instrument: Arc<str>,
    books: Vec<Option<OrderBook>>,
    len: usize,
}

impl VenueBooks {
    pub fn new(instrument: Arc<str>) -> Self {
        Self {
            instrument,
            books: Vec::new(),
            len: 0,
        }
    }

    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    /// Get the book for a venue, creating it on first use.
    ///
    /// Returns the book and whether it was just created.
    pub fn get_or_create(&mut self, venue: usize, venue_id: &Arc<str>) -> (&mut OrderBook, bool) {
        if venue >= self.books.len() {
            self.books.resize_with(venue + 1, || None);
        }

        let slot = &mut self.books[venue];
        let created = slot.is_none();
        if created {
            self.len += 1;
        }
        let book = slot.get_or_insert_with(|| {
            OrderBook::new(Arc::clone(&self.instrument), Arc::clone(venue_id))
        });
        (book, created)
    }

    pub fn get(&self, venue: usize) -> Option<&OrderBook> {
        self.books.get(venue).and_then(Option::as_ref)
    }

    /// Books in venue ordinal order
    pub fn iter(&self) -> impl Iterator<Item = &OrderBook> {
        self.books.iter().flatten()
    }

    /// Get states of all books
    pub fn snapshots(&self) -> Vec<BookSnapshot> {
        self.iter().map(OrderBook::snapshot).collect()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
