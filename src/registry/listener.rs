//! Update listeners
//!
//! Listeners are called synchronously on the thread that applied the update,
//! in registration order.

use std::fmt;

use crate::aggregator::VwapTwoWayPrice;
use crate::error::ListenerError;

/// Identifies a registered listener so it can be removed later
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    pub(crate) fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Receives the new aggregate of an instrument after every change.
///
/// `price` is only valid for the duration of the call; clone it to keep it.
#[cfg_attr(test, mockall::automock)]
pub trait UpdateListener {
    fn on_update(&mut self, instrument: &str, price: &VwapTwoWayPrice) -> Result<(), ListenerError>;
}

/// Listener as stored by the registry
pub type BoxedListener = Box<dyn UpdateListener + Send>;

/// Adapts a closure into an [`UpdateListener`]
pub struct FnListener<F>(F);

impl<F> UpdateListener for FnListener<F>
where
    F: FnMut(&str, &VwapTwoWayPrice) -> Result<(), ListenerError>,
{
    fn on_update(
        &mut self,
        instrument: &str,
        price: &VwapTwoWayPrice,
    ) -> Result<(), ListenerError> {
        (self.0)(instrument, price)
    }
}

/// Wrap a closure as a boxed listener
pub fn listener_fn<F>(f: F) -> BoxedListener
where
    F: FnMut(&str, &VwapTwoWayPrice) -> Result<(), ListenerError> + Send + 'static,
{
    Box::new(FnListener(f))
}
