//! Cross-venue VWAP aggregation engine
//!
//! This crate maintains per-venue order books for each instrument and a
//! cross-venue volume-weighted average bid and offer that is updated
//! incrementally on every price level change.

pub mod aggregator;
pub mod config;
pub mod engine;
pub mod error;
pub mod orderbook;
pub mod registry;
pub mod telemetry;

pub use aggregator::{
    AggregationState, PriceHandle, PriceState, ResultPool, SideTotals, TwoWayPrice,
    VwapAggregator, VwapTwoWayPrice,
};
pub use config::Config;
pub use engine::{AggregationEngine, EngineHandle, QuoteUpdate, Subscription};
pub use error::{AggregatorError, ListenerError, Result};
pub use orderbook::{BookSnapshot, OrderBook, OrderBookMetrics, PriceLevel, Side, VenueBooks};
pub use registry::{listener_fn, BoxedListener, ListenerId, MarketDataRegistry, UpdateListener};
pub use telemetry::EngineMetrics;
