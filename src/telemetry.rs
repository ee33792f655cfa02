//! Logging and metrics setup

use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::{AggregatorError, Result};

/// Initialize the global tracing subscriber.
///
/// Honours `RUST_LOG`, defaulting to INFO. Returns an error if a subscriber
/// is already installed.
pub fn init_tracing(json: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::from_default_env().add_directive(Level::INFO.into());

    if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().compact())
            .with(filter)
            .try_init()?;
    }
    Ok(())
}

/// Engine counters, shared by every shard
#[derive(Debug, Clone)]
pub struct EngineMetrics {
    pub updates_applied: IntCounter,
    pub updates_rejected: IntCounter,
    pub listener_failures: IntCounter,
    pub instruments: IntGauge,
    pub books: IntGauge,
}

impl EngineMetrics {
    /// Create metrics that are not exported anywhere
    pub fn new() -> Result<Self> {
        Ok(Self {
            updates_applied: IntCounter::new(
                "vwap_updates_applied_total",
                "Price level updates applied to a book and aggregated",
            )?,
            updates_rejected: IntCounter::new(
                "vwap_updates_rejected_total",
                "Price level updates rejected as invalid",
            )?,
            listener_failures: IntCounter::new(
                "vwap_listener_failures_total",
                "Listener calls that returned an error",
            )?,
            instruments: IntGauge::new("vwap_instruments", "Instruments tracked")?,
            books: IntGauge::new("vwap_books", "Per-venue order books tracked")?,
        })
    }

    /// Create metrics and register them for export
    pub fn register(registry: &Registry) -> Result<Self> {
        let metrics = Self::new()?;
        registry.register(Box::new(metrics.updates_applied.clone()))?;
        registry.register(Box::new(metrics.updates_rejected.clone()))?;
        registry.register(Box::new(metrics.listener_failures.clone()))?;
        registry.register(Box::new(metrics.instruments.clone()))?;
        registry.register(Box::new(metrics.books.clone()))?;
        Ok(metrics)
    }
}

/// Text exposition of everything in `registry`
pub fn render(registry: &Registry) -> Result<String> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&registry.gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| AggregatorError::MetricsError(e.to_string()))
}
