//! Error types for the VWAP aggregation engine

use thiserror::Error;

use crate::registry::ListenerId;

/// Error returned by an update listener.
///
/// Listeners are downstream code, so the engine only carries their message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ListenerError(pub String);

impl ListenerError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

/// Aggregation engine errors
#[derive(Error, Debug)]
pub enum AggregatorError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("No price data available for instrument: {instrument}")]
    NoData { instrument: String },

    #[error("Result pool misuse: {0}")]
    PoolMisuse(String),

    #[error("Listener {listener} failed for instrument {instrument}: {source}")]
    ListenerFailed {
        instrument: String,
        listener: ListenerId,
        #[source]
        source: ListenerError,
    },

    #[error("Aggregation engine is shut down")]
    EngineClosed,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Metrics error: {0}")]
    MetricsError(String),
}

impl AggregatorError {
    /// Whether the caller may resend a corrected request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AggregatorError::InvalidInput(_))
    }

    pub(crate) fn no_data(instrument: &str) -> Self {
        AggregatorError::NoData {
            instrument: instrument.to_string(),
        }
    }
}

impl From<prometheus::Error> for AggregatorError {
    fn from(err: prometheus::Error) -> Self {
        AggregatorError::MetricsError(err.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for AggregatorError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        AggregatorError::EngineClosed
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for AggregatorError {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        AggregatorError::EngineClosed
    }
}

pub type Result<T> = std::result::Result<T, AggregatorError>;
