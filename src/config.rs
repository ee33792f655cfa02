//! Configuration module for the aggregation engine

use serde::Deserialize;

use crate::error::{AggregatorError, Result};

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Pooled result objects preallocated per instrument (0 disables pooling)
    pub pool_size_per_instrument: usize,

    /// Number of single-writer shards instruments are partitioned across
    pub shard_count: usize,

    /// Bounded command queue per shard; senders wait when it is full
    pub command_queue_capacity: usize,

    /// Per-instrument subscriber buffer; the oldest update is dropped on overflow
    pub subscriber_queue_capacity: usize,

    /// Emit logs as JSON instead of plain text
    pub log_json: bool,
}

impl Config {
    /// Load configuration from `.env` and `VWAP_*` environment variables
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("VWAP").try_parsing(true))
            .build()?
            .try_deserialize::<Config>()?;

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.shard_count == 0 {
            return Err(AggregatorError::ConfigError(
                "shard_count must be at least 1".to_string(),
            ));
        }
        if self.command_queue_capacity == 0 {
            return Err(AggregatorError::ConfigError(
                "command_queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.subscriber_queue_capacity == 0 {
            return Err(AggregatorError::ConfigError(
                "subscriber_queue_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_pool_size(mut self, pool_size_per_instrument: usize) -> Self {
        self.pool_size_per_instrument = pool_size_per_instrument;
        self
    }

    pub fn with_shards(mut self, shard_count: usize) -> Self {
        self.shard_count = shard_count;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pool_size_per_instrument: 2,
            shard_count: 4,
            command_queue_capacity: 4096,
            subscriber_queue_capacity: 1024,
            log_json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_zero_shards_rejected() {
        let config = Config::default().with_shards(0);
        assert!(matches!(
            config.validate(),
            Err(AggregatorError::ConfigError(_))
        ));
    }

    #[test]
    fn test_zero_pool_is_allowed() {
        let config = Config::default().with_pool_size(0);
        assert!(config.validate().is_ok());
        assert_eq!(config.pool_size_per_instrument, 0);
    }

    #[test]
    fn test_zero_subscriber_queue_rejected() {
        let config = Config {
            subscriber_queue_capacity: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_environment() {
        std::env::set_var("VWAP_SHARD_COUNT", "3");
        std::env::set_var("VWAP_LOG_JSON", "true");
        let config = Config::load().unwrap();
        std::env::remove_var("VWAP_SHARD_COUNT");
        std::env::remove_var("VWAP_LOG_JSON");

        assert_eq!(config.shard_count, 3);
        assert!(config.log_json);
        assert_eq!(config.subscriber_queue_capacity, 1024);
    }

    #[test]
    fn test_deserialize_partial_uses_defaults() {
        let config: Config = serde_json::from_str(r#"{"shard_count": 8}"#).unwrap();
        assert_eq!(config.shard_count, 8);
        assert_eq!(config.pool_size_per_instrument, 2);
        assert_eq!(config.command_queue_capacity, 4096);
        assert!(!config.log_json);
    }
}
