//! Sharded aggregation service
//!
//! Instruments are partitioned across a fixed number of shards by hash.
//! Each shard is a task that exclusively owns a [`MarketDataRegistry`], so
//! every instrument has a single writer while different instruments are
//! processed in parallel. Callers talk to shards through bounded queues.

mod shard;

use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::aggregator::{PriceState, VwapTwoWayPrice};
use crate::config::Config;
use crate::error::Result;
use crate::orderbook::{BookSnapshot, Side};
use crate::registry::{BoxedListener, ListenerId, MarketDataRegistry};
use crate::telemetry::EngineMetrics;

/// Stream of aggregates for one instrument.
///
/// Slow receivers lose the oldest updates and observe
/// `RecvError::Lagged` with the number skipped.
pub type Subscription = broadcast::Receiver<VwapTwoWayPrice>;

/// One price level update from a venue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteUpdate {
    pub instrument: String,
    pub venue: String,
    pub side: Side,
    pub price: f64,
    pub quantity: f64,
}

impl QuoteUpdate {
    pub fn new(
        instrument: impl Into<String>,
        venue: impl Into<String>,
        side: Side,
        price: f64,
        quantity: f64,
    ) -> Self {
        Self {
            instrument: instrument.into(),
            venue: venue.into(),
            side,
            price,
            quantity,
        }
    }
}

pub(crate) enum Command {
    Update {
        update: QuoteUpdate,
        reply: Option<oneshot::Sender<Result<()>>>,
    },
    SetVenueState {
        instrument: String,
        venue: String,
        state: PriceState,
        reply: oneshot::Sender<Result<()>>,
    },
    Aggregate {
        instrument: String,
        reply: oneshot::Sender<Result<VwapTwoWayPrice>>,
    },
    Book {
        instrument: String,
        venue: String,
        reply: oneshot::Sender<Option<BookSnapshot>>,
    },
    Snapshot {
        instrument: String,
        reply: oneshot::Sender<Vec<BookSnapshot>>,
    },
    Subscribe {
        instrument: String,
        reply: oneshot::Sender<Subscription>,
    },
    RegisterListener {
        instrument: String,
        listener: BoxedListener,
        reply: oneshot::Sender<ListenerId>,
    },
    UnregisterListener {
        instrument: String,
        id: ListenerId,
        reply: oneshot::Sender<bool>,
    },
    Shutdown,
}

/// Running engine: owns the shard tasks
pub struct AggregationEngine {
    handle: EngineHandle,
    tasks: Vec<JoinHandle<()>>,
}

impl AggregationEngine {
    /// Spawn one task per shard on the current Tokio runtime
    pub fn start(config: &Config, metrics: EngineMetrics) -> Result<Self> {
        config.validate()?;

        let mut senders = Vec::with_capacity(config.shard_count);
        let mut tasks = Vec::with_capacity(config.shard_count);

        for index in 0..config.shard_count {
            let (tx, rx) = mpsc::channel(config.command_queue_capacity);
            let registry = MarketDataRegistry::with_metrics(config, metrics.clone());
            tasks.push(tokio::spawn(shard::run(
                index,
                registry,
                rx,
                config.subscriber_queue_capacity,
            )));
            senders.push(tx);
        }

        info!(shards = config.shard_count, "Aggregation engine started");
        Ok(Self {
            handle: EngineHandle {
                shards: senders.into(),
            },
            tasks,
        })
    }

    /// A cloneable handle for producers and consumers
    pub fn handle(&self) -> EngineHandle {
        self.handle.clone()
    }

    /// Stop every shard after it drains the commands already queued
    pub async fn shutdown(self) {
        for shard in self.handle.shards.iter() {
            // a shard that already stopped has nothing left to drain
            let _ = shard.send(Command::Shutdown).await;
        }
        for (index, task) in self.tasks.into_iter().enumerate() {
            if let Err(e) = task.await {
                error!(shard = index, error = %e, "Shard task failed");
            }
        }
        info!("Aggregation engine stopped");
    }
}

/// Cloneable front end to a running [`AggregationEngine`].
///
/// Senders wait when a shard's queue is full.
#[derive(Clone)]
pub struct EngineHandle {
    shards: Arc<[mpsc::Sender<Command>]>,
}

impl EngineHandle {
    fn shard(&self, instrument: &str) -> &mpsc::Sender<Command> {
        &self.shards[shard_index(instrument, self.shards.len())]
    }

    async fn request<T>(
        &self,
        instrument: &str,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.shard(instrument).send(command(reply)).await?;
        Ok(rx.await?)
    }

    /// Apply an update and wait for its outcome, including listener errors
    pub async fn update(&self, update: QuoteUpdate) -> Result<()> {
        let instrument = update.instrument.clone();
        self.request(&instrument, |reply| Command::Update {
            update,
            reply: Some(reply),
        })
        .await?
    }

    /// Queue an update without waiting; failures are logged by the shard
    pub async fn submit(&self, update: QuoteUpdate) -> Result<()> {
        self.shard(&update.instrument)
            .send(Command::Update {
                update,
                reply: None,
            })
            .await?;
        Ok(())
    }

    pub async fn set_venue_state(
        &self,
        instrument: &str,
        venue: &str,
        state: PriceState,
    ) -> Result<()> {
        self.request(instrument, |reply| Command::SetVenueState {
            instrument: instrument.to_string(),
            venue: venue.to_string(),
            state,
            reply,
        })
        .await?
    }

    pub async fn aggregate(&self, instrument: &str) -> Result<VwapTwoWayPrice> {
        self.request(instrument, |reply| Command::Aggregate {
            instrument: instrument.to_string(),
            reply,
        })
        .await?
    }

    pub async fn book(&self, instrument: &str, venue: &str) -> Result<Option<BookSnapshot>> {
        self.request(instrument, |reply| Command::Book {
            instrument: instrument.to_string(),
            venue: venue.to_string(),
            reply,
        })
        .await
    }

    pub async fn snapshot(&self, instrument: &str) -> Result<Vec<BookSnapshot>> {
        self.request(instrument, |reply| Command::Snapshot {
            instrument: instrument.to_string(),
            reply,
        })
        .await
    }

    /// Receive every aggregate of an instrument on another task
    pub async fn subscribe(&self, instrument: &str) -> Result<Subscription> {
        self.request(instrument, |reply| Command::Subscribe {
            instrument: instrument.to_string(),
            reply,
        })
        .await
    }

    /// Register a listener that runs on the instrument's shard
    pub async fn register_listener(
        &self,
        instrument: &str,
        listener: BoxedListener,
    ) -> Result<ListenerId> {
        self.request(instrument, |reply| Command::RegisterListener {
            instrument: instrument.to_string(),
            listener,
            reply,
        })
        .await
    }

    pub async fn unregister_listener(&self, instrument: &str, id: ListenerId) -> Result<bool> {
        self.request(instrument, |reply| Command::UnregisterListener {
            instrument: instrument.to_string(),
            id,
            reply,
        })
        .await
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }
}

/// Stable shard assignment of an instrument. `shard_count` is never 0:
/// `AggregationEngine::start` rejects that configuration.
pub(crate) fn shard_index(instrument: &str, shard_count: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    instrument.hash(&mut hasher);
    (hasher.finish() % shard_count as u64) as usize
}
