//! Shard task: the single writer of its instruments

use std::collections::HashMap;
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};

use super::Command;
use crate::aggregator::VwapTwoWayPrice;
use crate::registry::{listener_fn, MarketDataRegistry};

pub(super) async fn run(
    index: usize,
    mut registry: MarketDataRegistry,
    mut commands: mpsc::Receiver<Command>,
    subscriber_capacity: usize,
) {
    info!(shard = index, "Shard started");
    let mut subscribers: HashMap<String, broadcast::Sender<VwapTwoWayPrice>> = HashMap::new();

    while let Some(command) = commands.recv().await {
        match command {
            Command::Update { update, reply } => {
                let result = registry.update(
                    &update.instrument,
                    &update.venue,
                    update.side,
                    update.price,
                    update.quantity,
                );
                match reply {
                    // the caller may have given up waiting
                    Some(reply) => {
                        let _ = reply.send(result);
                    }
                    None => {
                        if let Err(e) = result {
                            warn!(
                                shard = index,
                                instrument = %update.instrument,
                                venue = %update.venue,
                                error = %e,
                                "Queued update failed"
                            );
                        }
                    }
                }
            }
            Command::SetVenueState {
                instrument,
                venue,
                state,
                reply,
            } => {
                let _ = reply.send(registry.set_venue_state(&instrument, &venue, state));
            }
            Command::Aggregate { instrument, reply } => {
                let _ = reply.send(registry.get_aggregate(&instrument));
            }
            Command::Book {
                instrument,
                venue,
                reply,
            } => {
                let book = registry
                    .get_book(&instrument, &venue)
                    .map(|book| book.snapshot());
                let _ = reply.send(book);
            }
            Command::Snapshot { instrument, reply } => {
                let _ = reply.send(registry.snapshot(&instrument));
            }
            Command::Subscribe { instrument, reply } => {
                let sender = subscribers.entry(instrument).or_insert_with_key(|instrument| {
                    let (tx, _) = broadcast::channel(subscriber_capacity);
                    let forward = tx.clone();
                    registry.register_listener(
                        instrument,
                        listener_fn(move |_, price| {
                            // no live receivers is not a listener failure
                            let _ = forward.send(price.clone());
                            Ok(())
                        }),
                    );
                    tx
                });
                let _ = reply.send(sender.subscribe());
            }
            Command::RegisterListener {
                instrument,
                listener,
                reply,
            } => {
                let _ = reply.send(registry.register_listener(&instrument, listener));
            }
            Command::UnregisterListener {
                instrument,
                id,
                reply,
            } => {
                let _ = reply.send(registry.unregister_listener(&instrument, id));
            }
            Command::Shutdown => break,
        }
    }

    info!(shard = index, "Shard stopped");
}
