//! ChattyBank Core
//!
//! Conversation dispatch and the runtime loop that feeds it from the event bus.

pub mod actions;
pub mod context;
pub mod dispatcher;
pub mod render;

pub use actions::{ActionKind, ActionTable};
pub use context::{ContextStore, InMemoryContextStore};
pub use dispatcher::Dispatcher;

use anyhow::Result;
use chattybank_config::Config;
use chattybank_dialog::WatsonConversation;
use chattybank_ipc::{EventBus, InboundBatch, OutboundMessage};
use chattybank_offers::ProductCatalog;
use std::sync::Arc;
use tokio::sync::{broadcast, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const MAX_INBOUND_CONCURRENCY: usize = 8;

pub struct ChattyRuntime {
    dispatcher: Arc<Dispatcher>,
    event_bus: EventBus,
}

impl ChattyRuntime {
    pub fn new(dispatcher: Dispatcher, event_bus: EventBus) -> Self {
        Self {
            dispatcher: Arc::new(dispatcher),
            event_bus,
        }
    }

    /// Wires the hosted dialog service, the product catalog and an in-memory
    /// context store from configuration.
    pub fn from_config(config: &Config, event_bus: EventBus) -> Result<Self> {
        let oracle = Arc::new(WatsonConversation::new(&config.dialog)?);
        let catalog = Arc::new(ProductCatalog::new(&config.offers)?);
        let store = Arc::new(InMemoryContextStore::new());
        let actions = ActionTable::new(&config.actions);
        info!("Action table loaded with {} entries", actions.len());

        let dispatcher = Dispatcher::new(
            oracle,
            catalog,
            store,
            actions,
            config.server.server_url.trim_end_matches('/'),
        );
        Ok(Self::new(dispatcher, event_bus))
    }

    /// Subscribes to inbound batches before returning, so anything published
    /// after this call is processed.
    pub fn spawn(&self) -> JoinHandle<()> {
        let inbound_rx = self.event_bus.subscribe();
        let outbound = self.event_bus.outbound_sender();
        let dispatcher = Arc::clone(&self.dispatcher);
        tokio::spawn(Self::process_batches(inbound_rx, outbound, dispatcher))
    }

    async fn process_batches(
        mut inbound_rx: broadcast::Receiver<InboundBatch>,
        outbound: broadcast::Sender<OutboundMessage>,
        dispatcher: Arc<Dispatcher>,
    ) {
        info!("ChattyBank runtime started");
        let semaphore = Arc::new(Semaphore::new(MAX_INBOUND_CONCURRENCY));

        loop {
            match inbound_rx.recv().await {
                Ok(batch) => {
                    let dispatcher = Arc::clone(&dispatcher);
                    let outbound = outbound.clone();
                    let semaphore = Arc::clone(&semaphore);

                    tokio::spawn(async move {
                        let _permit = match semaphore.acquire_owned().await {
                            Ok(permit) => permit,
                            Err(err) => {
                                error!(
                                    "Inbound worker semaphore closed (trace_id={}): {}",
                                    batch.trace_id, err
                                );
                                return;
                            }
                        };
                        Self::process_batch(batch, &dispatcher, &outbound).await;
                    });
                }
                Err(broadcast::error::RecvError::Closed) => {
                    info!("Event bus closed, stopping message processor");
                    break;
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Event bus lagged by {} batches", n);
                }
            }
        }
    }

    // Events of one delivery are handled strictly in order.
    async fn process_batch(
        batch: InboundBatch,
        dispatcher: &Dispatcher,
        outbound: &broadcast::Sender<OutboundMessage>,
    ) {
        for event in &batch.events {
            debug!(
                trace_id = %batch.trace_id,
                sender = %event.sender_id,
                kind = event.kind.label(),
                "Dispatching event"
            );
            for message in dispatcher.dispatch(event).await {
                if let Err(e) = outbound.send(message) {
                    warn!(
                        "Failed to queue outbound message (trace_id={}): {}",
                        batch.trace_id, e
                    );
                }
            }
        }
    }
}
