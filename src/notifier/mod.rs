//! In-process event notifier for product lifecycle events.
//!
//! Handlers subscribe per [`ProductEventKind`]. `emit` runs them in
//! subscription order and waits for all of them; `publish` does the same on
//! a spawned task and returns immediately. Callers emit only after the write
//! that produced the event has committed.

pub mod nats;

pub use nats::NatsForwarder;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::domain::{ProductEvent, ProductEventKind};

/// Receives product events. Implementations must not fail the emitter: log and move on.
#[async_trait]
pub trait ProductEventHandler: Send + Sync {
    fn name(&self) -> &'static str;

    async fn handle(&self, event: &ProductEvent);
}

type Handlers = HashMap<ProductEventKind, Vec<Arc<dyn ProductEventHandler>>>;

#[derive(Clone, Default)]
pub struct EventBus {
    handlers: Arc<RwLock<Handlers>>,
}

impl EventBus {
    pub fn new() -> Self { Self::default() }

    pub fn subscribe(&self, kind: ProductEventKind, handler: Arc<dyn ProductEventHandler>) {
        let mut handlers = self.handlers.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        debug!(handler = handler.name(), event = kind.as_str(), "handler subscribed");
        handlers.entry(kind).or_default().push(handler);
    }

    pub fn subscribe_all(&self, handler: Arc<dyn ProductEventHandler>) {
        for kind in [ProductEventKind::Created, ProductEventKind::StatusChanged, ProductEventKind::Deleted, ProductEventKind::StoreDeleted] {
            self.subscribe(kind, handler.clone());
        }
    }

    fn handlers_for(&self, kind: ProductEventKind) -> Vec<Arc<dyn ProductEventHandler>> {
        let handlers = self.handlers.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        handlers.get(&kind).cloned().unwrap_or_default()
    }

    pub async fn emit(&self, event: ProductEvent) {
        let handlers = self.handlers_for(event.kind());
        debug!(event = event.kind().as_str(), handlers = handlers.len(), "emitting");
        for handler in handlers {
            handler.handle(&event).await;
        }
    }

    /// Fire-and-forget variant of [`Self::emit`].
    pub fn publish(&self, event: ProductEvent) -> JoinHandle<()> {
        let bus = self.clone();
        tokio::spawn(async move { bus.emit(event).await })
    }
}
