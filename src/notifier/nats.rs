//! Forwards product events to NATS so other services (search indexing,
//! storefront cache) can follow catalog changes.

use async_trait::async_trait;
use tracing::{trace, warn};

use super::ProductEventHandler;
use crate::domain::ProductEvent;

pub const DEFAULT_SUBJECT_PREFIX: &str = "products.events";

pub struct NatsForwarder {
    client: async_nats::Client,
    prefix: String,
}

impl NatsForwarder {
    pub fn new(client: async_nats::Client) -> Self {
        Self::with_prefix(client, DEFAULT_SUBJECT_PREFIX)
    }

    pub fn with_prefix(client: async_nats::Client, prefix: impl Into<String>) -> Self {
        Self { client, prefix: prefix.into() }
    }

    pub fn subject(&self, event: &ProductEvent) -> String {
        format!("{}.{}", self.prefix, event.kind().as_str())
    }
}

#[async_trait]
impl ProductEventHandler for NatsForwarder {
    fn name(&self) -> &'static str { "nats-forwarder" }

    async fn handle(&self, event: &ProductEvent) {
        let payload = match serde_json::to_vec(event) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "failed to encode product event");
                return;
            }
        };
        let subject = self.subject(event);
        match self.client.publish(subject.clone(), payload.into()).await {
            Ok(()) => trace!(%subject, "product event forwarded"),
            Err(e) => warn!(%subject, error = %e, "failed to forward product event"),
        }
    }
}
