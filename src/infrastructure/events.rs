//! Domain event publishing over NATS.

use crate::domain::events::DomainEvent;

/// Publishes domain events when a NATS connection is configured; otherwise a
/// no-op. Publishing never fails the caller.
#[derive(Clone, Debug, Default)]
pub struct EventBus {
    nats: Option<async_nats::Client>,
    prefix: String,
}

impl EventBus {
    pub fn new(nats: Option<async_nats::Client>, prefix: impl Into<String>) -> Self {
        Self { nats, prefix: prefix.into() }
    }

    pub fn disabled() -> Self { Self::default() }

    pub async fn publish(&self, event: &DomainEvent) {
        let Some(client) = &self.nats else { return };

        let subject = format!("{}.{}", self.prefix, event.subject());
        let payload = match serde_json::to_vec(event) {
            Ok(payload) => payload,
            Err(e) => { tracing::warn!(error = %e, %subject, "could not encode event"); return; }
        };

        if let Err(e) = client.publish(subject.clone(), payload.into()).await {
            tracing::warn!(error = %e, %subject, "event publish failed");
        }
    }

    pub async fn publish_all(&self, events: &[DomainEvent]) {
        for event in events {
            self.publish(event).await;
        }
    }
}
