//! Queue transport: hand-off to an asynchronous broker.
//!
//! Success means the broker acknowledged the hand-off, not that any
//! consumer processed the message — the broker and its consumers are
//! external collaborators. The in-process [`ChannelBroker`] implements
//! the broker contract over named bounded channels for single-process
//! deployments and tests.

use crate::transports::{DeliveryRequest, DeliveryResult, TransportAdapter};
use async_trait::async_trait;
use compact_str::CompactString;
use grcev_sdk::objects::QueueMessage;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;
use tokio::sync::mpsc;

/// Queue used when a subscription leaves its endpoint blank.
pub const DEFAULT_QUEUE_NAME: &str = "default-grc-events";

/// Buffer depth of each bound queue.
///
/// Enough to absorb bursts while keeping memory bounded; a full queue
/// exerts backpressure on the dispatcher instead of growing.
pub const DEFAULT_QUEUE_DEPTH: usize = 256;

/// Errors surfaced by a queue broker on hand-off.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// No consumer has bound this queue name.
    #[error("queue {0} is not bound on this broker")]
    UnknownQueue(CompactString),

    /// The consumer went away; the queue no longer accepts messages.
    #[error("queue {0} is no longer accepting messages")]
    Closed(CompactString),
}

/// Hand-off contract to an asynchronous broker.
#[async_trait]
pub trait QueueBroker: Send + Sync {
    async fn enqueue(&self, queue: &str, message: QueueMessage) -> Result<(), QueueError>;
}

/// In-process broker over named bounded mpsc channels.
#[derive(Default)]
pub struct ChannelBroker {
    queues: RwLock<HashMap<CompactString, mpsc::Sender<QueueMessage>>>,
}

impl ChannelBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a queue and return its consumer half. Rebinding a name
    /// replaces the previous sender; the old receiver drains and closes.
    pub fn bind(&self, queue: &str) -> mpsc::Receiver<QueueMessage> {
        let (tx, rx) = mpsc::channel(DEFAULT_QUEUE_DEPTH);
        self.write().insert(queue.into(), tx);
        rx
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<CompactString, mpsc::Sender<QueueMessage>>> {
        match self.queues.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<CompactString, mpsc::Sender<QueueMessage>>> {
        match self.queues.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl QueueBroker for ChannelBroker {
    async fn enqueue(&self, queue: &str, message: QueueMessage) -> Result<(), QueueError> {
        // Clone the sender out so the lock is not held across the send.
        let sender = self.read().get(queue).cloned();
        let Some(sender) = sender else {
            return Err(QueueError::UnknownQueue(queue.into()));
        };
        sender
            .send(message)
            .await
            .map_err(|_| QueueError::Closed(queue.into()))
    }
}

/// Transport adapter handing envelopes off to a [`QueueBroker`].
pub struct QueueTransport {
    broker: Arc<dyn QueueBroker>,
}

impl QueueTransport {
    pub fn new(broker: Arc<dyn QueueBroker>) -> Self {
        Self { broker }
    }
}

#[async_trait]
impl TransportAdapter for QueueTransport {
    async fn deliver(&self, request: &DeliveryRequest) -> DeliveryResult {
        let queue = request.endpoint.as_deref().unwrap_or(DEFAULT_QUEUE_NAME);
        let message = QueueMessage {
            event_id: request.envelope.event_id,
            subscription_code: request.subscription_code.clone(),
            payload: request.envelope.payload.clone(),
            timestamp: time::OffsetDateTime::now_utc().unix_timestamp(),
        };

        let started = Instant::now();
        let outcome = tokio::time::timeout(request.timeout, self.broker.enqueue(queue, message));
        let latency_ms = |started: Instant| {
            i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX)
        };
        match outcome.await {
            Ok(Ok(())) => DeliveryResult::delivered(latency_ms(started)),
            Ok(Err(e)) => DeliveryResult::failed(e.to_string(), latency_ms(started)),
            Err(_) => DeliveryResult::failed(
                format!("queue {queue} hand-off timed out"),
                latency_ms(started),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_event;
    use std::time::Duration;

    fn request_to(endpoint: Option<&str>) -> DeliveryRequest {
        let event = sample_event();
        DeliveryRequest {
            endpoint: endpoint.map(str::to_owned),
            envelope: grcev_sdk::objects::WebhookEnvelope {
                event_id: event.id,
                event_type: event.event_type,
                object_type: event.object_type,
                object_id: event.object_id,
                payload: serde_json::json!({"audit_id": 3}),
                occurred_at: event.occurred_at,
                schema_version: event.schema_version,
            },
            subscription_code: "audit-portal-feed".into(),
            timeout: Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn hand_off_reaches_the_bound_consumer() {
        let broker = Arc::new(ChannelBroker::new());
        let mut rx = broker.bind("risk-updates");
        let transport = QueueTransport::new(broker);

        let request = request_to(Some("risk-updates"));
        let result = transport.deliver(&request).await;
        assert!(result.success);

        let message = rx.recv().await.unwrap();
        assert_eq!(message.event_id, request.envelope.event_id);
        assert_eq!(message.subscription_code, "audit-portal-feed");
        assert_eq!(message.payload, serde_json::json!({"audit_id": 3}));
    }

    #[tokio::test]
    async fn blank_endpoint_falls_back_to_the_default_queue() {
        let broker = Arc::new(ChannelBroker::new());
        let mut rx = broker.bind(DEFAULT_QUEUE_NAME);
        let transport = QueueTransport::new(broker);

        let result = transport.deliver(&request_to(None)).await;
        assert!(result.success);
        assert!(rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn unbound_queue_is_a_transient_failure() {
        let broker = Arc::new(ChannelBroker::new());
        let transport = QueueTransport::new(broker);

        let result = transport.deliver(&request_to(Some("nobody-listens"))).await;
        assert!(!result.success);
        assert!(result.error_message.unwrap().contains("nobody-listens"));
    }

    #[tokio::test]
    async fn dropped_consumer_closes_the_queue() {
        let broker = Arc::new(ChannelBroker::new());
        let rx = broker.bind("short-lived");
        drop(rx);
        let transport = QueueTransport::new(broker);

        let result = transport.deliver(&request_to(Some("short-lived"))).await;
        assert!(!result.success);
        assert!(
            result
                .error_message
                .unwrap()
                .contains("no longer accepting")
        );
    }
}
