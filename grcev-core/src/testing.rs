//! Shared fixtures for the unit tests.

use crate::entities::{
    DeliveryMethod, DeliveryStatus, DomainEvent, EventDeliveryLog, EventStatus,
    EventSubscription, RetryPolicy,
};
use crate::transports::{DeliveryRequest, DeliveryResult, TransportAdapter, TransportRegistry};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

pub(crate) fn sample_event() -> DomainEvent {
    DomainEvent {
        id: Uuid::new_v4(),
        event_type: "control.updated".into(),
        object_type: "Control".into(),
        object_id: Uuid::new_v4(),
        payload_json: r#"{"control_id":7,"severity":"high"}"#.to_owned(),
        occurred_at: time::OffsetDateTime::UNIX_EPOCH,
        schema_version: 1,
        status: EventStatus::Pending,
        processed_at: None,
    }
}

pub(crate) fn subscription_with(
    method: DeliveryMethod,
    policy: RetryPolicy,
    endpoint: Option<&str>,
    max_retries: i32,
) -> EventSubscription {
    EventSubscription {
        id: Uuid::new_v4(),
        subscription_code: "audit-portal-feed".into(),
        subscriber_system: "audit-portal".into(),
        delivery_method: method,
        delivery_endpoint: endpoint.map(str::to_owned),
        retry_policy: policy,
        max_retries,
    }
}

pub(crate) fn webhook_subscription(max_retries: i32) -> EventSubscription {
    subscription_with(
        DeliveryMethod::Webhook,
        RetryPolicy::Exponential,
        Some("https://subscriber.example/hooks/grc"),
        max_retries,
    )
}

pub(crate) fn pending_log(event_id: Uuid, subscription_id: Uuid) -> EventDeliveryLog {
    EventDeliveryLog {
        id: Uuid::new_v4(),
        event_id,
        subscription_id,
        attempt_number: 0,
        status: DeliveryStatus::Pending,
        attempted_at: None,
        next_retry_at: None,
        http_status_code: None,
        response_body: None,
        error_message: None,
        latency_ms: None,
    }
}

pub(crate) fn failed_log(
    event_id: Uuid,
    subscription_id: Uuid,
    attempt_number: i32,
) -> EventDeliveryLog {
    EventDeliveryLog {
        id: Uuid::new_v4(),
        event_id,
        subscription_id,
        attempt_number,
        status: DeliveryStatus::Failed,
        attempted_at: Some(time::OffsetDateTime::UNIX_EPOCH),
        next_retry_at: None,
        http_status_code: Some(500),
        response_body: None,
        error_message: Some("webhook returned HTTP 500".to_owned()),
        latency_ms: Some(12),
    }
}

/// Transport stub that replays scripted results, then a fallback.
pub(crate) struct StubTransport {
    scripted: Mutex<VecDeque<DeliveryResult>>,
    fallback: DeliveryResult,
    calls: AtomicUsize,
}

impl StubTransport {
    pub(crate) fn always(fallback: DeliveryResult) -> Arc<Self> {
        Arc::new(Self {
            scripted: Mutex::new(VecDeque::new()),
            fallback,
            calls: AtomicUsize::new(0),
        })
    }

    pub(crate) fn scripted(
        results: impl IntoIterator<Item = DeliveryResult>,
        fallback: DeliveryResult,
    ) -> Arc<Self> {
        Arc::new(Self {
            scripted: Mutex::new(results.into_iter().collect()),
            fallback,
            calls: AtomicUsize::new(0),
        })
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransportAdapter for StubTransport {
    async fn deliver(&self, _request: &DeliveryRequest) -> DeliveryResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut scripted = match self.scripted.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        scripted.pop_front().unwrap_or_else(|| self.fallback.clone())
    }
}

pub(crate) fn delivered_result() -> DeliveryResult {
    DeliveryResult {
        success: true,
        http_status_code: Some(200),
        response_body: Some("ok".to_owned()),
        error_message: None,
        latency_ms: 12,
    }
}

pub(crate) fn server_error_result() -> DeliveryResult {
    DeliveryResult {
        success: false,
        http_status_code: Some(500),
        response_body: Some("upstream unavailable".to_owned()),
        error_message: Some("webhook returned HTTP 500".to_owned()),
        latency_ms: 34,
    }
}

/// Registry routing every delivery method to the same stub.
pub(crate) fn registry_of(stub: Arc<StubTransport>) -> TransportRegistry {
    TransportRegistry::new(stub.clone(), stub.clone(), stub)
}
