//! Transport adapters: the pluggable delivery channels.
//!
//! Every adapter implements [`TransportAdapter`] and reports through the
//! same [`DeliveryResult`] shape, so the dispatcher is indifferent to
//! how bytes actually move:
//!
//! - [`WebhookTransport`]: HTTP POST of the signed envelope
//! - [`QueueTransport`]: hand-off to a named broker queue
//! - [`DirectCallTransport`]: in-process handler invocation

pub mod direct;
pub mod queue;
pub mod webhook;

use crate::entities::DeliveryMethod;
use async_trait::async_trait;
use compact_str::CompactString;
use grcev_sdk::objects::WebhookEnvelope;
use std::sync::Arc;
use std::time::Duration;

pub use direct::{DirectCallTransport, HandlerError, HandlerRegistry, SubscriberHandler};
pub use queue::{
    ChannelBroker, DEFAULT_QUEUE_DEPTH, DEFAULT_QUEUE_NAME, QueueBroker, QueueError,
    QueueTransport,
};
pub use webhook::WebhookTransport;

/// One delivery attempt handed to a transport adapter.
#[derive(Debug, Clone)]
pub struct DeliveryRequest {
    /// Subscription endpoint: URL, queue name or handler name depending
    /// on the delivery method. `None` when the registry row left it out.
    pub endpoint: Option<String>,
    pub envelope: WebhookEnvelope,
    pub subscription_code: CompactString,
    pub timeout: Duration,
}

/// Uniform outcome of a single delivery attempt over any channel.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryResult {
    pub success: bool,
    pub http_status_code: Option<i32>,
    pub response_body: Option<String>,
    pub error_message: Option<String>,
    pub latency_ms: i64,
}

impl DeliveryResult {
    pub fn delivered(latency_ms: i64) -> Self {
        Self {
            success: true,
            http_status_code: None,
            response_body: None,
            error_message: None,
            latency_ms,
        }
    }

    pub fn failed(error_message: impl Into<String>, latency_ms: i64) -> Self {
        Self {
            success: false,
            http_status_code: None,
            response_body: None,
            error_message: Some(error_message.into()),
            latency_ms,
        }
    }
}

/// A delivery channel. Implementations capture every failure into the
/// result instead of returning errors; the dispatcher records whatever
/// comes back.
#[async_trait]
pub trait TransportAdapter: Send + Sync {
    async fn deliver(&self, request: &DeliveryRequest) -> DeliveryResult;
}

/// Enum-keyed strategy map from delivery method to adapter.
///
/// An [`DeliveryMethod::Unrecognized`] method selects nothing; the
/// dispatcher turns that into an explicit configuration failure that
/// keeps surfacing through the normal retry accounting.
pub struct TransportRegistry {
    webhook: Arc<dyn TransportAdapter>,
    queue: Arc<dyn TransportAdapter>,
    direct_call: Arc<dyn TransportAdapter>,
}

impl TransportRegistry {
    pub fn new(
        webhook: Arc<dyn TransportAdapter>,
        queue: Arc<dyn TransportAdapter>,
        direct_call: Arc<dyn TransportAdapter>,
    ) -> Self {
        Self {
            webhook,
            queue,
            direct_call,
        }
    }

    pub fn select(&self, method: &DeliveryMethod) -> Option<&dyn TransportAdapter> {
        match method {
            DeliveryMethod::Webhook => Some(self.webhook.as_ref()),
            DeliveryMethod::Queue => Some(self.queue.as_ref()),
            DeliveryMethod::DirectCall => Some(self.direct_call.as_ref()),
            DeliveryMethod::Unrecognized(_) => None,
        }
    }
}
