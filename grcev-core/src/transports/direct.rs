//! Direct-call transport: in-process handler invocation.
//!
//! The subscription's delivery endpoint names a handler registered in a
//! [`HandlerRegistry`]; success is the handler completing without error.

use crate::transports::{DeliveryRequest, DeliveryResult, TransportAdapter};
use async_trait::async_trait;
use compact_str::CompactString;
use grcev_sdk::objects::WebhookEnvelope;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// Failure reported by a subscriber handler.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// An in-process event consumer addressable by name.
#[async_trait]
pub trait SubscriberHandler: Send + Sync {
    async fn handle(&self, envelope: &WebhookEnvelope) -> Result<(), HandlerError>;
}

/// Named handlers available to direct-call subscriptions.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<CompactString, Arc<dyn SubscriberHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<CompactString>, handler: Arc<dyn SubscriberHandler>) {
        self.handlers.insert(name.into(), handler);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn SubscriberHandler>> {
        self.handlers.get(name).cloned()
    }
}

/// Transport adapter invoking registered handlers.
pub struct DirectCallTransport {
    registry: Arc<HandlerRegistry>,
}

impl DirectCallTransport {
    pub fn new(registry: Arc<HandlerRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl TransportAdapter for DirectCallTransport {
    async fn deliver(&self, request: &DeliveryRequest) -> DeliveryResult {
        let Some(name) = request.endpoint.as_deref() else {
            return DeliveryResult::failed("direct-call handler name is not configured", 0);
        };
        let Some(handler) = self.registry.get(name) else {
            return DeliveryResult::failed(format!("no handler registered under {name}"), 0);
        };

        let started = Instant::now();
        let outcome = tokio::time::timeout(request.timeout, handler.handle(&request.envelope));
        let latency_ms = |started: Instant| {
            i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX)
        };
        match outcome.await {
            Ok(Ok(())) => DeliveryResult::delivered(latency_ms(started)),
            Ok(Err(e)) => {
                DeliveryResult::failed(format!("handler {name} failed: {e}"), latency_ms(started))
            }
            Err(_) => {
                DeliveryResult::failed(format!("handler {name} timed out"), latency_ms(started))
            }
        }
    }
}
