//! EventDispatcher processor.
//!
//! The EventDispatcher executes exactly one delivery attempt:
//! - Loading the delivery log with its event and subscription
//! - Claiming the log row (optimistic conditional attempt increment)
//! - Selecting the transport adapter for the subscription's method
//! - Recording the outcome and scheduling the next retry on failure
//! - Marking the parent event processed on the first success
//!
//! `dispatch_event` never propagates an error to its caller; every
//! failure mode ends up in the delivery log where operators can see it.

use crate::entities::{DeliveryStatus, DomainEvent, EventSubscription};
use crate::retry;
use crate::store::DeliveryStore;
use crate::transports::{DeliveryRequest, DeliveryResult, TransportRegistry};
use crate::utils::truncate::truncate_chars;
use grcev_sdk::objects::WebhookEnvelope;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Stored error messages are bounded; transports can produce arbitrarily
/// long response dumps.
pub const MAX_ERROR_MESSAGE_CHARS: usize = 2000;

/// Executes single delivery attempts against a [`DeliveryStore`].
pub struct EventDispatcher<S> {
    store: Arc<S>,
    transports: TransportRegistry,
    transport_timeout: Duration,
}

impl<S: DeliveryStore> EventDispatcher<S> {
    pub fn new(store: Arc<S>, transports: TransportRegistry, transport_timeout: Duration) -> Self {
        Self {
            store,
            transports,
            transport_timeout,
        }
    }

    /// Execute one delivery attempt for `delivery_log_id`.
    ///
    /// Returns `true` only when the transport delivered and the outcome
    /// was persisted. A missing log, a lost claim, a transport failure
    /// and a store failure all return `false`.
    pub async fn dispatch_event(&self, delivery_log_id: Uuid) -> bool {
        let item = match self.store.load_work_item(delivery_log_id).await {
            Ok(Some(item)) => item,
            Ok(None) => {
                warn!(log_id = %delivery_log_id, "Delivery log not found");
                return false;
            }
            Err(e) => {
                error!(log_id = %delivery_log_id, error = %e, "Failed to load delivery log");
                return false;
            }
        };

        let now = time::OffsetDateTime::now_utc();
        match self
            .store
            .claim_attempt(delivery_log_id, item.log.attempt_number, now)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                debug!(
                    log_id = %delivery_log_id,
                    attempt = item.log.attempt_number,
                    "Lost the claim on delivery log, skipping"
                );
                return false;
            }
            Err(e) => {
                error!(log_id = %delivery_log_id, error = %e, "Failed to claim delivery log");
                return false;
            }
        }

        let mut log = item.log;
        log.attempt_number += 1;
        log.attempted_at = Some(now);

        let result = self.attempt(&item.event, &item.subscription).await;

        log.http_status_code = result.http_status_code;
        log.response_body = result
            .response_body
            .as_deref()
            .map(|body| truncate_chars(body, MAX_ERROR_MESSAGE_CHARS).to_owned());
        log.latency_ms = Some(result.latency_ms);

        if result.success {
            log.status = DeliveryStatus::Delivered;
            log.next_retry_at = None;
            log.error_message = None;
        } else {
            log.status = DeliveryStatus::Failed;
            log.error_message = result
                .error_message
                .as_deref()
                .map(|message| truncate_chars(message, MAX_ERROR_MESSAGE_CHARS).to_owned());
            log.next_retry_at = retry::next_retry_at(
                log.attempt_number,
                item.subscription.retry_policy,
                item.subscription.max_retries,
                now,
            );
        }

        if let Err(e) = self.store.record_outcome(&log).await {
            error!(log_id = %log.id, error = %e, "Failed to record delivery outcome");
            return false;
        }

        if result.success {
            // First successful delivery marks the event processed;
            // fan-out completion lives in the delivery logs.
            if let Err(e) = self.store.mark_event_processed(item.event.id, now).await {
                error!(
                    event_id = %item.event.id,
                    error = %e,
                    "Delivery succeeded but event could not be marked processed"
                );
            }
            info!(
                log_id = %log.id,
                event_id = %item.event.id,
                subscription = %item.subscription.subscription_code,
                attempt = log.attempt_number,
                latency_ms = result.latency_ms,
                "Delivery succeeded"
            );
            true
        } else {
            warn!(
                log_id = %log.id,
                event_id = %item.event.id,
                subscription = %item.subscription.subscription_code,
                attempt = log.attempt_number,
                next_retry_at = ?log.next_retry_at,
                error = log.error_message.as_deref().unwrap_or("unknown"),
                "Delivery attempt failed"
            );
            false
        }
    }

    /// Run the transport for one claimed attempt.
    ///
    /// Payload parse failures and unrecognized delivery methods are
    /// folded into the failure result so they hit the same retry and
    /// dead-letter accounting as transport failures.
    async fn attempt(
        &self,
        event: &DomainEvent,
        subscription: &EventSubscription,
    ) -> DeliveryResult {
        let payload: serde_json::Value = match serde_json::from_str(&event.payload_json) {
            Ok(payload) => payload,
            Err(e) => {
                return DeliveryResult::failed(format!("invalid event payload: {e}"), 0);
            }
        };

        let Some(adapter) = self.transports.select(&subscription.delivery_method) else {
            return DeliveryResult::failed(
                format!(
                    "unsupported delivery method {} on subscription {}",
                    subscription.delivery_method, subscription.subscription_code
                ),
                0,
            );
        };

        let request = DeliveryRequest {
            endpoint: subscription.delivery_endpoint.clone(),
            envelope: WebhookEnvelope {
                event_id: event.id,
                event_type: event.event_type.clone(),
                object_type: event.object_type.clone(),
                object_id: event.object_id,
                payload,
                occurred_at: event.occurred_at,
                schema_version: event.schema_version,
            },
            subscription_code: subscription.subscription_code.clone(),
            timeout: self.transport_timeout,
        };

        adapter.deliver(&request).await
    }
}
