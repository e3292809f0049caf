//! DeadLetterMover processor.
//!
//! The DeadLetterMover is responsible for:
//! - Selecting failed logs whose attempts reached the retry ceiling
//! - Creating one dead-letter entry per log (with a payload copy)
//! - Flipping each log to skipped, the only path that produces skipped
//!
//! The quarantine is transactional and conditional on the log still
//! being failed, so rerunning the mover over the same rows is a no-op.

use crate::config::{ConfigStore, RunnerConfig};
use crate::entities::{DEFAULT_DEAD_LETTER_ERROR, DeadLetterEntry, DeadLetterStatus};
use crate::store::DeliveryStore;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Upper bound of exhausted logs examined per pass; the polling loop
/// picks up any remainder on its next tick.
const DEAD_LETTER_SCAN_LIMIT: i64 = 500;

/// Moves exhausted deliveries into the dead-letter store.
pub struct DeadLetterMover<S> {
    store: Arc<S>,
}

impl<S: DeliveryStore> DeadLetterMover<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Quarantine every failed log with `attempt_number >= max_retries`.
    ///
    /// Returns the number of logs moved in this pass.
    pub async fn move_to_dead_letter_queue(&self, max_retries: i32) -> usize {
        let exhausted = match self
            .store
            .exhausted_deliveries(max_retries, DEAD_LETTER_SCAN_LIMIT)
            .await
        {
            Ok(exhausted) => exhausted,
            Err(e) => {
                error!(error = %e, "Failed to select exhausted deliveries");
                return 0;
            }
        };

        let now = time::OffsetDateTime::now_utc();
        let mut moved = 0usize;

        for item in exhausted {
            let log = &item.log;
            let entry = DeadLetterEntry {
                id: Uuid::new_v4(),
                event_id: log.event_id,
                subscription_id: log.subscription_id,
                payload_json: item.payload_json.clone(),
                error_message: log
                    .error_message
                    .clone()
                    .unwrap_or_else(|| DEFAULT_DEAD_LETTER_ERROR.to_owned()),
                failure_count: log.attempt_number,
                status: DeadLetterStatus::Pending,
                created_at: now,
            };

            match self.store.quarantine(log.id, entry).await {
                Ok(true) => {
                    moved += 1;
                    info!(
                        log_id = %log.id,
                        event_id = %log.event_id,
                        failures = log.attempt_number,
                        "Delivery moved to dead letter"
                    );
                }
                Ok(false) => {
                    debug!(log_id = %log.id, "Delivery already quarantined");
                }
                Err(e) => {
                    error!(log_id = %log.id, error = %e, "Failed to quarantine delivery");
                }
            }
        }

        moved
    }

    /// Run the polling loop until shutdown is signaled.
    pub async fn run(
        self,
        mut shutdown_rx: watch::Receiver<bool>,
        config: ConfigStore<RunnerConfig>,
    ) {
        info!("DeadLetterMover started");

        loop {
            let (interval, max_retries) = {
                let cfg = config.read().await;
                (cfg.dead_letter_interval, cfg.max_retries)
            };

            tokio::select! {
                biased;

                // Check for shutdown
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("DeadLetterMover received shutdown signal");
                        break;
                    }
                }

                _ = tokio::time::sleep(interval) => {
                    let moved = self.move_to_dead_letter_queue(max_retries).await;
                    if moved > 0 {
                        debug!(moved, "Dead-letter pass complete");
                    }
                }
            }
        }

        info!("DeadLetterMover shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::DeliveryStatus;
    use crate::store::InMemoryDeliveryStore;
    use crate::testing::{failed_log, pending_log, sample_event, webhook_subscription};

    #[tokio::test]
    async fn exhausted_log_is_quarantined_once() {
        let store = Arc::new(InMemoryDeliveryStore::new());
        let event = sample_event();
        let subscription = webhook_subscription(3);
        let log = failed_log(event.id, subscription.id, 3);
        let (event_id, log_id) = (event.id, log.id);
        let payload = event.payload_json.clone();
        store.insert_event(event);
        store.insert_subscription(subscription);
        store.insert_log(log);

        let mover = DeadLetterMover::new(store.clone());

        assert_eq!(mover.move_to_dead_letter_queue(3).await, 1);

        let log = store.log(log_id).unwrap();
        assert_eq!(log.status, DeliveryStatus::Skipped);
        assert_eq!(log.next_retry_at, None);

        let entries = store.dead_letters();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].event_id, event_id);
        assert_eq!(entries[0].payload_json, payload);
        assert_eq!(entries[0].failure_count, 3);
        assert_eq!(entries[0].status, DeadLetterStatus::Pending);
        assert_eq!(entries[0].error_message, "webhook returned HTTP 500");

        // Rerunning the mover is a no-op for the moved log.
        assert_eq!(mover.move_to_dead_letter_queue(3).await, 0);
        assert_eq!(store.dead_letters().len(), 1);
        assert_eq!(store.log(log_id).unwrap().status, DeliveryStatus::Skipped);
    }

    #[tokio::test]
    async fn missing_error_message_gets_the_default() {
        let store = Arc::new(InMemoryDeliveryStore::new());
        let event = sample_event();
        let subscription = webhook_subscription(2);
        let mut log = failed_log(event.id, subscription.id, 2);
        log.error_message = None;
        store.insert_event(event);
        store.insert_subscription(subscription);
        store.insert_log(log);

        let mover = DeadLetterMover::new(store.clone());
        assert_eq!(mover.move_to_dead_letter_queue(2).await, 1);
        assert_eq!(
            store.dead_letters()[0].error_message,
            DEFAULT_DEAD_LETTER_ERROR
        );
    }

    #[tokio::test]
    async fn logs_below_the_ceiling_are_left_alone() {
        let store = Arc::new(InMemoryDeliveryStore::new());
        let event = sample_event();
        let subscription = webhook_subscription(5);
        let still_retrying = failed_log(event.id, subscription.id, 2);
        let pending = pending_log(event.id, subscription.id);
        let (retrying_id, pending_id) = (still_retrying.id, pending.id);
        store.insert_event(event);
        store.insert_subscription(subscription);
        store.insert_log(still_retrying);
        store.insert_log(pending);

        let mover = DeadLetterMover::new(store.clone());
        assert_eq!(mover.move_to_dead_letter_queue(5).await, 0);
        assert!(store.dead_letters().is_empty());
        assert_eq!(
            store.log(retrying_id).unwrap().status,
            DeliveryStatus::Failed
        );
        assert_eq!(
            store.log(pending_id).unwrap().status,
            DeliveryStatus::Pending
        );
    }
}
