//! DeliveryBatchRunner processor.
//!
//! The DeliveryBatchRunner is responsible for:
//! - Selecting pending delivery logs, oldest first, and dispatching each
//! - Selecting failed logs whose retry is due and dispatching each
//! - Running both passes on a configurable polling cadence
//!
//! Both entry points are safe to run concurrently across worker
//! instances: the dispatcher's row claim guarantees at most one
//! in-flight attempt per log, so overlapping batches cannot double-send.

use crate::config::{ConfigStore, RunnerConfig};
use crate::processors::dispatcher::EventDispatcher;
use crate::store::DeliveryStore;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Default batch size of the retry pass.
pub const DEFAULT_RETRY_BATCH_SIZE: usize = 50;

/// Polls the delivery log store and dispatches due work in batches.
pub struct DeliveryBatchRunner<S> {
    store: Arc<S>,
    dispatcher: Arc<EventDispatcher<S>>,
}

impl<S: DeliveryStore> DeliveryBatchRunner<S> {
    pub fn new(store: Arc<S>, dispatcher: Arc<EventDispatcher<S>>) -> Self {
        Self { store, dispatcher }
    }

    /// Dispatch up to `batch_size` pending logs, oldest attempt first.
    ///
    /// Returns the number of successful deliveries. One log's failure
    /// never aborts the batch.
    pub async fn dispatch_pending_deliveries(&self, batch_size: usize) -> usize {
        let ids = match self.store.pending_delivery_ids(limit_of(batch_size)).await {
            Ok(ids) => ids,
            Err(e) => {
                error!(error = %e, "Failed to select pending deliveries");
                return 0;
            }
        };
        self.dispatch_all(ids).await
    }

    /// Dispatch up to `batch_size` failed logs whose `next_retry_at` has
    /// passed and whose attempts are still below `max_retries`.
    pub async fn retry_failed_deliveries(&self, max_retries: i32, batch_size: usize) -> usize {
        let now = time::OffsetDateTime::now_utc();
        let ids = match self
            .store
            .due_retry_ids(max_retries, now, limit_of(batch_size))
            .await
        {
            Ok(ids) => ids,
            Err(e) => {
                error!(error = %e, "Failed to select due retries");
                return 0;
            }
        };
        self.dispatch_all(ids).await
    }

    async fn dispatch_all(&self, ids: Vec<Uuid>) -> usize {
        let mut delivered = 0usize;
        for id in ids {
            if self.dispatcher.dispatch_event(id).await {
                delivered += 1;
            }
        }
        delivered
    }

    /// Run the polling loop until shutdown is signaled.
    ///
    /// Cadence and batch sizes are read from the [`ConfigStore`] on every
    /// pass, so a reload takes effect without restarting the loop.
    pub async fn run(
        self,
        mut shutdown_rx: watch::Receiver<bool>,
        config: ConfigStore<RunnerConfig>,
    ) {
        info!("DeliveryBatchRunner started");

        loop {
            let (poll_interval, batch_size, retry_batch_size, max_retries) = {
                let cfg = config.read().await;
                (
                    cfg.poll_interval,
                    cfg.batch_size,
                    cfg.retry_batch_size,
                    cfg.max_retries,
                )
            };

            tokio::select! {
                biased;

                // Check for shutdown
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("DeliveryBatchRunner received shutdown signal");
                        break;
                    }
                }

                _ = tokio::time::sleep(poll_interval) => {
                    let dispatched = self.dispatch_pending_deliveries(batch_size).await;
                    let retried = self.retry_failed_deliveries(max_retries, retry_batch_size).await;
                    if dispatched + retried > 0 {
                        debug!(dispatched, retried, "Delivery poll pass complete");
                    }
                }
            }
        }

        info!("DeliveryBatchRunner shutdown complete");
    }
}

fn limit_of(batch_size: usize) -> i64 {
    i64::try_from(batch_size).unwrap_or(i64::MAX)
}
