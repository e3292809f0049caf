//! Postgres-backed delivery store.
//!
//! Thin orchestration over the per-statement processors defined next to
//! the entities; the multi-row quarantine runs in a transaction.

use crate::entities::dead_letter::DeadLetterEntry;
use crate::entities::delivery_log::{
    ClaimDeliveryAttempt, EventDeliveryLog, ExhaustedDelivery, GetDeliveryLogById,
    GetDueRetryIds, GetExhaustedDeliveries, GetPendingDeliveryIds, RecordDeliveryOutcome,
};
use crate::entities::domain_event::{GetDomainEventById, MarkDomainEventProcessed};
use crate::entities::subscription::GetSubscriptionById;
use crate::framework::DatabaseProcessor;
use crate::store::{DeliveryStore, DeliveryWorkItem, StoreError};
use async_trait::async_trait;
use kanau::processor::Processor;
use sqlx::PgPool;
use uuid::Uuid;

/// Durable store shared across worker instances.
#[derive(Clone)]
pub struct PgDeliveryStore {
    pool: PgPool,
}

impl PgDeliveryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn processor(&self) -> DatabaseProcessor {
        DatabaseProcessor {
            pool: self.pool.clone(),
        }
    }
}

#[async_trait]
impl DeliveryStore for PgDeliveryStore {
    async fn load_work_item(&self, log_id: Uuid) -> Result<Option<DeliveryWorkItem>, StoreError> {
        let processor = self.processor();

        let Some(log) = processor.process(GetDeliveryLogById { log_id }).await? else {
            return Ok(None);
        };
        let Some(event) = processor
            .process(GetDomainEventById {
                event_id: log.event_id,
            })
            .await?
        else {
            return Ok(None);
        };
        let Some(subscription) = processor
            .process(GetSubscriptionById {
                subscription_id: log.subscription_id,
            })
            .await?
        else {
            return Ok(None);
        };

        Ok(Some(DeliveryWorkItem {
            log,
            event,
            subscription,
        }))
    }

    async fn claim_attempt(
        &self,
        log_id: Uuid,
        expected_attempt: i32,
        attempted_at: time::OffsetDateTime,
    ) -> Result<bool, StoreError> {
        let claimed = self
            .processor()
            .process(ClaimDeliveryAttempt {
                log_id,
                expected_attempt,
                attempted_at,
            })
            .await?;
        Ok(claimed > 0)
    }

    async fn record_outcome(&self, log: &EventDeliveryLog) -> Result<(), StoreError> {
        self.processor()
            .process(RecordDeliveryOutcome { log: log.clone() })
            .await?;
        Ok(())
    }

    async fn mark_event_processed(
        &self,
        event_id: Uuid,
        processed_at: time::OffsetDateTime,
    ) -> Result<(), StoreError> {
        self.processor()
            .process(MarkDomainEventProcessed {
                event_id,
                processed_at,
            })
            .await?;
        Ok(())
    }

    async fn pending_delivery_ids(&self, limit: i64) -> Result<Vec<Uuid>, StoreError> {
        Ok(self
            .processor()
            .process(GetPendingDeliveryIds { limit })
            .await?)
    }

    async fn due_retry_ids(
        &self,
        max_retries: i32,
        due_before: time::OffsetDateTime,
        limit: i64,
    ) -> Result<Vec<Uuid>, StoreError> {
        Ok(self
            .processor()
            .process(GetDueRetryIds {
                max_retries,
                due_before,
                limit,
            })
            .await?)
    }

    async fn exhausted_deliveries(
        &self,
        max_retries: i32,
        limit: i64,
    ) -> Result<Vec<ExhaustedDelivery>, StoreError> {
        Ok(self
            .processor()
            .process(GetExhaustedDeliveries { max_retries, limit })
            .await?)
    }

    async fn quarantine(&self, log_id: Uuid, entry: DeadLetterEntry) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;

        // Flip first: the row lock serializes racing movers, and a rerun
        // on an already-skipped log rolls back without inserting.
        let flipped = EventDeliveryLog::mark_skipped_tx(&mut tx, log_id).await?;
        if flipped == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        DeadLetterEntry::insert_tx(&mut tx, &entry).await?;
        tx.commit().await?;

        Ok(true)
    }
}
