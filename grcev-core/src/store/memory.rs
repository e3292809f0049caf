//! In-process delivery store.
//!
//! Implements the same claim and quarantine semantics as the Postgres
//! store over a mutex-guarded map. Used by the unit tests and by
//! embedders that want the engine without a database.

use crate::entities::delivery_log::ExhaustedDelivery;
use crate::entities::{
    DeadLetterEntry, DeliveryStatus, DomainEvent, EventDeliveryLog, EventStatus,
    EventSubscription,
};
use crate::store::{DeliveryStore, DeliveryWorkItem, StoreError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    events: HashMap<Uuid, DomainEvent>,
    subscriptions: HashMap<Uuid, EventSubscription>,
    logs: HashMap<Uuid, EventDeliveryLog>,
    dead_letters: Vec<DeadLetterEntry>,
}

#[derive(Default)]
pub struct InMemoryDeliveryStore {
    inner: Mutex<Inner>,
}

impl InMemoryDeliveryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn insert_event(&self, event: DomainEvent) {
        self.lock().events.insert(event.id, event);
    }

    pub fn insert_subscription(&self, subscription: EventSubscription) {
        self.lock()
            .subscriptions
            .insert(subscription.id, subscription);
    }

    pub fn insert_log(&self, log: EventDeliveryLog) {
        self.lock().logs.insert(log.id, log);
    }

    pub fn log(&self, log_id: Uuid) -> Option<EventDeliveryLog> {
        self.lock().logs.get(&log_id).cloned()
    }

    pub fn event(&self, event_id: Uuid) -> Option<DomainEvent> {
        self.lock().events.get(&event_id).cloned()
    }

    pub fn dead_letters(&self) -> Vec<DeadLetterEntry> {
        self.lock().dead_letters.clone()
    }
}

fn capped(limit: i64) -> usize {
    usize::try_from(limit).unwrap_or(0)
}

#[async_trait]
impl DeliveryStore for InMemoryDeliveryStore {
    async fn load_work_item(&self, log_id: Uuid) -> Result<Option<DeliveryWorkItem>, StoreError> {
        let inner = self.lock();
        let Some(log) = inner.logs.get(&log_id) else {
            return Ok(None);
        };
        let Some(event) = inner.events.get(&log.event_id) else {
            return Ok(None);
        };
        let Some(subscription) = inner.subscriptions.get(&log.subscription_id) else {
            return Ok(None);
        };
        Ok(Some(DeliveryWorkItem {
            log: log.clone(),
            event: event.clone(),
            subscription: subscription.clone(),
        }))
    }

    async fn claim_attempt(
        &self,
        log_id: Uuid,
        expected_attempt: i32,
        attempted_at: time::OffsetDateTime,
    ) -> Result<bool, StoreError> {
        let mut inner = self.lock();
        let Some(log) = inner.logs.get_mut(&log_id) else {
            return Ok(false);
        };
        let dispatchable =
            matches!(log.status, DeliveryStatus::Pending | DeliveryStatus::Failed);
        if !dispatchable || log.attempt_number != expected_attempt {
            return Ok(false);
        }
        log.attempt_number += 1;
        log.attempted_at = Some(attempted_at);
        Ok(true)
    }

    async fn record_outcome(&self, log: &EventDeliveryLog) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if let Some(slot) = inner.logs.get_mut(&log.id) {
            *slot = log.clone();
        }
        Ok(())
    }

    async fn mark_event_processed(
        &self,
        event_id: Uuid,
        processed_at: time::OffsetDateTime,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if let Some(event) = inner.events.get_mut(&event_id) {
            if event.status == EventStatus::Pending {
                event.status = EventStatus::Processed;
                event.processed_at = Some(processed_at);
            }
        }
        Ok(())
    }

    async fn pending_delivery_ids(&self, limit: i64) -> Result<Vec<Uuid>, StoreError> {
        let inner = self.lock();
        let mut pending: Vec<&EventDeliveryLog> = inner
            .logs
            .values()
            .filter(|log| log.status == DeliveryStatus::Pending)
            .collect();
        // Option ordering puts never-attempted logs first, like NULLS FIRST.
        pending.sort_by_key(|log| (log.attempted_at, log.id));
        Ok(pending
            .into_iter()
            .take(capped(limit))
            .map(|log| log.id)
            .collect())
    }

    async fn due_retry_ids(
        &self,
        max_retries: i32,
        due_before: time::OffsetDateTime,
        limit: i64,
    ) -> Result<Vec<Uuid>, StoreError> {
        let inner = self.lock();
        let mut due: Vec<&EventDeliveryLog> = inner
            .logs
            .values()
            .filter(|log| {
                log.status == DeliveryStatus::Failed
                    && log.attempt_number < max_retries
                    && log.next_retry_at.is_some_and(|at| at <= due_before)
            })
            .collect();
        due.sort_by_key(|log| (log.next_retry_at, log.id));
        Ok(due
            .into_iter()
            .take(capped(limit))
            .map(|log| log.id)
            .collect())
    }

    async fn exhausted_deliveries(
        &self,
        max_retries: i32,
        limit: i64,
    ) -> Result<Vec<ExhaustedDelivery>, StoreError> {
        let inner = self.lock();
        let mut exhausted: Vec<&EventDeliveryLog> = inner
            .logs
            .values()
            .filter(|log| {
                log.status == DeliveryStatus::Failed && log.attempt_number >= max_retries
            })
            .collect();
        exhausted.sort_by_key(|log| (log.attempted_at, log.id));
        Ok(exhausted
            .into_iter()
            .take(capped(limit))
            .map(|log| ExhaustedDelivery {
                log: log.clone(),
                payload_json: inner
                    .events
                    .get(&log.event_id)
                    .map(|event| event.payload_json.clone())
                    .unwrap_or_else(|| "null".to_owned()),
            })
            .collect())
    }

    async fn quarantine(&self, log_id: Uuid, entry: DeadLetterEntry) -> Result<bool, StoreError> {
        let mut inner = self.lock();
        let Some(log) = inner.logs.get_mut(&log_id) else {
            return Ok(false);
        };
        if log.status != DeliveryStatus::Failed {
            return Ok(false);
        }
        log.status = DeliveryStatus::Skipped;
        log.next_retry_at = None;
        inner.dead_letters.push(entry);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{failed_log, pending_log, sample_event, webhook_subscription};

    #[tokio::test]
    async fn claim_increments_only_on_expected_attempt() {
        let store = InMemoryDeliveryStore::new();
        let log = pending_log(Uuid::new_v4(), Uuid::new_v4());
        let log_id = log.id;
        store.insert_log(log);
        let now = time::OffsetDateTime::now_utc();

        assert!(!store.claim_attempt(log_id, 3, now).await.unwrap());
        assert!(store.claim_attempt(log_id, 0, now).await.unwrap());

        let claimed = store.log(log_id).unwrap();
        assert_eq!(claimed.attempt_number, 1);
        assert_eq!(claimed.attempted_at, Some(now));

        // A racing runner that observed attempt 0 loses.
        assert!(!store.claim_attempt(log_id, 0, now).await.unwrap());
    }

    #[tokio::test]
    async fn terminal_logs_cannot_be_claimed() {
        let store = InMemoryDeliveryStore::new();
        let mut log = pending_log(Uuid::new_v4(), Uuid::new_v4());
        log.status = DeliveryStatus::Delivered;
        let log_id = log.id;
        store.insert_log(log);

        let claimed = store
            .claim_attempt(log_id, 0, time::OffsetDateTime::now_utc())
            .await
            .unwrap();
        assert!(!claimed);
    }

    #[tokio::test]
    async fn pending_ids_come_back_oldest_first_with_unattempted_leading() {
        let store = InMemoryDeliveryStore::new();
        let event_id = Uuid::new_v4();
        let subscription_id = Uuid::new_v4();
        let base = time::OffsetDateTime::UNIX_EPOCH;

        let mut fresh = pending_log(event_id, subscription_id);
        fresh.attempted_at = None;
        let mut old = pending_log(event_id, subscription_id);
        old.attempted_at = Some(base);
        let mut newer = pending_log(event_id, subscription_id);
        newer.attempted_at = Some(base + time::Duration::hours(1));

        let (fresh_id, old_id, newer_id) = (fresh.id, old.id, newer.id);
        store.insert_log(newer);
        store.insert_log(fresh);
        store.insert_log(old);

        let ids = store.pending_delivery_ids(10).await.unwrap();
        assert_eq!(ids, vec![fresh_id, old_id, newer_id]);
    }

    #[tokio::test]
    async fn missing_event_row_yields_null_payload_copy() {
        let store = InMemoryDeliveryStore::new();
        let subscription = webhook_subscription(3);
        let event = sample_event();
        let log = failed_log(event.id, subscription.id, 3);
        let log_id = log.id;
        store.insert_subscription(subscription);
        store.insert_log(log);

        let exhausted = store.exhausted_deliveries(3, 10).await.unwrap();
        assert_eq!(exhausted.len(), 1);
        assert_eq!(exhausted[0].log.id, log_id);
        assert_eq!(exhausted[0].payload_json, "null");
    }
}
