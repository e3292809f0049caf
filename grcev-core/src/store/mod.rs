//! Persistence seam for the delivery engine.
//!
//! The dispatcher, batch runner and dead-letter mover are generic over
//! [`DeliveryStore`] and never see a concrete database handle. The
//! Postgres implementation is the production store; the in-memory one
//! backs unit tests and embedded use.

pub mod memory;
pub mod postgres;

use crate::entities::delivery_log::ExhaustedDelivery;
use crate::entities::{DeadLetterEntry, DomainEvent, EventDeliveryLog, EventSubscription};
use async_trait::async_trait;
use uuid::Uuid;

pub use memory::InMemoryDeliveryStore;
pub use postgres::PgDeliveryStore;

/// Errors surfaced by a delivery store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// A delivery log joined with its event and subscription: everything one
/// attempt needs.
#[derive(Debug, Clone)]
pub struct DeliveryWorkItem {
    pub log: EventDeliveryLog,
    pub event: DomainEvent,
    pub subscription: EventSubscription,
}

/// Transactional store contract consumed by the engine.
///
/// `claim_attempt` and `quarantine` carry the atomicity the engine
/// relies on: the claim is a conditional increment keyed on the
/// caller-observed attempt number, and the quarantine flips the log and
/// inserts the dead-letter entry as one unit, conditional on the log
/// still being failed.
#[async_trait]
pub trait DeliveryStore: Send + Sync {
    /// Load a log with its event and subscription; `None` when any of
    /// the three rows is missing.
    async fn load_work_item(&self, log_id: Uuid) -> Result<Option<DeliveryWorkItem>, StoreError>;

    /// Claim one attempt. Returns `false` when the claim is lost — the
    /// row moved on (another runner, or a terminal status).
    async fn claim_attempt(
        &self,
        log_id: Uuid,
        expected_attempt: i32,
        attempted_at: time::OffsetDateTime,
    ) -> Result<bool, StoreError>;

    /// Write back the outcome fields of a claimed attempt.
    async fn record_outcome(&self, log: &EventDeliveryLog) -> Result<(), StoreError>;

    /// Mark the parent event processed (first successful delivery wins).
    async fn mark_event_processed(
        &self,
        event_id: Uuid,
        processed_at: time::OffsetDateTime,
    ) -> Result<(), StoreError>;

    /// Pending logs, oldest `attempted_at` first (nulls first).
    async fn pending_delivery_ids(&self, limit: i64) -> Result<Vec<Uuid>, StoreError>;

    /// Failed logs with retries remaining and a due `next_retry_at`,
    /// earliest due first.
    async fn due_retry_ids(
        &self,
        max_retries: i32,
        due_before: time::OffsetDateTime,
        limit: i64,
    ) -> Result<Vec<Uuid>, StoreError>;

    /// Failed logs whose `attempt_number` reached `max_retries`, joined
    /// with their event payloads.
    async fn exhausted_deliveries(
        &self,
        max_retries: i32,
        limit: i64,
    ) -> Result<Vec<ExhaustedDelivery>, StoreError>;

    /// Atomically insert `entry` and flip the log to skipped. Returns
    /// `false` when the log is no longer failed (already moved).
    async fn quarantine(&self, log_id: Uuid, entry: DeadLetterEntry) -> Result<bool, StoreError>;
}
