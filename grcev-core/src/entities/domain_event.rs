use crate::framework::DatabaseProcessor;
use compact_str::CompactString;
use kanau::processor::Processor;
use uuid::Uuid;

/// Processing status of a domain event.
///
/// `Processed` means at least one subscription has received the event;
/// per-subscription completion lives in the delivery logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "lowercase", type_name = "event_status")]
pub enum EventStatus {
    Pending,
    Processed,
}

/// An immutable domain event recorded by a producer.
///
/// `payload_json` is kept as raw JSON text and parsed at dispatch time,
/// so a malformed payload surfaces as a delivery failure on the log
/// rather than a decode error on the read path.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct DomainEvent {
    pub id: Uuid,
    pub event_type: CompactString,
    pub object_type: CompactString,
    pub object_id: Uuid,
    pub payload_json: String,
    pub occurred_at: time::OffsetDateTime,
    pub schema_version: i32,
    pub status: EventStatus,
    pub processed_at: Option<time::OffsetDateTime>,
}

#[derive(Debug, Clone)]
pub struct GetDomainEventById {
    pub event_id: Uuid,
}

impl Processor<GetDomainEventById> for DatabaseProcessor {
    type Output = Option<DomainEvent>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetDomainEventById")]
    async fn process(&self, query: GetDomainEventById) -> Result<Option<DomainEvent>, sqlx::Error> {
        sqlx::query_as::<_, DomainEvent>(
            r#"
            SELECT id, event_type, object_type, object_id, payload_json,
                   occurred_at, schema_version, status, processed_at
            FROM domain_events
            WHERE id = $1
            "#,
        )
        .bind(query.event_id)
        .fetch_optional(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
/// Flip an event to `processed` on its first successful delivery.
///
/// Conditional on the event still being `pending`, so later deliveries
/// for other subscriptions leave `processed_at` at the first success.
pub struct MarkDomainEventProcessed {
    pub event_id: Uuid,
    pub processed_at: time::OffsetDateTime,
}

impl Processor<MarkDomainEventProcessed> for DatabaseProcessor {
    type Output = u64;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:MarkDomainEventProcessed")]
    async fn process(&self, cmd: MarkDomainEventProcessed) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE domain_events
            SET status = 'processed', processed_at = $2
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(cmd.event_id)
        .bind(cmd.processed_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
