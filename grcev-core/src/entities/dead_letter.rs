use uuid::Uuid;

/// Error message recorded when an exhausted log carries none of its own.
pub const DEFAULT_DEAD_LETTER_ERROR: &str = "Max retries exceeded";

/// Remediation state of a dead-letter entry, resolved independently of
/// the delivery log that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "lowercase", type_name = "dead_letter_status")]
pub enum DeadLetterStatus {
    Pending,
    Resolved,
    Ignored,
}

/// Terminal quarantine record for a delivery that exhausted its retries.
///
/// Carries its own copy of the event payload so remediation does not
/// depend on the event row still existing. Created once by the
/// dead-letter mover and never touched by the dispatcher again.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct DeadLetterEntry {
    pub id: Uuid,
    pub event_id: Uuid,
    pub subscription_id: Uuid,
    pub payload_json: String,
    pub error_message: String,
    pub failure_count: i32,
    pub status: DeadLetterStatus,
    pub created_at: time::OffsetDateTime,
}

impl DeadLetterEntry {
    /// Insert the entry inside a quarantine transaction.
    pub async fn insert_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        entry: &DeadLetterEntry,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO dead_letter_entries
                (id, event_id, subscription_id, payload_json, error_message,
                 failure_count, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(entry.id)
        .bind(entry.event_id)
        .bind(entry.subscription_id)
        .bind(&entry.payload_json)
        .bind(&entry.error_message)
        .bind(entry.failure_count)
        .bind(entry.status)
        .bind(entry.created_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}
