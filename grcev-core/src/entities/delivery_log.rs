use crate::framework::DatabaseProcessor;
use kanau::processor::Processor;
use uuid::Uuid;

/// State of a delivery log.
///
/// Transitions: `Pending` → `Delivered` on success; `Pending` → `Failed`
/// on failure (re-attempted while retries remain); `Failed` → `Skipped`
/// only through the dead-letter mover. `Delivered` and `Skipped` are
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "lowercase", type_name = "delivery_status")]
pub enum DeliveryStatus {
    Pending,
    Delivered,
    Failed,
    Skipped,
}

/// The per-(event, subscription) work item advanced by the dispatcher.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct EventDeliveryLog {
    pub id: Uuid,
    pub event_id: Uuid,
    pub subscription_id: Uuid,
    pub attempt_number: i32,
    pub status: DeliveryStatus,
    pub attempted_at: Option<time::OffsetDateTime>,
    pub next_retry_at: Option<time::OffsetDateTime>,
    pub http_status_code: Option<i32>,
    pub response_body: Option<String>,
    pub error_message: Option<String>,
    pub latency_ms: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct GetDeliveryLogById {
    pub log_id: Uuid,
}

impl Processor<GetDeliveryLogById> for DatabaseProcessor {
    type Output = Option<EventDeliveryLog>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetDeliveryLogById")]
    async fn process(
        &self,
        query: GetDeliveryLogById,
    ) -> Result<Option<EventDeliveryLog>, sqlx::Error> {
        sqlx::query_as::<_, EventDeliveryLog>(
            r#"
            SELECT id, event_id, subscription_id, attempt_number, status,
                   attempted_at, next_retry_at, http_status_code,
                   response_body, error_message, latency_ms
            FROM event_delivery_logs
            WHERE id = $1
            "#,
        )
        .bind(query.log_id)
        .fetch_optional(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
/// Claim a log for one attempt via an optimistic conditional increment.
///
/// The increment succeeds only if `attempt_number` still holds the value
/// the caller observed and the log is in a dispatchable state, so two
/// runners racing on the same row perform exactly one transport call.
pub struct ClaimDeliveryAttempt {
    pub log_id: Uuid,
    pub expected_attempt: i32,
    pub attempted_at: time::OffsetDateTime,
}

impl Processor<ClaimDeliveryAttempt> for DatabaseProcessor {
    type Output = u64;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:ClaimDeliveryAttempt")]
    async fn process(&self, cmd: ClaimDeliveryAttempt) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE event_delivery_logs
            SET attempt_number = attempt_number + 1, attempted_at = $3
            WHERE id = $1
              AND attempt_number = $2
              AND status IN ('pending', 'failed')
            "#,
        )
        .bind(cmd.log_id)
        .bind(cmd.expected_attempt)
        .bind(cmd.attempted_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[derive(Debug, Clone)]
/// Write back the outcome of a claimed attempt.
pub struct RecordDeliveryOutcome {
    pub log: EventDeliveryLog,
}

impl Processor<RecordDeliveryOutcome> for DatabaseProcessor {
    type Output = u64;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:RecordDeliveryOutcome")]
    async fn process(&self, cmd: RecordDeliveryOutcome) -> Result<u64, sqlx::Error> {
        let log = cmd.log;
        let result = sqlx::query(
            r#"
            UPDATE event_delivery_logs
            SET status = $2, next_retry_at = $3, http_status_code = $4,
                response_body = $5, error_message = $6, latency_ms = $7
            WHERE id = $1
            "#,
        )
        .bind(log.id)
        .bind(log.status)
        .bind(log.next_retry_at)
        .bind(log.http_status_code)
        .bind(log.response_body)
        .bind(log.error_message)
        .bind(log.latency_ms)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[derive(Debug, Clone)]
/// Select pending logs, oldest attempt first so no log starves.
pub struct GetPendingDeliveryIds {
    pub limit: i64,
}

impl Processor<GetPendingDeliveryIds> for DatabaseProcessor {
    type Output = Vec<Uuid>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetPendingDeliveryIds")]
    async fn process(&self, query: GetPendingDeliveryIds) -> Result<Vec<Uuid>, sqlx::Error> {
        sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT id
            FROM event_delivery_logs
            WHERE status = 'pending'
            ORDER BY attempted_at ASC NULLS FIRST
            LIMIT $1
            "#,
        )
        .bind(query.limit)
        .fetch_all(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
/// Select failed logs whose retry is due, earliest due first.
pub struct GetDueRetryIds {
    pub max_retries: i32,
    pub due_before: time::OffsetDateTime,
    pub limit: i64,
}

impl Processor<GetDueRetryIds> for DatabaseProcessor {
    type Output = Vec<Uuid>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetDueRetryIds")]
    async fn process(&self, query: GetDueRetryIds) -> Result<Vec<Uuid>, sqlx::Error> {
        sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT id
            FROM event_delivery_logs
            WHERE status = 'failed'
              AND attempt_number < $1
              AND next_retry_at IS NOT NULL
              AND next_retry_at <= $2
            ORDER BY next_retry_at ASC
            LIMIT $3
            "#,
        )
        .bind(query.max_retries)
        .bind(query.due_before)
        .bind(query.limit)
        .fetch_all(&self.pool)
        .await
    }
}

/// A failed log that exhausted its retries, joined with the payload of
/// its event so the dead-letter entry can carry a copy. `'null'` stands
/// in when the event row is gone.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ExhaustedDelivery {
    #[sqlx(flatten)]
    pub log: EventDeliveryLog,
    pub payload_json: String,
}

#[derive(Debug, Clone)]
pub struct GetExhaustedDeliveries {
    pub max_retries: i32,
    pub limit: i64,
}

impl Processor<GetExhaustedDeliveries> for DatabaseProcessor {
    type Output = Vec<ExhaustedDelivery>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetExhaustedDeliveries")]
    async fn process(
        &self,
        query: GetExhaustedDeliveries,
    ) -> Result<Vec<ExhaustedDelivery>, sqlx::Error> {
        sqlx::query_as::<_, ExhaustedDelivery>(
            r#"
            SELECT l.id, l.event_id, l.subscription_id, l.attempt_number,
                   l.status, l.attempted_at, l.next_retry_at,
                   l.http_status_code, l.response_body, l.error_message,
                   l.latency_ms,
                   COALESCE(e.payload_json, 'null') AS payload_json
            FROM event_delivery_logs l
            LEFT JOIN domain_events e ON e.id = l.event_id
            WHERE l.status = 'failed' AND l.attempt_number >= $1
            ORDER BY l.attempted_at ASC NULLS FIRST
            LIMIT $2
            "#,
        )
        .bind(query.max_retries)
        .bind(query.limit)
        .fetch_all(&self.pool)
        .await
    }
}

impl EventDeliveryLog {
    /// Flip an exhausted log to `skipped` inside a quarantine transaction.
    ///
    /// Conditional on the log still being `failed`, which makes a rerun
    /// of the dead-letter mover a no-op for already-moved logs.
    pub async fn mark_skipped_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        log_id: Uuid,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE event_delivery_logs
            SET status = 'skipped', next_retry_at = NULL
            WHERE id = $1 AND status = 'failed'
            "#,
        )
        .bind(log_id)
        .execute(&mut **tx)
        .await?;
        Ok(result.rows_affected())
    }
}
