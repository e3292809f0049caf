use crate::framework::DatabaseProcessor;
use compact_str::CompactString;
use kanau::processor::Processor;
use uuid::Uuid;

/// Delivery channel of a subscription.
///
/// Stored as text in the registry. Unknown text is carried as
/// [`DeliveryMethod::Unrecognized`] instead of failing the row decode:
/// a misconfigured subscription must surface as repeated delivery
/// failures, never as a crash or a silently dropped work item.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DeliveryMethod {
    Webhook,
    Queue,
    DirectCall,
    Unrecognized(CompactString),
}

impl DeliveryMethod {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "webhook" => DeliveryMethod::Webhook,
            "queue" => DeliveryMethod::Queue,
            "direct_call" => DeliveryMethod::DirectCall,
            other => DeliveryMethod::Unrecognized(other.into()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            DeliveryMethod::Webhook => "webhook",
            DeliveryMethod::Queue => "queue",
            DeliveryMethod::DirectCall => "direct_call",
            DeliveryMethod::Unrecognized(raw) => raw,
        }
    }
}

impl std::fmt::Display for DeliveryMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Backoff family applied between failed delivery attempts.
///
/// Also stored as text; unrecognized text falls back to exponential
/// backoff, the safest default against retry storms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetryPolicy {
    None,
    Linear,
    Exponential,
}

impl RetryPolicy {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "none" => RetryPolicy::None,
            "linear" => RetryPolicy::Linear,
            _ => RetryPolicy::Exponential,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            RetryPolicy::None => "none",
            RetryPolicy::Linear => "linear",
            RetryPolicy::Exponential => "exponential",
        }
    }
}

impl std::fmt::Display for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An active subscription of an external system to domain events.
///
/// Read-only to the delivery engine; administrators manage these rows.
#[derive(Debug, Clone, PartialEq)]
pub struct EventSubscription {
    pub id: Uuid,
    pub subscription_code: CompactString,
    pub subscriber_system: CompactString,
    pub delivery_method: DeliveryMethod,
    pub delivery_endpoint: Option<String>,
    pub retry_policy: RetryPolicy,
    pub max_retries: i32,
}

/// Raw registry row; method and policy stay text until parsed.
#[derive(Debug, Clone, sqlx::FromRow)]
struct SubscriptionRow {
    id: Uuid,
    subscription_code: CompactString,
    subscriber_system: CompactString,
    delivery_method: String,
    delivery_endpoint: Option<String>,
    retry_policy: String,
    max_retries: i32,
}

impl From<SubscriptionRow> for EventSubscription {
    fn from(row: SubscriptionRow) -> Self {
        Self {
            id: row.id,
            subscription_code: row.subscription_code,
            subscriber_system: row.subscriber_system,
            delivery_method: DeliveryMethod::parse(&row.delivery_method),
            delivery_endpoint: row.delivery_endpoint,
            retry_policy: RetryPolicy::parse(&row.retry_policy),
            max_retries: row.max_retries,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GetSubscriptionById {
    pub subscription_id: Uuid,
}

impl Processor<GetSubscriptionById> for DatabaseProcessor {
    type Output = Option<EventSubscription>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetSubscriptionById")]
    async fn process(
        &self,
        query: GetSubscriptionById,
    ) -> Result<Option<EventSubscription>, sqlx::Error> {
        let row = sqlx::query_as::<_, SubscriptionRow>(
            r#"
            SELECT id, subscription_code, subscriber_system, delivery_method,
                   delivery_endpoint, retry_policy, max_retries
            FROM event_subscriptions
            WHERE id = $1
            "#,
        )
        .bind(query.subscription_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(EventSubscription::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivery_method_parse_round_trips() {
        for method in [
            DeliveryMethod::Webhook,
            DeliveryMethod::Queue,
            DeliveryMethod::DirectCall,
        ] {
            assert_eq!(DeliveryMethod::parse(method.as_str()), method);
        }
    }

    #[test]
    fn unknown_delivery_method_is_carried_not_dropped() {
        let method = DeliveryMethod::parse("carrier_pigeon");
        assert_eq!(
            method,
            DeliveryMethod::Unrecognized("carrier_pigeon".into())
        );
        assert_eq!(method.as_str(), "carrier_pigeon");
    }

    #[test]
    fn retry_policy_parse_round_trips() {
        for policy in [RetryPolicy::None, RetryPolicy::Linear, RetryPolicy::Exponential] {
            assert_eq!(RetryPolicy::parse(policy.as_str()), policy);
        }
    }

    #[test]
    fn unknown_retry_policy_defaults_to_exponential() {
        assert_eq!(RetryPolicy::parse("fibonacci"), RetryPolicy::Exponential);
        assert_eq!(RetryPolicy::parse(""), RetryPolicy::Exponential);
    }
}
