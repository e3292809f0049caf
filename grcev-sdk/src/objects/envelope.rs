//! Webhook envelope: the JSON body POSTed to subscriber endpoints.

use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Normalized envelope wrapping a domain event for webhook delivery.
///
/// Wire keys are PascalCase. `Payload` carries the event's own JSON
/// document untouched; `SchemaVersion` refers to that payload, not to
/// the envelope itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WebhookEnvelope {
    pub event_id: Uuid,
    pub event_type: CompactString,
    pub object_type: CompactString,
    pub object_id: Uuid,
    pub payload: serde_json::Value,
    #[serde(with = "time::serde::rfc3339")]
    pub occurred_at: time::OffsetDateTime,
    pub schema_version: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> WebhookEnvelope {
        WebhookEnvelope {
            event_id: Uuid::nil(),
            event_type: "control.updated".into(),
            object_type: "Control".into(),
            object_id: Uuid::nil(),
            payload: serde_json::json!({"control_id": 7, "severity": "high"}),
            occurred_at: time::OffsetDateTime::UNIX_EPOCH,
            schema_version: 1,
        }
    }

    #[test]
    fn wire_keys_are_pascal_case() {
        let json = serde_json::to_value(sample()).unwrap();
        let obj = json.as_object().unwrap();
        let mut keys: Vec<&str> = obj.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(
            keys,
            vec![
                "EventId",
                "EventType",
                "ObjectId",
                "ObjectType",
                "OccurredAt",
                "Payload",
                "SchemaVersion",
            ]
        );
    }

    #[test]
    fn round_trips_through_json() {
        let envelope = sample();
        let json = serde_json::to_string(&envelope).unwrap();
        let parsed: WebhookEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, envelope);
    }

    #[test]
    fn occurred_at_is_rfc3339() {
        let json = serde_json::to_value(sample()).unwrap();
        let occurred_at = json["OccurredAt"].as_str().unwrap();
        assert!(occurred_at.starts_with("1970-01-01T00:00:00"));
    }
}
