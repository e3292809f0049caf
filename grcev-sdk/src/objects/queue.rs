//! Queue hand-off message.

use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Message handed off to a named queue for asynchronous consumption.
///
/// `Timestamp` is the unix time of the hand-off, not of the original
/// event; consumers needing the event time must read it from `Payload`
/// or fetch the event record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct QueueMessage {
    pub event_id: Uuid,
    pub subscription_code: CompactString,
    pub payload: serde_json::Value,
    pub timestamp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_keys_are_pascal_case() {
        let message = QueueMessage {
            event_id: Uuid::nil(),
            subscription_code: "audit-feed".into(),
            payload: serde_json::json!({"audit_id": 3}),
            timestamp: 1_700_000_000,
        };
        let json = serde_json::to_value(&message).unwrap();
        let obj = json.as_object().unwrap();
        let mut keys: Vec<&str> = obj.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(
            keys,
            vec!["EventId", "Payload", "SubscriptionCode", "Timestamp"]
        );
    }
}
