//! Message types exchanged with the publishing and consuming roles.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A message handed to the publisher for one trigger invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Message body
    pub payload: String,

    /// Routing key override; the configured key is used when absent
    #[serde(default)]
    pub routing_key: Option<String>,

    /// MIME type of the body
    #[serde(default)]
    pub content_type: Option<String>,

    /// Application headers
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl OutboundMessage {
    /// Create a message with the given body.
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            ..Default::default()
        }
    }

    /// Set the routing key.
    pub fn with_routing_key(mut self, routing_key: &str) -> Self {
        self.routing_key = Some(routing_key.to_string());
        self
    }

    /// Add a header.
    pub fn with_header(mut self, key: &str, value: &str) -> Self {
        self.headers.insert(key.to_string(), value.to_string());
        self
    }
}

/// A message pulled from the broker by the consumer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Local identifier
    pub id: Uuid,

    /// Message body, lossily decoded as UTF-8
    pub payload: String,

    /// `amqp$*` attributes derived from the delivery and its properties
    pub attributes: BTreeMap<String, String>,

    /// When the message was pulled
    pub received_at: DateTime<Utc>,
}

impl InboundMessage {
    /// Create an inbound message from a raw body and its attributes.
    pub fn new(body: &[u8], attributes: BTreeMap<String, String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            payload: String::from_utf8_lossy(body).into_owned(),
            attributes,
            received_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_outbound_from_minimal_json() {
        let message: OutboundMessage = serde_json::from_str(r#"{"payload": "hello"}"#).unwrap();
        assert_eq!(message.payload, "hello");
        assert!(message.routing_key.is_none());
        assert!(message.headers.is_empty());
    }

    #[test]
    fn test_outbound_from_full_json() {
        let message: OutboundMessage = serde_json::from_str(
            r#"{
                "payload": "{\"id\": 1}",
                "routing_key": "orders.created",
                "content_type": "application/json",
                "headers": {"tenant": "acme"}
            }"#,
        )
        .unwrap();

        assert_eq!(message.routing_key.as_deref(), Some("orders.created"));
        assert_eq!(message.content_type.as_deref(), Some("application/json"));
        assert_eq!(message.headers.get("tenant").map(String::as_str), Some("acme"));
    }

    #[test]
    fn test_inbound_decodes_lossily() {
        let message = InboundMessage::new(&[b'o', b'k', 0xff], BTreeMap::new());
        assert_eq!(message.payload, "ok\u{fffd}");

        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["payload"], "ok\u{fffd}");
        assert_eq!(json["attributes"], serde_json::json!({}));
    }
}
