//! Consuming role.

use std::collections::BTreeMap;

use async_trait::async_trait;
use lapin::options::{BasicAckOptions, BasicGetOptions, BasicQosOptions};
use lapin::types::{AMQPValue, FieldTable, ShortString};
use lapin::{BasicProperties, Channel};
use tracing::{debug, instrument};

use crate::broker::{AmqpConnection, Worker};
use crate::lifecycle::ProcessingStep;
use crate::types::{ConsumerSettings, InboundMessage};

/// Pulls messages from one queue on a channel owned for the worker's lifetime.
pub struct AmqpConsumer {
    channel: Channel,
    queue: String,
    auto_ack: bool,
}

impl AmqpConsumer {
    /// Apply the prefetch to the channel and wrap it.
    pub async fn new(channel: Channel, settings: &ConsumerSettings) -> anyhow::Result<Self> {
        channel
            .basic_qos(settings.prefetch_count, BasicQosOptions::default())
            .await?;
        Ok(Self {
            channel,
            queue: settings.queue.clone(),
            auto_ack: settings.auto_ack,
        })
    }

    /// Pull at most one message.
    ///
    /// Without auto-ack the message is acknowledged once it has been
    /// converted; a failure before that leaves it with the broker.
    #[instrument(skip(self), fields(queue = %self.queue))]
    pub async fn fetch(&self) -> anyhow::Result<Option<InboundMessage>> {
        let message = self
            .channel
            .basic_get(
                &self.queue,
                BasicGetOptions {
                    no_ack: self.auto_ack,
                },
            )
            .await?;

        let Some(message) = message else {
            debug!("Queue is empty");
            return Ok(None);
        };

        let delivery = message.delivery;
        let attributes = message_attributes(
            &delivery.properties,
            delivery.routing_key.as_str(),
            delivery.exchange.as_str(),
            delivery.redelivered,
        );
        let inbound = InboundMessage::new(&delivery.data, attributes);

        if !self.auto_ack {
            delivery.acker.ack(BasicAckOptions::default()).await?;
        }

        debug!(message_id = %inbound.id, bytes = delivery.data.len(), "Message received");
        Ok(Some(inbound))
    }
}

#[async_trait]
impl Worker for AmqpConsumer {
    async fn close(&self) -> anyhow::Result<()> {
        if self.channel.status().connected() {
            self.channel.close(200, "OK").await?;
        }
        Ok(())
    }
}

/// Derive `amqp$*` attributes from a delivery.
pub fn message_attributes(
    properties: &BasicProperties,
    routing_key: &str,
    exchange: &str,
    redelivered: bool,
) -> BTreeMap<String, String> {
    let mut attributes = BTreeMap::new();

    let mut put = |key: &str, value: Option<String>| {
        if let Some(value) = value {
            attributes.insert(format!("amqp${key}"), value);
        }
    };

    put("routingKey", Some(routing_key.to_string()));
    put("exchange", Some(exchange.to_string()));
    put("redelivered", Some(redelivered.to_string()));
    put("appId", short(properties.app_id()));
    put("contentEncoding", short(properties.content_encoding()));
    put("contentType", short(properties.content_type()));
    put("correlationId", short(properties.correlation_id()));
    put("replyTo", short(properties.reply_to()));
    put("expiration", short(properties.expiration()));
    put("messageId", short(properties.message_id()));
    put("type", short(properties.kind()));
    put("userId", short(properties.user_id()));
    put("clusterId", short(properties.cluster_id()));
    put("deliveryMode", properties.delivery_mode().map(|v| v.to_string()));
    put("priority", properties.priority().map(|v| v.to_string()));
    put("timestamp", properties.timestamp().map(|v| v.to_string()));
    put("headers", properties.headers().as_ref().map(format_headers));

    attributes
}

fn short(value: &Option<ShortString>) -> Option<String> {
    value.as_ref().map(|v| v.as_str().to_string())
}

fn format_headers(headers: &FieldTable) -> String {
    headers
        .inner()
        .iter()
        .map(|(key, value)| format!("{}={}", key.as_str(), format_value(value)))
        .collect::<Vec<_>>()
        .join(",")
}

fn format_value(value: &AMQPValue) -> String {
    match value {
        AMQPValue::LongString(s) => String::from_utf8_lossy(s.as_bytes()).into_owned(),
        AMQPValue::ShortString(s) => s.as_str().to_string(),
        AMQPValue::Boolean(b) => b.to_string(),
        AMQPValue::LongInt(i) => i.to_string(),
        AMQPValue::LongLongInt(i) => i.to_string(),
        other => format!("{other:?}"),
    }
}

/// Processing step that pulls one message per trigger.
pub struct ConsumeStep {
    settings: ConsumerSettings,
}

impl ConsumeStep {
    pub fn new(settings: ConsumerSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl ProcessingStep<AmqpConnection> for ConsumeStep {
    type Worker = AmqpConsumer;
    type Input = ();
    type Output = Option<InboundMessage>;

    fn name(&self) -> &'static str {
        "consume"
    }

    async fn create_worker(&self, connection: &AmqpConnection) -> anyhow::Result<AmqpConsumer> {
        let channel = connection.create_channel().await?;
        AmqpConsumer::new(channel, &self.settings).await
    }

    async fn process(
        &self,
        _connection: &AmqpConnection,
        worker: &mut AmqpConsumer,
        _input: (),
    ) -> anyhow::Result<Option<InboundMessage>> {
        worker.fetch().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lapin::types::LongString;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_attributes_from_minimal_delivery() {
        let attributes =
            message_attributes(&BasicProperties::default(), "orders.created", "events", false);

        assert_eq!(
            attributes,
            BTreeMap::from([
                ("amqp$exchange".to_string(), "events".to_string()),
                ("amqp$redelivered".to_string(), "false".to_string()),
                ("amqp$routingKey".to_string(), "orders.created".to_string()),
            ])
        );
    }

    #[test]
    fn test_attributes_from_properties() {
        let mut headers = FieldTable::default();
        headers.insert(
            ShortString::from("tenant"),
            AMQPValue::LongString(LongString::from("acme")),
        );
        headers.insert(ShortString::from("retries"), AMQPValue::LongInt(3));

        let properties = BasicProperties::default()
            .with_content_type(ShortString::from("application/json"))
            .with_app_id(ShortString::from("billing"))
            .with_message_id(ShortString::from("m-1"))
            .with_delivery_mode(2)
            .with_priority(5)
            .with_headers(headers);

        let attributes = message_attributes(&properties, "", "", true);

        assert_eq!(attributes["amqp$contentType"], "application/json");
        assert_eq!(attributes["amqp$appId"], "billing");
        assert_eq!(attributes["amqp$messageId"], "m-1");
        assert_eq!(attributes["amqp$deliveryMode"], "2");
        assert_eq!(attributes["amqp$priority"], "5");
        assert_eq!(attributes["amqp$redelivered"], "true");
        assert_eq!(attributes["amqp$headers"], "retries=3,tenant=acme");
        assert!(!attributes.contains_key("amqp$correlationId"));
    }
}
