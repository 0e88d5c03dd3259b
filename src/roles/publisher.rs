//! Publishing role.

use async_trait::async_trait;
use lapin::options::{BasicPublishOptions, ConfirmSelectOptions};
use lapin::publisher_confirm::Confirmation;
use lapin::types::{AMQPValue, FieldTable, LongString, ShortString};
use lapin::{BasicProperties, Channel};
use tracing::{debug, instrument, warn};

use crate::broker::{AmqpConnection, Worker};
use crate::lifecycle::ProcessingStep;
use crate::types::{OutboundMessage, PublisherSettings};

/// Persistent delivery mode.
const PERSISTENT: u8 = 2;

/// Publishes on a confirm-mode channel owned for the worker's lifetime.
pub struct AmqpPublisher {
    channel: Channel,
}

impl AmqpPublisher {
    /// Put the channel in confirm mode and wrap it.
    pub async fn new(channel: Channel) -> anyhow::Result<Self> {
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await?;
        Ok(Self { channel })
    }

    /// Publish one message and wait for the broker's confirmation.
    ///
    /// Messages are mandatory: an unroutable message comes back from the
    /// broker and is logged. A NACK is an error.
    #[instrument(skip(self, message), fields(bytes = message.payload.len()))]
    pub async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        message: &OutboundMessage,
    ) -> anyhow::Result<()> {
        let confirmation = self
            .channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions {
                    mandatory: true,
                    ..Default::default()
                },
                message.payload.as_bytes(),
                message_properties(message),
            )
            .await?
            .await?;

        match confirmation {
            Confirmation::Ack(Some(_returned)) => {
                warn!(
                    exchange = %exchange,
                    routing_key = %routing_key,
                    "Message was not routable and was returned by the broker"
                );
            }
            Confirmation::Ack(None) | Confirmation::NotRequested => {
                debug!(exchange = %exchange, routing_key = %routing_key, "Message published");
            }
            Confirmation::Nack(_) => {
                anyhow::bail!(
                    "broker rejected message published to exchange '{}' with routing key '{}'",
                    exchange,
                    routing_key
                );
            }
        }

        Ok(())
    }
}

#[async_trait]
impl Worker for AmqpPublisher {
    async fn close(&self) -> anyhow::Result<()> {
        if self.channel.status().connected() {
            self.channel.close(200, "OK").await?;
        }
        Ok(())
    }
}

/// Build the AMQP properties for an outbound message.
pub fn message_properties(message: &OutboundMessage) -> BasicProperties {
    let mut properties = BasicProperties::default().with_delivery_mode(PERSISTENT);

    if let Some(content_type) = &message.content_type {
        properties = properties.with_content_type(ShortString::from(content_type.as_str()));
    }

    if !message.headers.is_empty() {
        let mut headers = FieldTable::default();
        for (key, value) in &message.headers {
            headers.insert(
                ShortString::from(key.as_str()),
                AMQPValue::LongString(LongString::from(value.as_str())),
            );
        }
        properties = properties.with_headers(headers);
    }

    properties
}

/// Processing step that publishes one message per trigger.
pub struct PublishStep {
    settings: PublisherSettings,
}

impl PublishStep {
    pub fn new(settings: PublisherSettings) -> Self {
        Self { settings }
    }

    pub fn exchange(&self) -> &str {
        &self.settings.exchange
    }

    /// Routing key for a message: its own, or the configured default.
    pub fn routing_key_for<'a>(&'a self, message: &'a OutboundMessage) -> &'a str {
        message
            .routing_key
            .as_deref()
            .unwrap_or(&self.settings.routing_key)
    }
}

#[async_trait]
impl ProcessingStep<AmqpConnection> for PublishStep {
    type Worker = AmqpPublisher;
    type Input = OutboundMessage;
    type Output = ();

    fn name(&self) -> &'static str {
        "publish"
    }

    async fn create_worker(&self, connection: &AmqpConnection) -> anyhow::Result<AmqpPublisher> {
        let channel = connection.create_channel().await?;
        AmqpPublisher::new(channel).await
    }

    async fn process(
        &self,
        _connection: &AmqpConnection,
        worker: &mut AmqpPublisher,
        message: OutboundMessage,
    ) -> anyhow::Result<()> {
        let routing_key = self.routing_key_for(&message);
        worker
            .publish(&self.settings.exchange, routing_key, &message)
            .await
    }
}
