//! Broker abstractions.
//!
//! The lifecycle controller only needs to open connections and close them
//! again; everything protocol specific lives behind these traits so the
//! pooling logic can be exercised without a broker.

mod amqp;

pub use amqp::{build_uri, load_tls_config, AmqpConnection, LapinConnectionFactory};

use async_trait::async_trait;

use crate::error::ConnectionError;
use crate::types::AmqpConfig;

/// A live broker session.
#[async_trait]
pub trait BrokerConnection: Send + Sync + 'static {
    /// Close the session.
    async fn close(&self) -> anyhow::Result<()>;
}

/// Role specific helper bound to a single connection for its lifetime.
#[async_trait]
pub trait Worker: Send + Sync + 'static {
    /// Release whatever the worker holds on its connection.
    async fn close(&self) -> anyhow::Result<()>;
}

/// Builds broker connections from configuration.
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    type Connection: BrokerConnection;

    /// Make exactly one connection attempt.
    async fn create_connection(
        &self,
        config: &AmqpConfig,
    ) -> Result<Self::Connection, ConnectionError>;
}
