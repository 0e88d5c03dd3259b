//! AMQP 0-9-1 connections backed by `lapin`.

use async_trait::async_trait;
use lapin::tcp::{OwnedIdentity, OwnedTLSConfig};
use lapin::uri::{AMQPAuthority, AMQPQueryString, AMQPScheme, AMQPUri, AMQPUserInfo, SASLMechanism};
use lapin::{Channel, Connection, ConnectionProperties};
use tracing::{debug, info, instrument};

use super::{BrokerConnection, ConnectionFactory};
use crate::error::ConnectionError;
use crate::types::{AmqpConfig, TlsContext};

/// Reply code sent with a clean connection or channel close.
const REPLY_SUCCESS: u16 = 200;

/// Build the broker URI for a configuration.
///
/// A TLS context switches the scheme to `amqps`. Certificate authentication
/// selects SASL EXTERNAL so the broker takes the identity from the client
/// certificate; otherwise username and password are sent with PLAIN.
pub fn build_uri(config: &AmqpConfig) -> AMQPUri {
    let scheme = if config.tls.is_some() {
        AMQPScheme::AMQPS
    } else {
        AMQPScheme::AMQP
    };

    let (userinfo, mechanism) = if config.tls.is_some() && config.use_cert_authentication {
        (
            AMQPUserInfo {
                username: String::new(),
                password: String::new(),
            },
            SASLMechanism::External,
        )
    } else {
        (
            AMQPUserInfo {
                username: config.username.clone().unwrap_or_default(),
                password: config.password.clone().unwrap_or_default(),
            },
            SASLMechanism::Plain,
        )
    };

    AMQPUri {
        scheme,
        authority: AMQPAuthority {
            userinfo,
            host: config.host.clone(),
            port: config.port,
        },
        vhost: config
            .virtual_host
            .clone()
            .unwrap_or_else(|| "/".to_string()),
        query: AMQPQueryString {
            auth_mechanism: Some(mechanism),
            ..Default::default()
        },
    }
}

/// Read the TLS material referenced by a context.
pub fn load_tls_config(tls: &TlsContext) -> Result<OwnedTLSConfig, ConnectionError> {
    let cert_chain = tls
        .ca_cert_path
        .as_ref()
        .map(|path| {
            std::fs::read_to_string(path).map_err(|source| ConnectionError::Tls {
                path: path.clone(),
                source,
            })
        })
        .transpose()?;

    let identity = tls
        .identity_path
        .as_ref()
        .map(|path| {
            std::fs::read(path)
                .map(|der| OwnedIdentity {
                    der,
                    password: tls.identity_password.clone().unwrap_or_default(),
                })
                .map_err(|source| ConnectionError::Tls {
                    path: path.clone(),
                    source,
                })
        })
        .transpose()?;

    Ok(OwnedTLSConfig {
        identity,
        cert_chain,
    })
}

/// A `lapin` connection together with the target it was opened against.
pub struct AmqpConnection {
    inner: Connection,
    target: String,
}

impl AmqpConnection {
    /// Open a new channel on this connection.
    pub async fn create_channel(&self) -> anyhow::Result<Channel> {
        Ok(self.inner.create_channel().await?)
    }

    /// The `host:port/vhost` this connection was opened against.
    pub fn target(&self) -> &str {
        &self.target
    }
}

#[async_trait]
impl BrokerConnection for AmqpConnection {
    async fn close(&self) -> anyhow::Result<()> {
        if self.inner.status().connected() {
            self.inner.close(REPLY_SUCCESS, "OK").await?;
        }
        debug!(broker = %self.target(), "AMQP connection closed");
        Ok(())
    }
}

/// Connection factory that opens real broker connections.
#[derive(Debug, Clone, Default)]
pub struct LapinConnectionFactory;

impl LapinConnectionFactory {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ConnectionFactory for LapinConnectionFactory {
    type Connection = AmqpConnection;

    #[instrument(skip_all, fields(broker = %config.target()))]
    async fn create_connection(
        &self,
        config: &AmqpConfig,
    ) -> Result<AmqpConnection, ConnectionError> {
        let target = config.target();
        let uri = build_uri(config);

        let tls = match &config.tls {
            Some(tls) => load_tls_config(tls)?,
            None => OwnedTLSConfig::default(),
        };

        let properties = ConnectionProperties::default()
            .with_connection_name(config.connection_name.clone().into());

        let inner = Connection::connect_uri_with_config(uri, properties, tls)
            .await
            .map_err(|e| ConnectionError::Establish {
                target: target.clone(),
                source: e.into(),
            })?;

        info!(
            broker = %target,
            cert_auth = config.use_cert_authentication,
            tls = config.tls.is_some(),
            "AMQP connection established"
        );

        Ok(AmqpConnection { inner, target })
    }
}
