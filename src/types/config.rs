//! Configuration types for broker connections and roles.

use std::fmt;
use std::path::PathBuf;

use serde::Deserialize;

use crate::{DEFAULT_AMQP_PORT, DEFAULT_CONNECTION_NAME, DEFAULT_HOST, DEFAULT_PREFETCH_COUNT};

/// Broker connection configuration.
///
/// Read once per component activation and treated as immutable afterwards.
/// Exactly one credential path may be active: username and password, or
/// client certificate authentication (which additionally needs [`TlsContext`]).
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct AmqpConfig {
    /// Network address of the broker
    pub host: String,

    /// Broker port
    pub port: u16,

    /// Virtual host segregating the broker
    pub virtual_host: Option<String>,

    /// User name for PLAIN authentication
    pub username: Option<String>,

    /// Password for PLAIN authentication
    pub password: Option<String>,

    /// TLS material; switches the transport to `amqps`
    pub tls: Option<TlsContext>,

    /// Authenticate with the TLS client certificate (SASL EXTERNAL)
    pub use_cert_authentication: bool,

    /// Deprecated. Accepted for configuration compatibility, has no effect.
    pub client_auth: ClientAuth,

    /// Name reported to the broker for connections built from this config
    pub connection_name: String,
}

impl Default for AmqpConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_AMQP_PORT,
            virtual_host: None,
            username: None,
            password: None,
            tls: None,
            use_cert_authentication: false,
            client_auth: ClientAuth::default(),
            connection_name: DEFAULT_CONNECTION_NAME.to_string(),
        }
    }
}

// Hand-written so the password never reaches the logs.
impl fmt::Debug for AmqpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AmqpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("virtual_host", &self.virtual_host)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "********"))
            .field("tls", &self.tls)
            .field("use_cert_authentication", &self.use_cert_authentication)
            .field("client_auth", &self.client_auth)
            .field("connection_name", &self.connection_name)
            .finish()
    }
}

impl AmqpConfig {
    /// Create a config using username/password authentication.
    pub fn with_credentials(host: &str, username: &str, password: &str) -> Self {
        Self {
            host: host.to_string(),
            username: Some(username.to_string()),
            password: Some(password.to_string()),
            ..Default::default()
        }
    }

    /// Create a config using client certificate authentication.
    pub fn with_certificate(host: &str, tls: TlsContext) -> Self {
        Self {
            host: host.to_string(),
            tls: Some(tls),
            use_cert_authentication: true,
            ..Default::default()
        }
    }

    /// Set the port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the virtual host.
    pub fn with_virtual_host(mut self, vhost: &str) -> Self {
        self.virtual_host = Some(vhost.to_string());
        self
    }

    /// Set the TLS context.
    pub fn with_tls(mut self, tls: TlsContext) -> Self {
        self.tls = Some(tls);
        self
    }

    /// Whether a user name is configured. Empty strings count as unset.
    pub fn username_set(&self) -> bool {
        is_set(&self.username)
    }

    /// Whether a password is configured. Empty strings count as unset.
    pub fn password_set(&self) -> bool {
        is_set(&self.password)
    }

    /// Human readable description of the broker this config points at,
    /// in the form `host:port/vhost`.
    pub fn target(&self) -> String {
        format!(
            "{}:{}/{}",
            self.host,
            self.port,
            self.virtual_host.as_deref().unwrap_or_default()
        )
    }
}

fn is_set(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.is_empty())
}

/// TLS material used to secure the broker transport.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TlsContext {
    /// PEM encoded CA chain used to verify the broker
    pub ca_cert_path: Option<PathBuf>,

    /// PKCS#12 archive with the client certificate and key
    pub identity_path: Option<PathBuf>,

    /// Password protecting the PKCS#12 archive
    pub identity_password: Option<String>,
}

impl fmt::Debug for TlsContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsContext")
            .field("ca_cert_path", &self.ca_cert_path)
            .field("identity_path", &self.identity_path)
            .field(
                "identity_password",
                &self.identity_password.as_ref().map(|_| "********"),
            )
            .finish()
    }
}

impl TlsContext {
    /// TLS context that only verifies the broker against a CA chain.
    pub fn with_ca(ca_cert_path: impl Into<PathBuf>) -> Self {
        Self {
            ca_cert_path: Some(ca_cert_path.into()),
            ..Default::default()
        }
    }

    /// Add a client identity for certificate authentication.
    pub fn with_identity(mut self, path: impl Into<PathBuf>, password: &str) -> Self {
        self.identity_path = Some(path.into());
        self.identity_password = Some(password.to_string());
        self
    }
}

/// Client authentication mode of the TLS context.
///
/// Deprecated: retained so existing configurations still load. It is never
/// consulted when building connections.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ClientAuth {
    #[default]
    None,
    Want,
    Required,
}

/// Settings for the publishing role.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PublisherSettings {
    /// Exchange to publish to. Empty means the default exchange.
    pub exchange: String,

    /// Routing key used when a message does not carry its own
    pub routing_key: String,
}

/// Settings for the consuming role.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConsumerSettings {
    /// Queue to pull messages from
    pub queue: String,

    /// Let the broker consider messages acknowledged on delivery
    pub auto_ack: bool,

    /// Channel prefetch (basic.qos)
    pub prefetch_count: u16,
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        Self {
            queue: String::new(),
            auto_ack: false,
            prefetch_count: DEFAULT_PREFETCH_COUNT,
        }
    }
}

/// Top-level configuration of the service binary.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Broker connection shared by both roles
    pub amqp: AmqpConfig,

    /// Publisher role settings
    pub publish: PublisherSettings,

    /// Consumer role settings
    pub consume: ConsumerSettings,

    /// HTTP listen port
    pub http_port: u16,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            amqp: AmqpConfig::default(),
            publish: PublisherSettings::default(),
            consume: ConsumerSettings::default(),
            http_port: 3018,
        }
    }
}

impl ServiceConfig {
    /// Load configuration from an optional `amqp-lifecycle.toml` file and
    /// `APP_*` environment variables.
    ///
    /// Nested keys use a double underscore, e.g. `APP_AMQP__HOST` or
    /// `APP_AMQP__TLS__CA_CERT_PATH`. `PORT` overrides the HTTP port.
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::layered("amqp-lifecycle", None, std::env::var("PORT").ok().as_deref())
    }

    /// Layer `file` (any supported extension, optional), then `APP_*`
    /// variables from `env` or the process environment, then `port`.
    /// An unparsable port is ignored.
    fn layered(
        file: &str,
        env: Option<config::Map<String, String>>,
        port: Option<&str>,
    ) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder()
            .add_source(config::File::with_name(file).required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .source(env),
            );

        if let Some(port) = port.and_then(|p| p.parse::<u16>().ok()) {
            builder = builder.set_override("http_port", i64::from(port))?;
        }

        builder.build()?.try_deserialize()
    }

    /// Parse configuration from a TOML document.
    pub fn from_toml(source: &str) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()?
            .try_deserialize()
    }
}
