//! AMQP Lifecycle Library
//!
//! Pooled connection and worker lifecycle management for recurring AMQP
//! processing triggers. Connections are reused across triggers, broken
//! resources are discarded on the first failure, and shutdown drains the
//! pool without ever failing.

pub mod api;
pub mod broker;
pub mod error;
pub mod lifecycle;
pub mod roles;
pub mod types;
pub mod validation;

#[cfg(test)]
pub(crate) mod testing;

pub use broker::{BrokerConnection, ConnectionFactory, LapinConnectionFactory, Worker};
pub use error::{CloseError, ConnectionError, InvalidConfiguration, ProcessingError, TriggerError};
pub use lifecycle::{LifecycleController, ProcessingStep, Resource, ResourcePool, ShutdownSummary};
pub use types::{AmqpConfig, ClientAuth, TlsContext};
pub use validation::{validate, ValidationFailure};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::broker::*;
    pub use crate::error::*;
    pub use crate::lifecycle::*;
    pub use crate::roles::*;
    pub use crate::types::*;
    pub use crate::validation::*;
}

/// Default broker host
pub const DEFAULT_HOST: &str = "localhost";

/// Default AMQP port (5671 is the usual TLS port)
pub const DEFAULT_AMQP_PORT: u16 = 5672;

/// Default connection name reported to the broker
pub const DEFAULT_CONNECTION_NAME: &str = "amqp-lifecycle";

/// Default consumer prefetch
pub const DEFAULT_PREFETCH_COUNT: u16 = 10;
