//! Error types for connection, processing and teardown failures.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

use crate::validation::ValidationFailure;

/// Stable identifier of a pooled resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceId(Uuid);

impl ResourceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ResourceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Configuration rejected before any connection attempt.
#[derive(Debug, Error)]
#[error("invalid configuration: {}", summarize(.failures))]
pub struct InvalidConfiguration {
    pub failures: Vec<ValidationFailure>,
}

fn summarize(failures: &[ValidationFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Failure while building a connection or its worker. Never retried internally.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("failed to establish connection with AMQP broker {target}")]
    Establish {
        target: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to read TLS material from {}", .path.display())]
    Tls {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create worker on connection to {target}")]
    Worker {
        target: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Failure while closing one half of a resource.
#[derive(Debug, Error)]
pub enum CloseError {
    #[error("failed to close worker of resource {resource_id}")]
    Worker {
        resource_id: ResourceId,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to close connection of resource {resource_id}")]
    Connection {
        resource_id: ResourceId,
        #[source]
        source: anyhow::Error,
    },
}

impl CloseError {
    pub fn resource_id(&self) -> ResourceId {
        match self {
            Self::Worker { resource_id, .. } | Self::Connection { resource_id, .. } => *resource_id,
        }
    }
}

/// A processing step failed and its resource was discarded.
///
/// `cause` is always the original failure. A failure to close the discarded
/// resource is kept in `suppressed` and never replaces it.
#[derive(Debug, Error)]
#[error("processing failed on resource {resource_id}: {cause:#}")]
pub struct ProcessingError {
    pub resource_id: ResourceId,
    #[source]
    pub cause: anyhow::Error,
    pub suppressed: Option<CloseError>,
}

impl ProcessingError {
    /// The failure raised by the processing step.
    pub fn root_cause(&self) -> &anyhow::Error {
        &self.cause
    }

    /// The failure raised while closing the discarded resource, if any.
    pub fn suppressed(&self) -> Option<&CloseError> {
        self.suppressed.as_ref()
    }
}

/// Error returned from a single trigger invocation.
#[derive(Debug, Error)]
pub enum TriggerError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Processing(#[from] ProcessingError),

    #[error("lifecycle controller has been shut down")]
    Shutdown,
}
