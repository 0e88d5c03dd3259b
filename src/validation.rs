//! Pre-flight validation of broker configuration.
//!
//! Validation never connects and never fails: it returns every rule violation
//! it finds so the host can report them all and refuse to start the component.

use std::fmt;

use serde::Serialize;

use crate::types::{AmqpConfig, ConsumerSettings};

const USER: &str = "User Name";
const PASSWORD: &str = "Password";
const USE_CERT_AUTHENTICATION: &str = "Use Client Certificate Authentication";
const SSL_CONTEXT: &str = "SSL Context Service";

/// A single configuration rule violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationFailure {
    /// What the failure is about
    pub subject: String,
    /// Human readable explanation
    pub explanation: String,
}

impl ValidationFailure {
    pub fn new(subject: &str, explanation: impl Into<String>) -> Self {
        Self {
            subject: subject.to_string(),
            explanation: explanation.into(),
        }
    }
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.subject, self.explanation)
    }
}

/// Validate a connection configuration.
///
/// All rules are checked independently; the result is empty when the
/// configuration is usable.
pub fn validate(config: &AmqpConfig) -> Vec<ValidationFailure> {
    let mut failures = Vec::new();

    if config.host.trim().is_empty() {
        failures.push(ValidationFailure::new("Host Name", "must not be empty"));
    }

    if config.port == 0 {
        failures.push(ValidationFailure::new("Port", "must be between 1 and 65535"));
    }

    if config.virtual_host.as_deref().is_some_and(str::is_empty) {
        failures.push(ValidationFailure::new(
            "Virtual Host",
            "must not be empty when set",
        ));
    }

    let user_configured = config.username_set();
    let password_configured = config.password_set();
    let use_cert_authentication = config.use_cert_authentication;

    if use_cert_authentication && (user_configured || password_configured) {
        failures.push(ValidationFailure::new(
            "Authentication configuration",
            format!(
                "'{USER}' with '{PASSWORD}' and '{USE_CERT_AUTHENTICATION}' cannot be configured at the same time"
            ),
        ));
    }

    if !use_cert_authentication && !(user_configured && password_configured) {
        failures.push(ValidationFailure::new(
            "Authentication configuration",
            format!(
                "either '{USER}' with '{PASSWORD}' or '{USE_CERT_AUTHENTICATION}' must be configured"
            ),
        ));
    }

    if use_cert_authentication && config.tls.is_none() {
        failures.push(ValidationFailure::new(
            "SSL configuration",
            format!("'{USE_CERT_AUTHENTICATION}' has been set but no '{SSL_CONTEXT}' configured"),
        ));
    }

    failures
}

/// Validate the consuming role settings.
pub fn validate_consumer(settings: &ConsumerSettings) -> Vec<ValidationFailure> {
    let mut failures = Vec::new();

    if settings.queue.trim().is_empty() {
        failures.push(ValidationFailure::new("Queue", "must not be empty"));
    }

    failures
}
