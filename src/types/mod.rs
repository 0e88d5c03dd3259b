//! Core types for the lifecycle service.

mod config;
mod message;

pub use config::{
    AmqpConfig, ClientAuth, ConsumerSettings, PublisherSettings, ServiceConfig, TlsContext,
};
pub use message::{InboundMessage, OutboundMessage};
