//! Publishing and consuming roles.
//!
//! Each role provides a worker bound to one channel and the processing step
//! the lifecycle controller runs on every trigger.

pub mod consumer;
pub mod publisher;

pub use consumer::{AmqpConsumer, ConsumeStep};
pub use publisher::{AmqpPublisher, PublishStep};

use crate::broker::LapinConnectionFactory;
use crate::lifecycle::LifecycleController;

/// Controller for the publishing role against a real broker.
pub type PublishController = LifecycleController<LapinConnectionFactory, PublishStep>;

/// Controller for the consuming role against a real broker.
pub type ConsumeController = LifecycleController<LapinConnectionFactory, ConsumeStep>;
