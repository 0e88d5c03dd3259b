//! Resource pooling and trigger lifecycle.
//!
//! A [`LifecycleController`] owns a [`ResourcePool`] of connection/worker
//! pairs and runs one [`ProcessingStep`] per trigger:
//!
//! - reuse an idle resource, or build one on a miss (never wait for another
//!   caller to return one)
//! - on success the resource goes back to the pool
//! - on failure it is closed, never pooled again, and the original error is
//!   returned with any close failure attached
//! - `shutdown` drains and closes every idle resource

mod controller;
mod pool;
mod resource;

pub use controller::{LifecycleController, ShutdownSummary};
pub use pool::ResourcePool;
pub use resource::Resource;

use resource::CloseOnCancel;

use async_trait::async_trait;

use crate::broker::{BrokerConnection, Worker};

/// What a trigger does with a checked-out resource.
///
/// Implemented once per role (publish, consume). The controller never looks
/// inside the worker; it only builds it, hands it over and closes it.
#[async_trait]
pub trait ProcessingStep<C: BrokerConnection>: Send + Sync + 'static {
    type Worker: Worker;
    type Input: Send + 'static;
    type Output: Send + 'static;

    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Build the worker for a freshly opened connection.
    async fn create_worker(&self, connection: &C) -> anyhow::Result<Self::Worker>;

    /// Do the work of one trigger invocation.
    async fn process(
        &self,
        connection: &C,
        worker: &mut Self::Worker,
        input: Self::Input,
    ) -> anyhow::Result<Self::Output>;
}
